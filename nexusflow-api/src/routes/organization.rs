/// The caller's organization
///
/// - `GET /api/organization` - any member
/// - `PUT /api/organization` - `organization:manage`

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use nexusflow_shared::{
    auth::{
        authorization::{require_active_member, require_permission},
        middleware::AuthContext,
    },
    models::{
        organization::{Organization, UpdateOrganization},
        role::Permission,
    },
};
use serde::Deserialize;
use validator::Validate;

use super::double_option;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub industry: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub company_size: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
}

/// Blank strings clear the field like `null` does
fn clean(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|inner| inner.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

impl UpdateOrganizationRequest {
    fn into_update(self) -> UpdateOrganization {
        UpdateOrganization {
            name: self.name.map(|n| n.trim().to_string()),
            industry: clean(self.industry),
            company_size: clean(self.company_size),
            phone: clean(self.phone),
        }
    }
}

pub async fn get_organization(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Organization>> {
    require_active_member(&state.db, &auth).await?;

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok(Json(organization))
}

pub async fn update_organization(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateOrganizationRequest>,
) -> ApiResult<Json<Organization>> {
    validate_request(&req)?;
    require_permission(&state.db, &auth, Permission::OrganizationManage).await?;

    let update = req.into_update();
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let organization = Organization::update(&state.db, auth.organization_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    tracing::info!(organization_id = %organization.id, updated_by = %auth.user_id, "Organization updated");
    Ok(Json(organization))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_clear_fields() {
        let req: UpdateOrganizationRequest =
            serde_json::from_str(r#"{"industry":"  ","phone":null,"company_size":"11-50"}"#).unwrap();
        let update = req.into_update();

        assert_eq!(update.industry, Some(None));
        assert_eq!(update.phone, Some(None));
        assert_eq!(update.company_size, Some(Some("11-50".to_string())));
        assert!(update.name.is_none());
    }
}
