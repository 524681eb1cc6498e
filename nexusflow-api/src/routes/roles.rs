/// Roles and the permission catalog
///
/// - `GET    /api/roles` - any member
/// - `GET    /api/roles/permissions` - catalog with labels, for the role editor
/// - `POST   /api/roles` - `roles:manage`
/// - `GET    /api/roles/:id` - any member
/// - `PUT    /api/roles/:id` - `roles:manage`
/// - `DELETE /api/roles/:id` - `roles:manage`
///
/// Permission lists are stored normalized: known names only, de-duplicated
/// and sorted. System roles (seeded at registration) keep their name and
/// cannot be deleted.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use nexusflow_shared::{
    auth::{
        authorization::{require_active_member, require_permission},
        middleware::AuthContext,
    },
    models::{
        role::{normalize_permissions, CreateRole, Permission, Role, UpdateRole},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::double_option;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub permissions: Option<Vec<String>>,
}

/// One catalog entry
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
}

pub fn permission_catalog() -> Vec<PermissionInfo> {
    Permission::ALL
        .iter()
        .map(|p| PermissionInfo {
            name: p.as_str(),
            label: p.label(),
            category: p.category(),
        })
        .collect()
}

fn normalize(names: &[String]) -> ApiResult<Vec<String>> {
    normalize_permissions(names).map_err(|e| ApiError::invalid("permissions", e))
}

async fn find_role(state: &AppState, auth: &AuthContext, role_id: Uuid) -> ApiResult<Role> {
    Role::find_by_id_and_org(&state.db, role_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))
}

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Role>>> {
    require_active_member(&state.db, &auth).await?;
    Ok(Json(Role::list_by_org(&state.db, auth.organization_id).await?))
}

pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<PermissionInfo>>> {
    require_active_member(&state.db, &auth).await?;
    Ok(Json(permission_catalog()))
}

/// Create a role
///
/// ```text
/// POST /api/roles
/// {
///   "name": "Reviewer",
///   "description": "Reviews submitted work",
///   "permissions": ["tasks:review", "tasks:view_all"]
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: a role with this name exists
/// - `422 Unprocessable Entity`: unknown permission name
pub async fn create_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    validate_request(&req)?;
    require_permission(&state.db, &auth, Permission::RolesManage).await?;

    let role = Role::create(
        &state.db,
        CreateRole {
            organization_id: auth.organization_id,
            name: req.name.trim().to_string(),
            description: req.description.filter(|d| !d.trim().is_empty()),
            permissions: normalize(&req.permissions)?,
            is_system: false,
        },
    )
    .await?;

    tracing::info!(role_id = %role.id, organization_id = %auth.organization_id, "Role created");
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<Role>> {
    require_active_member(&state.db, &auth).await?;
    Ok(Json(find_role(&state, &auth, role_id).await?))
}

/// Update a role
///
/// Refuses to strip `roles:manage` from the caller's own role, which would
/// leave nobody able to undo the change.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Role>> {
    validate_request(&req)?;
    let principal = require_permission(&state.db, &auth, Permission::RolesManage).await?;
    let role = find_role(&state, &auth, role_id).await?;

    let name = req.name.map(|n| n.trim().to_string());
    if role.is_system && name.as_deref().is_some_and(|n| n != role.name) {
        return Err(ApiError::Conflict("System roles cannot be renamed".to_string()));
    }

    let permissions = req.permissions.as_deref().map(normalize).transpose()?;
    if let Some(permissions) = &permissions {
        let keeps_manage = permissions.iter().any(|p| p == Permission::RolesManage.as_str());
        if principal.user.role_id == Some(role.id) && !keeps_manage {
            return Err(ApiError::Conflict(
                "You cannot remove roles:manage from your own role".to_string(),
            ));
        }
    }

    let update = UpdateRole {
        name,
        description: req
            .description
            .map(|d| d.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())),
        permissions,
    };

    let updated = Role::update(&state.db, role.id, auth.organization_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

    tracing::info!(role_id = %updated.id, updated_by = %auth.user_id, "Role updated");
    Ok(Json(updated))
}

/// Delete a role; system roles and roles still held by users are kept
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, &auth, Permission::RolesManage).await?;
    let role = find_role(&state, &auth, role_id).await?;

    if role.is_system {
        return Err(ApiError::Conflict("System roles cannot be deleted".to_string()));
    }

    let holders = User::count_with_role(&state.db, role.id).await?;
    if holders > 0 {
        return Err(ApiError::Conflict(format!(
            "Role is assigned to {} user(s); reassign them first",
            holders
        )));
    }

    if !Role::delete(&state.db, role.id, auth.organization_id).await? {
        return Err(ApiError::NotFound("Role not found".to_string()));
    }

    tracing::info!(role_id = %role.id, deleted_by = %auth.user_id, "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_permission() {
        let catalog = permission_catalog();
        assert_eq!(catalog.len(), Permission::ALL.len());
        assert_eq!(
            catalog[0],
            PermissionInfo {
                name: "organization:manage",
                label: "Edit organization profile",
                category: "organization",
            }
        );
        assert!(catalog.iter().any(|p| p.name == "tasks:view_all" && p.category == "tasks"));
    }

    #[test]
    fn test_normalize_rejects_unknown_names() {
        let names = vec!["tasks:review".to_string(), "tasks:fly".to_string()];
        let err = normalize(&names).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(ref details) if details[0].field == "permissions"));
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let names = vec![
            "tasks:review".to_string(),
            "roles:manage".to_string(),
            "tasks:review".to_string(),
        ];
        let normalized = normalize(&names).unwrap();
        assert_eq!(normalized.len(), 2);
        assert!(normalized.contains(&"roles:manage".to_string()));
    }
}
