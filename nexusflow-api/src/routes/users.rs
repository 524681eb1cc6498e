/// Organization members
///
/// - `GET    /api/users?search=&limit=&offset=` - any member
/// - `POST   /api/users` - `users:manage`; the account is pre-verified and a
///   welcome email is queued
/// - `GET    /api/users/:id` - any member
/// - `PUT    /api/users/:id` - profile fields on yourself; everything else
///   needs `users:manage`
/// - `DELETE /api/users/:id` - `users:manage`, never yourself

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use nexusflow_shared::{
    auth::{
        authorization::{load_principal, require_active_member, require_permission, Principal},
        middleware::AuthContext,
        password::{self, validate_password_field},
    },
    mail,
    models::{
        email_outbox::OutboxEmail,
        organization::Organization,
        role::{Permission, Role},
        user::{CreateUser, UpdateUser, User, UserSummary},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{double_option, Pagination};

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "validate_password_field"))]
    pub password: String,

    #[validate(length(max = 100, message = "Designation must be at most 100 characters"))]
    pub designation: Option<String>,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    pub role_id: Option<Uuid>,
}

/// Partial update; `null` clears nullable fields
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub designation: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,

    /// New password. Changing your own needs `current_password`.
    #[validate(custom(function = "validate_password_field"))]
    pub password: Option<String>,

    pub current_password: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub role_id: Option<Option<Uuid>>,

    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    /// Fields that only `users:manage` may change
    fn touches_admin_fields(&self) -> bool {
        self.role_id.is_some() || self.is_active.is_some()
    }
}

fn trimmed(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|inner| inner.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

async fn check_role(state: &AppState, organization_id: Uuid, role_id: Uuid) -> ApiResult<Role> {
    Role::find_by_id_and_org(&state.db, role_id, organization_id)
        .await?
        .ok_or_else(|| ApiError::invalid("role_id", "Role does not exist in your organization"))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<UserListResponse>> {
    require_active_member(&state.db, &auth).await?;

    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve();
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let users = User::list_by_org(&state.db, auth.organization_id, search, limit, offset).await?;
    let total = User::count_by_org(&state.db, auth.organization_id, search).await?;

    Ok(Json(UserListResponse {
        users,
        total,
        limit,
        offset,
    }))
}

/// Add a member
///
/// ```text
/// POST /api/users
/// {
///   "name": "Bob",
///   "email": "bob@acme.test",
///   "password": "initial-pass-1",
///   "role_id": "uuid"
/// }
/// ```
///
/// The user and the welcome email are written in one transaction.
///
/// # Errors
///
/// - `403 Forbidden`: missing `users:manage`
/// - `409 Conflict`: email already registered
/// - `422 Unprocessable Entity`: validation failed or unknown role
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    validate_request(&req)?;
    let principal = require_permission(&state.db, &auth, Permission::UsersManage).await?;

    if let Some(role_id) = req.role_id {
        check_role(&state, auth.organization_id, role_id).await?;
    }

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    let password_hash = password::hash_password(&req.password)?;
    let email = req.email.trim().to_string();

    let mut tx = state.db.begin().await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: auth.organization_id,
            role_id: req.role_id,
            email: email.clone(),
            email_verified: true,
            password_hash,
            name: req.name.trim().to_string(),
            designation: req.designation.filter(|d| !d.trim().is_empty()),
            phone: req.phone.filter(|p| !p.trim().is_empty()),
        },
    )
    .await?;

    OutboxEmail::enqueue(
        &mut *tx,
        mail::welcome_email(&email, &user.name, &organization.name, &principal.user.name),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        organization_id = %auth.organization_id,
        created_by = %auth.user_id,
        "User created"
    );

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    require_active_member(&state.db, &auth).await?;

    let user = User::find_by_id_and_org(&state.db, user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Decides which parts of an update the principal may apply to `target`
fn authorize_update(principal: &Principal, target: &User, req: &UpdateUserRequest) -> ApiResult<()> {
    let is_self = principal.user.id == target.id;

    if !is_self || req.touches_admin_fields() {
        principal.require(Permission::UsersManage)?;
    }

    if is_self && req.touches_admin_fields() {
        return Err(ApiError::Conflict(
            "You cannot change your own role or active status".to_string(),
        ));
    }

    if is_self && req.password.is_some() && req.current_password.is_none() {
        return Err(ApiError::invalid("current_password", "Current password is required"));
    }

    Ok(())
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    validate_request(&req)?;
    let principal = load_principal(&state.db, &auth).await?;

    let target = User::find_by_id_and_org(&state.db, user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    authorize_update(&principal, &target, &req)?;

    if let (Some(current), true) = (&req.current_password, principal.user.id == target.id) {
        if !password::verify_password(current, &target.password_hash)? {
            return Err(ApiError::invalid("current_password", "Current password is incorrect"));
        }
    }

    if let Some(Some(role_id)) = req.role_id {
        check_role(&state, auth.organization_id, role_id).await?;
    }

    let password_hash = match &req.password {
        Some(new_password) => Some(password::hash_password(new_password)?),
        None => None,
    };

    let update = UpdateUser {
        name: req.name.map(|n| n.trim().to_string()),
        designation: trimmed(req.designation),
        phone: trimmed(req.phone),
        avatar_url: trimmed(req.avatar_url),
        password_hash,
        role_id: req.role_id,
        is_active: req.is_active,
    };

    let updated = User::update(&state.db, target.id, auth.organization_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %updated.id, updated_by = %auth.user_id, "User updated");
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, &auth, Permission::UsersManage).await?;

    if user_id == auth.user_id {
        return Err(ApiError::Conflict("You cannot delete your own account".to_string()));
    }

    if !User::delete(&state.db, user_id, auth.organization_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %user_id, deleted_by = %auth.user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn user(id: Uuid) -> User {
        User {
            id,
            organization_id: Uuid::nil(),
            role_id: None,
            email: "a@b.test".to_string(),
            email_verified: true,
            password_hash: String::new(),
            name: "A".to_string(),
            designation: None,
            phone: None,
            avatar_url: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    fn principal(permissions: &[Permission]) -> Principal {
        Principal {
            user: user(Uuid::new_v4()),
            role: None,
            permissions: permissions.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_self_may_edit_profile_only() {
        let me = principal(&[]);
        let target = me.user.clone();

        let profile: UpdateUserRequest = serde_json::from_str(r#"{"name":"New","phone":null}"#).unwrap();
        assert!(authorize_update(&me, &target, &profile).is_ok());

        let promote: UpdateUserRequest = serde_json::from_str(r#"{"is_active":false}"#).unwrap();
        assert!(matches!(authorize_update(&me, &target, &promote), Err(ApiError::Forbidden(_))));

        let admin = principal(&[Permission::UsersManage]);
        let admin_self = admin.user.clone();
        assert!(matches!(
            authorize_update(&admin, &admin_self, &promote),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn test_editing_others_needs_users_manage() {
        let target = user(Uuid::new_v4());
        let req: UpdateUserRequest = serde_json::from_str(r#"{"designation":"Lead"}"#).unwrap();

        assert!(authorize_update(&principal(&[]), &target, &req).is_err());
        assert!(authorize_update(&principal(&[Permission::UsersManage]), &target, &req).is_ok());
    }

    #[test]
    fn test_own_password_change_needs_current_password() {
        let me = principal(&[]);
        let target = me.user.clone();

        let req: UpdateUserRequest = serde_json::from_str(r#"{"password":"new-pass-123"}"#).unwrap();
        assert!(matches!(
            authorize_update(&me, &target, &req),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_create_request_validation() {
        let req = CreateUserRequest {
            name: "Bob".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            designation: None,
            phone: None,
            role_id: None,
        };

        let fields: Vec<String> = match validate_request(&req) {
            Err(ApiError::ValidationError(details)) => details.into_iter().map(|d| d.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        };
        assert_eq!(fields, ["email", "password"]);
    }
}
