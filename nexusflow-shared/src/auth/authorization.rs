/// Permission checks
///
/// Tokens only prove identity. What a caller may do is decided on every
/// request from the database:
///
/// 1. **Membership**: the user must still exist in the token's organization
///    and be active. Deactivating an account locks it out immediately even
///    while its tokens are unexpired.
/// 2. **Role permissions**: the user's role lists catalog permissions
///    (see [`Permission`]). A user without a role has none.
/// 3. **Resource rules**: handlers layer ownership checks on top (task
///    creator, group admin, comment author).
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::auth::authorization::require_permission;
/// use nexusflow_shared::auth::middleware::AuthContext;
/// use nexusflow_shared::models::role::Permission;
/// use sqlx::PgPool;
///
/// async fn delete_role(pool: &PgPool, auth: &AuthContext) -> Result<(), Box<dyn std::error::Error>> {
///     let principal = require_permission(pool, auth, Permission::RolesManage).await?;
///     tracing::info!(user_id = %principal.user.id, "Deleting role");
///     Ok(())
/// }
/// ```

use std::collections::BTreeSet;

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::role::{Permission, Role};
use crate::models::user::User;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Token refers to a user that no longer exists in the organization
    #[error("Not a member of this organization")]
    NotMember,

    #[error("Account is deactivated")]
    Inactive,

    #[error("Missing permission: {0}")]
    MissingPermission(Permission),

    /// Resource-level rule failed (not the owner, not a group admin, ...)
    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// The caller's user row together with its effective permissions
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub role: Option<Role>,
    pub permissions: BTreeSet<Permission>,
}

impl Principal {
    pub fn new(user: User, role: Option<Role>) -> Self {
        let permissions = role
            .as_ref()
            .map(|r| parse_permissions(&r.permissions))
            .unwrap_or_default();

        Self {
            user,
            role,
            permissions,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// `Ok(())` if the principal holds `permission`
    pub fn require(&self, permission: Permission) -> Result<(), AuthzError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AuthzError::MissingPermission(permission))
        }
    }

    /// Passes if the caller is `owner_id` or holds `permission`
    pub fn require_owner_or(&self, owner_id: Option<Uuid>, permission: Permission) -> Result<(), AuthzError> {
        if owner_id == Some(self.user.id) || self.can(permission) {
            Ok(())
        } else {
            Err(AuthzError::NotAuthorized)
        }
    }
}

/// Known permission names; stale entries left in a role are ignored
pub fn parse_permissions(names: &[String]) -> BTreeSet<Permission> {
    names.iter().filter_map(|n| n.parse().ok()).collect()
}

/// Loads the caller and checks they are an active member of the token's
/// organization.
pub async fn require_active_member(pool: &PgPool, auth: &AuthContext) -> Result<User, AuthzError> {
    let user = User::find_by_id_and_org(pool, auth.user_id, auth.organization_id)
        .await?
        .ok_or(AuthzError::NotMember)?;

    if !user.is_active {
        return Err(AuthzError::Inactive);
    }

    Ok(user)
}

/// Effective permissions of `user` (empty when no role is assigned)
pub async fn load_permissions(pool: &PgPool, user: &User) -> Result<BTreeSet<Permission>, sqlx::Error> {
    let Some(role_id) = user.role_id else {
        return Ok(BTreeSet::new());
    };

    let role = Role::find_by_id_and_org(pool, role_id, user.organization_id).await?;
    Ok(role
        .map(|r| parse_permissions(&r.permissions))
        .unwrap_or_default())
}

/// Resolves the caller into a [`Principal`] without requiring any permission
pub async fn load_principal(pool: &PgPool, auth: &AuthContext) -> Result<Principal, AuthzError> {
    let user = require_active_member(pool, auth).await?;

    let role = match user.role_id {
        Some(role_id) => Role::find_by_id_and_org(pool, role_id, user.organization_id).await?,
        None => None,
    };

    Ok(Principal::new(user, role))
}

/// Resolves the caller and requires `permission`
///
/// # Errors
///
/// - `NotMember` / `Inactive` from the membership check
/// - `MissingPermission` when the role does not grant `permission`
pub async fn require_permission(
    pool: &PgPool,
    auth: &AuthContext,
    permission: Permission,
) -> Result<Principal, AuthzError> {
    let principal = load_principal(pool, auth).await?;
    principal.require(permission)?;

    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role_id,
            email: "jane@acme.test".to_string(),
            email_verified: true,
            password_hash: String::new(),
            name: "Jane".to_string(),
            designation: None,
            phone: None,
            avatar_url: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    fn role(permissions: &[&str]) -> Role {
        Role {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Custom".to_string(),
            description: None,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            is_system: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_permissions_skips_unknown() {
        let parsed = parse_permissions(&[
            "tasks:review".to_string(),
            "billing:manage".to_string(),
            "tasks:review".to_string(),
        ]);

        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains(&Permission::TasksReview));
    }

    #[test]
    fn test_principal_without_role_has_nothing() {
        let principal = Principal::new(user(None), None);

        for permission in Permission::ALL {
            assert!(!principal.can(permission));
        }
        assert!(matches!(
            principal.require(Permission::TasksCreate),
            Err(AuthzError::MissingPermission(Permission::TasksCreate))
        ));
    }

    #[test]
    fn test_principal_permissions_from_role() {
        let r = role(&["tasks:create", "tasks:review"]);
        let principal = Principal::new(user(Some(r.id)), Some(r));

        assert!(principal.can(Permission::TasksCreate));
        assert!(principal.can(Permission::TasksReview));
        assert!(!principal.can(Permission::UsersManage));
        assert!(principal.require(Permission::TasksReview).is_ok());
    }

    #[test]
    fn test_require_owner_or() {
        let principal = Principal::new(user(None), None);
        let me = principal.user.id;

        assert!(principal.require_owner_or(Some(me), Permission::TasksDelete).is_ok());
        assert!(matches!(
            principal.require_owner_or(Some(Uuid::new_v4()), Permission::TasksDelete),
            Err(AuthzError::NotAuthorized)
        ));
        assert!(principal.require_owner_or(None, Permission::TasksDelete).is_err());

        let r = role(&["tasks:delete"]);
        let admin = Principal::new(user(Some(r.id)), Some(r));
        assert!(admin.require_owner_or(None, Permission::TasksDelete).is_ok());
    }
}
