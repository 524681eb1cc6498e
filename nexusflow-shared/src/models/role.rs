/// Role model, permission catalog and database operations
///
/// A role is a named permission set scoped to one organization. Permissions
/// are stored as a `TEXT[]` of catalog names (e.g. `tasks:review`); the
/// role editor toggles entries and persists the resulting list.
///
/// Every organization starts with three system roles created by
/// [`Role::seed_defaults`]: Admin (everything), Manager and Employee. System
/// roles can be edited but not deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE roles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     name VARCHAR(100) NOT NULL,
///     description TEXT,
///     permissions TEXT[] NOT NULL DEFAULT '{}',
///     is_system BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (organization_id, name)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Permission catalog
///
/// The string form (`as_str`) is what is stored in `roles.permissions` and
/// what clients send to the role editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "organization:manage")]
    OrganizationManage,
    #[serde(rename = "users:manage")]
    UsersManage,
    #[serde(rename = "roles:manage")]
    RolesManage,
    #[serde(rename = "tasks:create")]
    TasksCreate,
    #[serde(rename = "tasks:assign")]
    TasksAssign,
    #[serde(rename = "tasks:review")]
    TasksReview,
    #[serde(rename = "tasks:view_all")]
    TasksViewAll,
    #[serde(rename = "tasks:delete")]
    TasksDelete,
    #[serde(rename = "groups:manage")]
    GroupsManage,
}

impl Permission {
    /// Every permission, in catalog order
    pub const ALL: [Permission; 9] = [
        Permission::OrganizationManage,
        Permission::UsersManage,
        Permission::RolesManage,
        Permission::TasksCreate,
        Permission::TasksAssign,
        Permission::TasksReview,
        Permission::TasksViewAll,
        Permission::TasksDelete,
        Permission::GroupsManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::OrganizationManage => "organization:manage",
            Permission::UsersManage => "users:manage",
            Permission::RolesManage => "roles:manage",
            Permission::TasksCreate => "tasks:create",
            Permission::TasksAssign => "tasks:assign",
            Permission::TasksReview => "tasks:review",
            Permission::TasksViewAll => "tasks:view_all",
            Permission::TasksDelete => "tasks:delete",
            Permission::GroupsManage => "groups:manage",
        }
    }

    /// Human-readable label for the role editor
    pub fn label(&self) -> &'static str {
        match self {
            Permission::OrganizationManage => "Edit organization profile",
            Permission::UsersManage => "Add, edit and remove users",
            Permission::RolesManage => "Create and edit roles",
            Permission::TasksCreate => "Create tasks",
            Permission::TasksAssign => "Assign and edit any task",
            Permission::TasksReview => "Approve or reject submitted tasks",
            Permission::TasksViewAll => "See every task in the organization",
            Permission::TasksDelete => "Delete any task",
            Permission::GroupsManage => "Administer any chat group",
        }
    }

    /// Grouping used by the role editor (`organization`, `users`, ...)
    pub fn category(&self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Parses, de-duplicates and sorts a permission list.
///
/// # Errors
///
/// Returns the first name that is not in the catalog.
pub fn normalize_permissions<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, String> {
    let mut parsed = names
        .iter()
        .map(|n| n.as_ref().trim().parse::<Permission>())
        .collect::<Result<Vec<_>, _>>()?;

    parsed.sort();
    parsed.dedup();

    Ok(parsed.into_iter().map(|p| p.as_str().to_string()).collect())
}

/// Role row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Catalog names; see [`Permission`]
    pub permissions: Vec<String>,

    /// Seeded at registration; cannot be deleted
    pub is_system: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a role. `permissions` should already be normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub is_system: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub permissions: Option<Vec<String>>,
}

/// Roles seeded for a new organization, as `(name, description, permissions)`
pub fn default_roles() -> Vec<(&'static str, &'static str, Vec<Permission>)> {
    vec![
        (
            "Admin",
            "Full access to the organization",
            Permission::ALL.to_vec(),
        ),
        (
            "Manager",
            "Creates, assigns and reviews tasks",
            vec![
                Permission::TasksCreate,
                Permission::TasksAssign,
                Permission::TasksReview,
                Permission::TasksViewAll,
                Permission::GroupsManage,
            ],
        ),
        (
            "Employee",
            "Works on assigned tasks",
            vec![Permission::TasksCreate],
        ),
    ]
}

const ROLE_COLUMNS: &str =
    "id, organization_id, name, description, permissions, is_system, created_at, updated_at";

impl Role {
    /// Returns true if this role grants `permission`
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p == permission.as_str())
    }

    /// Inserts a role
    ///
    /// # Errors
    ///
    /// Returns a unique-violation error if the organization already has a
    /// role with this name.
    pub async fn create<'e, E>(executor: E, data: CreateRole) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO roles (organization_id, name, description, permissions, is_system) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ROLE_COLUMNS
        );

        sqlx::query_as::<_, Role>(&query)
            .bind(data.organization_id)
            .bind(data.name)
            .bind(data.description)
            .bind(data.permissions)
            .bind(data.is_system)
            .fetch_one(executor)
            .await
    }

    /// Creates the Admin, Manager and Employee roles for a new organization.
    ///
    /// # Returns
    ///
    /// The created roles in seeding order; the first one is Admin.
    pub async fn seed_defaults(
        conn: &mut sqlx::PgConnection,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut roles = Vec::new();

        for (name, description, permissions) in default_roles() {
            let role = Role::create(
                &mut *conn,
                CreateRole {
                    organization_id,
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
                    is_system: true,
                },
            )
            .await?;
            roles.push(role);
        }

        Ok(roles)
    }

    /// Finds a role inside an organization
    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM roles WHERE id = $1 AND organization_id = $2",
            ROLE_COLUMNS
        );

        sqlx::query_as::<_, Role>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Finds the role with this name inside an organization
    pub async fn find_by_name(
        pool: &PgPool,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM roles WHERE organization_id = $1 AND name = $2",
            ROLE_COLUMNS
        );

        sqlx::query_as::<_, Role>(&query)
            .bind(organization_id)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Lists an organization's roles, system roles first
    pub async fn list_by_org(pool: &PgPool, organization_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM roles WHERE organization_id = $1 ORDER BY is_system DESC, name ASC",
            ROLE_COLUMNS
        );

        sqlx::query_as::<_, Role>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    /// Updates a role's non-`None` fields, scoped to its organization
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
        data: UpdateRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE roles SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.permissions.is_some() {
            bind_count += 1;
            query.push_str(&format!(", permissions = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {}",
            ROLE_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, Role>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(permissions) = data.permissions {
            q = q.bind(permissions);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a non-system role
    ///
    /// # Returns
    ///
    /// `false` if the role doesn't exist or is a system role
    pub async fn delete(pool: &PgPool, id: Uuid, organization_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM roles WHERE id = $1 AND organization_id = $2 AND is_system = FALSE",
        )
        .bind(id)
        .bind(organization_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_string_roundtrip() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>(), Ok(permission));
        }
        assert!("tasks:fly".parse::<Permission>().is_err());
    }

    #[test]
    fn test_permission_serde_matches_as_str() {
        let json = serde_json::to_string(&Permission::TasksViewAll).unwrap();
        assert_eq!(json, "\"tasks:view_all\"");
    }

    #[test]
    fn test_permission_category() {
        assert_eq!(Permission::TasksReview.category(), "tasks");
        assert_eq!(Permission::OrganizationManage.category(), "organization");
    }

    #[test]
    fn test_normalize_permissions_sorts_and_dedups() {
        let normalized =
            normalize_permissions(&["tasks:review", "users:manage", " tasks:review "]).unwrap();
        assert_eq!(normalized, vec!["users:manage", "tasks:review"]);
    }

    #[test]
    fn test_normalize_permissions_rejects_unknown() {
        let err = normalize_permissions(&["tasks:create", "billing:manage"]).unwrap_err();
        assert!(err.contains("billing:manage"));
    }

    #[test]
    fn test_default_roles() {
        let roles = default_roles();
        assert_eq!(roles.len(), 3);
        assert_eq!(roles[0].0, "Admin");
        assert_eq!(roles[0].2.len(), Permission::ALL.len());
        assert!(!roles[2].2.contains(&Permission::TasksReview));
    }

    #[test]
    fn test_role_grants() {
        let role = Role {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Reviewer".to_string(),
            description: None,
            permissions: vec!["tasks:review".to_string()],
            is_system: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(role.grants(Permission::TasksReview));
        assert!(!role.grants(Permission::TasksDelete));
    }
}
