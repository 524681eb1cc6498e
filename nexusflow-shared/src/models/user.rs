/// User model and database operations
///
/// Users belong to exactly one organization and hold at most one role. The
/// organization owner is created unverified at registration and becomes
/// usable once the emailed OTP is confirmed; users added by an administrator
/// are created verified.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     role_id UUID REFERENCES roles(id) ON DELETE SET NULL,
///     email CITEXT NOT NULL UNIQUE,
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     password_hash TEXT NOT NULL,
///     name VARCHAR(200) NOT NULL,
///     designation VARCHAR(100),
///     phone VARCHAR(32),
///     avatar_url TEXT,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::models::user::{User, CreateUser};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, org_id: Uuid, role_id: Uuid) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     organization_id: org_id,
///     role_id: Some(role_id),
///     email: "jane@acme.test".to_string(),
///     email_verified: true,
///     password_hash: "$argon2id$...".to_string(),
///     name: "Jane Doe".to_string(),
///     designation: Some("Engineer".to_string()),
///     phone: None,
/// }).await?;
///
/// // Lookups by email are case-insensitive
/// let found = User::find_by_email(&pool, "JANE@acme.test").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// Role granting this user's permissions; `None` means no permissions
    pub role_id: Option<Uuid>,

    /// Unique across all organizations (CITEXT)
    pub email: String,

    /// Set once the registration OTP has been confirmed
    pub email_verified: bool,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub name: String,
    pub designation: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,

    /// Deactivated users cannot log in or connect to chat
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Public view of a user, safe to return to other members
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub designation: Option<String>,
    pub avatar_url: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            designation: user.designation.clone(),
            avatar_url: user.avatar_url.clone(),
            role_id: user.role_id,
            is_active: user.is_active,
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organization_id: Uuid,
    pub role_id: Option<Uuid>,
    pub email: String,
    pub email_verified: bool,

    /// Argon2id hash, never the plaintext password
    pub password_hash: String,

    pub name: String,
    pub designation: Option<String>,
    pub phone: Option<String>,
}

/// Partial update. Only `Some` fields are written; `Some(None)` clears.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub designation: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub role_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

const USER_COLUMNS: &str = "id, organization_id, role_id, email::TEXT AS email, email_verified, password_hash, \
     name, designation, phone, avatar_url, is_active, created_at, updated_at, last_login_at";

impl User {
    /// Inserts a user
    ///
    /// # Errors
    ///
    /// Returns a unique-violation error (`users_email_key`) when the email is
    /// already registered anywhere.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO users (organization_id, role_id, email, email_verified, password_hash, \
             name, designation, phone) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.organization_id)
            .bind(data.role_id)
            .bind(data.email)
            .bind(data.email_verified)
            .bind(data.password_hash)
            .bind(data.name)
            .bind(data.designation)
            .bind(data.phone)
            .fetch_one(executor)
            .await
    }

    /// Finds a user by ID across all organizations
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by ID inside one organization
    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE id = $1 AND organization_id = $2",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE email = $1::CITEXT", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Lists an organization's users, alphabetically
    ///
    /// `search` matches name or email as a case-insensitive substring.
    pub async fn list_by_org(
        pool: &PgPool,
        organization_id: Uuid,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        let pattern = search.map(|s| format!("%{}%", escape_like(s)));

        sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, email::TEXT AS email, name, designation, avatar_url, role_id, is_active
            FROM users
            WHERE organization_id = $1
              AND ($2::TEXT IS NULL OR name ILIKE $2 OR email ILIKE $2)
            ORDER BY name ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(organization_id)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts users matching the same filter as [`User::list_by_org`]
    pub async fn count_by_org(
        pool: &PgPool,
        organization_id: Uuid,
        search: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let pattern = search.map(|s| format!("%{}%", escape_like(s)));

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM users
            WHERE organization_id = $1
              AND ($2::TEXT IS NULL OR name ILIKE $2 OR email ILIKE $2)
            "#,
        )
        .bind(organization_id)
        .bind(pattern)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Returns how many of `ids` are active members of the organization.
    ///
    /// Used to validate member lists (group creation, task assignment)
    /// without loading every row.
    pub async fn count_members(
        pool: &PgPool,
        organization_id: Uuid,
        ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT id) FROM users
            WHERE organization_id = $1 AND id = ANY($2) AND is_active = TRUE
            "#,
        )
        .bind(organization_id)
        .bind(ids)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Number of users holding a role
    pub async fn count_with_role(pool: &PgPool, role_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Updates a user's non-`None` fields, scoped to the organization
    ///
    /// # Returns
    ///
    /// The updated user, or `None` if the user isn't in this organization
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.designation.is_some() {
            bind_count += 1;
            query.push_str(&format!(", designation = ${}", bind_count));
        }
        if data.phone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", phone = ${}", bind_count));
        }
        if data.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if data.password_hash.is_some() {
            bind_count += 1;
            query.push_str(&format!(", password_hash = ${}", bind_count));
        }
        if data.role_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", role_id = ${}", bind_count));
        }
        if data.is_active.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_active = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {}",
            USER_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(designation) = data.designation {
            q = q.bind(designation);
        }
        if let Some(phone) = data.phone {
            q = q.bind(phone);
        }
        if let Some(avatar_url) = data.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(password_hash) = data.password_hash {
            q = q.bind(password_hash);
        }
        if let Some(role_id) = data.role_id {
            q = q.bind(role_id);
        }
        if let Some(is_active) = data.is_active {
            q = q.bind(is_active);
        }

        q.fetch_optional(pool).await
    }

    /// Marks the email verified after a successful OTP check
    pub async fn mark_email_verified(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamps `last_login_at`
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user from an organization
    ///
    /// Tasks and messages they authored keep their rows with a NULL author.
    pub async fn delete(pool: &PgPool, id: Uuid, organization_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
