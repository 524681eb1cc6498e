/// Organization model and database operations
///
/// An organization is the tenant boundary: every user, role, task and chat
/// room belongs to exactly one organization and queries are always scoped by
/// `organization_id`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organizations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(200) NOT NULL,
///     industry VARCHAR(100),
///     company_size VARCHAR(50),
///     phone VARCHAR(32),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::models::organization::{Organization, CreateOrganization};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let org = Organization::create(&pool, CreateOrganization {
///     name: "Acme Corp".to_string(),
///     industry: Some("Manufacturing".to_string()),
///     company_size: Some("11-50".to_string()),
///     phone: None,
/// }).await?;
///
/// let found = Organization::find_by_id(&pool, org.id).await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Registered organization
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,

    /// Display name shown to members
    pub name: String,

    /// Free-form industry label from the registration form
    pub industry: Option<String>,

    /// Size bucket from the registration form (e.g. "11-50")
    pub company_size: Option<String>,

    /// Contact phone
    pub phone: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub phone: Option<String>,
}

/// Partial update. `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub industry: Option<Option<String>>,
    pub company_size: Option<Option<String>>,
    pub phone: Option<Option<String>>,
}

impl UpdateOrganization {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.industry.is_none()
            && self.company_size.is_none()
            && self.phone.is_none()
    }
}

impl Organization {
    /// Inserts a new organization
    ///
    /// Accepts any executor so registration can create the organization,
    /// its default roles and the owner inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create<'e, E>(executor: E, data: CreateOrganization) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name, industry, company_size, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, industry, company_size, phone, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.industry)
        .bind(data.company_size)
        .bind(data.phone)
        .fetch_one(executor)
        .await?;

        Ok(org)
    }

    /// Finds an organization by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, industry, company_size, phone, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(org)
    }

    /// Updates the non-`None` fields of an organization
    ///
    /// # Returns
    ///
    /// The updated row, or `None` if no organization has this ID
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateOrganization,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE organizations SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.industry.is_some() {
            bind_count += 1;
            query.push_str(&format!(", industry = ${}", bind_count));
        }
        if data.company_size.is_some() {
            bind_count += 1;
            query.push_str(&format!(", company_size = ${}", bind_count));
        }
        if data.phone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", phone = ${}", bind_count));
        }

        query.push_str(
            " WHERE id = $1 RETURNING id, name, industry, company_size, phone, created_at, updated_at",
        );

        let mut q = sqlx::query_as::<_, Organization>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(industry) = data.industry {
            q = q.bind(industry);
        }
        if let Some(company_size) = data.company_size {
            q = q.bind(company_size);
        }
        if let Some(phone) = data.phone {
            q = q.bind(phone);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes an organization and, by cascade, everything it owns
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
