/// API route handlers, one module per resource
///
/// - `health`: liveness and database check
/// - `auth`: registration, OTP verification, login, token refresh
/// - `organization`: the caller's organization profile
/// - `users`: organization members
/// - `roles`: roles and the permission catalog
/// - `tasks`: tasks, workflow steps, comments, attachments, audit log
/// - `chat`: rooms and messages
/// - `groups`: group chat administration

pub mod auth;
pub mod chat;
pub mod groups;
pub mod health;
pub mod organization;
pub mod roles;
pub mod tasks;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Lets a partial-update field tell "absent" (`None`) apart from an explicit
/// `null` (`Some(None)`). Use with `#[serde(default, deserialize_with = ...)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `?limit=&offset=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// `(limit, offset)` with the limit clamped to `1..=MAX_LIMIT`
    pub fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}
