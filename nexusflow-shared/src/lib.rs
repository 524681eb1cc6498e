//! # NexusFlow Shared Library
//!
//! Types and data access shared by the NexusFlow API server and worker.
//!
//! ## Modules
//!
//! - `db`: connection pool and embedded migrations
//! - `models`: database rows and their queries
//! - `auth`: passwords, session tokens, OTP codes, permission checks
//! - `events`: the chat socket protocol
//! - `mail`: outbound email templates
//! - `redis`: optional Redis client and shared rate-limit buckets

pub mod auth;
pub mod db;
pub mod events;
pub mod mail;
pub mod models;
pub mod redis;

/// Crate version, reported by the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
