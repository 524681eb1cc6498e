/// Database layer
///
/// - `pool`: connection pool construction and health checks
/// - `migrations`: embedded schema migrations
///
/// Row types and queries live in [`crate::models`].

pub mod migrations;
pub mod pool;
