/// HTTP middleware
///
/// - `security`: response security headers
/// - `rate_limit`: token-bucket limits for auth endpoints and authenticated routes

pub mod rate_limit;
pub mod security;
