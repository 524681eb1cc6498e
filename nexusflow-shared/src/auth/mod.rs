/// Authentication and authorization
///
/// - [`password`]: Argon2id hashing and the password policy
/// - [`jwt`]: access/refresh session tokens
/// - [`otp`]: email verification codes
/// - [`middleware`]: bearer-token layer producing [`middleware::AuthContext`]
/// - [`authorization`]: membership and role permission checks
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::auth::jwt::{issue_token_pair, validate_access_token};
/// use nexusflow_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Secret-123")?;
/// assert!(verify_password("Secret-123", &hash)?);
///
/// let secret = "an-example-secret-that-is-32-bytes!";
/// let pair = issue_token_pair(Uuid::new_v4(), Uuid::new_v4(), secret)?;
/// validate_access_token(&pair.access_token, secret)?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod otp;
pub mod password;
