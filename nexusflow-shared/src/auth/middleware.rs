/// Bearer-token authentication
///
/// [`jwt_auth_middleware`] validates the access token on every protected
/// request and stores an [`AuthContext`] in the request extensions, where
/// handlers pick it up with `Extension<AuthContext>`.
///
/// The chat socket cannot always send headers from a browser, so
/// [`authenticate`] also accepts a raw token taken from the query string.
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Extension, Router};
/// use nexusflow_shared::auth::middleware::{create_jwt_middleware, AuthContext};
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     auth.user_id.to_string()
/// }
///
/// let app: Router = Router::new()
///     .route("/me", get(whoami))
///     .layer(axum::middleware::from_fn(create_jwt_middleware("secret")));
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, Claims, JwtError};

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

impl AuthContext {
    pub fn new(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }

    pub fn from_claims(claims: &Claims) -> Self {
        Self::new(claims.sub, claims.org_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            JwtError::WrongTokenType { .. } => {
                AuthError::InvalidToken("Access token required".to_string())
            }
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({
            "error": "unauthorized",
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// # Returns
///
/// - `Ok(None)` when there is no Authorization header
/// - `Err(InvalidFormat)` when the header isn't a bearer credential
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid UTF-8".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates the access token from the headers, falling back to
/// `query_token` (used by the WebSocket upgrade).
pub fn authenticate(
    headers: &HeaderMap,
    query_token: Option<&str>,
    secret: &str,
) -> Result<AuthContext, AuthError> {
    let token = match bearer_token(headers)? {
        Some(token) => token,
        None => query_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials)?,
    };

    let claims = validate_access_token(token, secret)?;
    Ok(AuthContext::from_claims(&claims))
}

/// Axum middleware: rejects requests without a valid access token
pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = authenticate(req.headers(), None, &secret)?;
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Wraps [`jwt_auth_middleware`] for `axum::middleware::from_fn`
pub fn create_jwt_middleware(
    secret: impl Into<String>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>
       + Clone {
    let secret = secret.into();
    move |req, next| {
        let secret = secret.clone();
        Box::pin(jwt_auth_middleware(secret, req, next))
    }
}
