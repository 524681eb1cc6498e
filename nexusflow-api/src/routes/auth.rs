/// Authentication endpoints
///
/// - `POST /api/auth/register` - create an organization and its owner
/// - `POST /api/auth/verify-otp` - confirm the emailed code, start a session
/// - `POST /api/auth/resend-otp` - send a fresh code
/// - `POST /api/auth/login` - exchange credentials for tokens
/// - `POST /api/auth/refresh` - exchange a refresh token for an access token
/// - `GET  /api/auth/me` - the caller with role, permissions and organization
///
/// Everything except `me` is public and rate limited per email address.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use nexusflow_shared::{
    auth::{
        authorization::load_principal,
        jwt,
        middleware::AuthContext,
        otp,
        password::{self, validate_password_field},
    },
    mail,
    models::{
        email_outbox::OutboxEmail,
        organization::{CreateOrganization, Organization},
        role::Role,
        user::{CreateUser, User},
    },
    redis::rate_limit::BucketConfig,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

const AUTH_SCOPE: &str = "auth";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 200, message = "Organization name must be 1-200 characters"))]
    pub organization_name: String,

    #[validate(length(max = 100, message = "Industry must be at most 100 characters"))]
    pub industry: Option<String>,

    #[validate(length(max = 50, message = "Company size must be at most 50 characters"))]
    pub company_size: Option<String>,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "validate_password_field"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,

    /// Seconds until the emailed code expires
    pub otp_expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResendOtpResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Returned by login and OTP verification
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl SessionResponse {
    fn issue(user: &User, secret: &str) -> ApiResult<Self> {
        let tokens = jwt::issue_token_pair(user.id, user.organization_id, secret)?;
        Ok(Self {
            user_id: user.id,
            organization_id: user.organization_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub role: Option<Role>,
    pub permissions: Vec<&'static str>,
    pub organization: Organization,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Per-email bucket shared by every public auth endpoint
async fn throttle(state: &AppState, email: &str) -> ApiResult<()> {
    let config = BucketConfig::per(state.config.rate_limit.auth_per_minute, 60);
    state.limiter.check(AUTH_SCOPE, email, config).await?;
    Ok(())
}

/// Register a new organization
///
/// ```text
/// POST /api/auth/register
/// {
///   "organization_name": "Acme",
///   "industry": "Manufacturing",
///   "name": "Alice",
///   "email": "alice@acme.test",
///   "password": "correct-horse-1"
/// }
/// ```
///
/// Creates the organization, its default roles and the owner (Admin role,
/// unverified) in one transaction together with the queued OTP email. The
/// owner must call `verify-otp` before logging in.
///
/// # Errors
///
/// - `409 Conflict`: email already registered
/// - `422 Unprocessable Entity`: validation failed
/// - `429 Too Many Requests`: rate limited
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    validate_request(&req)?;
    let email = normalize_email(&req.email);
    throttle(&state, &email).await?;

    let password_hash = password::hash_password(&req.password)?;
    let policy = state.config.otp.policy();
    let blank_to_none = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let mut tx = state.db.begin().await?;

    let organization = Organization::create(
        &mut *tx,
        CreateOrganization {
            name: req.organization_name.trim().to_string(),
            industry: blank_to_none(req.industry),
            company_size: blank_to_none(req.company_size),
            phone: blank_to_none(req.phone),
        },
    )
    .await?;

    let roles = Role::seed_defaults(&mut *tx, organization.id).await?;
    let admin_role = roles
        .first()
        .ok_or_else(|| ApiError::InternalError("Default roles were not created".to_string()))?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: organization.id,
            role_id: Some(admin_role.id),
            email: email.clone(),
            email_verified: false,
            password_hash,
            name: req.name.trim().to_string(),
            designation: None,
            phone: None,
        },
    )
    .await?;

    let issued = otp::issue(&mut *tx, &state.config.otp.secret, &email, &policy).await?;
    OutboxEmail::enqueue(
        &mut *tx,
        mail::otp_email(&email, &user.name, &issued.code, issued.expires_at),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        organization_id = %organization.id,
        "Organization registered"
    );

    Ok(Json(RegisterResponse {
        user_id: user.id,
        organization_id: organization.id,
        email,
        otp_expires_in: policy.ttl.num_seconds(),
    }))
}

/// Confirm the registration code and start a session
///
/// # Errors
///
/// - `400 Bad Request`: no pending code, expired, wrong code or too many attempts
/// - `429 Too Many Requests`: rate limited
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<Json<SessionResponse>> {
    validate_request(&req)?;
    let email = normalize_email(&req.email);
    throttle(&state, &email).await?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::BadRequest(otp::OtpError::NotFound.to_string()))?;

    otp::verify(
        &state.db,
        &state.config.otp.secret,
        &email,
        &req.code,
        &state.config.otp.policy(),
    )
    .await?;

    User::mark_email_verified(&state.db, user.id).await?;
    User::update_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, "Email verified");
    Ok(Json(SessionResponse::issue(&user, state.jwt_secret())?))
}

/// Send a fresh code
///
/// Unknown and already verified addresses get the same answer as a real
/// send, so the endpoint does not reveal which emails are registered.
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<ResendOtpRequest>,
) -> ApiResult<Json<ResendOtpResponse>> {
    validate_request(&req)?;
    let email = normalize_email(&req.email);
    throttle(&state, &email).await?;

    let response = ResendOtpResponse {
        message: "If the address is awaiting verification, a new code has been sent".to_string(),
    };

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(user) if !user.email_verified => user,
        _ => return Ok(Json(response)),
    };

    let mut tx = state.db.begin().await?;
    let issued = otp::issue(
        &mut *tx,
        &state.config.otp.secret,
        &email,
        &state.config.otp.policy(),
    )
    .await?;
    OutboxEmail::enqueue(
        &mut *tx,
        mail::otp_email(&email, &user.name, &issued.code, issued.expires_at),
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(user_id = %user.id, "Verification code resent");
    Ok(Json(response))
}

/// Login with email and password
///
/// ```text
/// POST /api/auth/login
/// { "email": "alice@acme.test", "password": "correct-horse-1" }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: unknown email or wrong password
/// - `403 Forbidden`: email not verified, or account deactivated
/// - `429 Too Many Requests`: rate limited
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    validate_request(&req)?;
    let email = normalize_email(&req.email);
    throttle(&state, &email).await?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    // checked after the password so these answers don't confirm an address
    if !user.email_verified {
        return Err(ApiError::Forbidden("Email address has not been verified".to_string()));
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    User::update_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, organization_id = %user.organization_id, "User logged in");
    Ok(Json(SessionResponse::issue(&user, state.jwt_secret())?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;
    Ok(Json(RefreshResponse { access_token }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MeResponse>> {
    let principal = load_principal(&state.db, &auth).await?;

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok(Json(MeResponse {
        permissions: principal.permissions.iter().map(|p| p.as_str()).collect(),
        user: principal.user,
        role: principal.role,
        organization,
    }))
}
