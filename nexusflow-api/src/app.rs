/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use nexusflow_api::{app::{build_router, AppState}, config::Config, middleware::rate_limit::RateLimiter};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config, RateLimiter::local());
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        rate_limit::{api_rate_limit, RateLimiter},
        security::SecurityHeadersLayer,
    },
    realtime::{socket::ws_handler, ChatHub},
    routes,
    storage::AttachmentStore,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use nexusflow_shared::auth::middleware::create_jwt_middleware;
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,

    /// Socket fan-out for chat rooms and personal channels
    pub hub: Arc<ChatHub>,

    pub store: AttachmentStore,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, limiter: RateLimiter) -> Self {
        let store = AttachmentStore::new(config.uploads.dir.clone(), config.uploads.max_bytes);

        Self {
            db,
            config: Arc::new(config),
            hub: Arc::new(ChatHub::default()),
            store,
            limiter: Arc::new(limiter),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Builds the complete router
///
/// ```text
/// /api
/// ├── GET  /health                  public
/// ├── /auth                         public, per-email rate limit
/// │   ├── POST /register, /verify-otp, /resend-otp, /login, /refresh
/// │   └── GET  /me                  authenticated
/// ├── GET  /ws?token=               WebSocket, authenticates itself
/// └── authenticated, per-user rate limit
///     ├── /organization
///     ├── /users
///     ├── /roles
///     ├── /tasks
///     ├── /chat
///     └── /groups
/// ```
///
/// Outermost first: security headers, CORS, tracing, then per-router auth
/// and rate limiting.
pub fn build_router(state: AppState) -> Router {
    let public_auth = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify-otp", post(routes::auth::verify_otp))
        .route("/resend-otp", post(routes::auth::resend_otp))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let organization = Router::new().route(
        "/",
        get(routes::organization::get_organization).put(routes::organization::update_organization),
    );

    let users = Router::new()
        .route("/", get(routes::users::list_users).post(routes::users::create_user))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        );

    let roles = Router::new()
        .route("/", get(routes::roles::list_roles).post(routes::roles::create_role))
        .route("/permissions", get(routes::roles::list_permissions))
        .route(
            "/:id",
            get(routes::roles::get_role)
                .put(routes::roles::update_role)
                .delete(routes::roles::delete_role),
        );

    let upload_limit = DefaultBodyLimit::max(state.store.max_bytes() + MULTIPART_OVERHEAD);
    let tasks = Router::new()
        .route("/", get(routes::tasks::list_tasks).post(routes::tasks::create_task))
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/:id/start", post(routes::tasks::start_task))
        .route("/:id/submit", post(routes::tasks::submit_task))
        .route("/:id/approve", post(routes::tasks::approve_task))
        .route("/:id/reject", post(routes::tasks::reject_task))
        .route(
            "/:id/comments",
            get(routes::tasks::list_comments).post(routes::tasks::add_comment),
        )
        .route("/:id/comments/:comment_id", delete(routes::tasks::delete_comment))
        .route(
            "/:id/attachments",
            get(routes::tasks::list_attachments)
                .post(routes::tasks::upload_attachment)
                .layer(upload_limit),
        )
        .route(
            "/:id/attachments/:attachment_id",
            get(routes::tasks::download_attachment).delete(routes::tasks::delete_attachment),
        )
        .route("/:id/logs", get(routes::tasks::list_logs));

    let chat = Router::new()
        .route("/rooms", get(routes::chat::list_rooms))
        .route("/direct", post(routes::chat::open_direct))
        .route("/rooms/:id", get(routes::chat::get_room))
        .route(
            "/rooms/:id/messages",
            get(routes::chat::list_messages).post(routes::chat::send_message),
        )
        .route("/rooms/:id/read", post(routes::chat::mark_read));

    let groups = Router::new()
        .route("/", get(routes::groups::list_groups).post(routes::groups::create_group))
        .route(
            "/:id",
            get(routes::groups::get_group)
                .put(routes::groups::rename_group)
                .delete(routes::groups::delete_group),
        )
        .route("/:id/members", post(routes::groups::add_members))
        .route("/:id/members/:user_id", delete(routes::groups::remove_member));

    // the JWT layer is added last so it runs before the rate limiter
    let protected = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .nest("/organization", organization)
        .nest("/users", users)
        .nest("/roles", roles)
        .nest("/tasks", tasks)
        .nest("/chat", chat)
        .nest("/groups", groups)
        .layer(from_fn_with_state(state.clone(), api_rate_limit))
        .layer(from_fn(create_jwt_middleware(state.jwt_secret().to_string())));

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(ws_handler))
        .nest("/auth", public_auth)
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(origins: &str) -> Config {
        Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgresql://localhost/nexusflow_test".to_string()),
            "JWT_SECRET" => Some("app-test-secret-at-least-32-bytes-long".to_string()),
            "CORS_ORIGINS" => Some(origins.to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_any_origin_detection() {
        assert!(config("*").allows_any_origin());
        assert!(!config("https://app.nexusflow.test").allows_any_origin());
    }
}
