//! Student Commons Backend
//!
//! REST backend for the community platform: posts, comments, anonymous chat
//! with live fan-out, personal todo lists and user/admin management, backed by
//! SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod pagination;
mod realtime;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use realtime::{ChatBroadcast, CHANNEL_CAPACITY};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub chat_tx: ChatBroadcast,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Student Commons Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if the JWT secret was not configured
    if config.uses_dev_secret() {
        tracing::warn!("No JWT secret configured (COMMONS_JWT_SECRET). Using the dev fallback!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Chat fan-out channel
    let (chat_tx, _) = broadcast::channel(CHANNEL_CAPACITY);

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
        chat_tx,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone config for the auth layer
    let auth_config = state.config.clone();

    // API routes
    let api_routes = Router::new()
        // Auth & profile
        .route("/auth/user/signup", post(api::user_signup))
        .route("/auth/user/login", post(api::user_login))
        .route("/auth/admin/signup", post(api::admin_signup))
        .route("/auth/admin/login", post(api::admin_login))
        .route(
            "/auth/admin/generate-verification",
            post(api::generate_admin_verification),
        )
        .route("/auth/profile", get(api::get_profile))
        .route("/auth/profile", put(api::update_profile))
        // Posts
        .route("/posts", get(api::list_posts))
        .route("/posts", post(api::create_post))
        .route("/posts/saved", get(api::get_saved_posts))
        .route("/posts/{id}", put(api::update_post))
        .route("/posts/{id}", delete(api::delete_post))
        .route("/posts/{id}/like", post(api::toggle_like))
        .route("/posts/{id}/save", post(api::toggle_save))
        .route("/posts/{id}/comments", get(api::get_comments))
        .route("/posts/{id}/comments", post(api::add_comment))
        .route("/posts/comments/{id}", delete(api::delete_comment))
        // Chat
        .route("/chat/messages", get(api::get_messages))
        .route("/chat/messages", post(api::send_message))
        .route("/chat/messages/{id}/reply", post(api::reply_to_message))
        .route("/chat/messages/{id}/like", post(api::like_message))
        .route("/chat/messages/{id}", delete(api::delete_message))
        .route("/chat/messages/{id}/replies", get(api::get_message_replies))
        .route("/chat/stream", get(realtime::chat_stream))
        // Todos
        .route("/todos", get(api::get_todos))
        .route("/todos", post(api::create_todo))
        .route("/todos/stats", get(api::get_todo_stats))
        .route("/todos/bulk", patch(api::bulk_update_todos))
        .route("/todos/{id}", put(api::update_todo))
        .route("/todos/{id}", delete(api::delete_todo))
        .route("/todos/{id}/position", put(api::update_todo_position))
        // Users
        .route("/users", get(api::get_users))
        .route("/users/admin/stats", get(api::get_user_stats))
        .route("/users/{id}", get(api::get_user_by_id))
        .route("/users/{id}/posts", get(api::get_user_posts))
        .route("/users/{id}/role", put(api::update_user_role))
        .route("/users/{id}/status", patch(api::toggle_user_status))
        .route("/users/{id}", delete(api::delete_user))
        // Decode the caller identity; anonymous requests pass through
        .layer(middleware::from_fn(move |req, next| {
            auth::optional_auth(auth_config.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
