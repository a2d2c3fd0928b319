mod api;
mod bot;
mod config;
mod db;
mod rate_limit;
mod session;
mod state;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use rate_limit::RateLimiter;
use state::AppState;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thutalk_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load settings
    let settings = config::Settings::new().expect("Failed to load settings");

    // Initialize database
    let db = db::Database::new(&settings.database.path).expect("Failed to create database");

    db.initialize()
        .expect("Failed to initialize database schema");

    // The well-known bot accounts must exist before any traffic
    bot::ensure_bot_accounts(&db).expect("Failed to provision bot accounts");
    tracing::info!("Bot accounts ready");

    tracing::info!("Database initialized successfully");

    // Create application state
    let state = AppState::new(db);

    // Run initial session cleanup on startup
    tracing::info!("Running initial session cleanup...");
    match state.session_manager.cleanup_expired_sessions() {
        Ok(count) => {
            if count > 0 {
                tracing::info!("Cleaned up {} expired sessions on startup", count);
            } else {
                tracing::info!("No expired sessions to clean up");
            }
        }
        Err(e) => {
            tracing::error!("Failed to cleanup expired sessions on startup: {}", e);
        }
    }

    // Start background task for periodic session cleanup
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Run every hour
        loop {
            interval.tick().await;
            tracing::debug!("Running periodic session cleanup...");
            match cleanup_state.session_manager.cleanup_expired_sessions() {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!("Periodic cleanup: removed {} expired sessions", count);
                    }
                }
                Err(e) => {
                    tracing::error!("Periodic session cleanup failed: {}", e);
                }
            }
        }
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create global rate limiter: 100 requests per minute per caller
    let rate_limiter = RateLimiter::new(100, 60);

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/validate", get(api::auth::validate_session))
        // Core feed & notifications
        .route("/feed", get(api::posts::get_feed))
        .route("/notifications", get(api::notifications::list_notifications))
        .route(
            "/notifications/mark-all-read",
            post(api::notifications::mark_all_read),
        )
        .route("/get_unread_count", get(api::notifications::get_unread_count))
        // Posts & interactions
        .route("/post/add", post(api::posts::add_post))
        .route("/post/edit/:id", put(api::posts::edit_post))
        .route("/post/delete/:id", delete(api::posts::delete_post))
        .route("/like/:id", post(api::posts::like_post))
        .route("/post/:post_id/comments", get(api::comments::get_comments))
        .route("/add_comment/:post_id", post(api::comments::add_comment))
        .route(
            "/comment/delete/:comment_id",
            delete(api::comments::delete_comment),
        )
        // Stories
        .route("/story/add", post(api::stories::add_story))
        .route("/delete-story/:story_id", delete(api::stories::delete_story))
        // Profile & social
        .route("/search", get(api::profile::search_users))
        .route("/search-by-id", get(api::profile::search_by_id))
        .route("/profile/:username", get(api::profile::profile_view))
        .route("/profile/:username/friends", get(api::profile::all_friends))
        .route("/block/:user_id", post(api::friends::block_user))
        .route("/unblock/:user_id", delete(api::friends::unblock_user))
        .route("/unfriend/:user_id", delete(api::friends::unfriend_user))
        // Friend system
        .route(
            "/friend/request/:user_id",
            post(api::friends::send_friend_request),
        )
        .route("/friend/accept/:request_id", post(api::friends::accept_friend))
        .route(
            "/friend/delete/:request_id",
            delete(api::friends::delete_request),
        )
        .route(
            "/friend/cancel/:user_id",
            delete(api::friends::cancel_friend_request),
        )
        // Chat system & APIs
        .route("/chats", get(api::chat::chat_list))
        .route("/chat/:username", get(api::chat::chat_room))
        .route("/chat/search/:username", get(api::chat::search_messages))
        .route("/api/send_message/:username", post(api::chat::send_message))
        .route("/api/get_messages/:username", get(api::chat::get_messages))
        .route("/api/user_status/:username", get(api::chat::user_status))
        .route("/chat/edit_message/:message_id", put(api::chat::edit_message))
        .route(
            "/chat/delete_message/:message_id",
            delete(api::chat::delete_message),
        )
        // Settings
        .route("/settings/profile", put(api::profile::update_profile))
        .route("/settings/blocked", get(api::friends::list_blocked))
        .route("/settings/password", post(api::auth::change_password))
        .route("/settings/delete", post(api::auth::delete_account))
        // Admin actions
        .route("/admin/ban-user/:user_id", post(api::admin::ban_user))
        .route("/admin/unban-user/:user_id", post(api::admin::unban_user))
        .route(
            "/admin/change-role/:user_id",
            post(api::admin::change_user_role),
        )
        .route(
            "/official-broadcast",
            get(api::admin::list_broadcasts).post(api::admin::send_broadcast),
        )
        .with_state(state)
        .layer(middleware::from_fn(rate_limit::rate_limit_middleware))
        .layer(axum::Extension(rate_limiter))
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .expect("Failed to parse server address");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

async fn health_check() -> &'static str {
    "OK"
}
