//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use asis_core::config::AsisConfig;
use asis_core::error::AsisError;

use crate::handlers;
use crate::state::AppState;

/// Requests served at once; chat turns hold an LLM call each.
const MAX_IN_FLIGHT: usize = 64;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Browser clients are only expected from the machine itself.
    let port = state.config.api.port;
    let origins: Vec<HeaderValue> = ["127.0.0.1", "localhost"]
        .iter()
        .filter_map(|host| format!("http://{}:{}", host, port).parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let api_routes = Router::new()
        .route("/voice/chat", post(handlers::chat))
        .route(
            "/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route("/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route(
            "/tasks/{id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/tasks/{id}/complete", post(handlers::complete_task))
        .route(
            "/shopping",
            get(handlers::list_shopping).post(handlers::create_shopping_item),
        )
        .route("/shopping/clear-purchased", post(handlers::clear_purchased))
        .route(
            "/shopping/{id}",
            put(handlers::update_shopping_item)
                .delete(handlers::delete_shopping_item),
        )
        .route("/shopping/{id}/purchase", post(handlers::purchase_shopping_item))
        .route(
            "/calendar/schedule-meeting",
            post(handlers::schedule_meeting),
        )
        .route("/calendar/events", get(handlers::list_events))
        .route("/calendar/events/{id}", delete(handlers::cancel_event))
        .route("/calendar/upcoming", get(handlers::upcoming_events))
        .route("/agent/email", post(handlers::send_email))
        .route("/agent/search", post(handlers::search))
        .route("/agent/history", get(handlers::action_history))
        .route("/actions/{intent}", post(handlers::run_action))
        .route("/intents", get(handlers::list_intents))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT));

    // SSE connections are long-lived and stay outside the concurrency limit.
    let stream_routes =
        Router::new().route("/notifications/stream", get(handlers::notification_stream));

    Router::new()
        .route("/", get(handlers::status))
        .route("/health", get(handlers::health))
        .nest("/api", api_routes.merge(stream_routes))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB global limit
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `[api] host:port`.
pub async fn start_server(config: &AsisConfig, state: AppState) -> Result<(), AsisError> {
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AsisError::Service(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| AsisError::Service(format!("Server error: {}", e)))?;

    Ok(())
}
