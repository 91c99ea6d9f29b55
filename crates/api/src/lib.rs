pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.settings.app.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    // Meeting routes (under tenant)
    let meeting_routes = Router::new()
        .route("/create", post(routes::meeting::create))
        .route("/token", post(routes::meeting::token))
        .route("/room-info", get(routes::meeting::room_info))
        .route("/end", post(routes::meeting::end))
        .route("/leave", post(routes::meeting::leave))
        .route("/cancel", post(routes::meeting::cancel))
        .route("/reschedule", post(routes::meeting::reschedule))
        .route("/status", get(routes::meeting::status))
        .route("/attendance", get(routes::meeting::attendance));

    // Session sync from the scheduling system (under tenant)
    let session_routes = Router::new().route("/", put(routes::session::register));

    // Conferencing service callbacks (signature checked, no user auth)
    let webhook_routes = Router::new().route("/meetings", post(routes::webhook::meetings));

    let api = Router::new()
        .nest("/webhooks", webhook_routes)
        .nest("/tenant/{tenant_id}/meetings", meeting_routes)
        .nest("/tenant/{tenant_id}/sessions", session_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Any origin when none are configured, otherwise only the listed ones.
fn allowed_origins(origins: &[String]) -> AllowOrigin {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parsed)
    }
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
