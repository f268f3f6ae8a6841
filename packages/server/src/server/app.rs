//! Application setup and server configuration.

use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{groups, health, matching, sessions, stream};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    if origins.is_empty() {
        // Development: allow any origin
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps, allowed_origins: &[String]) -> Router {
    let app_state = AppState { deps };

    Router::new()
        .route("/health", get(health::health_handler))
        // Groups and formation
        .route("/groups", post(groups::create_group))
        .route(
            "/groups/:group_id",
            get(groups::get_group).delete(groups::dissolve_group),
        )
        .route("/groups/:group_id/members", post(groups::add_member))
        // Discovery and decisions
        .route("/groups/:group_id/candidates", get(matching::list_candidates))
        .route("/groups/:group_id/likes/:target_id", post(matching::like))
        .route("/groups/:group_id/passes/:target_id", post(matching::pass))
        .route(
            "/groups/:group_id/badge",
            get(matching::get_badge).delete(matching::clear_badge),
        )
        .route("/matches/:match_id", get(matching::get_match))
        // Browsing sessions
        .route(
            "/sessions/:group_id",
            post(sessions::open_session)
                .get(sessions::get_session)
                .delete(sessions::close_session),
        )
        .route("/sessions/:group_id/more", post(sessions::load_more))
        .route("/sessions/:group_id/refetch", post(sessions::refetch))
        .route("/sessions/:group_id/likes/:target_id", post(sessions::like))
        .route("/sessions/:group_id/passes/:target_id", post(sessions::pass))
        // Real-time events
        .route("/events", get(stream::stream_handler))
        .layer(Extension(app_state))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
