use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::domains::groups::events::BubbleFormed;
use crate::domains::matching::events::MatchCreated;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    store: StoreHealth,
    open_sessions: usize,
    event_bus: EventBusHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    backend: &'static str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idle_connections: Option<usize>,
}

#[derive(Serialize)]
pub struct EventBusHealth {
    bubble_formed_subscribers: usize,
    match_created_subscribers: usize,
}

/// Health check endpoint
///
/// Checks database connectivity when running on Postgres and reports bus and
/// session counts. Returns 200 OK if the store is reachable, 503 otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let deps = &state.deps;

    let store = match &deps.db_pool {
        Some(pool) => {
            let (status, error) = match tokio::time::timeout(
                std::time::Duration::from_secs(5),
                sqlx::query("SELECT 1").execute(pool),
            )
            .await
            {
                Ok(Ok(_)) => ("ok".to_string(), None),
                Ok(Err(e)) => ("error".to_string(), Some(format!("Query failed: {}", e))),
                Err(_) => ("error".to_string(), Some("Query timeout (>5s)".to_string())),
            };
            StoreHealth {
                backend: "postgres",
                status,
                error,
                pool_size: Some(pool.size()),
                idle_connections: Some(pool.num_idle()),
            }
        }
        None => StoreHealth {
            backend: "memory",
            status: "ok".to_string(),
            error: None,
            pool_size: None,
            idle_connections: None,
        },
    };

    let is_healthy = store.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            store,
            open_sessions: deps.sessions.len(),
            event_bus: EventBusHealth {
                bubble_formed_subscribers: deps.bus.subscriber_count::<BubbleFormed>(),
                match_created_subscribers: deps.bus.subscriber_count::<MatchCreated>(),
            },
        }),
    )
}
