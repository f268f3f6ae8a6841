//! SSE streaming endpoint.
//!
//! GET /events            all matchmaking events
//! GET /events?group_id=  events that concern one group
//!
//! Subscribes to the StreamHub and forwards JSON values as SSE events named
//! after their `type` field (`bubble_formed`, `match_created`,
//! `membership_changed`).

use std::convert::Infallible;

use axum::{
    extract::{Extension, Query},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;

use crate::common::GroupId;
use crate::kernel::stream_hub::{group_topic, MATCHMAKING_TOPIC};
use crate::server::app::AppState;

#[derive(Deserialize)]
pub struct StreamQuery {
    group_id: Option<GroupId>,
}

pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let topic = match query.group_id {
        Some(group_id) => group_topic(group_id),
        None => MATCHMAKING_TOPIC.to_string(),
    };
    // Dropped with the response, which releases the topic.
    let subscription = state.deps.stream_hub.stream(&topic);
    tracing::debug!(%topic, "event stream opened");

    // Stream with connected event and lag handling
    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = subscription.filter_map(|result| async {
        match result {
            Ok(value) => {
                let event_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("message");
                Event::default()
                    .event(event_name)
                    .json_data(&value)
                    .ok()
                    .map(Ok)
            }
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                Event::default()
                    .event("lagged")
                    .json_data(serde_json::json!({"missed": n}))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}
