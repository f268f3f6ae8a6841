//! Forwards matchmaking events into the StreamHub.
//!
//! Bus events (`BubbleFormed`, `MatchCreated`) and the store's membership
//! feed are serialized as `{"type": ..., ...}` JSON and published on the
//! `matchmaking` topic and on each involved group's topic.

use bubble_bus::{EventBus, Subscription};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::common::GroupId;
use crate::domains::groups::events::BubbleFormed;
use crate::domains::groups::models::{MembershipChange, MembershipChangeKind};
use crate::domains::matching::events::MatchCreated;
use crate::kernel::stream_hub::{group_topic, StreamHub, MATCHMAKING_TOPIC};

/// Payload pushed to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    BubbleFormed(BubbleFormed),
    MatchCreated(MatchCreated),
    MembershipChanged {
        group_id: GroupId,
        change: MembershipChangeKind,
        member_count: usize,
        target_size: usize,
    },
}

impl StreamMessage {
    fn groups(&self) -> Vec<GroupId> {
        match self {
            StreamMessage::BubbleFormed(e) => vec![e.group_id],
            StreamMessage::MatchCreated(e) => vec![e.group_a_id, e.group_b_id],
            StreamMessage::MembershipChanged { group_id, .. } => vec![*group_id],
        }
    }
}

impl From<&MembershipChange> for StreamMessage {
    fn from(change: &MembershipChange) -> Self {
        StreamMessage::MembershipChanged {
            group_id: change.group.id,
            change: change.kind,
            member_count: change.group.member_count(),
            target_size: change.group.target_size.get(),
        }
    }
}

fn forward(hub: &StreamHub, message: &StreamMessage) -> anyhow::Result<()> {
    let value = serde_json::to_value(message)?;
    for group_id in message.groups() {
        hub.publish(&group_topic(group_id), value.clone());
    }
    hub.publish(MATCHMAKING_TOPIC, value);
    Ok(())
}

/// Bus subscriptions feeding the hub. Dropping this keeps them registered;
/// call `detach` to stop forwarding.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    subscriptions: Vec<Subscription>,
}

impl StreamRelay {
    pub fn attach(bus: &EventBus, hub: &StreamHub) -> Self {
        let formed_hub = hub.clone();
        let matched_hub = hub.clone();
        let subscriptions = vec![
            bus.subscribe(move |event: &BubbleFormed| {
                forward(&formed_hub, &StreamMessage::BubbleFormed(event.clone()))
            }),
            bus.subscribe(move |event: &MatchCreated| {
                forward(&matched_hub, &StreamMessage::MatchCreated(event.clone()))
            }),
        ];
        Self { subscriptions }
    }

    pub fn detach(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

/// Forward the store's membership feed until the store goes away.
pub fn spawn_membership_relay(
    mut changes: broadcast::Receiver<MembershipChange>,
    hub: StreamHub,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    if change.kind == MembershipChangeKind::Unchanged {
                        continue;
                    }
                    if let Err(e) = forward(&hub, &StreamMessage::from(&change)) {
                        warn!(error = %e, "failed to relay membership change");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "membership relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("membership feed closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatRoomId, MatchId};

    #[tokio::test]
    async fn test_match_created_reaches_both_group_topics() {
        let bus = EventBus::new();
        let hub = StreamHub::new();
        let _relay = StreamRelay::attach(&bus, &hub);

        let (a, b) = (GroupId::new(), GroupId::new());
        let mut all = hub.subscribe(MATCHMAKING_TOPIC);
        let mut side_a = hub.subscribe(&group_topic(a));
        let mut side_b = hub.subscribe(&group_topic(b));

        bus.publish(MatchCreated {
            match_id: MatchId::new(),
            chat_room_id: ChatRoomId::new(),
            group_a_id: a,
            group_b_id: b,
        });

        let value = all.recv().await.unwrap();
        assert_eq!(value["type"], "match_created");
        assert_eq!(side_a.recv().await.unwrap(), value);
        assert_eq!(side_b.recv().await.unwrap(), value);
    }

    #[test]
    fn test_detach_stops_forwarding() {
        let bus = EventBus::new();
        let hub = StreamHub::new();
        let relay = StreamRelay::attach(&bus, &hub);

        relay.detach();
        assert_eq!(bus.subscriber_count::<BubbleFormed>(), 0);
        assert_eq!(bus.subscriber_count::<MatchCreated>(), 0);
    }
}
