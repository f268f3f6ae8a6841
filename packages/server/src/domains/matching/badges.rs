use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bubble_bus::{EventBus, Subscription};

use crate::common::GroupId;
use crate::domains::matching::events::MatchCreated;

/// Unseen-match counts per group, fed by `MatchCreated`.
#[derive(Clone)]
pub struct MatchBadgeCounter {
    counts: Arc<Mutex<HashMap<GroupId, usize>>>,
    subscription: Subscription,
}

impl MatchBadgeCounter {
    pub fn attach(bus: &EventBus) -> Self {
        let counts: Arc<Mutex<HashMap<GroupId, usize>>> = Arc::default();
        let sink = counts.clone();
        let subscription = bus.subscribe(move |event: &MatchCreated| {
            let mut counts = sink.lock().unwrap_or_else(|e| e.into_inner());
            for group_id in [event.group_a_id, event.group_b_id] {
                *counts.entry(group_id).or_insert(0) += 1;
            }
            Ok(())
        });
        Self {
            counts,
            subscription,
        }
    }

    pub fn unseen(&self, group_id: GroupId) -> usize {
        self.lock().get(&group_id).copied().unwrap_or(0)
    }

    /// Reset the badge once the group has looked at its matches.
    pub fn clear(&self, group_id: GroupId) -> usize {
        self.lock().remove(&group_id).unwrap_or(0)
    }

    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<GroupId, usize>> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }
}
