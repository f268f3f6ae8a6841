//! Group formation: create, join, dissolve, and announce bubbles.
//!
//! A bubble forms the moment a group's member count reaches its target size.
//! The store reports the count before and after each mutation from inside its
//! transaction, so exactly one call sees the step to completion and
//! `BubbleFormed` is published once per group.

use std::sync::Arc;

use bubble_bus::EventBus;
use tracing::{debug, info, instrument};

use crate::common::{GroupId, MatchmakingError, Result};
use crate::domains::groups::events::BubbleFormed;
use crate::domains::groups::models::{Group, Member, MembershipChange, NewGroup};
use crate::kernel::BaseCandidateStore;

#[derive(Clone)]
pub struct FormationDetector {
    store: Arc<dyn BaseCandidateStore>,
    bus: EventBus,
}

impl FormationDetector {
    pub fn new(store: Arc<dyn BaseCandidateStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Create a group with its founders. Publishes `BubbleFormed` if the
    /// founders already fill it.
    #[instrument(skip(self, new_group), fields(group_id = %new_group.id))]
    pub async fn create_group(&self, new_group: NewGroup) -> Result<Group> {
        let change = self.store.insert_group(new_group).await?;
        info!(
            name = %change.group.name,
            target = %change.group.target_size,
            members = change.group.member_count(),
            "group created"
        );
        Ok(self.observe(change))
    }

    /// Commit one member to a group.
    #[instrument(skip(self, member), fields(member_id = %member.id))]
    pub async fn add_member(&self, group_id: GroupId, member: Member) -> Result<Group> {
        let change = self.store.add_member(group_id, member).await?;
        debug!(kind = ?change.kind, members = change.group.member_count(), "membership changed");
        Ok(self.observe(change))
    }

    /// Dissolve a group. It leaves every candidate pool and its members may
    /// join other groups. Repeat calls are no-ops.
    #[instrument(skip(self))]
    pub async fn dissolve_group(&self, group_id: GroupId) -> Result<Group> {
        let change = self.store.dissolve_group(group_id).await?;
        info!(kind = ?change.kind, "group dissolved");
        Ok(change.group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> Result<Group> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or_else(|| MatchmakingError::not_found(format!("group {}", group_id)))
    }

    fn observe(&self, change: MembershipChange) -> Group {
        if change.completed_group() {
            let event = BubbleFormed::for_group(&change.group);
            let delivered = self.bus.publish(event);
            info!(group_id = %change.group.id, delivered, "bubble formed");
        }
        change.group
    }
}
