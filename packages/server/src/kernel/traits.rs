// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only. Matchmaking rules (who may like whom,
// when a group is complete) live in the domain services; the store only has
// to make each call atomic.
//
// Naming convention: Base* for trait names.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::common::{GroupId, MatchId, Result};
use crate::domains::groups::models::{Group, Member, MembershipChange, NewGroup};
use crate::domains::matching::models::{EdgeWrite, Match, Promotion};

// =============================================================================
// Candidate Store (groups, members, likes, passes, matches, chat rooms)
// =============================================================================

#[async_trait]
pub trait BaseCandidateStore: Send + Sync {
    /// Load a group with its members (join order).
    async fn get_group(&self, id: GroupId) -> Result<Option<Group>>;

    /// Create a group with its founders in one step.
    ///
    /// Fails with `InvalidTransition` if a founder already belongs to another
    /// active group.
    async fn insert_group(&self, group: NewGroup) -> Result<MembershipChange>;

    /// Add one member. Over-capacity joins fail with `InvalidTransition` and
    /// leave the group unchanged; re-adding a present member is `Unchanged`.
    async fn add_member(&self, group_id: GroupId, member: Member) -> Result<MembershipChange>;

    /// Mark the group dissolved and release its members.
    async fn dissolve_group(&self, id: GroupId) -> Result<MembershipChange>;

    /// Eligible candidates for `group_id` with ids strictly greater than
    /// `after`, ascending, at most `limit` rows.
    ///
    /// Eligible: complete, not dissolved, not `group_id`, no like/pass edge
    /// from `group_id`, no match with `group_id`.
    async fn query_candidates(
        &self,
        group_id: GroupId,
        after: Option<GroupId>,
        limit: usize,
    ) -> Result<Vec<Group>>;

    /// Record `from` liking `to`. `InvalidTransition` if `from` passed on `to`.
    async fn create_like_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite>;

    /// Record `from` passing on `to`. `InvalidTransition` if `from` liked `to`.
    async fn create_pass_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite>;

    /// Atomic check-and-create: if both directions of like exist, return the
    /// pair's match, creating it and its chat room if absent.
    async fn try_promote_match(&self, a: GroupId, b: GroupId) -> Result<Promotion>;

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>>;

    async fn find_match_between(&self, a: GroupId, b: GroupId) -> Result<Option<Match>>;

    /// Feed of committed membership changes.
    fn on_membership_changed(&self) -> broadcast::Receiver<MembershipChange>;
}
