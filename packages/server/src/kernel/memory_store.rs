//! In-process candidate store.
//!
//! Used when no `DATABASE_URL` is configured and by the test suites. One
//! mutex guards all state, which makes every trait call a single atomic
//! step: the same guarantees `PgCandidateStore` gets from row locks.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::common::{ChatRoomId, GroupId, MatchId, MatchmakingError, MemberId, Result};
use crate::domains::groups::models::{
    Group, Member, MembershipChange, MembershipChangeKind, NewGroup,
};
use crate::domains::matching::models::{ordered_pair, ChatRoom, EdgeWrite, Match, Promotion};
use crate::kernel::BaseCandidateStore;

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct MemoryState {
    // BTreeMap keeps groups in id order for keyset pagination.
    groups: BTreeMap<GroupId, Group>,
    active_group_of: HashMap<MemberId, GroupId>,
    likes: HashMap<(GroupId, GroupId), DateTime<Utc>>,
    passes: HashMap<(GroupId, GroupId), DateTime<Utc>>,
    matches: HashMap<MatchId, Match>,
    match_by_pair: HashMap<(GroupId, GroupId), MatchId>,
    chat_rooms: HashMap<ChatRoomId, ChatRoom>,
}

impl MemoryState {
    fn group(&self, id: GroupId) -> Result<&Group> {
        self.groups
            .get(&id)
            .ok_or_else(|| MatchmakingError::not_found(format!("group {}", id)))
    }

    fn claim_member(&mut self, member: &Member, group_id: GroupId) -> Result<()> {
        match self.active_group_of.get(&member.id) {
            Some(current) if *current != group_id => Err(MatchmakingError::invalid_transition(
                format!("member {} already belongs to active group {}", member.id, current),
            )),
            _ => {
                self.active_group_of.insert(member.id, group_id);
                Ok(())
            }
        }
    }

    fn release_members(&mut self, group_id: GroupId) {
        self.active_group_of.retain(|_, g| *g != group_id);
    }

    fn is_eligible(&self, requester: GroupId, candidate: &Group) -> bool {
        candidate.id != requester
            && candidate.is_matchable()
            && !self.likes.contains_key(&(requester, candidate.id))
            && !self.passes.contains_key(&(requester, candidate.id))
            && !self
                .match_by_pair
                .contains_key(&ordered_pair(requester, candidate.id))
    }
}

/// Candidate store held entirely in memory.
///
/// Clones share state. `set_available(false)` and `with_latency` let tests
/// exercise the transient-failure and in-flight paths.
#[derive(Clone)]
pub struct InMemoryCandidateStore {
    state: Arc<Mutex<MemoryState>>,
    changes: broadcast::Sender<MembershipChange>,
    available: Arc<AtomicBool>,
    latency: Option<Duration>,
    candidate_queries: Arc<AtomicUsize>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            changes,
            available: Arc::new(AtomicBool::new(true)),
            latency: None,
            candidate_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every call by `latency` before touching state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate the store going away (`Transient`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `query_candidates` calls served so far.
    pub fn candidate_query_count(&self) -> usize {
        self.candidate_queries.load(Ordering::SeqCst)
    }

    pub fn like_count(&self) -> usize {
        self.lock().likes.len()
    }

    pub fn match_count(&self) -> usize {
        self.lock().matches.len()
    }

    pub fn chat_room_count(&self) -> usize {
        self.lock().chat_rooms.len()
    }

    async fn enter(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MatchmakingError::Transient("in-memory store offline".into()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn announce(&self, change: &MembershipChange) {
        // No receivers is fine.
        let _ = self.changes.send(change.clone());
    }
}

impl Default for InMemoryCandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCandidateStore for InMemoryCandidateStore {
    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        self.enter().await?;
        Ok(self.lock().groups.get(&id).cloned())
    }

    async fn insert_group(&self, new_group: NewGroup) -> Result<MembershipChange> {
        self.enter().await?;
        new_group.validate()?;

        let change = {
            let mut state = self.lock();
            if state.groups.contains_key(&new_group.id) {
                return Err(MatchmakingError::invalid_transition(format!(
                    "group {} already exists",
                    new_group.id
                )));
            }
            for founder in &new_group.founders {
                if let Some(current) = state.active_group_of.get(&founder.id) {
                    return Err(MatchmakingError::invalid_transition(format!(
                        "member {} already belongs to active group {}",
                        founder.id, current
                    )));
                }
            }
            for founder in &new_group.founders {
                state.claim_member(founder, new_group.id)?;
            }

            let now = Utc::now();
            let complete = new_group.founders.len() == new_group.target_size.get();
            let group = Group {
                id: new_group.id,
                name: new_group.name.trim().to_string(),
                target_size: new_group.target_size,
                members: new_group.founders,
                created_at: now,
                completed_at: complete.then_some(now),
                dissolved_at: None,
            };
            state.groups.insert(group.id, group.clone());

            MembershipChange {
                kind: MembershipChangeKind::Created,
                previous_count: 0,
                group,
            }
        };

        debug!(group_id = %change.group.id, members = change.group.member_count(), "group inserted");
        self.announce(&change);
        Ok(change)
    }

    async fn add_member(&self, group_id: GroupId, member: Member) -> Result<MembershipChange> {
        self.enter().await?;

        let change = {
            let mut state = self.lock();
            let group = state.group(group_id)?.clone();

            if group.is_dissolved() {
                return Err(MatchmakingError::invalid_state(format!(
                    "group {} is dissolved",
                    group_id
                )));
            }
            if group.has_member(member.id) {
                return Ok(MembershipChange {
                    kind: MembershipChangeKind::Unchanged,
                    previous_count: group.member_count(),
                    group,
                });
            }
            if group.is_complete() {
                return Err(MatchmakingError::invalid_transition(format!(
                    "group {} already has {} members",
                    group_id,
                    group.target_size.get()
                )));
            }

            state.claim_member(&member, group_id)?;

            let previous_count = group.member_count();
            let mut group = group;
            group.members.push(member);
            if group.is_complete() {
                group.completed_at = Some(Utc::now());
            }
            state.groups.insert(group_id, group.clone());

            MembershipChange {
                kind: MembershipChangeKind::MemberAdded,
                previous_count,
                group,
            }
        };

        self.announce(&change);
        Ok(change)
    }

    async fn dissolve_group(&self, id: GroupId) -> Result<MembershipChange> {
        self.enter().await?;

        let change = {
            let mut state = self.lock();
            let mut group = state.group(id)?.clone();
            let previous_count = group.member_count();

            if group.is_dissolved() {
                return Ok(MembershipChange {
                    kind: MembershipChangeKind::Unchanged,
                    previous_count,
                    group,
                });
            }

            group.dissolved_at = Some(Utc::now());
            state.groups.insert(id, group.clone());
            state.release_members(id);

            MembershipChange {
                kind: MembershipChangeKind::Dissolved,
                previous_count,
                group,
            }
        };

        self.announce(&change);
        Ok(change)
    }

    async fn query_candidates(
        &self,
        group_id: GroupId,
        after: Option<GroupId>,
        limit: usize,
    ) -> Result<Vec<Group>> {
        self.enter().await?;
        self.candidate_queries.fetch_add(1, Ordering::SeqCst);

        let state = self.lock();
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(state
            .groups
            .range((lower, Bound::Unbounded))
            .map(|(_, group)| group)
            .filter(|group| state.is_eligible(group_id, group))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_like_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite> {
        self.enter().await?;
        let mut state = self.lock();

        if state.passes.contains_key(&(from, to)) {
            return Err(MatchmakingError::invalid_transition(format!(
                "group {} already passed on {}",
                from, to
            )));
        }
        if state.likes.contains_key(&(from, to)) {
            return Ok(EdgeWrite::AlreadyExists);
        }
        state.likes.insert((from, to), Utc::now());
        Ok(EdgeWrite::Created)
    }

    async fn create_pass_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite> {
        self.enter().await?;
        let mut state = self.lock();

        if state.likes.contains_key(&(from, to)) {
            return Err(MatchmakingError::invalid_transition(format!(
                "group {} already liked {}",
                from, to
            )));
        }
        if state.passes.contains_key(&(from, to)) {
            return Ok(EdgeWrite::AlreadyExists);
        }
        state.passes.insert((from, to), Utc::now());
        Ok(EdgeWrite::Created)
    }

    async fn try_promote_match(&self, a: GroupId, b: GroupId) -> Result<Promotion> {
        self.enter().await?;
        let mut state = self.lock();
        let pair = ordered_pair(a, b);

        if let Some(match_id) = state.match_by_pair.get(&pair) {
            let existing = state.matches.get(match_id).cloned().ok_or_else(|| {
                MatchmakingError::Internal(format!("pair index points at missing match {}", match_id))
            })?;
            return Ok(Promotion::Existing(existing));
        }

        if !(state.likes.contains_key(&(a, b)) && state.likes.contains_key(&(b, a))) {
            return Ok(Promotion::NotMutual);
        }

        let now = Utc::now();
        let record = Match {
            id: MatchId::new(),
            group_a_id: pair.0,
            group_b_id: pair.1,
            chat_room_id: ChatRoomId::new(),
            created_at: now,
        };
        state.chat_rooms.insert(
            record.chat_room_id,
            ChatRoom {
                id: record.chat_room_id,
                match_id: record.id,
                created_at: now,
            },
        );
        state.match_by_pair.insert(pair, record.id);
        state.matches.insert(record.id, record.clone());

        Ok(Promotion::Created(record))
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>> {
        self.enter().await?;
        Ok(self.lock().matches.get(&id).cloned())
    }

    async fn find_match_between(&self, a: GroupId, b: GroupId) -> Result<Option<Match>> {
        self.enter().await?;
        let state = self.lock();
        Ok(state
            .match_by_pair
            .get(&ordered_pair(a, b))
            .and_then(|id| state.matches.get(id))
            .cloned())
    }

    fn on_membership_changed(&self) -> broadcast::Receiver<MembershipChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::groups::models::TargetSize;

    async fn complete_group(store: &InMemoryCandidateStore, name: &str) -> Group {
        store
            .insert_group(NewGroup::new(
                name,
                TargetSize::Two,
                vec![Member::new(format!("{}-1", name)), Member::new(format!("{}-2", name))],
            ))
            .await
            .unwrap()
            .group
    }

    #[tokio::test]
    async fn test_candidates_exclude_self_incomplete_and_decided() {
        let store = InMemoryCandidateStore::new();
        let me = complete_group(&store, "me").await;
        let liked = complete_group(&store, "liked").await;
        let passed = complete_group(&store, "passed").await;
        let open = complete_group(&store, "open").await;
        store
            .insert_group(NewGroup::new("forming", TargetSize::Three, vec![Member::new("x")]))
            .await
            .unwrap();

        store.create_like_edge(me.id, liked.id).await.unwrap();
        store.create_pass_edge(me.id, passed.id).await.unwrap();

        let ids: Vec<GroupId> = store
            .query_candidates(me.id, None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![open.id]);
    }

    #[tokio::test]
    async fn test_member_cannot_join_two_active_groups() {
        let store = InMemoryCandidateStore::new();
        let shared = Member::new("Sam");
        let first = store
            .insert_group(NewGroup::new("one", TargetSize::Three, vec![shared.clone()]))
            .await
            .unwrap()
            .group;
        let second = store
            .insert_group(NewGroup::new("two", TargetSize::Three, vec![Member::new("Kim")]))
            .await
            .unwrap()
            .group;

        let err = store.add_member(second.id, shared.clone()).await.unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidTransition(_)));

        store.dissolve_group(first.id).await.unwrap();
        let change = store.add_member(second.id, shared).await.unwrap();
        assert_eq!(change.group.member_count(), 2);
    }

    #[tokio::test]
    async fn test_promotion_requires_both_directions() {
        let store = InMemoryCandidateStore::new();
        let a = complete_group(&store, "a").await;
        let b = complete_group(&store, "b").await;

        store.create_like_edge(a.id, b.id).await.unwrap();
        assert_eq!(
            store.try_promote_match(a.id, b.id).await.unwrap(),
            Promotion::NotMutual
        );

        store.create_like_edge(b.id, a.id).await.unwrap();
        let created = match store.try_promote_match(b.id, a.id).await.unwrap() {
            Promotion::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(
            store.try_promote_match(a.id, b.id).await.unwrap(),
            Promotion::Existing(created.clone())
        );
        assert_eq!(store.match_count(), 1);
        assert_eq!(store.chat_room_count(), 1);
        assert_eq!(
            store.find_match_between(a.id, b.id).await.unwrap(),
            Some(created)
        );
    }

    #[tokio::test]
    async fn test_promotion_keeps_members_bound() {
        let store = InMemoryCandidateStore::new();
        let a = complete_group(&store, "a").await;
        let b = complete_group(&store, "b").await;
        store.create_like_edge(a.id, b.id).await.unwrap();
        store.create_like_edge(b.id, a.id).await.unwrap();
        store.try_promote_match(a.id, b.id).await.unwrap();

        let err = store
            .insert_group(NewGroup::new("again", TargetSize::Two, a.members.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakingError::InvalidTransition(_)));

        store.dissolve_group(a.id).await.unwrap();
        store
            .insert_group(NewGroup::new("again", TargetSize::Two, a.members))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_store_is_transient() {
        let store = InMemoryCandidateStore::new();
        store.set_available(false);
        let err = store.get_group(GroupId::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_change_feed_reports_membership() {
        let store = InMemoryCandidateStore::new();
        let mut feed = store.on_membership_changed();

        let group = store
            .insert_group(NewGroup::new("feed", TargetSize::Two, vec![Member::new("a")]))
            .await
            .unwrap()
            .group;
        store.add_member(group.id, Member::new("b")).await.unwrap();

        assert_eq!(feed.recv().await.unwrap().kind, MembershipChangeKind::Created);
        let joined = feed.recv().await.unwrap();
        assert_eq!(joined.kind, MembershipChangeKind::MemberAdded);
        assert!(joined.completed_group());
    }
}
