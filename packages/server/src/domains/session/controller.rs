//! Per-group browsing session.
//!
//! Holds the candidates a group is currently being offered and reconciles
//! them with the store:
//!
//! - at most one page load runs at a time; callers arriving while one is in
//!   flight await that load's outcome instead of starting another
//! - likes and passes remove the candidate locally before the store answers,
//!   and a removed candidate is never restored or re-offered
//! - `refetch` and `close` bump a generation counter; a load that finishes
//!   under an older generation is discarded
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::common::{Cursor, ErrorReport, GroupId, MatchmakingError, Result};
use crate::domains::matching::candidates::CandidateQuery;
use crate::domains::matching::decisions::DecisionEngine;
use crate::domains::matching::models::LikeResult;
use crate::domains::session::state::SessionState;

type LoadFuture = Shared<BoxFuture<'static, Result<()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    More,
}

struct InFlight {
    id: u64,
    future: LoadFuture,
}

struct Inner {
    state: SessionState,
    generation: u64,
    next_load_id: u64,
    in_flight: Option<InFlight>,
    /// Candidates decided in this session; filtered out of later pages.
    decided: HashSet<GroupId>,
    closed: bool,
}

#[derive(Clone)]
pub struct SessionController {
    group_id: GroupId,
    page_size: usize,
    query: CandidateQuery,
    decisions: DecisionEngine,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(
        group_id: GroupId,
        page_size: usize,
        query: CandidateQuery,
        decisions: DecisionEngine,
    ) -> Self {
        Self {
            group_id,
            page_size,
            query,
            decisions,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::default(),
                generation: 0,
                next_load_id: 0,
                in_flight: None,
                decided: HashSet::new(),
                closed: false,
            })),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether both handles point at the same session.
    pub fn is_same(&self, other: &SessionController) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Load the first page, replacing the current candidates.
    pub async fn load(&self) -> Result<()> {
        match self.begin_load(LoadKind::Initial)? {
            Some(load) => load.await,
            None => Ok(()),
        }
    }

    /// Append the next page. No-op when there is nothing more to load.
    pub async fn load_more(&self) -> Result<()> {
        match self.begin_load(LoadKind::More)? {
            Some(load) => load.await,
            None => Ok(()),
        }
    }

    /// Discard cursor and candidates and load the first page again.
    ///
    /// A load still in flight from before the call is dropped when it lands.
    pub async fn refetch(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(closed_error(self.group_id));
            }
            inner.generation += 1;
            inner.in_flight = None;
            inner.state = SessionState::default();
        }
        debug!(group_id = %self.group_id, "session refetch");
        self.load().await
    }

    /// Tear the session down. Results arriving afterwards are dropped.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.generation += 1;
        inner.in_flight = None;
        inner.state = SessionState::default();
        info!(group_id = %self.group_id, "session closed");
    }

    /// Like `target`. The candidate leaves the local list immediately and
    /// stays out even if the store rejects the like; the failure is recorded
    /// in `error` and returned. A closed session fails with `InvalidState`
    /// and writes nothing.
    #[instrument(skip(self), fields(group_id = %self.group_id))]
    pub async fn like_group(&self, target: GroupId) -> Result<LikeResult> {
        let generation = self.mark_decided(target)?;

        let result = self.decisions.like(self.group_id, target).await;
        if let Err(err) = &result {
            let mut inner = self.lock();
            if inner.generation == generation && !inner.closed {
                inner.state.error = Some(ErrorReport::from(err));
            }
        }
        result
    }

    /// Pass on `target`. The pass runs detached; failures are logged only.
    /// A closed session fails with `InvalidState` and spawns nothing.
    pub fn pass_group(&self, target: GroupId) -> Result<JoinHandle<()>> {
        if let Err(e) = self.mark_decided(target) {
            warn!(group_id = %self.group_id, %target, "pass on closed session ignored");
            return Err(e);
        }

        let decisions = self.decisions.clone();
        let group_id = self.group_id;
        Ok(tokio::spawn(async move {
            if let Err(e) = decisions.pass(group_id, target).await {
                warn!(%group_id, %target, error = %e, "pass failed");
            }
        }))
    }

    fn mark_decided(&self, target: GroupId) -> Result<u64> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed_error(self.group_id));
        }
        inner.decided.insert(target);
        let removed = inner.state.remove(target);
        debug!(group_id = %self.group_id, %target, removed, "candidate decided");
        Ok(inner.generation)
    }

    /// Start a load, join the one in flight, or report there is nothing to do.
    fn begin_load(&self, kind: LoadKind) -> Result<Option<LoadFuture>> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed_error(self.group_id));
        }
        if let Some(flight) = &inner.in_flight {
            debug!(group_id = %self.group_id, ?kind, load = flight.id, "joining in-flight load");
            return Ok(Some(flight.future.clone()));
        }
        if kind == LoadKind::More && !inner.state.has_more {
            return Ok(None);
        }

        match kind {
            LoadKind::Initial => inner.state.is_loading = true,
            LoadKind::More => inner.state.is_loading_more = true,
        }
        inner.next_load_id += 1;
        let load_id = inner.next_load_id;
        let generation = inner.generation;
        let cursor = match kind {
            LoadKind::Initial => None,
            LoadKind::More => inner.state.cursor,
        };

        // The lock is still held, so the task cannot finish and clear
        // `in_flight` before it is set below.
        let this = self.clone();
        let task = tokio::spawn(async move { this.run_load(kind, load_id, generation, cursor).await });
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(MatchmakingError::Internal(format!("load task failed: {}", e))))
        }
        .boxed()
        .shared();

        inner.in_flight = Some(InFlight {
            id: load_id,
            future: future.clone(),
        });
        Ok(Some(future))
    }

    async fn run_load(
        &self,
        kind: LoadKind,
        load_id: u64,
        generation: u64,
        cursor: Option<Cursor>,
    ) -> Result<()> {
        let result = self
            .query
            .fetch_candidates(self.group_id, self.page_size, cursor.as_ref())
            .await;

        let mut inner = self.lock();
        if inner.in_flight.as_ref().map(|f| f.id) == Some(load_id) {
            inner.in_flight = None;
        }
        if inner.generation != generation || inner.closed {
            debug!(group_id = %self.group_id, load = load_id, "discarding stale load");
            return Ok(());
        }

        let Inner { state, decided, .. } = &mut *inner;
        state.is_loading = false;
        state.is_loading_more = false;

        match result {
            Ok(page) => {
                let has_more = page.has_more();
                let fresh: Vec<_> = page
                    .candidates
                    .into_iter()
                    .filter(|g| !decided.contains(&g.id))
                    .collect();
                match kind {
                    LoadKind::Initial => state.groups = fresh,
                    LoadKind::More => {
                        for group in fresh {
                            if !state.contains(group.id) {
                                state.groups.push(group);
                            }
                        }
                    }
                }
                state.cursor = page.next_cursor;
                state.has_more = has_more;
                state.error = None;
                debug!(
                    group_id = %self.group_id,
                    ?kind,
                    offered = state.groups.len(),
                    has_more,
                    "page applied"
                );
                Ok(())
            }
            Err(err) => {
                warn!(group_id = %self.group_id, ?kind, error = %err, "candidate load failed");
                state.error = Some(ErrorReport::from(&err));
                if kind == LoadKind::Initial {
                    state.groups.clear();
                    state.cursor = None;
                    state.has_more = false;
                }
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn closed_error(group_id: GroupId) -> MatchmakingError {
    MatchmakingError::invalid_state(format!("session for group {} is closed", group_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bubble_bus::EventBus;

    use super::*;
    use crate::common::ErrorKind;
    use crate::domains::groups::models::{Member, NewGroup, TargetSize};
    use crate::kernel::{BaseCandidateStore, InMemoryCandidateStore};

    async fn complete(store: &InMemoryCandidateStore) -> GroupId {
        store
            .insert_group(NewGroup::new(
                "g",
                TargetSize::Two,
                vec![Member::new("a"), Member::new("b")],
            ))
            .await
            .unwrap()
            .group
            .id
    }

    async fn setup(
        store: InMemoryCandidateStore,
        candidates: usize,
        page_size: usize,
    ) -> (SessionController, GroupId, Vec<GroupId>) {
        let me = complete(&store).await;
        let mut others = Vec::new();
        for _ in 0..candidates {
            others.push(complete(&store).await);
        }
        others.sort();

        let shared: Arc<dyn BaseCandidateStore> = Arc::new(store);
        let controller = SessionController::new(
            me,
            page_size,
            CandidateQuery::new(shared.clone()),
            DecisionEngine::new(shared, EventBus::new()),
        );
        (controller, me, others)
    }

    fn ids(state: &SessionState) -> Vec<GroupId> {
        state.groups.iter().map(|g| g.id).collect()
    }

    #[tokio::test]
    async fn test_load_then_load_more_appends() {
        let (session, _, others) = setup(InMemoryCandidateStore::new(), 5, 2).await;

        session.load().await.unwrap();
        assert_eq!(ids(&session.snapshot()), others[..2].to_vec());

        session.load_more().await.unwrap();
        session.load_more().await.unwrap();
        let state = session.snapshot();
        assert_eq!(ids(&state), others);
        assert!(!state.has_more);
        assert!(!state.is_loading_more);
    }

    #[tokio::test]
    async fn test_load_more_without_more_is_noop() {
        let store = InMemoryCandidateStore::new();
        let (session, _, _) = setup(store.clone(), 1, 5).await;

        session.load().await.unwrap();
        let queries = store.candidate_query_count();
        session.load_more().await.unwrap();

        assert_eq!(store.candidate_query_count(), queries);
        assert!(!session.snapshot().is_loading_more);
    }

    #[tokio::test]
    async fn test_concurrent_load_more_coalesces() {
        let store = InMemoryCandidateStore::new().with_latency(Duration::from_millis(20));
        let (session, _, others) = setup(store.clone(), 4, 2).await;
        session.load().await.unwrap();
        let before = store.candidate_query_count();

        let (a, b) = tokio::join!(session.load_more(), session.load_more());
        a.unwrap();
        b.unwrap();

        assert_eq!(store.candidate_query_count(), before + 1);
        assert_eq!(ids(&session.snapshot()), others);
    }

    #[tokio::test]
    async fn test_failed_initial_load() {
        let store = InMemoryCandidateStore::new();
        let (session, _, _) = setup(store.clone(), 2, 5).await;

        store.set_available(false);
        let err = session.load().await.unwrap_err();
        assert!(err.is_retryable());

        let state = session.snapshot();
        assert!(state.groups.is_empty());
        assert!(!state.is_loading);
        assert_eq!(state.error.unwrap().kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_failed_load_more_keeps_groups_and_cursor() {
        let store = InMemoryCandidateStore::new();
        let (session, _, others) = setup(store.clone(), 3, 2).await;
        session.load().await.unwrap();
        let before = session.snapshot();

        store.set_available(false);
        assert!(session.load_more().await.is_err());
        let after = session.snapshot();
        assert_eq!(after.groups, before.groups);
        assert_eq!(after.cursor, before.cursor);
        assert!(after.error.is_some());

        store.set_available(true);
        session.load_more().await.unwrap();
        let state = session.snapshot();
        assert_eq!(ids(&state), others);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_like_keeps_candidate_removed() {
        let store = InMemoryCandidateStore::new();
        let (session, _, others) = setup(store.clone(), 2, 5).await;
        session.load().await.unwrap();

        store.set_available(false);
        assert!(session.like_group(others[0]).await.is_err());
        store.set_available(true);

        let state = session.snapshot();
        assert_eq!(ids(&state), vec![others[1]]);
        assert!(state.error.is_some());

        // Not re-offered after a reload either.
        session.refetch().await.unwrap();
        assert_eq!(ids(&session.snapshot()), vec![others[1]]);
    }

    #[tokio::test]
    async fn test_pass_runs_detached() {
        let store = InMemoryCandidateStore::new();
        let (session, me, others) = setup(store.clone(), 2, 5).await;
        session.load().await.unwrap();

        session.pass_group(others[0]).unwrap().await.unwrap();
        assert_eq!(ids(&session.snapshot()), vec![others[1]]);

        let remaining = store.query_candidates(me, None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_decides_nothing() {
        let store = InMemoryCandidateStore::new();
        let (session, me, others) = setup(store.clone(), 2, 5).await;
        session.load().await.unwrap();
        session.close();

        let err = session.like_group(others[0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = session.pass_group(others[1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        assert_eq!(store.like_count(), 0);
        let untouched = store.query_candidates(me, None, 10).await.unwrap();
        assert_eq!(untouched.len(), 2);
    }

    #[tokio::test]
    async fn test_refetch_drops_stale_load() {
        let store = InMemoryCandidateStore::new().with_latency(Duration::from_millis(30));
        let (session, _, others) = setup(store, 3, 2).await;
        session.load().await.unwrap();

        let stale = {
            let session = session.clone();
            tokio::spawn(async move { session.load_more().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.refetch().await.unwrap();
        stale.await.unwrap().unwrap();

        let state = session.snapshot();
        assert_eq!(ids(&state), others[..2].to_vec());
        assert!(state.has_more);
    }

    #[tokio::test]
    async fn test_close_discards_late_results() {
        let store = InMemoryCandidateStore::new().with_latency(Duration::from_millis(20));
        let (session, _, _) = setup(store, 2, 5).await;

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.load().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.close();
        pending.await.unwrap().unwrap();

        assert!(session.snapshot().groups.is_empty());
        assert!(matches!(
            session.load().await,
            Err(MatchmakingError::InvalidState(_))
        ));
    }
}
