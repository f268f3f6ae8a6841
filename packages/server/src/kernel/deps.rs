//! Server dependencies (composition root)
//!
//! Builds the store-backed services once and hands them out by clone. The
//! event bus lives here and nowhere else; everything that publishes or
//! subscribes receives it from this container.

use std::sync::Arc;

use bubble_bus::EventBus;
use sqlx::PgPool;

use crate::common::pagination::clamp_page_size;
use crate::domains::groups::FormationDetector;
use crate::domains::matching::{CandidateQuery, DecisionEngine, MatchBadgeCounter};
use crate::domains::session::SessionRegistry;
use crate::kernel::stream_relay::{spawn_membership_relay, StreamRelay};
use crate::kernel::{BaseCandidateStore, InMemoryCandidateStore, PgCandidateStore, StreamHub};

// =============================================================================
// ServerDeps
// =============================================================================

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseCandidateStore>,
    /// Set when running against Postgres; used by the health check.
    pub db_pool: Option<PgPool>,
    pub bus: EventBus,
    /// In-process pub/sub hub for real-time streaming to SSE endpoints
    pub stream_hub: StreamHub,
    pub formation: FormationDetector,
    pub candidates: CandidateQuery,
    pub decisions: DecisionEngine,
    pub sessions: SessionRegistry,
    pub badges: MatchBadgeCounter,
    pub relay: StreamRelay,
    pub page_size: usize,
}

impl ServerDeps {
    pub fn new(store: Arc<dyn BaseCandidateStore>, db_pool: Option<PgPool>, page_size: usize) -> Self {
        let page_size = clamp_page_size(page_size);
        let bus = EventBus::new();
        let stream_hub = StreamHub::new();

        let candidates = CandidateQuery::new(store.clone());
        let decisions = DecisionEngine::new(store.clone(), bus.clone());
        let sessions = SessionRegistry::new(candidates.clone(), decisions.clone(), page_size);

        Self {
            formation: FormationDetector::new(store.clone(), bus.clone()),
            badges: MatchBadgeCounter::attach(&bus),
            relay: StreamRelay::attach(&bus, &stream_hub),
            store,
            db_pool,
            bus,
            stream_hub,
            candidates,
            decisions,
            sessions,
            page_size,
        }
    }

    pub fn postgres(pool: PgPool, page_size: usize) -> Self {
        let store = Arc::new(PgCandidateStore::new(pool.clone()));
        Self::new(store, Some(pool), page_size)
    }

    pub fn in_memory(page_size: usize) -> Self {
        Self::new(Arc::new(InMemoryCandidateStore::new()), None, page_size)
    }

    /// Start forwarding the store's membership feed to the stream hub.
    /// Needs a running tokio runtime.
    pub fn spawn_relays(&self) -> tokio::task::JoinHandle<()> {
        spawn_membership_relay(self.store.on_membership_changed(), self.stream_hub.clone())
    }
}
