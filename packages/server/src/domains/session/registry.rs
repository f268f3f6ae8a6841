use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::common::{GroupId, MatchmakingError, Result};
use crate::domains::matching::candidates::CandidateQuery;
use crate::domains::matching::decisions::DecisionEngine;
use crate::domains::session::controller::SessionController;

/// Owns the open browsing sessions, one per requesting group.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<GroupId, SessionController>>>,
    query: CandidateQuery,
    decisions: DecisionEngine,
    page_size: usize,
}

impl SessionRegistry {
    pub fn new(query: CandidateQuery, decisions: DecisionEngine, page_size: usize) -> Self {
        Self {
            sessions: Arc::default(),
            query,
            decisions,
            page_size,
        }
    }

    /// Session for `group_id`, creating it if needed. Opening twice returns
    /// the same session.
    pub fn open(&self, group_id: GroupId) -> SessionController {
        self.open_tracked(group_id).0
    }

    /// Like `open`, also reporting whether this call created the session.
    pub fn open_tracked(&self, group_id: GroupId) -> (SessionController, bool) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = sessions.get(&group_id) {
            return (existing.clone(), false);
        }
        debug!(%group_id, "session opened");
        let session = SessionController::new(
            group_id,
            self.page_size,
            self.query.clone(),
            self.decisions.clone(),
        );
        sessions.insert(group_id, session.clone());
        (session, true)
    }

    /// The open session for `group_id`.
    ///
    /// `MissingDependency` when none is open: callers must `open` first.
    pub fn get(&self, group_id: GroupId) -> Result<SessionController> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&group_id)
            .cloned()
            .ok_or_else(|| {
                MatchmakingError::MissingDependency(format!("no open session for group {}", group_id))
            })
    }

    /// Close and forget the session. Returns whether one was open.
    pub fn close(&self, group_id: GroupId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&group_id);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close `session` only if it is still the one registered for its group.
    pub fn discard(&self, session: &SessionController) -> bool {
        let group_id = session.group_id();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get(&group_id) {
            Some(current) if current.is_same(session) => {
                sessions.remove(&group_id);
                drop(sessions);
                session.close();
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
