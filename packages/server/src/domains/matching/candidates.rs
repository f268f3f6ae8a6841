//! Candidate discovery for a complete group.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::common::pagination::{clamp_page_size, trim_results};
use crate::common::{Cursor, GroupId, MatchmakingError, Result};
use crate::domains::groups::models::Group;
use crate::kernel::BaseCandidateStore;

/// One page of candidates. `next_cursor` is `None` at the end of results.
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePage {
    pub candidates: Vec<Group>,
    pub next_cursor: Option<Cursor>,
}

impl CandidatePage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

#[derive(Clone)]
pub struct CandidateQuery {
    store: Arc<dyn BaseCandidateStore>,
}

impl CandidateQuery {
    pub fn new(store: Arc<dyn BaseCandidateStore>) -> Self {
        Self { store }
    }

    /// Fetch the page of eligible candidates after `cursor`.
    ///
    /// The requesting group must exist and be complete (and not dissolved);
    /// otherwise `NotFound`. Retrying with the same cursor returns the same
    /// page minus anything decided in between.
    #[instrument(skip(self, cursor))]
    pub async fn fetch_candidates(
        &self,
        group_id: GroupId,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<CandidatePage> {
        let requester = self
            .store
            .get_group(group_id)
            .await?
            .filter(Group::is_matchable)
            .ok_or_else(|| MatchmakingError::not_found(format!("matchable group {}", group_id)))?;

        let limit = clamp_page_size(page_size);
        let rows = self
            .store
            .query_candidates(requester.id, cursor.map(Cursor::group_id), limit + 1)
            .await?;

        let (candidates, has_more) = trim_results(rows, limit);
        let next_cursor = if has_more {
            candidates.last().map(|g| Cursor::after_group(g.id))
        } else {
            None
        };

        debug!(returned = candidates.len(), has_more, "candidate page");
        Ok(CandidatePage {
            candidates,
            next_cursor,
        })
    }
}
