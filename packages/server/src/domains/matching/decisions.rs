//! Like/pass decisions and mutual-match promotion.

use std::sync::Arc;

use bubble_bus::EventBus;
use tracing::{debug, error, info, instrument};

use crate::common::{GroupId, MatchId, MatchmakingError, Result};
use crate::domains::groups::models::Group;
use crate::domains::matching::events::MatchCreated;
use crate::domains::matching::models::{EdgeWrite, LikeResult, Match, Promotion};
use crate::kernel::BaseCandidateStore;

#[derive(Clone)]
pub struct DecisionEngine {
    store: Arc<dyn BaseCandidateStore>,
    bus: EventBus,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn BaseCandidateStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Record that `from` likes `to`, promoting the pair to a match when the
    /// like is reciprocated.
    ///
    /// Repeat calls return the same result. Only the call whose promotion
    /// created the match publishes `MatchCreated`.
    #[instrument(skip(self))]
    pub async fn like(&self, from: GroupId, to: GroupId) -> Result<LikeResult> {
        self.validate_pair(from, to).await?;

        let edge = self.store.create_like_edge(from, to).await?;
        debug!(?edge, "like recorded");

        match self.store.try_promote_match(from, to).await? {
            Promotion::NotMutual => Ok(LikeResult::pending()),
            Promotion::Existing(record) => {
                check_pair(&record, from, to)?;
                Ok(LikeResult::matched(&record))
            }
            Promotion::Created(record) => {
                check_pair(&record, from, to)?;
                let delivered = self.bus.publish(MatchCreated::from(&record));
                info!(
                    match_id = %record.id,
                    chat_room_id = %record.chat_room_id,
                    delivered,
                    "match created"
                );
                Ok(LikeResult::matched(&record))
            }
        }
    }

    /// Record that `from` passes on `to`. Terminal for the ordered pair.
    #[instrument(skip(self))]
    pub async fn pass(&self, from: GroupId, to: GroupId) -> Result<()> {
        self.validate_pair(from, to).await?;

        match self.store.create_pass_edge(from, to).await? {
            EdgeWrite::Created => debug!("pass recorded"),
            EdgeWrite::AlreadyExists => debug!("pass already recorded"),
        }
        Ok(())
    }

    pub async fn get_match(&self, id: MatchId) -> Result<Match> {
        self.store
            .get_match(id)
            .await?
            .ok_or_else(|| MatchmakingError::not_found(format!("match {}", id)))
    }

    async fn validate_pair(&self, from: GroupId, to: GroupId) -> Result<()> {
        if from == to {
            return Err(MatchmakingError::invalid_transition(
                "a group cannot decide on itself",
            ));
        }
        let from_group = self.require_group(from).await?;
        let to_group = self.require_group(to).await?;
        for group in [&from_group, &to_group] {
            if !group.is_matchable() {
                return Err(MatchmakingError::invalid_state(format!(
                    "group {} is not complete and active",
                    group.id
                )));
            }
        }
        Ok(())
    }

    async fn require_group(&self, id: GroupId) -> Result<Group> {
        self.store
            .get_group(id)
            .await?
            .ok_or_else(|| MatchmakingError::not_found(format!("group {}", id)))
    }
}

fn check_pair(record: &Match, from: GroupId, to: GroupId) -> Result<()> {
    if record.involves(from) && record.involves(to) {
        Ok(())
    } else {
        error!(match_id = %record.id, %from, %to, "store returned a match for another pair");
        Err(MatchmakingError::Internal(format!(
            "match {} does not join {} and {}",
            record.id, from, to
        )))
    }
}
