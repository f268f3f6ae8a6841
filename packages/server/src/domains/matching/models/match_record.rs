use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::{ChatRoomId, GroupId, MatchId};

/// Mutual like between two groups. Stored with `group_a_id < group_b_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Match {
    pub id: MatchId,
    pub group_a_id: GroupId,
    pub group_b_id: GroupId,
    pub chat_room_id: ChatRoomId,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, group_id: GroupId) -> bool {
        self.group_a_id == group_id || self.group_b_id == group_id
    }

    /// The group on the other side of the match from `group_id`.
    pub fn other(&self, group_id: GroupId) -> Option<GroupId> {
        if self.group_a_id == group_id {
            Some(self.group_b_id)
        } else if self.group_b_id == group_id {
            Some(self.group_a_id)
        } else {
            None
        }
    }
}

/// Chat room opened together with a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub match_id: MatchId,
    pub created_at: DateTime<Utc>,
}

/// Canonical (low, high) ordering of an unordered group pair.
pub fn ordered_pair(a: GroupId, b: GroupId) -> (GroupId, GroupId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Outcome of the store's atomic check-and-create for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// At least one direction of like is missing.
    NotMutual,
    /// The pair was already matched.
    Existing(Match),
    /// This call created the match and its chat room.
    Created(Match),
}
