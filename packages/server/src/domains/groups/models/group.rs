use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{GroupId, MatchmakingError, MemberId};

/// Declared size of a group: the number of members it needs to be complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TargetSize {
    Two,
    Three,
    Four,
}

impl TargetSize {
    pub fn get(self) -> usize {
        match self {
            TargetSize::Two => 2,
            TargetSize::Three => 3,
            TargetSize::Four => 4,
        }
    }
}

impl TryFrom<u8> for TargetSize {
    type Error = MatchmakingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(TargetSize::Two),
            3 => Ok(TargetSize::Three),
            4 => Ok(TargetSize::Four),
            other => Err(MatchmakingError::InvalidInput(format!(
                "target size must be 2, 3 or 4, got {}",
                other
            ))),
        }
    }
}

impl TryFrom<i16> for TargetSize {
    type Error = MatchmakingError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| MatchmakingError::InvalidInput(format!("invalid target size {}", value)))
            .and_then(TargetSize::try_from)
    }
}

impl From<TargetSize> for u8 {
    fn from(size: TargetSize) -> Self {
        size.get() as u8
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.get(), self.get())
    }
}

/// A person committed to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(),
            name: name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

/// Formation lifecycle of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FormationState {
    Forming { missing: usize },
    Complete,
}

/// A group of 1..=4 committed members with a declared target size.
///
/// Membership only grows until the group is complete, then is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub target_size: TargetSize,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dissolved_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_complete(&self) -> bool {
        self.members.len() >= self.target_size.get()
    }

    pub fn is_dissolved(&self) -> bool {
        self.dissolved_at.is_some()
    }

    /// Complete and not dissolved: may browse, be browsed, like and pass.
    pub fn is_matchable(&self) -> bool {
        self.is_complete() && !self.is_dissolved()
    }

    pub fn has_member(&self, member_id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == member_id)
    }

    pub fn formation_state(&self) -> FormationState {
        if self.is_complete() {
            FormationState::Complete
        } else {
            FormationState::Forming {
                missing: self.target_size.get() - self.members.len(),
            }
        }
    }
}

/// Input for creating a group with its founding members.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub id: GroupId,
    pub name: String,
    pub target_size: TargetSize,
    pub founders: Vec<Member>,
}

impl NewGroup {
    pub fn new(name: impl Into<String>, target_size: TargetSize, founders: Vec<Member>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            target_size,
            founders,
        }
    }

    /// Checks that need no store access.
    pub fn validate(&self) -> Result<(), MatchmakingError> {
        if self.name.trim().is_empty() {
            return Err(MatchmakingError::InvalidInput("group name is empty".into()));
        }
        if self.founders.is_empty() {
            return Err(MatchmakingError::invalid_transition(
                "a group needs at least one committed member",
            ));
        }
        if self.founders.len() > self.target_size.get() {
            return Err(MatchmakingError::invalid_transition(format!(
                "{} founders exceed target size {}",
                self.founders.len(),
                self.target_size.get()
            )));
        }
        for (i, member) in self.founders.iter().enumerate() {
            if self.founders[..i].iter().any(|m| m.id == member.id) {
                return Err(MatchmakingError::InvalidInput(format!(
                    "member {} listed twice",
                    member.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChangeKind {
    Created,
    MemberAdded,
    Dissolved,
    /// The request was already satisfied (member re-added, group re-dissolved).
    Unchanged,
}

/// Result of a membership mutation, computed inside the store's transaction.
///
/// `previous_count` is read under the same lock as the write, so exactly one
/// change per group can observe the step to completion.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipChange {
    pub kind: MembershipChangeKind,
    pub previous_count: usize,
    pub group: Group,
}

impl MembershipChange {
    /// True only for the mutation that took the group from Forming to Complete.
    pub fn completed_group(&self) -> bool {
        let target = self.group.target_size.get();
        matches!(
            self.kind,
            MembershipChangeKind::Created | MembershipChangeKind::MemberAdded
        ) && self.previous_count < target
            && self.group.member_count() == target
    }
}
