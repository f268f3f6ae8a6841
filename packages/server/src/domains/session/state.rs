use serde::Serialize;

use crate::common::{Cursor, ErrorReport, GroupId};
use crate::domains::groups::models::Group;

/// Snapshot of one group's browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Candidates still on offer, in ranking order.
    pub groups: Vec<Group>,
    pub cursor: Option<Cursor>,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub error: Option<ErrorReport>,
    pub has_more: bool,
}

impl SessionState {
    pub fn contains(&self, group_id: GroupId) -> bool {
        self.groups.iter().any(|g| g.id == group_id)
    }

    /// Drop `group_id` from the offered candidates. Returns whether it was there.
    pub(crate) fn remove(&mut self, group_id: GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != group_id);
        self.groups.len() != before
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            cursor: None,
            is_loading: false,
            is_loading_more: false,
            error: None,
            has_more: true,
        }
    }
}
