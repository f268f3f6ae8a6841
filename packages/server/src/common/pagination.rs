//! Keyset (cursor) pagination for candidate lists.
//!
//! Candidates are ordered by group id. Group ids are UUID v7, so the order is
//! creation order and never changes for a given row. A cursor is the last id
//! a page returned; the next page starts strictly after it. Rows that drop
//! out of the eligible set between pages (liked, passed, matched) therefore
//! never shift the position of the remaining ones.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::error::{MatchmakingError, Result};
use super::GroupId;

/// Default number of candidates per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 50;

// ============================================================================
// Cursor
// ============================================================================

/// Opaque cursor (URL-safe base64 of the last returned group id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(Uuid);

impl Cursor {
    pub fn after_group(id: GroupId) -> Self {
        Cursor(id.into_uuid())
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    pub fn decode(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| MatchmakingError::InvalidInput("cursor is not valid base64".into()))?;
        let uuid = Uuid::from_slice(&bytes)
            .map_err(|_| MatchmakingError::InvalidInput("cursor does not hold an id".into()))?;
        Ok(Cursor(uuid))
    }

    /// The group id the next page starts after.
    pub fn group_id(&self) -> GroupId {
        GroupId::from_uuid(self.0)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Raw forward-pagination arguments as they arrive from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
}

/// Validated arguments: page size clamped, cursor decoded.
#[derive(Debug, Clone)]
pub struct ValidatedPageArgs {
    pub limit: usize,
    pub cursor: Option<Cursor>,
}

impl PageArgs {
    pub fn validate(&self) -> Result<ValidatedPageArgs> {
        let limit = self
            .first
            .map(|n| n.clamp(1, MAX_PAGE_SIZE as i64) as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let cursor = self.after.as_deref().map(Cursor::decode).transpose()?;

        Ok(ValidatedPageArgs { limit, cursor })
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(requested: usize) -> usize {
    requested.clamp(1, MAX_PAGE_SIZE)
}

/// Trim a `limit + 1` fetch to `limit` rows, reporting whether more exist.
pub fn trim_results<T>(mut results: Vec<T>, limit: usize) -> (Vec<T>, bool) {
    let has_more = results.len() > limit;
    results.truncate(limit);
    (results, has_more)
}
