//! Update-time filtering for incremental sync.
//!
//! During a poll, items already seen by a previous run are skipped
//! client-side. The upstream listing is still traversed in full because
//! its ordering is not guaranteed to be monotonic in update time, so the
//! walk never stops early on an old item.

use serde::{Deserialize, Serialize};

/// Inclusive update-time window applied while walking a listing.
///
/// An empty window matches everything. Bounds are combined with AND
/// logic; polling normally sets only `after`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Only include items updated at or after this timestamp (Unix seconds).
    pub after: Option<u64>,
    /// Only include items updated at or before this timestamp (Unix seconds).
    pub before: Option<u64>,
}

impl TimeWindow {
    /// Creates an empty window that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive lower bound.
    pub fn after(mut self, timestamp: u64) -> Self {
        self.after = Some(timestamp);
        self
    }

    /// Sets the inclusive upper bound.
    pub fn before(mut self, timestamp: u64) -> Self {
        self.before = Some(timestamp);
        self
    }

    /// Whether no bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    /// Checks whether an update timestamp falls within the window.
    pub fn contains(&self, timestamp: u64) -> bool {
        if let Some(after) = self.after {
            if timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if timestamp > before {
                return false;
            }
        }
        true
    }
}
