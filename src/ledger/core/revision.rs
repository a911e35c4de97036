use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Revision - Ordering of Line-Item Batches
// ============================================================================

/// Identifier of one atomic edit to an order's contents: the write instant in
/// integer milliseconds, bumped when needed to stay strictly increasing per
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl Revision {
    pub fn at(now: DateTime<Utc>) -> Self {
        Revision(now.timestamp_millis())
    }

    /// Revision for a batch written at `now` after `latest`.
    pub fn next(latest: Option<Revision>, now: DateTime<Utc>) -> Self {
        let candidate = Revision::at(now);
        match latest {
            Some(latest) if latest >= candidate => Revision(latest.0 + 1),
            _ => candidate,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
