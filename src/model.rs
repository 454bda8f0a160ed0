//! Core data model.
//!
//! A work item is one submitted action waiting in, or running at the head of,
//! its lane. Callers only ever see owned snapshots of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// Snapshot of a unit of work held by a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: WorkId,

    /// Set when the item was submitted.
    pub enqueued_at: DateTime<Utc>,

    /// Set when the drain began executing the item. None while pending.
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub(crate) fn new() -> Self {
        Self {
            id: WorkId::new(),
            enqueued_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.started_at.is_some() {
            Phase::InFlight
        } else {
            Phase::Pending
        }
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a work item is in its lane. Completed items leave the lane, so there
/// is no completed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    InFlight,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Pending => "pending",
            Phase::InFlight => "in_flight",
        };
        f.write_str(s)
    }
}
