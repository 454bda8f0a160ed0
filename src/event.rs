//! Structured events emitted by the lane queue on every lane transition.
//!
//! Consumers subscribe to the event stream to build dashboards or audit
//! trails. Events never carry task output; the completion handle is the only
//! path a result takes back to its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::WorkId;

/// A structured event emitted by the lane queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<K> {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// The lane it happened on.
    pub lane: K,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// First submission to an absent lane.
    LaneCreated,
    WorkQueued {
        id: WorkId,
        /// Items in the lane after this one was appended.
        depth: usize,
    },
    WorkStarted {
        id: WorkId,
        waited_ms: u64,
    },
    WorkCompleted {
        id: WorkId,
        duration_ms: u64,
    },
    WorkFailed {
        id: WorkId,
        duration_ms: u64,
        error: String,
    },
    /// The lane emptied and was removed.
    LaneDrained,
    /// The drain found lane state it should never see and stopped.
    Inconsistency {
        reason: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LaneCreated => "lane_created",
            EventKind::WorkQueued { .. } => "work_queued",
            EventKind::WorkStarted { .. } => "work_started",
            EventKind::WorkCompleted { .. } => "work_completed",
            EventKind::WorkFailed { .. } => "work_failed",
            EventKind::LaneDrained => "lane_drained",
            EventKind::Inconsistency { .. } => "inconsistency",
        }
    }
}
