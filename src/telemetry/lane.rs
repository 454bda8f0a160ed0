//! Lane task span helpers.
//!
//! Every work item executes inside a `lane.task` span; the outcome field is
//! filled in once the action settles.

use std::fmt::Debug;

use tracing::Span;

use crate::model::WorkId;

/// Start a span for one work item on a lane.
///
/// `work.outcome` is declared empty and set by [`record_outcome`].
pub fn start_task_span(lane: &dyn Debug, work_id: WorkId) -> Span {
    tracing::info_span!(
        "lane.task",
        "lane.key" = ?lane,
        "work.id" = %work_id.0,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record how the action settled ("ok", "failed" or "panicked").
pub fn record_outcome(span: &Span, outcome: &str, duration_ms: u64) {
    span.record("work.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome, duration_ms, "task settled");
    });
}
