//! Metric instrument factories for laneq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one, the instruments are no-ops.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for laneq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("laneq")
}

/// Counter: work items accepted by `submit`.
pub fn work_submitted() -> Counter<u64> {
    meter()
        .u64_counter("laneq.work.submitted")
        .with_description("Number of work items submitted")
        .build()
}

/// Counter: work items settled.
/// Labels: `result` ("ok" | "failed" | "panicked" | "abandoned").
pub fn work_settled() -> Counter<u64> {
    meter()
        .u64_counter("laneq.work.settled")
        .with_description("Number of work items settled")
        .build()
}

/// Counter: lane lifecycle transitions.
/// Labels: `transition` ("created" | "drained").
pub fn lane_transitions() -> Counter<u64> {
    meter()
        .u64_counter("laneq.lane.transitions")
        .with_description("Number of lane creations and removals")
        .build()
}

/// Histogram: action run time in milliseconds.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("laneq.task.duration_ms")
        .with_description("Task execution time in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: drains aborted on impossible lane state.
pub fn internal_inconsistency() -> Counter<u64> {
    meter()
        .u64_counter("laneq.internal.inconsistency")
        .with_description("Lane drains aborted on inconsistent state")
        .build()
}

/// The instrument set a lane queue records into, built once per queue.
pub(crate) struct LaneMetrics {
    submitted: Counter<u64>,
    settled: Counter<u64>,
    transitions: Counter<u64>,
    duration: Histogram<f64>,
    inconsistency: Counter<u64>,
}

impl LaneMetrics {
    pub(crate) fn new() -> Self {
        Self {
            submitted: work_submitted(),
            settled: work_settled(),
            transitions: lane_transitions(),
            duration: task_duration_ms(),
            inconsistency: internal_inconsistency(),
        }
    }

    pub(crate) fn submitted(&self) {
        self.submitted.add(1, &[]);
    }

    pub(crate) fn settled(&self, result: &'static str, duration_ms: u64) {
        self.settled.add(1, &[KeyValue::new("result", result)]);
        self.duration.record(duration_ms as f64, &[]);
    }

    pub(crate) fn transition(&self, transition: &'static str) {
        self.transitions
            .add(1, &[KeyValue::new("transition", transition)]);
    }

    pub(crate) fn inconsistency(&self) {
        self.inconsistency.add(1, &[]);
    }
}
