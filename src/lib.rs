//! # laneq
//!
//! Per-lane FIFO serialization of asynchronous work.
//!
//! Work submitted under the same lane key runs strictly one at a time, in
//! submission order; different lanes run independently. Provides the lane
//! queue, a single-shot task abstraction (closures and external commands),
//! lane lifecycle events, and OpenTelemetry observability.

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod task;
pub mod telemetry;

pub use error::{Error, Result, TaskError};
pub use queue::{Completion, LaneKey, LaneQueue};
pub use task::{CommandTask, Task, from_fn, from_sync};
