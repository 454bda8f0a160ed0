//! Lane queue. The public API for submitting work.
//!
//! Work submitted under the same lane key runs one item at a time, in
//! submission order. Different lanes never wait on each other. A lane exists
//! only while it holds at least one item: the first submission to an absent
//! lane creates it and starts its drain, and the drain removes it the moment
//! its last item is dequeued.
//!
//! All lane state lives behind one mutex that is never held across an await.
//! The "was the lane empty before my append" decision is made under that
//! lock, so exactly one drain exists per live lane.
//!
//! A stuck action stalls its whole lane. There is no timeout or cancellation
//! here; tasks that need one must bring their own.

use std::any::Any;
use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{Instrument, Span, debug, error, warn};

use crate::config::{Config, DEFAULT_EVENT_CAPACITY};
use crate::error::{Error, Result, TaskError};
use crate::event::{Event, EventKind};
use crate::model::{WorkId, WorkItem};
use crate::task::{self, Task};
use crate::telemetry::lane::{record_outcome, start_task_span};
use crate::telemetry::metrics::LaneMetrics;

/// Anything usable as a lane key.
pub trait LaneKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<K> LaneKey for K where K: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased work item body: runs the action inside the given span and
/// reports how it settled, holding the caller's result until delivery.
type Job = Box<dyn FnOnce(Span) -> BoxFuture<Settled> + Send>;

/// Hands the result to the caller. Returns it back when nobody is waiting,
/// so it can be dropped outside the lane lock.
type Deliver = Box<dyn FnOnce() -> Option<Box<dyn Any + Send>> + Send>;

struct Settled {
    outcome: Outcome,
    deliver: Deliver,
}

enum Outcome {
    Ok,
    Failed(String),
    Panicked(String),
    Abandoned,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Failed(_) => "failed",
            Outcome::Panicked(_) => "panicked",
            Outcome::Abandoned => "abandoned",
        }
    }
}

struct Slot {
    item: WorkItem,
    /// Taken by the drain when the item starts.
    job: Option<Job>,
}

type Lanes<K> = HashMap<K, VecDeque<Slot>>;

struct Shared<K> {
    lanes: Mutex<Lanes<K>>,
    events: broadcast::Sender<Event<K>>,
    seq: AtomicU64,
    metrics: LaneMetrics,
}

// ---------------------------------------------------------------------------
// Completion handle
// ---------------------------------------------------------------------------

/// Resolves once, with the task's value or the reason it produced none.
///
/// Dropping the handle does not cancel the task; it still runs in its turn.
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<T, E> {
    id: WorkId,
    rx: oneshot::Receiver<std::result::Result<T, TaskError<E>>>,
}

impl<T, E> Completion<T, E> {
    /// The work item this handle belongs to.
    pub fn id(&self) -> WorkId {
        self.id
    }
}

impl<T, E> Future for Completion<T, E> {
    type Output = std::result::Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

// ---------------------------------------------------------------------------
// Lane queue
// ---------------------------------------------------------------------------

/// Per-lane FIFO serializer. Cloning yields another handle to the same lanes.
pub struct LaneQueue<K = String> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for LaneQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: LaneKey> Default for LaneQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: LaneKey> LaneQueue<K> {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_event_capacity(config.event_capacity)
    }

    /// `capacity` bounds how far an event subscriber may fall behind.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                lanes: Mutex::new(HashMap::new()),
                events,
                seq: AtomicU64::new(0),
                metrics: LaneMetrics::new(),
            }),
        }
    }

    /// Queue `task` at the back of `lane`.
    ///
    /// Returns without waiting for the task. If the lane was absent, its
    /// drain starts now; otherwise the task waits for every item ahead of it
    /// to settle. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the task rejects itself, and
    /// [`Error::NoRuntime`] outside a runtime. Neither touches any lane.
    pub fn submit<T>(
        &self,
        lane: impl Into<K>,
        task: T,
    ) -> Result<Completion<T::Output, T::Error>>
    where
        T: Task,
        T::Output: Send + 'static,
        T::Error: Debug + Send + 'static,
    {
        task.check().map_err(Error::InvalidArgument)?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let lane = lane.into();
        let item = WorkItem::new();
        let id = item.id;
        let (tx, rx) = oneshot::channel();
        let slot = Slot {
            item,
            job: Some(job_for(task, tx)),
        };

        let start_drain = {
            let mut lanes = self.shared.lanes();
            let queue = match lanes.entry(lane.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    self.shared.emit(&lane, EventKind::LaneCreated);
                    self.shared.metrics.transition("created");
                    entry.insert(VecDeque::new())
                }
            };
            queue.push_back(slot);
            let depth = queue.len();
            self.shared.emit(&lane, EventKind::WorkQueued { id, depth });
            debug!(lane = ?lane, id = %id, depth, "work queued");
            depth == 1
        };

        self.shared.metrics.submitted();
        if start_drain {
            runtime.spawn(Arc::clone(&self.shared).drain(lane));
        }

        Ok(Completion { id, rx })
    }

    /// Queue an async closure. Shorthand for [`task::from_fn`] + [`Self::submit`].
    pub fn submit_fn<F, Fut, T, E>(&self, lane: impl Into<K>, f: F) -> Result<Completion<T, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Debug + Send + 'static,
    {
        self.submit(lane, task::from_fn(f))
    }

    /// Queue a synchronous closure. Shorthand for [`task::from_sync`] + [`Self::submit`].
    pub fn submit_sync<F, T, E>(&self, lane: impl Into<K>, f: F) -> Result<Completion<T, E>>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Debug + Send + 'static,
    {
        self.submit(lane, task::from_sync(f))
    }

    /// Snapshot of a lane's items, head first. The head may be in flight.
    ///
    /// `None` when the lane does not exist; a live lane is never empty.
    pub fn inspect<Q>(&self, lane: &Q) -> Option<Vec<WorkItem>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let lanes = self.shared.lanes();
        lanes
            .get(lane)
            .map(|queue| queue.iter().map(|slot| slot.item.clone()).collect())
    }

    /// Keys of every live lane, in no particular order.
    pub fn lanes(&self) -> Vec<K> {
        self.shared.lanes().keys().cloned().collect()
    }

    pub fn lane_count(&self) -> usize {
        self.shared.lanes().len()
    }

    /// True when no lane holds any work.
    pub fn is_idle(&self) -> bool {
        self.shared.lanes().is_empty()
    }

    /// Subscribe to lane events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<K>> {
        self.shared.events.subscribe()
    }
}

fn job_for<T>(
    task: T,
    tx: oneshot::Sender<std::result::Result<T::Output, TaskError<T::Error>>>,
) -> Job
where
    T: Task,
    T::Output: Send + 'static,
    T::Error: Debug + Send + 'static,
{
    Box::new(move |span: Span| -> BoxFuture<Settled> {
        Box::pin(async move {
            // Own task, so a panicking action cannot take the drain down with
            // it. `run` is called in there too: closures may panic before
            // producing a future.
            let joined = tokio::spawn(async move { task.run().await }.instrument(span)).await;
            let (outcome, result) = match joined {
                Ok(Ok(value)) => (Outcome::Ok, Ok(value)),
                Ok(Err(e)) => (Outcome::Failed(format!("{e:?}")), Err(TaskError::Failed(e))),
                Err(join) if join.is_panic() => {
                    let msg = panic_message(join.into_panic());
                    (Outcome::Panicked(msg.clone()), Err(TaskError::Panicked(msg)))
                }
                Err(_) => (Outcome::Abandoned, Err(TaskError::Abandoned)),
            };
            Settled {
                outcome,
                deliver: Box::new(move || {
                    // The caller may have dropped its handle.
                    tx.send(result)
                        .err()
                        .map(|unclaimed| Box::new(unclaimed) as Box<dyn Any + Send>)
                }),
            }
        })
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

impl<K: LaneKey> Shared<K> {
    fn lanes(&self) -> MutexGuard<'_, Lanes<K>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, lane: &K, kind: EventKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is not an error.
        let _ = self.events.send(Event {
            seq,
            timestamp: Utc::now(),
            lane: lane.clone(),
            kind,
        });
    }

    /// Run a lane until it is empty. Exactly one of these exists per live lane.
    ///
    /// Each item is dequeued and its caller told it settled in one critical
    /// section, so a lane recreated right after cannot complete ahead of it.
    async fn drain(self: Arc<Self>, lane: K) {
        while let Some((job, id, span)) = self.start_head(&lane) {
            let started = Instant::now();
            let settled = job(span.clone()).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let label = settled.outcome.label();
            record_outcome(&span, label, duration_ms);
            self.metrics.settled(label, duration_ms);
            if let Outcome::Panicked(ref msg) = settled.outcome {
                warn!(lane = ?lane, id = %id, panic = %msg, "task panicked");
            }

            let (more, unclaimed) =
                self.finish_head(&lane, id, &settled.outcome, duration_ms, settled.deliver);
            drop(unclaimed);
            if !more {
                break;
            }
        }
    }

    /// Mark the head in flight and hand out its job. `None` ends the drain.
    fn start_head(&self, lane: &K) -> Option<(Job, WorkId, Span)> {
        let mut lanes = self.lanes();
        let Some(queue) = lanes.get_mut(lane) else {
            drop(lanes);
            self.inconsistent(lane, "drain found no lane to run");
            return None;
        };

        let Some(head) = queue.front_mut() else {
            lanes.remove(lane);
            self.emit(lane, EventKind::LaneDrained);
            self.metrics.transition("drained");
            return None;
        };

        let Some(job) = head.job.take() else {
            drop(lanes);
            self.inconsistent(lane, "lane head was already started");
            return None;
        };

        let now = Utc::now();
        head.item.started_at = Some(now);
        let id = head.item.id;
        let waited_ms = (now - head.item.enqueued_at).num_milliseconds().max(0) as u64;
        self.emit(lane, EventKind::WorkStarted { id, waited_ms });
        debug!(lane = ?lane, id = %id, waited_ms, "work started");

        Some((job, id, start_task_span(lane, id)))
    }

    /// Dequeue the settled head and deliver its result under the same lock.
    /// Returns whether the lane has more work (when it does not, the lane is
    /// gone) and any result nobody was waiting for.
    fn finish_head(
        &self,
        lane: &K,
        id: WorkId,
        outcome: &Outcome,
        duration_ms: u64,
        deliver: Deliver,
    ) -> (bool, Option<Box<dyn Any + Send>>) {
        let mut lanes = self.lanes();
        let Some(queue) = lanes.get_mut(lane) else {
            drop(lanes);
            self.inconsistent(lane, "lane vanished while its head was running");
            return (false, deliver());
        };

        if !queue.front().is_some_and(|head| head.item.id == id) {
            drop(lanes);
            self.inconsistent(lane, "lane head changed while it was running");
            return (false, deliver());
        }
        queue.pop_front();

        let kind = match outcome {
            Outcome::Ok => EventKind::WorkCompleted { id, duration_ms },
            Outcome::Failed(error) | Outcome::Panicked(error) => EventKind::WorkFailed {
                id,
                duration_ms,
                error: error.clone(),
            },
            Outcome::Abandoned => EventKind::WorkFailed {
                id,
                duration_ms,
                error: "abandoned".to_string(),
            },
        };
        self.emit(lane, kind);

        let more = !queue.is_empty();
        if !more {
            lanes.remove(lane);
            self.emit(lane, EventKind::LaneDrained);
            self.metrics.transition("drained");
            debug!(lane = ?lane, "lane drained");
        }
        (more, deliver())
    }

    /// Unreachable while the lane invariants hold. Reported loudly; only this
    /// lane's drain stops.
    fn inconsistent(&self, lane: &K, reason: &str) {
        error!(lane = ?lane, reason, "lane state inconsistent, drain aborted");
        self.metrics.inconsistency();
        self.emit(
            lane,
            EventKind::Inconsistency {
                reason: reason.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_of_missing_lane_reports_inconsistency() {
        let queue: LaneQueue<&'static str> = LaneQueue::new();
        let mut events = queue.subscribe();

        Arc::clone(&queue.shared).drain("ghost").await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.lane, "ghost");
        assert!(matches!(event.kind, EventKind::Inconsistency { .. }));
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn drain_of_empty_lane_removes_it() {
        let queue: LaneQueue<&'static str> = LaneQueue::new();
        queue.shared.lanes().insert("hollow", VecDeque::new());
        let mut events = queue.subscribe();

        Arc::clone(&queue.shared).drain("hollow").await;

        assert!(queue.inspect("hollow").is_none());
        assert_eq!(events.try_recv().unwrap().kind, EventKind::LaneDrained);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    #[test]
    fn submit_outside_runtime_fails_without_creating_lane() {
        let queue: LaneQueue = LaneQueue::new();
        let result = queue.submit_fn("k", || async { Ok::<_, String>(()) });
        assert!(matches!(result, Err(Error::NoRuntime)));
        assert!(queue.inspect("k").is_none());
    }
}
