//! Core observer trait and event/metric types.

use std::time::Duration;

use uuid::Uuid;

/// Sink for allocation lifecycle events and metrics.
///
/// The coordinator and batch runner record events at each state change;
/// the observer decides whether to log them, keep them, or drop them.
///
/// Thread-safe and shared behind `Arc<dyn Observer>`.
pub trait Observer: Send + Sync {
    /// Record a discrete lifecycle event.
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric sample.
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered data. No-op by default.
    fn flush(&self) {}

    /// Human-readable backend name (e.g. "noop", "log").
    fn name(&self) -> &str;
}

/// Discrete allocation lifecycle events.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A batch started.
    BatchStart { items: usize },

    /// A selection attempt opened its transaction.
    AttemptStart { work_item_id: String, attempt: u32 },

    /// The selector reserved an agent for the work item.
    AgentReserved {
        work_item_id: String,
        agent_id: Uuid,
        agent_name: String,
        attempt: u32,
    },

    /// The selector found no free agent.
    NoAgent {
        work_item_id: String,
        attempt: u32,
        /// `None` when the retry budget is exhausted.
        retry_in: Option<Duration>,
    },

    /// Session record, agent reservation and work item update committed.
    Committed {
        work_item_id: String,
        session_id: String,
        agent_id: Uuid,
        duration: Duration,
    },

    /// The attempt's transaction was rolled back.
    RolledBack { work_item_id: String, reason: String },

    /// A batch finished.
    BatchEnd {
        succeeded: usize,
        failed: usize,
        duration: Duration,
    },
}

/// Numeric metric samples.
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// Wall time of one `assign` call, including backoff waits.
    AssignmentLatency(Duration),
    /// Selection attempts used by one `assign` call.
    SelectionAttempts(u32),
}
