//! Tracing-based observer that emits structured log events.

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

/// Observer that logs events and metrics via `tracing`.
pub struct LogObserver;

impl Observer for LogObserver {
    #[allow(clippy::cognitive_complexity)] // tracing macros inflate complexity
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::BatchStart { items } => {
                tracing::info!(items, "observer: batch.start");
            }
            ObserverEvent::AttemptStart {
                work_item_id,
                attempt,
            } => {
                tracing::debug!(work_item_id, attempt, "observer: attempt.start");
            }
            ObserverEvent::AgentReserved {
                work_item_id,
                agent_id,
                agent_name,
                attempt,
            } => {
                tracing::info!(
                    work_item_id,
                    agent_id = %agent_id,
                    agent_name,
                    attempt,
                    "observer: agent.reserved"
                );
            }
            ObserverEvent::NoAgent {
                work_item_id,
                attempt,
                retry_in,
            } => {
                tracing::info!(
                    work_item_id,
                    attempt,
                    retry_in_ms = retry_in.map(|d| d.as_millis() as u64).unwrap_or(0),
                    exhausted = retry_in.is_none(),
                    "observer: agent.none"
                );
            }
            ObserverEvent::Committed {
                work_item_id,
                session_id,
                agent_id,
                duration,
            } => {
                tracing::info!(
                    work_item_id,
                    session_id,
                    agent_id = %agent_id,
                    duration_ms = duration.as_millis() as u64,
                    "observer: assignment.committed"
                );
            }
            ObserverEvent::RolledBack {
                work_item_id,
                reason,
            } => {
                tracing::warn!(work_item_id, reason, "observer: assignment.rolled_back");
            }
            ObserverEvent::BatchEnd {
                succeeded,
                failed,
                duration,
            } => {
                tracing::info!(
                    succeeded,
                    failed,
                    duration_secs = duration.as_secs_f64(),
                    "observer: batch.end"
                );
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::AssignmentLatency(d) => {
                tracing::debug!(
                    latency_ms = d.as_millis() as u64,
                    "observer: metric.assignment_latency"
                );
            }
            ObserverMetric::SelectionAttempts(n) => {
                tracing::debug!(attempts = n, "observer: metric.selection_attempts");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
