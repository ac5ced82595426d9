//! Sequential batch assignment with per-item failure isolation.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::allocator::{AssignmentCoordinator, WorkItemId};
use crate::error::ErrorKind;
use crate::observability::ObserverEvent;

/// What happened to one work item in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Assigned {
        work_item_id: WorkItemId,
        agent_id: Uuid,
        agent_display_name: String,
        session_id: String,
    },
    Failed {
        work_item_id: WorkItemId,
        error_kind: ErrorKind,
        error_message: String,
    },
}

impl Outcome {
    pub fn work_item_id(&self) -> &WorkItemId {
        match self {
            Self::Assigned { work_item_id, .. } | Self::Failed { work_item_id, .. } => work_item_id,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned {
                work_item_id,
                agent_display_name,
                session_id,
                ..
            } => write!(f, "{work_item_id}: assigned to {agent_display_name} ({session_id})"),
            Self::Failed {
                work_item_id,
                error_kind,
                error_message,
            } => write!(f, "{work_item_id}: {error_kind}: {error_message}"),
        }
    }
}

/// Outcomes of one batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<Outcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_assigned()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_assigned(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Summary: {} assigned, {} failed",
            self.succeeded(),
            self.failed()
        )?;
        for outcome in &self.outcomes {
            writeln!(f, "  {outcome}")?;
        }
        Ok(())
    }
}

/// Runs a list of work items through one coordinator, in order.
pub struct BatchRunner<'a> {
    coordinator: &'a AssignmentCoordinator,
}

impl<'a> BatchRunner<'a> {
    pub fn new(coordinator: &'a AssignmentCoordinator) -> Self {
        Self { coordinator }
    }

    /// Assign every item in `ids`. One outcome per input, same order; a
    /// failure on one item never stops the rest.
    pub async fn run(&self, ids: &[WorkItemId]) -> BatchReport {
        let observer = self.coordinator.observer();
        let started = Instant::now();
        tracing::info!("Will assign agents for {} work items", ids.len());
        observer.record_event(&ObserverEvent::BatchStart { items: ids.len() });

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.coordinator.assign(id).await {
                Ok(session) => Outcome::Assigned {
                    work_item_id: id.clone(),
                    agent_id: session.agent_id,
                    agent_display_name: session.agent_display_name,
                    session_id: session.id,
                },
                Err(e) => {
                    tracing::error!(work_item_id = %id, kind = %e.kind(), "Assignment failed: {e}");
                    Outcome::Failed {
                        work_item_id: id.clone(),
                        error_kind: e.kind(),
                        error_message: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = BatchReport { outcomes };
        observer.record_event(&ObserverEvent::BatchEnd {
            succeeded: report.succeeded(),
            failed: report.failed(),
            duration: started.elapsed(),
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn assigned(id: &str) -> Outcome {
        Outcome::Assigned {
            work_item_id: id.into(),
            agent_id: Uuid::nil(),
            agent_display_name: "alice".into(),
            session_id: "room-1".into(),
        }
    }

    fn failed(id: &str) -> Outcome {
        Outcome::Failed {
            work_item_id: id.into(),
            error_kind: ErrorKind::NotFound,
            error_message: format!("Work item {id} not found"),
        }
    }

    #[test]
    fn report_counts() {
        let report = BatchReport {
            outcomes: vec![assigned("x"), failed("y"), assigned("z")],
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_assigned());
        assert!(BatchReport::default().all_assigned());
    }

    #[test]
    fn report_display_lists_each_outcome() {
        let report = BatchReport {
            outcomes: vec![assigned("x"), failed("y")],
        };
        let text = report.to_string();
        assert!(text.starts_with("Summary: 1 assigned, 1 failed"));
        assert!(text.contains("x: assigned to alice (room-1)"));
        assert!(text.contains("y: not_found: Work item y not found"));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(failed("P732687")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["work_item_id"], "P732687");
        assert_eq!(json["error_kind"], "not_found");

        let json = serde_json::to_value(assigned("190011")).unwrap();
        assert_eq!(json["status"], "assigned");
        assert_eq!(json["session_id"], "room-1");
    }

    #[cfg(feature = "libsql")]
    mod store {
        use std::sync::Arc;
        use std::time::Duration;

        use pretty_assertions::assert_eq;

        use super::super::*;
        use crate::allocator::{NewAgent, RetryPolicy};
        use crate::db::Database;
        use crate::db::libsql::LibSqlBackend;
        use crate::observability::recording::RecordingObserver;

        #[tokio::test]
        async fn failures_are_isolated_and_order_is_kept() {
            let dir = tempfile::tempdir().unwrap();
            let backend = LibSqlBackend::new_local(&dir.path().join("batch.db"))
                .await
                .unwrap();
            backend.run_migrations().await.unwrap();
            let store: Arc<dyn Database> = Arc::new(backend);

            store.add_agent(&NewAgent::active("alice")).await.unwrap();
            store.add_agent(&NewAgent::active("bob")).await.unwrap();
            store.add_work_item(&"x".into()).await.unwrap();
            store.add_work_item(&"z".into()).await.unwrap();

            let (observer, events, _) = RecordingObserver::new();
            let coordinator =
                AssignmentCoordinator::new(Arc::clone(&store), RetryPolicy::new(Duration::ZERO, 1))
                    .with_observer(Arc::new(observer));
            let ids: Vec<WorkItemId> = vec!["x".into(), "y".into(), "z".into()];
            let report = BatchRunner::new(&coordinator).run(&ids).await;

            assert_eq!(report.outcomes.len(), 3);
            let order: Vec<&str> = report
                .outcomes
                .iter()
                .map(|o| o.work_item_id().as_str())
                .collect();
            assert_eq!(order, vec!["x", "y", "z"]);

            assert!(report.outcomes[0].is_assigned());
            assert!(matches!(
                report.outcomes[1],
                Outcome::Failed {
                    error_kind: ErrorKind::NotFound,
                    ..
                }
            ));
            assert!(report.outcomes[2].is_assigned());

            let captured = events.lock().unwrap();
            assert!(matches!(
                captured.last(),
                Some(ObserverEvent::BatchEnd {
                    succeeded: 2,
                    failed: 1,
                    ..
                })
            ));
        }

        #[tokio::test]
        async fn empty_batch_yields_empty_report() {
            let dir = tempfile::tempdir().unwrap();
            let backend = LibSqlBackend::new_local(&dir.path().join("empty.db"))
                .await
                .unwrap();
            backend.run_migrations().await.unwrap();
            let coordinator =
                AssignmentCoordinator::new(Arc::new(backend), RetryPolicy::new(Duration::ZERO, 1));

            let report = BatchRunner::new(&coordinator).run(&[]).await;
            assert!(report.outcomes.is_empty());
        }
    }
}
