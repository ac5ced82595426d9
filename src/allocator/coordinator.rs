//! Assignment of one work item to one agent.
//!
//! Each selection attempt runs in its own short transaction:
//!
//! ```text
//! BEGIN -> lock work item -> reserve agent -> insert session -> mark pending -> COMMIT
//!                                 |
//!                                 +-- none free -> ROLLBACK -> sleep -> next attempt
//! ```
//!
//! No row lock is held across the backoff sleep. The agent reservation, the
//! session record and the work item update still commit together or not at
//! all.

use std::sync::Arc;
use std::time::Instant;

use crate::allocator::selector;
use crate::allocator::{
    RetryPolicy, SessionRecord, SessionStatus, WorkItemId, new_session_id, store_now,
};
use crate::db::{AllocationTx, Database};
use crate::error::AssignError;
use crate::observability::{NoopObserver, Observer, ObserverEvent, ObserverMetric};

/// Result of one selection attempt that did not fail.
enum Attempt {
    Assigned(SessionRecord),
    NoAgent,
}

/// Assigns work items to agents, one at a time.
pub struct AssignmentCoordinator {
    store: Arc<dyn Database>,
    policy: RetryPolicy,
    observer: Arc<dyn Observer>,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<dyn Database>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    /// Reserve an agent for `work_item_id` and record the session.
    ///
    /// Waits `policy.interval` between attempts while no agent is free. With
    /// a bounded policy, fails with [`AssignError::NoAgentAvailable`] after
    /// exactly `max_attempts` selector calls. Any other error ends the call
    /// immediately; nothing from the failed attempt is committed.
    pub async fn assign(&self, work_item_id: &WorkItemId) -> Result<SessionRecord, AssignError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let result = loop {
            attempt += 1;
            match self.attempt(work_item_id, attempt).await {
                Ok(Attempt::Assigned(session)) => {
                    self.observer.record_event(&ObserverEvent::Committed {
                        work_item_id: work_item_id.to_string(),
                        session_id: session.id.clone(),
                        agent_id: session.agent_id,
                        duration: started.elapsed(),
                    });
                    break Ok(session);
                }
                Ok(Attempt::NoAgent) if self.policy.allows_another(attempt) => {
                    tracing::info!(
                        work_item_id = %work_item_id,
                        attempt,
                        "No available agents (attempt {attempt}). Waiting {:?}",
                        self.policy.interval
                    );
                    self.observer.record_event(&ObserverEvent::NoAgent {
                        work_item_id: work_item_id.to_string(),
                        attempt,
                        retry_in: Some(self.policy.interval),
                    });
                    tokio::time::sleep(self.policy.interval).await;
                }
                Ok(Attempt::NoAgent) => {
                    self.observer.record_event(&ObserverEvent::NoAgent {
                        work_item_id: work_item_id.to_string(),
                        attempt,
                        retry_in: None,
                    });
                    break Err(AssignError::NoAgentAvailable {
                        work_item_id: work_item_id.clone(),
                        attempts: attempt,
                    });
                }
                Err(e) => break Err(e),
            }
        };

        self.observer
            .record_metric(&ObserverMetric::AssignmentLatency(started.elapsed()));
        self.observer
            .record_metric(&ObserverMetric::SelectionAttempts(attempt));
        result
    }

    /// One transaction: commit on success, roll back otherwise.
    async fn attempt(&self, work_item_id: &WorkItemId, attempt: u32) -> Result<Attempt, AssignError> {
        self.observer.record_event(&ObserverEvent::AttemptStart {
            work_item_id: work_item_id.to_string(),
            attempt,
        });
        tracing::debug!(work_item_id = %work_item_id, attempt, "BEGIN transaction");
        let mut tx = self.store.begin().await?;

        match self.create_session(tx.as_mut(), work_item_id, attempt).await {
            Ok(Some(session)) => {
                tx.commit().await?;
                tracing::info!(
                    work_item_id = %work_item_id,
                    session_id = %session.id,
                    "COMMIT"
                );
                Ok(Attempt::Assigned(session))
            }
            Ok(None) => {
                self.rollback(tx, work_item_id, "no agent available").await;
                Ok(Attempt::NoAgent)
            }
            Err(e) => {
                self.rollback(tx, work_item_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Lock, select, insert, update. `None` when no agent is free.
    async fn create_session(
        &self,
        tx: &mut dyn AllocationTx,
        work_item_id: &WorkItemId,
        attempt: u32,
    ) -> Result<Option<SessionRecord>, AssignError> {
        if tx.lock_work_item(work_item_id).await?.is_none() {
            return Err(AssignError::NotFound {
                work_item_id: work_item_id.clone(),
            });
        }

        let Some(agent) = selector::reserve_one_agent(tx).await? else {
            return Ok(None);
        };
        tracing::info!(
            work_item_id = %work_item_id,
            agent_id = %agent.id,
            "Reserved agent {}",
            agent.display_name
        );
        self.observer.record_event(&ObserverEvent::AgentReserved {
            work_item_id: work_item_id.to_string(),
            agent_id: agent.id,
            agent_name: agent.display_name.clone(),
            attempt,
        });

        let session = SessionRecord {
            id: new_session_id(),
            work_item_id: work_item_id.clone(),
            agent_id: agent.id,
            agent_display_name: agent.display_name,
            status: SessionStatus::Pending,
            created_at: store_now(),
        };
        tx.insert_session(&session).await?;
        tracing::debug!(work_item_id = %work_item_id, session_id = %session.id, "inserted session");

        tx.mark_work_item_pending(work_item_id, session.agent_id)
            .await?;
        tracing::debug!(work_item_id = %work_item_id, "work item marked pending");

        Ok(Some(session))
    }

    async fn rollback(&self, tx: Box<dyn AllocationTx>, work_item_id: &WorkItemId, reason: &str) {
        match tx.rollback().await {
            Ok(()) => tracing::debug!(work_item_id = %work_item_id, "ROLLBACK"),
            Err(e) => tracing::error!(work_item_id = %work_item_id, "Rollback failed: {e}"),
        }
        self.observer.record_event(&ObserverEvent::RolledBack {
            work_item_id: work_item_id.to_string(),
            reason: reason.to_string(),
        });
    }
}
