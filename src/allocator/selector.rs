//! Agent selection.
//!
//! The selection rule is the same on every backend: among agents that are
//! `active` and available, take the oldest `created_at`, breaking ties by
//! id. A row claimed by another in-flight transaction is skipped, never
//! waited on. FIFO therefore only holds among the candidates that are
//! visible and unclaimed at the instant of the call.
//!
//! PostgreSQL does the whole read-and-claim in one `SKIP LOCKED` statement.
//! Stores without skip-locking go through [`claim_first_available`], which
//! scans candidates and claims each with a conditional update until one
//! sticks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::allocator::{Agent, store_now};
use crate::db::AllocationTx;
use crate::error::DatabaseError;

/// Candidates fetched per scan by [`claim_first_available`].
pub(crate) const CANDIDATE_BATCH: usize = 32;

/// Reserve one agent inside `tx`, or report that none is free.
pub async fn reserve_one_agent(tx: &mut dyn AllocationTx) -> Result<Option<Agent>, DatabaseError> {
    let agent = tx.reserve_one_agent().await?;
    match &agent {
        Some(agent) => tracing::debug!(
            agent_id = %agent.id,
            agent = %agent.display_name,
            "selector claimed agent"
        ),
        None => tracing::debug!("selector found no free agent"),
    }
    Ok(agent)
}

/// Candidate scan and conditional claim, for stores without skip-locking.
#[async_trait]
pub(crate) trait ConditionalClaim: Send {
    /// Up to `limit` active, available agents, oldest first, ties by id.
    async fn eligible_agents(&mut self, limit: usize) -> Result<Vec<Agent>, DatabaseError>;

    /// Mark the agent unavailable if it is still active and available.
    /// Returns `false` when another transaction got there first.
    async fn try_claim(&mut self, agent_id: Uuid, at: DateTime<Utc>)
    -> Result<bool, DatabaseError>;
}

/// Claim the first candidate whose conditional update succeeds.
///
/// Rescans only when a full batch was lost to other claimants; a short
/// batch that was entirely lost means nothing is free.
pub(crate) async fn claim_first_available<C>(store: &mut C) -> Result<Option<Agent>, DatabaseError>
where
    C: ConditionalClaim + ?Sized,
{
    loop {
        let candidates = store.eligible_agents(CANDIDATE_BATCH).await?;
        let exhausted = candidates.len() < CANDIDATE_BATCH;
        let claimed_at = store_now();

        for mut agent in candidates {
            if store.try_claim(agent.id, claimed_at).await? {
                agent.is_available = false;
                agent.last_assignment_at = Some(claimed_at);
                return Ok(Some(agent));
            }
            tracing::debug!(agent_id = %agent.id, "agent claimed concurrently, skipping");
        }

        if exhausted {
            return Ok(None);
        }
    }
}
