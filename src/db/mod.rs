//! Lock store abstraction.
//!
//! The allocator talks to the store through two traits:
//!
//! - [`AllocationStore`] opens an [`AllocationTx`], the transaction in which
//!   one assignment attempt locks its work item, reserves an agent, writes
//!   the session record and updates the work item.
//! - [`AdminStore`] covers the operator-facing reads and writes (registering
//!   agents and work items, listing state) that run outside an allocation.
//!
//! Two backends implement both, behind cargo features:
//!
//! | Backend | Feature | Agent claim |
//! |---------|---------|-------------|
//! | [`postgres::PgBackend`] | `postgres` | `FOR UPDATE SKIP LOCKED` |
//! | [`libsql::LibSqlBackend`] | `libsql` | conditional `UPDATE` under `BEGIN IMMEDIATE` |

#[cfg(feature = "libsql")]
pub mod libsql;
#[cfg(feature = "libsql")]
pub mod libsql_migrations;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::allocator::{Agent, NewAgent, SessionRecord, WorkItem, WorkItemId};
use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::DatabaseError;

/// One open store transaction.
///
/// Dropping an unfinished transaction discards it; nothing it wrote becomes
/// visible. Callers should still prefer an explicit [`rollback`] so the
/// connection goes back to the pool clean.
///
/// [`rollback`]: AllocationTx::rollback
#[async_trait]
pub trait AllocationTx: Send {
    /// Lock the work item row until the transaction ends.
    ///
    /// Blocks while another transaction holds the same row. Returns `None`
    /// when the item does not exist.
    async fn lock_work_item(&mut self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError>;

    /// Claim the oldest active, available agent that no other in-flight
    /// transaction has claimed, without waiting on contended rows.
    ///
    /// On success the agent is marked unavailable and its last-assignment
    /// time stamped, both uncommitted. `None` means nothing is free right now.
    async fn reserve_one_agent(&mut self) -> Result<Option<Agent>, DatabaseError>;

    async fn insert_session(&mut self, session: &SessionRecord) -> Result<(), DatabaseError>;

    /// Point the work item at its agent and move it to `pending`.
    async fn mark_work_item_pending(
        &mut self,
        id: &WorkItemId,
        agent_id: Uuid,
    ) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Open a transaction for one allocation attempt.
    async fn begin(&self) -> Result<Box<dyn AllocationTx>, DatabaseError>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn add_agent(&self, agent: &NewAgent) -> Result<Agent, DatabaseError>;

    /// All agents, oldest first.
    async fn list_agents(&self) -> Result<Vec<Agent>, DatabaseError>;

    /// Register a work item as `unassigned`. Returns `false` if it already
    /// existed, in which case it is left untouched.
    async fn add_work_item(&self, id: &WorkItemId) -> Result<bool, DatabaseError>;

    async fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError>;

    /// All session records, oldest first.
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError>;
}

/// Backend-agnostic database supertrait.
#[async_trait]
pub trait Database: AllocationStore + AdminStore + Send + Sync {
    /// Create the allocator tables if they do not exist.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

/// Connect to the configured backend.
///
/// Does not run migrations; call [`Database::run_migrations`] (or the
/// `migrate` command) first on a fresh store.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    match config.backend {
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => {
            let backend = postgres::PgBackend::new(config).await?;
            tracing::info!(pool_size = config.pool_size, "connected to PostgreSQL");
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            let path = config
                .libsql_path
                .clone()
                .unwrap_or_else(crate::config::default_libsql_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            let backend = libsql::LibSqlBackend::new_local(&path).await?;
            tracing::info!(path = %path.display(), "opened libSQL database");
            Ok(Arc::new(backend))
        }
        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::Pool(format!(
            "database backend '{other}' is not compiled into this build"
        ))),
    }
}
