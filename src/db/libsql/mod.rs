//! libSQL/Turso backend for the Database trait.
//!
//! SQLite has no row locks, so allocation transactions are opened with
//! `BEGIN IMMEDIATE`, which takes the database write lock up front. That
//! serializes allocators against each other; the agent claim is still a
//! conditional update so the selection rule matches the PostgreSQL backend.
//!
//! Each transaction gets its own connection. The database must be
//! file-backed for connections to share state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, params};
use uuid::Uuid;

use crate::allocator::selector::{ConditionalClaim, claim_first_available};
use crate::allocator::{
    Agent, AgentStatus, NewAgent, SessionRecord, SessionStatus, WorkItem, WorkItemId,
    WorkItemStatus, store_now,
};
use crate::db::libsql_migrations::SCHEMA;
use crate::db::{AdminStore, AllocationStore, AllocationTx, Database};
use crate::error::DatabaseError;

/// How long a writer waits for the database lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const AGENT_COLUMNS: &str =
    "id, display_name, status, is_available, created_at, last_assignment_at";

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<libsql::Database>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open {}: {e}", path.display())))?;
        let backend = Self { db: Arc::new(db) };

        // WAL lets status reads proceed while an allocation holds the write lock.
        let conn = backend.connect().await?;
        let mut rows = conn.query("PRAGMA journal_mode=WAL", ()).await?;
        while rows.next().await?.is_some() {}

        Ok(backend)
    }

    /// Open a new connection with the busy timeout and foreign keys set.
    pub async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect()?;
        let pragma = format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT.as_millis());
        let mut rows = conn.query(&pragma, ()).await?;
        while rows.next().await?.is_some() {}
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(conn)
    }
}

/// Format a timestamp so lexical order equals chronological order.
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("invalid timestamp '{s}': {e}")))
}

fn get_text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    Ok(row.get::<String>(idx)?)
}

fn get_opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    Ok(row.get::<Option<String>>(idx)?)
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    s.parse()
        .map_err(|e| DatabaseError::Serialization(format!("invalid uuid '{s}': {e}")))
}

/// Column order: see [`AGENT_COLUMNS`].
fn row_to_agent(row: &libsql::Row) -> Result<Agent, DatabaseError> {
    Ok(Agent {
        id: parse_uuid(&get_text(row, 0)?)?,
        display_name: get_text(row, 1)?,
        status: get_text(row, 2)?
            .parse::<AgentStatus>()
            .map_err(DatabaseError::Serialization)?,
        is_available: row.get::<i64>(3)? != 0,
        created_at: parse_ts(&get_text(row, 4)?)?,
        last_assignment_at: get_opt_text(row, 5)?.as_deref().map(parse_ts).transpose()?,
    })
}

/// Column order: id(0), status(1), assigned_agent_id(2).
fn row_to_work_item(row: &libsql::Row) -> Result<WorkItem, DatabaseError> {
    Ok(WorkItem {
        id: WorkItemId::from(get_text(row, 0)?),
        status: get_text(row, 1)?
            .parse::<WorkItemStatus>()
            .map_err(DatabaseError::Serialization)?,
        assigned_agent_id: get_opt_text(row, 2)?
            .as_deref()
            .map(parse_uuid)
            .transpose()?,
    })
}

async fn select_work_item(
    conn: &Connection,
    id: &WorkItemId,
) -> Result<Option<WorkItem>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, status, assigned_agent_id FROM work_items WHERE id = ?1",
            params![id.as_str()],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_work_item(&row)?)),
        None => Ok(None),
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a dedicated connection.
///
/// Dropping it closes the connection, which rolls back anything
/// uncommitted.
struct LibSqlTx {
    conn: Connection,
}

#[async_trait]
impl ConditionalClaim for LibSqlTx {
    async fn eligible_agents(&mut self, limit: usize) -> Result<Vec<Agent>, DatabaseError> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents \
             WHERE status = 'active' AND is_available = 1 \
             ORDER BY created_at ASC, id ASC LIMIT ?1"
        );
        let mut rows = self.conn.query(&sql, params![limit as i64]).await?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next().await? {
            agents.push(row_to_agent(&row)?);
        }
        Ok(agents)
    }

    async fn try_claim(
        &mut self,
        agent_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .conn
            .execute(
                "UPDATE agents SET is_available = 0, last_assignment_at = ?2 \
                 WHERE id = ?1 AND is_available = 1 AND status = 'active'",
                params![agent_id.to_string(), fmt_ts(&at)],
            )
            .await?;
        Ok(updated == 1)
    }
}

#[async_trait]
impl AllocationTx for LibSqlTx {
    async fn lock_work_item(&mut self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError> {
        // The IMMEDIATE write lock already excludes other allocators.
        select_work_item(&self.conn, id).await
    }

    async fn reserve_one_agent(&mut self) -> Result<Option<Agent>, DatabaseError> {
        claim_first_available(self).await
    }

    async fn insert_session(&mut self, session: &SessionRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO session_records (id, work_item_id, agent_id, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id.as_str(),
                    session.work_item_id.as_str(),
                    session.agent_id.to_string(),
                    session.status.as_str(),
                    fmt_ts(&session.created_at)
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_work_item_pending(
        &mut self,
        id: &WorkItemId,
        agent_id: Uuid,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn
            .execute(
                "UPDATE work_items \
                 SET assigned_agent_id = ?1, status = 'pending', \
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                 WHERE id = ?2",
                params![agent_id.to_string(), id.as_str()],
            )
            .await?;
        if updated != 1 {
            return Err(DatabaseError::Constraint(format!(
                "expected to update one work item {id}, updated {updated}"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

#[async_trait]
impl AllocationStore for LibSqlBackend {
    async fn begin(&self) -> Result<Box<dyn AllocationTx>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(Box::new(LibSqlTx { conn }))
    }
}

#[async_trait]
impl AdminStore for LibSqlBackend {
    async fn add_agent(&self, agent: &NewAgent) -> Result<Agent, DatabaseError> {
        let conn = self.connect().await?;
        let created = Agent {
            id: Uuid::new_v4(),
            display_name: agent.display_name.clone(),
            status: agent.status,
            is_available: true,
            created_at: agent.created_at.unwrap_or_else(store_now),
            last_assignment_at: None,
        };
        conn.execute(
            "INSERT INTO agents (id, display_name, status, is_available, created_at) \
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![
                created.id.to_string(),
                created.display_name.as_str(),
                created.status.as_str(),
                fmt_ts(&created.created_at)
            ],
        )
        .await?;
        Ok(created)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, DatabaseError> {
        let conn = self.connect().await?;
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC, id ASC");
        let mut rows = conn.query(&sql, ()).await?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next().await? {
            agents.push(row_to_agent(&row)?);
        }
        Ok(agents)
    }

    async fn add_work_item(&self, id: &WorkItemId) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let inserted = conn
            .execute(
                "INSERT INTO work_items (id, status) VALUES (?1, 'unassigned') \
                 ON CONFLICT(id) DO NOTHING",
                params![id.as_str()],
            )
            .await?;
        Ok(inserted == 1)
    }

    async fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError> {
        let conn = self.connect().await?;
        select_work_item(&conn, id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT s.id, s.work_item_id, s.agent_id, a.display_name, s.status, s.created_at \
                 FROM session_records s JOIN agents a ON a.id = s.agent_id \
                 ORDER BY s.created_at ASC, s.id ASC",
                (),
            )
            .await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(SessionRecord {
                id: get_text(&row, 0)?,
                work_item_id: WorkItemId::from(get_text(&row, 1)?),
                agent_id: parse_uuid(&get_text(&row, 2)?)?,
                agent_display_name: get_text(&row, 3)?,
                status: get_text(&row, 4)?
                    .parse::<SessionStatus>()
                    .map_err(DatabaseError::Serialization)?,
                created_at: parse_ts(&get_text(&row, 5)?)?,
            });
        }
        Ok(sessions)
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;

    async fn setup() -> (LibSqlBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let backend = LibSqlBackend::new_local(&dir.path().join("test.db"))
            .await
            .expect("open db");
        backend.run_migrations().await.expect("run migrations");
        (backend, dir)
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() + ChronoDuration::minutes(minute)
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = fmt_ts(&at(0));
        let late = fmt_ts(&(at(0) + ChronoDuration::microseconds(1)));
        assert!(early < late);
        assert_eq!(parse_ts(&early).unwrap(), at(0));
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (backend, _dir) = setup().await;
        backend.run_migrations().await.expect("second run");
    }

    #[tokio::test]
    async fn reserve_prefers_oldest_agent() {
        let (backend, _dir) = setup().await;
        let newer = backend
            .add_agent(&NewAgent::active("newer").created_at(at(10)))
            .await
            .unwrap();
        let older = backend
            .add_agent(&NewAgent::active("older").created_at(at(1)))
            .await
            .unwrap();

        let mut tx = backend.begin().await.unwrap();
        let reserved = tx.reserve_one_agent().await.unwrap().unwrap();
        tx.commit().await.unwrap();

        assert_eq!(reserved.id, older.id);
        let agents = backend.list_agents().await.unwrap();
        let newer_row = agents.iter().find(|a| a.id == newer.id).unwrap();
        let older_row = agents.iter().find(|a| a.id == older.id).unwrap();
        assert!(newer_row.is_available);
        assert!(!older_row.is_available);
        assert!(older_row.last_assignment_at.is_some());
        assert_eq!(older_row, &reserved);
        assert_eq!(newer_row, &newer);
    }

    #[tokio::test]
    async fn added_agent_matches_stored_row() {
        let (backend, _dir) = setup().await;
        let added = backend.add_agent(&NewAgent::active("now")).await.unwrap();
        let stored = backend.list_agents().await.unwrap();
        assert_eq!(stored, vec![added]);
    }

    #[tokio::test]
    async fn insert_session_keeps_backend_error() {
        let (backend, _dir) = setup().await;
        let agent = backend.add_agent(&NewAgent::active("a")).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        let err = tx
            .insert_session(&SessionRecord {
                id: "room-orphan".into(),
                work_item_id: WorkItemId::from("missing"),
                agent_id: agent.id,
                agent_display_name: agent.display_name.clone(),
                status: SessionStatus::Pending,
                created_at: at(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::LibSql(_)), "got {err:?}");
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn reserve_skips_inactive_agents() {
        let (backend, _dir) = setup().await;
        backend
            .add_agent(&NewAgent::active("off").created_at(at(0)).inactive())
            .await
            .unwrap();

        let mut tx = backend.begin().await.unwrap();
        assert!(tx.reserve_one_agent().await.unwrap().is_none());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_restores_availability() {
        let (backend, _dir) = setup().await;
        backend.add_agent(&NewAgent::active("solo")).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        assert!(tx.reserve_one_agent().await.unwrap().is_some());
        tx.rollback().await.unwrap();

        let agents = backend.list_agents().await.unwrap();
        assert!(agents[0].is_available);
        assert!(agents[0].last_assignment_at.is_none());
    }

    #[tokio::test]
    async fn dropped_transaction_is_discarded() {
        let (backend, _dir) = setup().await;
        backend.add_agent(&NewAgent::active("solo")).await.unwrap();

        {
            let mut tx = backend.begin().await.unwrap();
            assert!(tx.reserve_one_agent().await.unwrap().is_some());
        }

        let agents = backend.list_agents().await.unwrap();
        assert!(agents[0].is_available);
    }

    #[tokio::test]
    async fn add_work_item_is_insert_once() {
        let (backend, _dir) = setup().await;
        let id = WorkItemId::from("190014");
        assert!(backend.add_work_item(&id).await.unwrap());
        assert!(!backend.add_work_item(&id).await.unwrap());

        let item = backend.get_work_item(&id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Unassigned);
        assert_eq!(item.assigned_agent_id, None);
    }

    #[tokio::test]
    async fn mark_pending_requires_existing_item() {
        let (backend, _dir) = setup().await;
        let agent = backend.add_agent(&NewAgent::active("a")).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        let err = tx
            .mark_work_item_pending(&WorkItemId::from("ghost"), agent.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
        tx.rollback().await.unwrap();
    }
}
