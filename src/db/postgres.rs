//! PostgreSQL backend.
//!
//! Agent selection uses `FOR UPDATE SKIP LOCKED`, so concurrent allocators
//! each claim a different agent instead of queueing behind one row.
//! Transactions are driven with plain `BEGIN`/`COMMIT` on a pooled
//! connection so the transaction can own its connection across awaits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use tokio_postgres_rustls::MakeRustlsConnect;
use uuid::Uuid;

use crate::allocator::{
    Agent, AgentStatus, NewAgent, SessionRecord, SessionStatus, WorkItem, WorkItemId,
    WorkItemStatus, store_now,
};
use crate::config::{DatabaseConfig, SslMode};
use crate::db::{AdminStore, AllocationStore, AllocationTx, Database};
use crate::error::DatabaseError;

const AGENT_COLUMNS: &str =
    "id, display_name, status, is_available, created_at, last_assignment_at";

const LOCK_WORK_ITEM_SQL: &str =
    "SELECT id, status, assigned_agent_id FROM work_items WHERE id = $1 FOR UPDATE";

const RESERVE_AGENT_SQL: &str = r#"
WITH candidate AS (
    SELECT id
    FROM agents
    WHERE status = 'active'
      AND is_available = TRUE
    ORDER BY created_at ASC, id ASC
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE agents a
SET is_available = FALSE,
    last_assignment_at = NOW()
FROM candidate c
WHERE a.id = c.id
RETURNING a.id, a.display_name, a.status, a.is_available, a.created_at, a.last_assignment_at
"#;

const INSERT_SESSION_SQL: &str = "INSERT INTO session_records \
     (id, work_item_id, agent_id, status, created_at) VALUES ($1, $2, $3, $4, $5)";

const MARK_PENDING_SQL: &str = "UPDATE work_items \
     SET assigned_agent_id = $1, status = 'pending', updated_at = NOW() \
     WHERE id = $2";

/// Build a rustls connector over the platform's root certificates.
fn make_rustls_connector() -> MakeRustlsConnect {
    let mut root_store = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!("error loading system root certs: {e}");
    }
    for cert in native.certs {
        if let Err(e) = root_store.add(cert) {
            tracing::warn!("skipping invalid system root cert: {e}");
        }
    }
    if root_store.is_empty() {
        tracing::error!("no system root certificates found -- TLS connections will fail");
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    MakeRustlsConnect::new(config)
}

/// Create the connection pool for the configured TLS mode.
///
/// `Prefer` and `Require` both hand tokio-postgres a TLS connector; there is
/// no plaintext fallback after a failed handshake.
pub fn create_pool(
    config: &deadpool_postgres::Config,
    ssl_mode: SslMode,
) -> Result<Pool, deadpool_postgres::CreatePoolError> {
    match ssl_mode {
        SslMode::Disable => config.create_pool(Some(Runtime::Tokio1), NoTls),
        SslMode::Prefer | SslMode::Require => {
            config.create_pool(Some(Runtime::Tokio1), make_rustls_connector())
        }
    }
}

/// PostgreSQL database backend.
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Create the pool and check that one connection can be opened.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = create_pool(&cfg, config.ssl_mode)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

fn parse_column<T>(row: &Row, column: &str) -> Result<T, DatabaseError>
where
    T: std::str::FromStr<Err = String>,
{
    row.try_get::<_, String>(column)?
        .parse()
        .map_err(DatabaseError::Serialization)
}

fn row_to_agent(row: &Row) -> Result<Agent, DatabaseError> {
    Ok(Agent {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        status: parse_column::<AgentStatus>(row, "status")?,
        is_available: row.try_get("is_available")?,
        created_at: row.try_get("created_at")?,
        last_assignment_at: row.try_get("last_assignment_at")?,
    })
}

fn row_to_work_item(row: &Row) -> Result<WorkItem, DatabaseError> {
    Ok(WorkItem {
        id: WorkItemId::from(row.try_get::<_, String>("id")?),
        status: parse_column::<WorkItemStatus>(row, "status")?,
        assigned_agent_id: row.try_get("assigned_agent_id")?,
    })
}

/// A transaction that owns its pooled connection.
///
/// `client` is `None` once the transaction has been committed or rolled
/// back. If it is still `Some` on drop, the connection is detached from the
/// pool and closed, which makes the server abort the transaction.
struct PgTx {
    client: Option<Object>,
}

impl PgTx {
    fn client(&self) -> Result<&Object, DatabaseError> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::Transaction("transaction already finished".into()))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), DatabaseError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| DatabaseError::Transaction("transaction already finished".into()))?;
        match client.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Connection state is unknown; keep it out of the pool.
                drop(Object::take(client));
                Err(e.into())
            }
        }
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            tracing::debug!("discarding connection with unfinished transaction");
            drop(Object::take(client));
        }
    }
}

#[async_trait]
impl AllocationTx for PgTx {
    async fn lock_work_item(&mut self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError> {
        let row = self
            .client()?
            .query_opt(LOCK_WORK_ITEM_SQL, &[&id.as_str()])
            .await?;
        row.as_ref().map(row_to_work_item).transpose()
    }

    async fn reserve_one_agent(&mut self) -> Result<Option<Agent>, DatabaseError> {
        let row = self.client()?.query_opt(RESERVE_AGENT_SQL, &[]).await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn insert_session(&mut self, session: &SessionRecord) -> Result<(), DatabaseError> {
        let status = session.status.as_str();
        self.client()?
            .execute(
                INSERT_SESSION_SQL,
                &[
                    &session.id,
                    &session.work_item_id.as_str(),
                    &session.agent_id,
                    &status,
                    &session.created_at,
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
            .client()?
            .execute(MARK_PENDING_SQL, &[&agent_id, &id.as_str()])
            .await?;
        if updated != 1 {
            return Err(DatabaseError::Constraint(format!(
                "expected to update one work item {id}, updated {updated}"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("ROLLBACK").await
    }
}

#[async_trait]
impl AllocationStore for PgBackend {
    async fn begin(&self) -> Result<Box<dyn AllocationTx>, DatabaseError> {
        let client = self.conn().await?;
        client
            .batch_execute("BEGIN ISOLATION LEVEL READ COMMITTED")
            .await?;
        Ok(Box::new(PgTx {
            client: Some(client),
        }))
    }
}

#[async_trait]
impl AdminStore for PgBackend {
    async fn add_agent(&self, agent: &NewAgent) -> Result<Agent, DatabaseError> {
        let conn = self.conn().await?;
        let id = Uuid::new_v4();
        let created_at: DateTime<Utc> = agent.created_at.unwrap_or_else(store_now);
        let status = agent.status.as_str();

        let sql = format!(
            "INSERT INTO agents (id, display_name, status, is_available, created_at) \
             VALUES ($1, $2, $3, TRUE, $4) RETURNING {AGENT_COLUMNS}"
        );
        let row = conn
            .query_one(sql.as_str(), &[&id, &agent.display_name, &status, &created_at])
            .await?;
        row_to_agent(&row)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, DatabaseError> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC, id ASC");
        let rows = conn.query(sql.as_str(), &[]).await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn add_work_item(&self, id: &WorkItemId) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO work_items (id, status) VALUES ($1, 'unassigned') \
                 ON CONFLICT (id) DO NOTHING",
                &[&id.as_str()],
            )
            .await?;
        Ok(inserted == 1)
    }

    async fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, status, assigned_agent_id FROM work_items WHERE id = $1",
                &[&id.as_str()],
            )
            .await?;
        row.as_ref().map(row_to_work_item).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT s.id, s.work_item_id, s.agent_id, a.display_name, s.status, s.created_at
                FROM session_records s
                JOIN agents a ON a.id = s.agent_id
                ORDER BY s.created_at ASC, s.id ASC
                "#,
                &[],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SessionRecord {
                    id: row.try_get("id")?,
                    work_item_id: WorkItemId::from(row.try_get::<_, String>("work_item_id")?),
                    agent_id: row.try_get("agent_id")?,
                    agent_display_name: row.try_get("display_name")?,
                    status: parse_column::<SessionStatus>(row, "status")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Database for PgBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        use refinery::embed_migrations;
        embed_migrations!("migrations");

        let mut client = self.conn().await?;
        migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}
