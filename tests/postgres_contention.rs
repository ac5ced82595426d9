//! Skip-locked contention against a real PostgreSQL server.
//!
//! Needs a container runtime: `cargo test --features integration`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::ContainerAsync;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

use agent_allocator::allocator::{
    AssignmentCoordinator, BatchRunner, NewAgent, RetryPolicy, WorkItemId, WorkItemStatus,
};
use agent_allocator::config::{DatabaseBackend, DatabaseConfig, SslMode};
use agent_allocator::db::postgres::PgBackend;
use agent_allocator::db::{AdminStore, AllocationStore, Database};
use agent_allocator::error::ErrorKind;

async fn start() -> (ContainerAsync<Postgres>, Arc<PgBackend>) {
    let container = Postgres::default().start().await.expect("start postgres");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port");

    let config = DatabaseConfig {
        backend: DatabaseBackend::Postgres,
        url: SecretString::from(format!("postgres://postgres:postgres@{host}:{port}/postgres")),
        pool_size: 16,
        ssl_mode: SslMode::Disable,
        libsql_path: None,
    };
    let backend = PgBackend::new(&config).await.expect("connect");
    backend.run_migrations().await.expect("migrate");
    (container, Arc::new(backend))
}

#[tokio::test]
async fn selector_skips_agent_claimed_by_open_transaction() {
    let (_pg, db) = start().await;
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
    let a = db
        .add_agent(&NewAgent::active("a").created_at(t0))
        .await
        .unwrap();
    let b = db
        .add_agent(&NewAgent::active("b").created_at(t0 + chrono::Duration::minutes(1)))
        .await
        .unwrap();

    let mut first = db.begin().await.unwrap();
    let held = first.reserve_one_agent().await.unwrap().unwrap();
    assert_eq!(held.id, a.id);

    let mut second = db.begin().await.unwrap();
    let skipped = tokio::time::timeout(Duration::from_secs(5), second.reserve_one_agent())
        .await
        .expect("selector must not block on a claimed row")
        .unwrap()
        .unwrap();
    assert_eq!(skipped.id, b.id);

    let mut third = db.begin().await.unwrap();
    let none = tokio::time::timeout(Duration::from_secs(5), third.reserve_one_agent())
        .await
        .expect("selector must not block on claimed rows")
        .unwrap();
    assert!(none.is_none());

    third.rollback().await.unwrap();
    second.rollback().await.unwrap();
    first.rollback().await.unwrap();

    assert!(db.list_agents().await.unwrap().iter().all(|a| a.is_available));
}

#[tokio::test]
async fn batch_commits_atomically_and_isolates_failures() {
    let (_pg, db) = start().await;
    let store: Arc<dyn Database> = db.clone();
    store.add_agent(&NewAgent::active("alice")).await.unwrap();
    store.add_agent(&NewAgent::active("bob")).await.unwrap();
    store.add_work_item(&"x".into()).await.unwrap();
    store.add_work_item(&"z".into()).await.unwrap();

    let coordinator =
        AssignmentCoordinator::new(Arc::clone(&store), RetryPolicy::new(Duration::ZERO, 1));
    let ids: Vec<WorkItemId> = vec!["x".into(), "y".into(), "z".into()];
    let report = BatchRunner::new(&coordinator).run(&ids).await;

    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[0].is_assigned());
    assert!(!report.outcomes[1].is_assigned());
    assert!(report.outcomes[2].is_assigned());

    let sessions = store.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    for session in &sessions {
        let item = store
            .get_work_item(&session.work_item_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.status, WorkItemStatus::Pending);
        assert_eq!(item.assigned_agent_id, Some(session.agent_id));
    }
}

#[tokio::test]
async fn concurrent_coordinators_never_share_an_agent() {
    let (_pg, db) = start().await;
    let store: Arc<dyn Database> = db.clone();
    for n in 0..3 {
        store
            .add_agent(&NewAgent::active(format!("agent-{n}")))
            .await
            .unwrap();
    }
    let ids: Vec<WorkItemId> = (0..8).map(|n| WorkItemId::from(format!("item-{n}"))).collect();
    for id in &ids {
        store.add_work_item(id).await.unwrap();
    }

    let mut handles = Vec::new();
    for id in ids {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            AssignmentCoordinator::new(store, RetryPolicy::new(Duration::ZERO, 1))
                .assign(&id)
                .await
        }));
    }

    let mut assigned = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => assigned += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::NoAgentAvailable),
        }
    }
    assert_eq!(assigned, 3);

    let sessions = store.list_sessions().await.unwrap();
    let agents: HashSet<_> = sessions.iter().map(|s| s.agent_id).collect();
    assert_eq!(sessions.len(), 3);
    assert_eq!(agents.len(), 3);
}
