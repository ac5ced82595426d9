//! Health and availability CLI command.

use crate::allocator::AgentStatus;
use crate::config::{Config, DatabaseBackend};

/// Print backend, connectivity and agent availability.
pub async fn run_status_command() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("Agent Allocator Status");
    println!("======================\n");

    println!(
        "  Version:     {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    print!("  Database:    ");
    match config.database.backend {
        DatabaseBackend::LibSql => {
            let path = config
                .database
                .libsql_path
                .clone()
                .unwrap_or_else(crate::config::default_libsql_path);
            if path.exists() {
                println!("libSQL ({})", path.display());
            } else {
                println!("libSQL (file missing: {})", path.display());
                return Ok(());
            }
        }
        DatabaseBackend::Postgres => println!("PostgreSQL (pool size {})", config.database.pool_size),
    }

    let policy = &config.allocator;
    let max = if policy.max_attempts == 0 {
        "unbounded".to_string()
    } else {
        policy.max_attempts.to_string()
    };
    println!(
        "  Retry:       every {}s, max attempts {}",
        policy.wait_interval.as_secs(),
        max
    );

    print!("  Connection:  ");
    let db = match super::open_store(&config).await {
        Ok(db) => db,
        Err(e) => {
            println!("error ({e:#})");
            return Ok(());
        }
    };
    let agents = match db.list_agents().await {
        Ok(agents) => {
            println!("ok");
            agents
        }
        Err(e) => {
            println!("error ({e}); run `agent-allocator migrate`?");
            return Ok(());
        }
    };

    let active = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Active)
        .count();
    let available = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Active && a.is_available)
        .count();
    println!(
        "  Agents:      {} total, {} active, {} available",
        agents.len(),
        active,
        available
    );

    match db.list_sessions().await {
        Ok(sessions) => println!("  Sessions:    {}", sessions.len()),
        Err(e) => println!("  Sessions:    error ({e})"),
    }

    Ok(())
}
