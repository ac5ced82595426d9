//! Transactional agent-assignment allocator.
//!
//! Pairs work items with free agents. Each pairing reserves the agent,
//! writes a session record and moves the work item to `pending` in one
//! store transaction, so the three changes become visible together or not
//! at all. Agent selection is FIFO by creation time and skips rows another
//! transaction has already claimed, so many allocators can share one store.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use agent_allocator::allocator::{AssignmentCoordinator, BatchRunner, RetryPolicy};
//! use agent_allocator::config::Config;
//!
//! let config = Config::from_env()?;
//! let db = agent_allocator::db::connect_from_config(&config.database).await?;
//! let coordinator = AssignmentCoordinator::new(Arc::clone(&db), RetryPolicy::from(&config.allocator));
//! let report = BatchRunner::new(&coordinator).run(&config.allocator.work_item_ids).await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
