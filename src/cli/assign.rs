//! Batch assignment command.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::allocator::{AssignmentCoordinator, BatchRunner, RetryPolicy, WorkItemId};
use crate::config::{AllocatorConfig, Config, parse_work_item_ids};
use crate::observability::{Observer, create_observer};

#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    /// Work item ids (space- or comma-separated). Defaults to WORK_ITEM_IDS.
    pub ids: Vec<String>,

    /// Seconds to wait between attempts when no agent is free
    #[arg(long)]
    pub wait_secs: Option<u64>,

    /// Selection attempts per work item before giving up (0 = forever)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl AssignArgs {
    fn work_item_ids(&self, config: &AllocatorConfig) -> Vec<WorkItemId> {
        if self.ids.is_empty() {
            return config.work_item_ids.clone();
        }
        self.ids
            .iter()
            .flat_map(|arg| parse_work_item_ids(arg))
            .collect()
    }

    fn policy(&self, config: &AllocatorConfig) -> RetryPolicy {
        let mut policy = RetryPolicy::from(config);
        if let Some(secs) = self.wait_secs {
            policy.interval = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_attempts {
            policy.max_attempts = max;
        }
        policy
    }
}

/// Run one batch. Exits non-zero when any work item failed.
pub async fn run_assign_command(args: AssignArgs) -> anyhow::Result<ExitCode> {
    let config = Config::from_env().context("Failed to load config")?;

    let ids = args.work_item_ids(&config.allocator);
    if ids.is_empty() {
        anyhow::bail!("No work items given. Pass ids as arguments or set WORK_ITEM_IDS.");
    }

    let policy = args.policy(&config.allocator);
    if policy.is_unbounded() {
        tracing::warn!("AGENT_WAIT_MAX_ATTEMPTS is 0; a work item will wait forever for an agent");
    }

    let db = super::open_store(&config).await?;
    let observer: Arc<dyn Observer> = Arc::from(create_observer(&config.observability));
    let coordinator = AssignmentCoordinator::new(db, policy).with_observer(Arc::clone(&observer));

    let report = BatchRunner::new(&coordinator).run(&ids).await;
    observer.flush();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(if report.all_assigned() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
