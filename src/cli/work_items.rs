//! Work item management CLI commands.

use anyhow::Context;
use clap::Subcommand;

use crate::allocator::WorkItemId;
use crate::config::Config;

#[derive(Subcommand, Debug, Clone)]
pub enum WorkItemCommand {
    /// Register work items as unassigned
    Add {
        /// Work item ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show a work item and its sessions
    Show {
        /// Work item id
        id: String,
    },
}

pub async fn run_work_item_command(cmd: WorkItemCommand) -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    let db = super::open_store(&config).await?;

    match cmd {
        WorkItemCommand::Add { ids } => {
            for id in ids.iter().map(|s| WorkItemId::from(s.trim())) {
                let created = db
                    .add_work_item(&id)
                    .await
                    .with_context(|| format!("Failed to add work item {id}"))?;
                if created {
                    println!("Work item '{id}' added.");
                } else {
                    println!("Work item '{id}' already exists, left unchanged.");
                }
            }
        }
        WorkItemCommand::Show { id } => {
            let id = WorkItemId::from(id.trim());
            let Some(item) = db.get_work_item(&id).await? else {
                anyhow::bail!("Work item '{id}' not found");
            };
            println!("Work item '{}':", item.id);
            println!("  Status:   {}", item.status);
            match item.assigned_agent_id {
                Some(agent) => println!("  Agent:    {agent}"),
                None => println!("  Agent:    -"),
            }

            let sessions: Vec<_> = db
                .list_sessions()
                .await?
                .into_iter()
                .filter(|s| s.work_item_id == id)
                .collect();
            println!("  Sessions: {}", sessions.len());
            for s in sessions {
                println!(
                    "    {} agent={} ({}) status={} created={}",
                    s.id,
                    s.agent_display_name,
                    s.agent_id,
                    s.status,
                    s.created_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
