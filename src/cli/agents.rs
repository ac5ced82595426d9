//! Agent management CLI commands.

use anyhow::Context;
use clap::Subcommand;

use crate::allocator::NewAgent;
use crate::config::Config;

#[derive(Subcommand, Debug, Clone)]
pub enum AgentCommand {
    /// List all agents, oldest first
    List,
    /// Register an agent
    Add {
        /// Display name
        name: String,
        /// Register as inactive (never selected)
        #[arg(long)]
        inactive: bool,
    },
}

pub async fn run_agent_command(cmd: AgentCommand) -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    let db = super::open_store(&config).await?;

    match cmd {
        AgentCommand::List => {
            let agents = db.list_agents().await.context("Failed to list agents")?;
            if agents.is_empty() {
                println!("  (No agents registered)");
            }
            for agent in agents {
                let last = agent
                    .last_assignment_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}  {:<20} {:<8} available={:<5} created={} last={}",
                    agent.id,
                    agent.display_name,
                    agent.status,
                    agent.is_available,
                    agent.created_at.to_rfc3339(),
                    last
                );
            }
        }
        AgentCommand::Add { name, inactive } => {
            let mut new = NewAgent::active(&name);
            if inactive {
                new = new.inactive();
            }
            let agent = db.add_agent(&new).await.context("Failed to add agent")?;
            println!("Agent '{}' added ({}, {}).", agent.display_name, agent.id, agent.status);
        }
    }

    Ok(())
}
