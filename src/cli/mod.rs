//! Command-line interface.
//!
//! ```text
//! agent-allocator assign [IDS...] [--wait-secs N] [--max-attempts N] [--json]
//! agent-allocator migrate
//! agent-allocator status
//! agent-allocator agents list | add <NAME> [--inactive]
//! agent-allocator work-items add <IDS...> | show <ID>
//! ```

mod agents;
mod assign;
mod status;
mod work_items;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

pub use agents::{AgentCommand, run_agent_command};
pub use assign::{AssignArgs, run_assign_command};
pub use status::run_status_command;
pub use work_items::{WorkItemCommand, run_work_item_command};

use crate::config::Config;
use crate::db::{Database, connect_from_config};
use crate::observability::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "agent-allocator",
    version,
    about = "Assign free agents to pending work items, one transaction per attempt"
)]
pub struct Cli {
    /// Log line format
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Assign an agent to each work item, in order
    Assign(AssignArgs),
    /// Create the allocator tables
    Migrate,
    /// Show backend, connectivity and agent availability
    Status,
    /// Manage agents
    #[command(subcommand)]
    Agents(AgentCommand),
    /// Manage work items
    #[command(subcommand)]
    WorkItems(WorkItemCommand),
}

/// Run the parsed command.
pub async fn dispatch(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Assign(args) => run_assign_command(args).await,
        Command::Migrate => run_migrate_command().await.map(|()| ExitCode::SUCCESS),
        Command::Status => run_status_command().await.map(|()| ExitCode::SUCCESS),
        Command::Agents(cmd) => run_agent_command(cmd).await.map(|()| ExitCode::SUCCESS),
        Command::WorkItems(cmd) => run_work_item_command(cmd)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

pub async fn run_migrate_command() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    let db = open_store(&config).await?;
    db.run_migrations()
        .await
        .context("Failed to run migrations")?;
    println!("Schema is up to date ({}).", config.database.backend);
    Ok(())
}

pub(crate) async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Database>> {
    connect_from_config(&config.database)
        .await
        .with_context(|| format!("Failed to connect to {} database", config.database.backend))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_assign_with_overrides() {
        let cli = Cli::try_parse_from([
            "agent-allocator",
            "assign",
            "67358326",
            "P732687",
            "--wait-secs",
            "5",
            "--max-attempts",
            "3",
            "--json",
        ])
        .unwrap();

        let Command::Assign(args) = cli.command else {
            panic!("expected assign");
        };
        assert_eq!(args.ids, vec!["67358326", "P732687"]);
        assert_eq!(args.wait_secs, Some(5));
        assert_eq!(args.max_attempts, Some(3));
        assert!(args.json);
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli =
            Cli::try_parse_from(["agent-allocator", "agents", "add", "alice", "--inactive"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Agents(AgentCommand::Add { ref name, inactive: true }) if name == "alice"
        ));

        let cli = Cli::try_parse_from(["agent-allocator", "work-items", "show", "190011"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::WorkItems(WorkItemCommand::Show { ref id }) if id == "190011"
        ));
    }

    #[test]
    fn log_format_is_global() {
        let cli =
            Cli::try_parse_from(["agent-allocator", "status", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn work_items_add_requires_ids() {
        assert!(Cli::try_parse_from(["agent-allocator", "work-items", "add"]).is_err());
    }
}
