use std::process::ExitCode;

use clap::Parser;

use agent_allocator::cli::{Cli, dispatch};
use agent_allocator::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    dispatch(cli.command).await
}
