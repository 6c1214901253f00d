mod cli;
mod ui;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use consular_workflow::config::ConsularConfig;
use consular_workflow::state_machine::{WorkflowCatalog, WorkflowKind};
use consular_workflow::{demo, telemetry};
use tracing::debug;
use ui::Printer;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConsularConfig::load_from(path)?,
        None => ConsularConfig::load()?,
    };
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    telemetry::init(&config.log_level, config.json_logs || cli.json_logs)?;
    debug!(dispatch_mode = ?config.dispatch_mode, templates = config.templates.len(), "configuration loaded");

    let printer = Printer::new();
    let catalog = WorkflowCatalog::global();

    match cli.command {
        Command::Check { workflow, from, to } => {
            let kind: WorkflowKind = workflow.parse()?;
            let allowed = printer.check(catalog.get(kind), &from, &to)?;
            Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Graph { workflow } => {
            let kind: WorkflowKind = workflow.parse()?;
            printer.graph(catalog.get(kind))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Demo { mode } => {
            let mode = mode.map(Into::into).unwrap_or(config.dispatch_mode);
            let summary = demo::run(&config, mode).await?;
            printer.demo(&summary);
            Ok(ExitCode::SUCCESS)
        }
    }
}
