//! `toolcall`: run the orchestration script against the remote service.
//!
//! Run with: cargo run -p toolcall-cli -- stream
//!
//! The bearer token is read from `VAPI_TOKEN` (or `--token`).

mod cli;
mod console;

use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::Parser;
use toolcall_core::ClientInfo;
use toolcall_session::{OrchestrationScript, ScriptReport, SessionManager, StepOutcome};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{cli::Cli, console::ConsoleReporter};

fn init_tracing(level: Option<&str>) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.unwrap_or("warn").into()),
        )
        .init();
}

fn print_summary(report: &ScriptReport) {
    let invoked = report
        .steps
        .iter()
        .filter(|s| !matches!(s.outcome, StepOutcome::Skipped { .. }))
        .count();
    println!(
        "\nRun {} finished: {} step(s) invoked, {} skipped, {} domain error(s)",
        report.run_id,
        invoked,
        report.steps.len() - invoked,
        report.domain_errors()
    );
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Checked before any connection attempt.
    let token = cli.token()?;
    let transport = cli
        .build_transport(token)
        .context("Failed to configure transport")?;

    let reporter = Arc::new(ConsoleReporter::new(cli.json));
    let script = OrchestrationScript::new(cli.script_options(), reporter);
    let mut session = SessionManager::with_client(
        transport,
        ClientInfo::new("toolcall", env!("CARGO_PKG_VERSION")),
    );

    let report = session.scoped(&script).await.context("Script run failed")?;

    if cli.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
