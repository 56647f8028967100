//! `nats-util` listens to and publishes on NATS subjects, either on plain core
//! NATS or against a persistent stream, using one subject/group vocabulary.

mod cli;
mod helpers;
mod instrumentation;
mod listener;
mod messaging;
mod publisher;
mod runtime;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::cli::Cli::parse();

    instrumentation::tracing::init_tracing(cli.global.debug);
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses user commands and then calls into the appropriate logic
    match cli::cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Failed to execute command");
            ExitCode::FAILURE
        }
    }
}
