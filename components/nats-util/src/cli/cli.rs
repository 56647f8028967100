use crate::helpers::load_config::{ConnectionFlags, NatsConfig};
use crate::listener::drain::DrainOptions;
use crate::messaging::models::ConnectionParams;
use crate::runtime;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "nats-util",
    long_about = "nats-util listens to and publishes on NATS subjects, in core mode or against a persistent stream.",
    about = "NATS listen/send diagnostic tool",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        nats-util -S nats://localhost:4222 listen orders
        nats-util -S nats://localhost:4222 listen orders workers --cluster-id ORDERS --delivery all --json
        nats-util -c ./nats.toml send orders --file ./order.json --times 3"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    /// A configuration file to use, overrides the server and TLS flags
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// The nats servers to connect to
    #[arg(short = 'S', long, global = true, value_delimiter = ',')]
    pub servers: Vec<String>,

    /// The key file to use
    #[arg(short = 'K', long = "key_file", global = true)]
    pub key_file: Option<PathBuf>,

    /// The cert file to use
    #[arg(short = 'C', long = "cert_file", global = true)]
    pub cert_file: Option<PathBuf>,

    /// The CA files to use
    #[arg(short = 'A', long = "ca_files", global = true, value_delimiter = ',')]
    pub ca_files: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Listen to a subject, optionally as part of a queue group
    Listen(ListenArgs),

    /// Send messages on a subject from a file or from stdin
    Send(SendArgs),

    /// Display version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// The subject to listen on
    pub subject: String,

    /// A queue group to join
    pub group: Option<String>,

    /// A number of messages to listen for, 0 or less listens forever
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub limit: i64,

    /// A client ID to use if connecting to a stream
    #[arg(long, default_value = "nats-util-listener")]
    pub client_id: String,

    /// A cluster ID to use, indicates we should connect to the stream of that name
    #[arg(long, default_value = "")]
    pub cluster_id: String,

    /// Where to pick up the stream of incoming messages: new, last or all
    #[arg(long, default_value = "new")]
    pub delivery: String,

    /// If the messages should be parsed as json, `--json=false` turns it off
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    pub json: bool,

    /// Stop listening after this many seconds without a message, 0 waits forever
    #[arg(long, value_name = "SECONDS")]
    pub max_wait: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// The subject to send on
    pub subject: String,

    /// A client ID to use if connecting to a stream
    #[arg(long, default_value = "nats-util-sender")]
    pub client_id: String,

    /// A cluster ID to use, indicates we should publish to the stream of that name
    #[arg(long, default_value = "")]
    pub cluster_id: String,

    /// A file to read and send, reads from stdin when omitted
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// The number of times to send data from a file
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub times: u32,
}

impl GlobalArgs {
    fn connection_flags(&self) -> ConnectionFlags {
        ConnectionFlags {
            servers: self.servers.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
            ca_files: self.ca_files.clone(),
        }
    }

    fn resolve_config(&self) -> Result<NatsConfig> {
        let config = NatsConfig::resolve(self.config.as_deref(), &self.connection_flags())
            .context("Failed to load the NATS configuration")?;
        tracing::debug!(nats_conf = ?config, "Configuration resolved");
        Ok(config)
    }
}

impl ListenArgs {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams::new(
            self.subject.clone(),
            self.group.clone(),
            Some(self.cluster_id.clone()),
            self.client_id.clone(),
        )
    }

    pub fn drain_options(&self) -> DrainOptions {
        let max_wait = self
            .max_wait
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        DrainOptions::new(self.json, self.limit, max_wait)
    }
}

impl SendArgs {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams::new(
            self.subject.clone(),
            None,
            Some(self.cluster_id.clone()),
            self.client_id.clone(),
        )
    }
}

/// Entry function for CLI
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Listen(args) => {
            let config = cli.global.resolve_config()?;
            runtime::runtime::run_listen(&config, &args).await?
        }
        Commands::Send(args) => {
            let config = cli.global.resolve_config()?;
            runtime::runtime::run_send(&config, &args).await?
        }
        Commands::Version => show_version(),
    }

    Ok(())
}

/// Show version information
fn show_version() {
    println!("nats-util {}", env!("CARGO_PKG_VERSION"));
}
