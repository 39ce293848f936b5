//! CLI for the redrive delivery client.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use redrive_core::config;
use redrive_core::RequestOrchestrator;

use commands::{
    run_clear, run_daemon, run_message, run_process, run_queue, run_send, run_stats, SendArgs,
};

/// Top-level CLI for redrive.
#[derive(Debug, Parser)]
#[command(name = "redrive")]
#[command(about = "redrive: HTTP delivery with retries and an offline redelivery queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send one request; queue it for redelivery if the network is down.
    Send {
        /// Absolute HTTP/HTTPS URL.
        url: String,
        /// HTTP method.
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request body.
        #[arg(short = 'd', long)]
        data: Option<String>,
        /// Extra header as `Name: value`; repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Key to cache a successful response under.
        #[arg(long)]
        cache_key: Option<String>,
    },

    /// POST a JSON message to a path under the configured base URL.
    Message {
        /// Path relative to `base_url`.
        path: String,
        /// JSON payload.
        json: String,
    },

    /// List requests waiting for redelivery.
    Queue,

    /// Run one redelivery pass over the queue now.
    Process,

    /// Show cache statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop every queued request and cached response.
    Clear,

    /// Redeliver queued requests periodically until Ctrl-C.
    Daemon {
        /// Seconds between passes (overrides `reprocess_interval_secs`).
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let orchestrator = RequestOrchestrator::from_config(&cfg).await?;

        let result = cli.command.dispatch(&orchestrator).await;

        orchestrator.dispose().await;
        orchestrator.cache().dispose().await?;
        result
    }

    async fn dispatch(self, orchestrator: &RequestOrchestrator) -> Result<()> {
        match self {
            CliCommand::Send {
                url,
                method,
                data,
                headers,
                cache_key,
            } => {
                let args = SendArgs {
                    url,
                    method,
                    data,
                    headers,
                    cache_key,
                };
                run_send(orchestrator, args).await
            }
            CliCommand::Message { path, json } => run_message(orchestrator, &path, &json).await,
            CliCommand::Queue => run_queue(orchestrator.cache()).await,
            CliCommand::Process => run_process(orchestrator).await,
            CliCommand::Stats { json } => run_stats(orchestrator.cache(), json).await,
            CliCommand::Clear => run_clear(orchestrator.cache()).await,
            CliCommand::Daemon { interval } => run_daemon(orchestrator, interval).await,
        }
    }
}

#[cfg(test)]
mod tests;
