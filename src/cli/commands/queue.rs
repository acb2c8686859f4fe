//! `seaworthy queue`: inspect, replay and purge the offline action queue.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::sync::Arc;

use crate::adapters::http::HttpTransport;
use crate::adapters::open_action_store;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, NetworkSignals, QueuedAction};
use crate::services::{
    AdaptiveConfigResolver, ConnectionMonitor, DrainReport, OfflineActionQueue, RequestScheduler,
};

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List pending actions in replay order
    List,
    /// Replay pending actions against the configured endpoint
    Drain {
        /// Override `transport.base_url` for this run
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Remove every pending action without replaying it
    Purge,
}

#[derive(Debug, Serialize)]
pub struct ActionListOutput {
    pub actions: Vec<QueuedAction>,
    pub total: usize,
}

impl CommandOutput for ActionListOutput {
    fn to_human(&self) -> String {
        if self.actions.is_empty() {
            return "Offline queue is empty.".to_string();
        }
        let table = TableFormatter::new().format_actions(&self.actions);
        format!("{table}\n\n{} pending action(s)", self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct DrainOutput {
    pub base_url: String,
    #[serde(flatten)]
    pub report: DrainReport,
}

impl CommandOutput for DrainOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        if r.already_running {
            return "A drain is already in progress.".to_string();
        }
        let mut lines = vec![
            format!("Replayed against {}", self.base_url),
            format!("Delivered: {}", r.delivered),
            format!("Failed permanently: {}", r.failed_permanently),
            format!("Remaining: {}", r.remaining),
        ];
        if r.stopped_early {
            lines.push("Stopped early on a retryable failure; run again later.".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct PurgeOutput {
    pub removed: usize,
}

impl CommandOutput for PurgeOutput {
    fn to_human(&self) -> String {
        format!("Removed {} pending action(s)", self.removed)
    }
}

pub async fn execute(args: QueueArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = open_action_store(config).await?;
    let queue = Arc::new(
        OfflineActionQueue::open(store, &config.offline_queue)
            .await
            .context("Failed to open offline queue")?,
    );

    match args.command {
        QueueCommands::List => {
            let actions = queue.list().await.context("Failed to list offline queue")?;
            let total = actions.len();
            output(&ActionListOutput { actions, total }, json_mode);
        }
        QueueCommands::Drain { base_url } => {
            let mut transport_config = config.transport.clone();
            if let Some(url) = base_url {
                transport_config.base_url = url;
            }
            let transport = HttpTransport::new(&transport_config)?;
            let base_url = transport.base_url().to_string();

            // The CLI has no host signals; assume the link is up.
            let scheduler = RequestScheduler::builder(
                ConnectionMonitor::new(NetworkSignals::online()),
                Arc::new(transport),
            )
            .resolver(AdaptiveConfigResolver::with_table(config.policy.clone()))
            .offline_queue(queue.clone())
            .build();

            let report = queue.drain(&scheduler).await.context("Failed to drain offline queue")?;
            output(&DrainOutput { base_url, report }, json_mode);
        }
        QueueCommands::Purge => {
            let removed = queue.purge().await.context("Failed to purge offline queue")?;
            output(&PurgeOutput { removed }, json_mode);
        }
    }

    Ok(())
}
