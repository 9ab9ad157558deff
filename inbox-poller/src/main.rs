mod classifier;
mod config;
mod error;
mod mailbox;
mod processor;
mod reconcile;
mod scheduler;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::classifier::OpenAiClassifier;
use crate::config::PollerConfig;
use crate::mailbox::ImapConnector;
use crate::processor::MailboxProcessor;
use crate::reconcile::ReconciliationEngine;
use crate::scheduler::PollScheduler;
use crate::store::HttpApplicationStore;

#[derive(Parser, Debug)]
#[command(name = "inbox-poller", about = "Track job applications from unread email")]
struct Cli {
    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_poller=info,shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    dotenv::dotenv().ok();
    let config = PollerConfig::from_env()?;
    tracing::info!(
        store = %config.store.base_url,
        imap = %config.imap.server,
        model = %config.classifier.model,
        "Starting inbox poller"
    );

    let store = Arc::new(
        HttpApplicationStore::new(&config.store).context("Failed to build store client")?,
    );
    let classifier = Arc::new(
        OpenAiClassifier::new(config.classifier.clone())
            .context("Failed to build classifier client")?,
    );
    let connector = Arc::new(ImapConnector::new(&config.imap));

    let processor = MailboxProcessor::new(
        connector,
        classifier,
        ReconciliationEngine::new(store.clone()),
    );
    let scheduler = PollScheduler::new(store, Arc::new(processor), config.scheduler.clone());
    let shutdown = CancellationToken::new();

    if cli.once {
        let report = scheduler
            .run_cycle(&shutdown)
            .await
            .context("Failed to fetch listening users")?;
        tracing::info!(
            users = report.users,
            users_failed = report.users_failed,
            "Single cycle finished"
        );
        return Ok(());
    }

    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    // Wait for shutdown signal
    tracing::info!("Inbox poller running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, finishing current mailbox...");

    // Let the in-flight mailbox log out before exiting
    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task error: {:?}", e);
    }

    tracing::info!("Inbox poller stopped");
    Ok(())
}
