//! maintme-poller - background service delivering filtered GitHub activity.
//!
//! Configuration comes from the file named by `MAINTME_CONFIG` (TOML, JSON or
//! YAML) or, when unset, from `MAINTME_*` environment variables. A `.env`
//! file in the working directory is loaded first.

use std::sync::Arc;

use maintme_core::{
    MaintmeConfig, Notifier, NotifierConfig, Poller, PollerHandle, WebhookNotifier,
    WriterNotifier,
};
use maintme_github::GitHubEventSource;
use maintme_store::SqliteStore;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,maintme_core=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for the stdout notifier
    if std::env::var("MAINTME_LOG_JSON").is_ok() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_config() -> Result<MaintmeConfig, Box<dyn std::error::Error>> {
    match std::env::var("MAINTME_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            Ok(MaintmeConfig::from_file(path)?)
        }
        Err(_) => Ok(MaintmeConfig::from_env()?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = load_config()?;

    let store = Arc::new(SqliteStore::open(&config.store.path)?);
    let source = Arc::new(GitHubEventSource::new(config.github.clone())?);
    let notifier: Arc<dyn Notifier> = match &config.notifier {
        NotifierConfig::Stdout => Arc::new(WriterNotifier::stdout()),
        NotifierConfig::Webhook(webhook) => {
            info!(url = %webhook.url, "Delivering to webhook");
            Arc::new(WebhookNotifier::new(webhook.clone())?)
        }
    };

    let poller = Poller::new(store, source, notifier, config.poller.clone(), &config.dedup);
    let PollerHandle { cancel, mut join } = poller.spawn();

    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut join => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => {
            info!("Shutdown signal received, stopping poller");
            cancel.cancel();
            join.await
        }
    };

    if let Err(e) = result? {
        error!(error = %e, "Poller failed");
        return Err(e.into());
    }

    info!("Poller exiting");
    Ok(())
}
