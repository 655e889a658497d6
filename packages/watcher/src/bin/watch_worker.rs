use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use onix_watcher::config::WatcherConfig;
use onix_watcher::worker::run_watch_worker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match WatcherConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    if let Err(e) = run_watch_worker(config, cancel).await {
        tracing::error!(error = %e, "watch worker exited with error");
        std::process::exit(1);
    }
}

/// Cancel the worker on SIGINT (ctrl+c) or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, stopping worker"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, stopping worker"),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received SIGINT, stopping worker");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl+c, stopping worker");
    }

    cancel.cancel();
}
