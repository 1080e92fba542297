//! Process entry point: builds the composition root, connects upstream
//! feeds, and serves the downstream WebSocket and admin HTTP surfaces until
//! a shutdown signal arrives.
//!
//! Logging setup is grounded in the `moexco-okane` app crate's `main.rs`:
//! a daily-rolling file appender paired with a stdout writer, both behind
//! `tracing_subscriber`'s env-filter.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use tickgate::config::Settings;
use tickgate::core::Core;
use tickgate::scheduler::MasterDataScheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file_appender = tracing_appender::rolling::daily("logs", "tickgate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stdout.and(non_blocking))
        .init();

    let settings = Settings::from_env()?;
    let http_port = settings.http_port;

    let core = Arc::new(Core::build(settings).await?);
    core.connect_upstreams().await;
    if let Err(e) = core.bootstrap_initial_instruments().await {
        tracing::warn!(error = %e, "failed to subscribe initial instrument list");
    }

    let scheduler = Arc::new(MasterDataScheduler::new(
        core.store.clone(),
        core.cache.clone(),
        core.trading_date.clone(),
    ));
    tokio::spawn(scheduler.run());

    let app = tickgate::control::router(core.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;
    tracing::info!(port = http_port, "tickgate listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    server.await?;

    tracing::info!("tickgate shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
