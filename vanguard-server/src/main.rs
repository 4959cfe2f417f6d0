use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use vanguard_queue::{DynQueueEngine, Maintenance, QueueBackend, QueueEngine, RedisBackend};
use vanguard_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();

    let backend = RedisBackend::connect(&config.redis_url, config.queue.key_prefix.clone())
        .await
        .with_context(|| format!("connecting to {}", config.redis_url))?;
    backend.ping().await.context("pinging redis")?;

    let backend: Arc<dyn QueueBackend> = Arc::new(backend);
    let engine: Arc<DynQueueEngine> =
        Arc::new(QueueEngine::new(backend).with_config(config.queue.clone()));
    let maintenance = Maintenance::spawn(engine.clone());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, vanguard_server::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    maintenance.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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
