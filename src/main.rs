use std::fs;
use std::path::Path;
use std::sync::Arc;

use confwatch::http;
use confwatch::ConfigService;
use confwatch::Connector;
use confwatch::GrpcConnector;
use confwatch::MemCluster;
use confwatch::Result;
use confwatch::Settings;
use confwatch::StoreBackend;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const LOG_FILE: &str = "confwatch.log";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;

    // Initializing Logs
    let _guard = init_observability(settings.server.log_dir.as_deref())?;

    let connector: Arc<dyn Connector> = match settings.store.backend {
        StoreBackend::Grpc => Arc::new(GrpcConnector::new(&settings.store)),
        StoreBackend::Memory => {
            warn!("Using the in-process simulated store; data is not persisted");
            Arc::new(MemCluster::new(settings.store.descriptors()?))
        }
    };

    let listen_address = settings.server.listen_address;
    let service = ConfigService::start(settings, connector).await?;

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    info!("Application started. Waiting for CTRL+C signal...");
    let served = http::serve(service.clone(), listen_address, async move {
        let _ = graceful_rx.changed().await;
    })
    .await;

    service.shutdown().await;
    if let Err(e) = &served {
        error!("HTTP server stopped with error: {:?}", e);
    }

    info!("Exiting program.");
    served
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        confwatch::SystemError::SignalSendFailed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

/// Logs go to stdout, or to `{log_dir}/confwatch.log` when a directory is set
fn init_observability(log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
