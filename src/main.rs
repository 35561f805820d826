use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use appointd::compactor;
use appointd::config::Config;
use appointd::engine::AppointmentService;
use appointd::notify::NotifyHub;
use appointd::store::WalStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    appointd::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let store = Arc::new(WalStore::open(&wal_path)?);
    let notify = Arc::new(NotifyHub::new());
    let service = AppointmentService::with_config(store.clone(), notify, config.scheduling);

    info!("appointd started");
    info!("  wal: {}", wal_path.display());
    info!("  appointments: {}", store.len());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  suggestions: {} within {}h",
        service.config().suggestion_count,
        service.config().suggestion_window.num_hours()
    );
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    tokio::spawn(compactor::run_compactor(store.clone(), config.compact_threshold));

    let mut events = service.subscribe();
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("event {json}"),
                    Err(e) => tracing::error!("unserializable event: {e}"),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("event log lagged, {n} events dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let kept = store.compact().await?;
    info!("final compaction kept {kept} appointments");
    info!("appointd stopped");
    Ok(())
}
