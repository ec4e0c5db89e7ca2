//! Transfer Service entry point
//!
//! Boots the persistence layer, the outbox publisher, and the SAGA timeout
//! watchdog, then runs until interrupted. Inbound transfer intents and
//! account-service responses arrive through [`SagaOrchestrator`], which an
//! API or consumer layer drives in front of this process.

use std::sync::Arc;
use std::time::Duration;

use transfer_service::config::AppConfig;
use transfer_service::logging::init_logging;
use transfer_service::transfer::publisher::LogPublisher;
use transfer_service::{
    MessagePublisher, OutboxPublisher, PublisherConfig, SagaOrchestrator, SagaTimeoutWorker,
    TransferStore, WatchdogConfig,
};

#[cfg(not(feature = "mock-broker"))]
compile_error!(
    "no message broker wired: build with the mock-broker feature or supply a MessagePublisher"
);

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _guard = init_logging(&config);

    tracing::info!(env = %env, "Transfer service starting");

    let store = Arc::new(
        TransferStore::connect(&config.database.url, config.database.max_connections).await?,
    );
    store.init_schema().await?;
    tracing::info!("Database schema ready");

    let orchestrator = Arc::new(SagaOrchestrator::new(Arc::clone(&store)));

    let broker: Arc<dyn MessagePublisher> = Arc::new(LogPublisher);
    let publisher = OutboxPublisher::new(
        Arc::clone(&store),
        broker,
        PublisherConfig {
            poll_interval: Duration::from_millis(config.outbox.poll_interval_ms),
            batch_size: config.outbox.batch_size,
            max_retry: config.outbox.max_retry,
        },
    );
    let publisher_handle = tokio::spawn(publisher.run());

    let watchdog = SagaTimeoutWorker::new(
        Arc::clone(&orchestrator),
        WatchdogConfig {
            scan_interval: Duration::from_millis(config.watchdog.scan_interval_ms),
            leg_timeout: Duration::from_millis(config.watchdog.leg_timeout_ms),
            batch_size: config.watchdog.batch_size,
        },
    );
    let watchdog_handle = tokio::spawn(watchdog.run());

    tracing::info!("Transfer service ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    publisher_handle.abort();
    watchdog_handle.abort();

    Ok(())
}
