//! hazardq worker - Consumer entry point
//! Pops simulation jobs from Redis and reports default counts until Ctrl+C

mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

// Import workspace crates
use hazardq_core::application::worker::constants::SHUTDOWN_DRAIN_TIMEOUT;
use hazardq_core::application::{
    serve, shutdown_channel, ConnectionManager, HazardKernel, WorkerStats,
};
use hazardq_core::config::Settings;
use hazardq_core::domain::JOBS_QUEUE;
use hazardq_core::port::SimulationKernel;
use hazardq_infra_redis::RedisConnector;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type ConsumerSet = JoinSet<hazardq_core::Result<WorkerStats>>;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = logging::init("hazardq=info")?;
    info!("hazardq worker v{} starting...", VERSION);

    // 2. Load configuration (defaults < environment)
    let settings = Settings::load().context("failed to load configuration")?;
    let broker_config = settings.broker();
    let worker_config = settings.worker();
    worker_config.validate()?;
    let params = settings.model()?;

    info!(
        endpoint = %format!("{}:{}", broker_config.host, broker_config.port),
        workers = worker_config.workers,
        hazard_rate = params.hazard_rate,
        time_horizon = params.time_horizon,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let connector = Arc::new(RedisConnector::from_config(&broker_config));
    let connection = Arc::new(ConnectionManager::new(
        connector,
        broker_config.retry_policy()?,
    ));
    let kernel: Arc<dyn SimulationKernel> = Arc::new(HazardKernel::new(params)?);

    // 4. Start consumers, each with its own connection (BLPOP blocks it)
    let (shutdown_tx, _) = shutdown_channel();
    let mut consumers: ConsumerSet = JoinSet::new();
    for _ in 0..worker_config.workers {
        let connection = Arc::clone(&connection);
        let kernel = Arc::clone(&kernel);
        let token = shutdown_tx.token();
        let poll_interval = worker_config.poll_interval;
        consumers.spawn(async move { serve(&connection, kernel, poll_interval, token).await });
    }

    info!("Waiting for jobs on '{}'. Press Ctrl+C to shutdown", JOBS_QUEUE);

    // 5. Run until Ctrl+C, or until a consumer dies (broker unreachable at startup
    //    or after a lost connection)
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received. Finishing in-flight jobs...");
        }
        Some(joined) = consumers.join_next() => {
            let failure = match joined {
                Ok(Ok(stats)) => anyhow::anyhow!(
                    "consumer stopped unexpectedly after {} jobs",
                    stats.completed
                ),
                Ok(Err(e)) => anyhow::Error::new(e),
                Err(e) => anyhow::Error::new(e),
            };
            error!(error = %failure, "Consumer terminated, stopping worker");
            shutdown_tx.shutdown();
            drain(&mut consumers).await;
            return Err(failure.context("worker aborted"));
        }
    }

    // 6. Graceful shutdown
    shutdown_tx.shutdown();
    drain(&mut consumers).await;

    info!("Shutdown complete.");
    Ok(())
}

/// Wait for every consumer to observe shutdown, bounded by the drain timeout
async fn drain(consumers: &mut ConsumerSet) {
    let wait_all = async {
        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok(Ok(stats)) => info!(
                    completed = stats.completed,
                    dropped = stats.dropped,
                    "Consumer stopped"
                ),
                Ok(Err(e)) => error!(error = %e, "Consumer failed"),
                Err(e) => error!(error = ?e, "Consumer task panicked"),
            }
        }
    };

    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, wait_all).await.is_err() {
        warn!(
            timeout_secs = SHUTDOWN_DRAIN_TIMEOUT.as_secs(),
            "Consumers still busy at shutdown; their jobs are lost"
        );
    }
}
