// In-process run - the full protocol without an external broker

use crate::application::producer::Producer;
use crate::application::worker::constants::LOCAL_POLL_INTERVAL;
use crate::application::worker::{shutdown_channel, Consumer};
use crate::config::RunConfig;
use crate::domain::RunSummary;
use crate::error::{AppError, Result};
use crate::port::broker::memory::MemoryBroker;
use crate::port::SimulationKernel;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const METHOD_LOCAL: &str = "local";

/// Run one producer and `workers` consumers against a private memory broker.
///
/// Same chunking, same wire format, same timeout policy as a distributed
/// run; useful for comparing against a Redis-backed cluster.
pub async fn run_local(
    config: RunConfig,
    kernel: Arc<dyn SimulationKernel>,
    workers: usize,
) -> Result<RunSummary> {
    if workers == 0 {
        return Err(AppError::Config("local run needs at least one worker".to_string()));
    }

    let broker = Arc::new(MemoryBroker::new());
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    info!(workers, "Starting in-process consumers");
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let consumer = Consumer::new(broker.clone(), Arc::clone(&kernel))
            .with_poll_interval(LOCAL_POLL_INTERVAL);
        let token = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { consumer.run(token).await }));
    }

    let outcome = Producer::new(broker, config).run().await;

    shutdown_tx.shutdown();
    for handle in handles {
        match handle.await {
            Ok(Ok(stats)) => debug!(
                completed = stats.completed,
                dropped = stats.dropped,
                "Local consumer finished"
            ),
            Ok(Err(e)) => warn!(error = %e, "Local consumer failed"),
            Err(e) => warn!(error = ?e, "Local consumer task panicked"),
        }
    }

    let mut summary = outcome?;
    summary.method = METHOD_LOCAL.to_string();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::kernel::mocks::MockKernel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_local_run_sums_all_chunks() {
        let config = RunConfig {
            total_population: 1_000,
            job_count: 8,
            result_timeout: Duration::from_secs(5),
        };
        let summary = run_local(config, Arc::new(MockKernel::echo()), 3)
            .await
            .unwrap();

        assert_eq!(summary.method, METHOD_LOCAL);
        assert_eq!(summary.chunk_size, 125);
        assert_eq!(summary.total_defaults, 1_000);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let result = run_local(RunConfig::default(), Arc::new(MockKernel::half()), 0).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
