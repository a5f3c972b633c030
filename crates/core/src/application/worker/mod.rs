// Consumer - job execution loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::connection::ConnectionManager;
use crate::domain::{Job, JobResult, JOBS_QUEUE, RESULTS_QUEUE};
use crate::error::Result;
use crate::port::{Broker, KernelError, SimulationKernel};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// What one poll iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing arrived within the poll interval
    Idle,
    /// Result pushed to the results queue
    Completed(JobResult),
    /// Job popped but no result will ever be reported for it
    Dropped,
}

/// Counters reported when a consumer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub dropped: u64,
}

/// Competing consumer: pop a job, compute, push the result.
///
/// Any number of consumers may share one broker; the broker's atomic pop
/// is the only coordination between them.
pub struct Consumer {
    worker_id: String,
    broker: Arc<dyn Broker>,
    kernel: Arc<dyn SimulationKernel>,
    poll_interval: Duration,
}

impl Consumer {
    pub fn new(broker: Arc<dyn Broker>, kernel: Arc<dyn SimulationKernel>) -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            broker,
            kernel,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until `shutdown` fires.
    ///
    /// Cancellation is only observed between iterations. A pop is never
    /// abandoned half way, so a popped job is always finished or dropped
    /// before the loop checks the token again.
    ///
    /// # Errors
    /// A lost broker connection ends the run; use [`serve`] to reconnect.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        self.run_session(&mut shutdown, &mut stats).await?;
        Ok(stats)
    }

    /// Poll loop on the current broker handle, counting into `stats`
    async fn run_session(
        &self,
        shutdown: &mut ShutdownToken,
        stats: &mut WorkerStats,
    ) -> Result<()> {
        info!(worker_id = %self.worker_id, queue = JOBS_QUEUE, "Consumer started");

        loop {
            if shutdown.is_shutdown() {
                info!(worker_id = %self.worker_id, "Consumer shutting down");
                break;
            }

            match self.process_next_job().await {
                Ok(JobOutcome::Completed(_)) => stats.completed += 1,
                Ok(JobOutcome::Dropped) => stats.dropped += 1,
                Ok(JobOutcome::Idle) => {}
                Err(e) if e.is_connection_lost() => {
                    warn!(worker_id = %self.worker_id, error = %e, "Broker connection lost");
                    return Err(e);
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Consumer error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(
                                worker_id = %self.worker_id,
                                "Consumer interrupted during error recovery"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            worker_id = %self.worker_id,
            completed = stats.completed,
            dropped = stats.dropped,
            "Consumer stopped"
        );
        Ok(())
    }

    /// One poll iteration: at most one job popped, at most one result pushed
    pub async fn process_next_job(&self) -> Result<JobOutcome> {
        let payload = match self.broker.pop(JOBS_QUEUE, self.poll_interval).await? {
            Some(p) => p,
            None => return Ok(JobOutcome::Idle),
        };

        let job = match Job::decode(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(
                    worker_id = %self.worker_id,
                    payload = %payload,
                    error = %e,
                    "Malformed job payload, skipping"
                );
                return Ok(JobOutcome::Dropped);
            }
        };

        info!(worker_id = %self.worker_id, job_id = job.id, load = job.load, "Processing job");

        let defaults = match self.compute(job).await {
            Ok(defaults) => defaults,
            Err(e) => {
                error!(
                    worker_id = %self.worker_id,
                    job_id = job.id,
                    error = %e,
                    "Job lost: no result will be reported"
                );
                return Ok(JobOutcome::Dropped);
            }
        };

        // Encode fully before pushing: the results queue only ever sees
        // complete payloads.
        let result = JobResult::new(job.id, defaults);
        let encoded = result.encode()?;
        self.broker.push(RESULTS_QUEUE, &encoded).await?;

        info!(
            worker_id = %self.worker_id,
            job_id = job.id,
            defaults,
            load = job.load,
            "Job done"
        );
        Ok(JobOutcome::Completed(result))
    }

    /// Run the kernel off the async threads with panic isolation
    async fn compute(&self, job: Job) -> std::result::Result<u64, KernelError> {
        let kernel = Arc::clone(&self.kernel);
        let load = job.load;

        let handle = tokio::task::spawn_blocking(move || {
            execute_guarded(AssertUnwindSafe(|| kernel.compute_defaults(load)))
        });

        match handle.await {
            Ok(PanicGuardResult::Success(Ok(defaults))) if defaults <= load => Ok(defaults),
            Ok(PanicGuardResult::Success(Ok(defaults))) => {
                Err(KernelError::OutOfRange { load, defaults })
            }
            Ok(PanicGuardResult::Success(Err(e))) => Err(e),
            Ok(PanicGuardResult::Panicked(msg)) => Err(KernelError::Panicked(msg)),
            Err(join_err) => {
                warn!(job_id = job.id, error = ?join_err, "Kernel task did not complete");
                Err(KernelError::Aborted(join_err.to_string()))
            }
        }
    }
}

/// Connect through `connection`, then consume until `shutdown` fires.
///
/// A connection lost mid-run goes back through the handshake; the worker
/// id and counters carry over to the new handle.
///
/// # Errors
/// `BrokerUnavailable` once a handshake, at startup or after a lost
/// connection, exhausts its attempts.
pub async fn serve(
    connection: &ConnectionManager,
    kernel: Arc<dyn SimulationKernel>,
    poll_interval: Duration,
    mut shutdown: ShutdownToken,
) -> Result<WorkerStats> {
    let broker = connection.connect().await?;
    let mut consumer = Consumer::new(broker, kernel).with_poll_interval(poll_interval);
    let mut stats = WorkerStats::default();

    loop {
        match consumer.run_session(&mut shutdown, &mut stats).await {
            Ok(()) => return Ok(stats),
            Err(e) if e.is_connection_lost() => {
                info!(
                    worker_id = %consumer.worker_id,
                    endpoint = %connection.endpoint(),
                    "Reconnecting to broker"
                );
                consumer.broker = tokio::select! {
                    connected = connection.connect() => connected?,
                    _ = shutdown.wait() => return Ok(stats),
                };
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::error::AppError;
    use crate::port::broker::memory::{MemoryBroker, MemoryConnector};
    use crate::port::kernel::mocks::{MockBehavior, MockKernel};

    const FAST_POLL: Duration = Duration::from_millis(10);

    fn consumer(broker: &Arc<MemoryBroker>, kernel: MockKernel) -> Consumer {
        Consumer::new(broker.clone(), Arc::new(kernel)).with_poll_interval(FAST_POLL)
    }

    async fn push_job(broker: &MemoryBroker, id: u64, load: u64) {
        let payload = Job::new(id, load).encode().unwrap();
        broker.push(JOBS_QUEUE, &payload).await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_when_queue_empty() {
        let broker = Arc::new(MemoryBroker::new());
        let outcome = consumer(&broker, MockKernel::half())
            .process_next_job()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Idle);
        assert_eq!(broker.depth(RESULTS_QUEUE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_completed_job_pushes_result() {
        let broker = Arc::new(MemoryBroker::new());
        push_job(&broker, 4, 21).await;

        let outcome = consumer(&broker, MockKernel::half())
            .process_next_job()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Completed(JobResult::new(4, 10)));
        assert_eq!(
            broker.snapshot(RESULTS_QUEUE),
            vec![r#"{"id":4,"defaults":10}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_panicking_kernel_drops_job_only() {
        let broker = Arc::new(MemoryBroker::new());
        push_job(&broker, 1, 10).await;
        push_job(&broker, 2, 10).await;

        let worker = consumer(&broker, MockKernel::new_panic_inducing("kernel exploded"));
        assert_eq!(worker.process_next_job().await.unwrap(), JobOutcome::Dropped);
        assert_eq!(worker.process_next_job().await.unwrap(), JobOutcome::Dropped);
        assert_eq!(broker.depth(RESULTS_QUEUE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_kernel_drops_job() {
        let broker = Arc::new(MemoryBroker::new());
        push_job(&broker, 1, 10).await;

        let outcome = consumer(&broker, MockKernel::new_fail("bad input"))
            .process_next_job()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Dropped);
        assert_eq!(broker.depth(RESULTS_QUEUE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_count_is_never_pushed() {
        let broker = Arc::new(MemoryBroker::new());
        push_job(&broker, 1, 10).await;

        let outcome = consumer(&broker, MockKernel::new(MockBehavior::Overflow))
            .process_next_job()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Dropped);
        assert!(broker.snapshot(RESULTS_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_job_is_skipped() {
        let broker = Arc::new(MemoryBroker::new());
        broker.push(JOBS_QUEUE, "garbage").await.unwrap();
        push_job(&broker, 2, 8).await;

        let kernel = Arc::new(MockKernel::echo());
        let worker = Consumer::new(broker.clone(), kernel.clone()).with_poll_interval(FAST_POLL);

        assert_eq!(worker.process_next_job().await.unwrap(), JobOutcome::Dropped);
        assert_eq!(
            worker.process_next_job().await.unwrap(),
            JobOutcome::Completed(JobResult::new(2, 8))
        );
        assert_eq!(kernel.loads(), vec![8]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let broker = Arc::new(MemoryBroker::new());
        for id in 1..=3 {
            push_job(&broker, id, 4).await;
        }

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let worker = consumer(&broker, MockKernel::half());
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.shutdown();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer should stop within 2 seconds")
            .unwrap()
            .unwrap();
        assert_eq!(
            stats,
            WorkerStats {
                completed: 3,
                dropped: 0,
            }
        );
        assert_eq!(broker.depth(RESULTS_QUEUE).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_connection_loss_ends_run() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_offline(true);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let worker = consumer(&broker, MockKernel::half());

        let result = tokio::time::timeout(Duration::from_millis(500), worker.run(shutdown_rx))
            .await
            .expect("a lost connection must not be retried forever");
        assert!(matches!(result, Err(e) if e.is_connection_lost()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_gives_up_when_broker_stays_down() {
        let broker = Arc::new(MemoryBroker::new());
        let connector = Arc::new(MemoryConnector::new(broker.clone()));
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).unwrap();
        let manager = ConnectionManager::new(connector.clone(), policy);

        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        let kernel = Arc::new(MockKernel::half());
        let handle = {
            let broker = broker.clone();
            tokio::spawn(async move {
                // Let the first handshake through, then drop the broker for good
                tokio::time::sleep(Duration::from_millis(20)).await;
                broker.set_offline(true);
            })
        };

        let result = serve(&manager, kernel, FAST_POLL, shutdown_rx).await;
        handle.await.unwrap();

        assert!(matches!(
            result,
            Err(AppError::BrokerUnavailable { attempts: 3, .. })
        ));
        // Startup handshake plus one exhausted reconnect
        assert_eq!(connector.attempts(), 4);
    }

    #[tokio::test]
    async fn test_serve_reconnects_and_keeps_working() {
        let broker = Arc::new(MemoryBroker::new());
        let connector = Arc::new(MemoryConnector::new(broker.clone()));
        let policy = RetryPolicy::new(20, Duration::from_millis(20)).unwrap();
        let manager = ConnectionManager::new(connector.clone(), policy);

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let handle = tokio::spawn(async move {
            serve(&manager, Arc::new(MockKernel::half()), FAST_POLL, shutdown_rx).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.set_offline(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        broker.set_offline(false);
        push_job(&broker, 1, 30).await;

        let arrived = tokio::time::timeout(Duration::from_secs(2), async {
            while broker.depth(RESULTS_QUEUE).await.unwrap() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(arrived.is_ok(), "job should be processed after reconnecting");

        shutdown_tx.shutdown();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(
            stats,
            WorkerStats {
                completed: 1,
                dropped: 0,
            }
        );
        assert!(connector.attempts() > 1);
        assert_eq!(
            broker.snapshot(RESULTS_QUEUE),
            vec![r#"{"id":1,"defaults":15}"#.to_string()]
        );
    }
}
