// Producer - split, enqueue, collect, sum

use crate::config::RunConfig;
use crate::domain::{
    aggregate_defaults, Job, JobResult, RunPlan, RunSummary, JOBS_QUEUE, RESULTS_QUEUE,
};
use crate::error::{AppError, Result};
use crate::port::Broker;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const METHOD_DISTRIBUTED: &str = "distributed";

/// Drives one run: pushes every job, then waits for one result per job.
pub struct Producer {
    broker: Arc<dyn Broker>,
    config: RunConfig,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, config: RunConfig) -> Self {
        Self { broker, config }
    }

    /// Execute the run.
    ///
    /// # Errors
    /// - `AppError::Domain` if the run shape is invalid (nothing is pushed)
    /// - `AppError::ResultsTimeout` if the result budget runs out; results
    ///   that arrive later stay in the broker
    /// - `AppError::Protocol` if a result cannot be counted
    pub async fn run(&self) -> Result<RunSummary> {
        let plan = RunPlan::new(self.config.total_population, self.config.job_count)?;
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        info!(
            total_population = plan.total_population(),
            job_count = plan.job_count(),
            chunk_size = plan.chunk_size(),
            "Starting distributed run"
        );
        if plan.excluded_loans() > 0 {
            warn!(
                excluded_loans = plan.excluded_loans(),
                "Population does not divide evenly; remainder is not simulated"
            );
        }

        self.enqueue(&plan).await?;
        let total_defaults = self.collect(&plan).await?;

        let summary = RunSummary::new(
            METHOD_DISTRIBUTED,
            &plan,
            total_defaults,
            start.elapsed(),
            started_at,
        );
        info!(
            total_defaults = summary.total_defaults,
            default_rate = summary.default_rate(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run complete"
        );
        Ok(summary)
    }

    /// Push jobs 1..=job_count in increasing id order
    async fn enqueue(&self, plan: &RunPlan) -> Result<()> {
        for job in plan.jobs() {
            let payload = job.encode()?;
            self.broker.push(JOBS_QUEUE, &payload).await?;
            debug!(job_id = job.id, load = job.load, "Pushed job");
        }
        info!(jobs = plan.job_count(), queue = JOBS_QUEUE, "All jobs enqueued");
        Ok(())
    }

    /// Pop exactly `job_count` results within one fixed budget
    async fn collect(&self, plan: &RunPlan) -> Result<u64> {
        let budget = self.config.result_timeout;
        let deadline = Instant::now() + budget;
        let expected = plan.job_count();
        let mut results: Vec<JobResult> = Vec::with_capacity(expected as usize);

        while (results.len() as u64) < expected {
            let received = results.len() as u64;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let payload = if remaining.is_zero() {
                None
            } else {
                self.broker.pop(RESULTS_QUEUE, remaining).await?
            };

            let Some(payload) = payload else {
                warn!(
                    expected,
                    received,
                    budget_ms = budget.as_millis() as u64,
                    "Result budget exhausted"
                );
                return Err(AppError::ResultsTimeout {
                    expected,
                    received,
                    budget,
                });
            };

            let result = Self::check_result(plan, &payload)?;
            debug!(
                job_id = result.id,
                defaults = result.defaults,
                received = received + 1,
                expected,
                "Result received"
            );
            results.push(result);
        }

        Ok(aggregate_defaults(&results))
    }

    fn check_result(plan: &RunPlan, payload: &str) -> Result<JobResult> {
        let violation = |reason: String| AppError::Protocol {
            queue: RESULTS_QUEUE.to_string(),
            reason,
        };

        let result = JobResult::decode(payload)
            .map_err(|e| violation(format!("undecodable result {:?}: {}", payload, e)))?;

        if result.id == 0 || result.id > plan.job_count() {
            return Err(violation(format!(
                "result for unknown job {} (run has {} jobs)",
                result.id,
                plan.job_count()
            )));
        }
        if result.defaults > plan.chunk_size() {
            return Err(violation(format!(
                "job {} reported {} defaults for a load of {}",
                result.id,
                result.defaults,
                plan.chunk_size()
            )));
        }
        Ok(result)
    }
}

/// Jobs as the producer would push them, for callers that only need the plan
pub fn planned_jobs(config: &RunConfig) -> Result<Vec<Job>> {
    let plan = RunPlan::new(config.total_population, config.job_count)?;
    Ok(plan.jobs().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::broker::memory::MemoryBroker;
    use std::time::Duration;

    fn config(total: u64, jobs: u64, timeout: Duration) -> RunConfig {
        RunConfig {
            total_population: total,
            job_count: jobs,
            result_timeout: timeout,
        }
    }

    #[tokio::test]
    async fn test_enqueues_jobs_in_id_order() {
        let broker = Arc::new(MemoryBroker::new());
        // Pre-load every result so collection finishes immediately
        for id in 1..=5u64 {
            let payload = JobResult::new(id, 1).encode().unwrap();
            broker.push(RESULTS_QUEUE, &payload).await.unwrap();
        }

        let producer = Producer::new(broker.clone(), config(53, 5, Duration::from_secs(1)));
        let summary = producer.run().await.unwrap();

        let jobs: Vec<Job> = broker
            .snapshot(JOBS_QUEUE)
            .iter()
            .map(|p| Job::decode(p).unwrap())
            .collect();
        assert_eq!(jobs, planned_jobs(&config(53, 5, Duration::ZERO)).unwrap());
        assert_eq!(jobs.iter().map(|j| j.load).sum::<u64>(), 50);
        assert_eq!(summary.total_defaults, 5);
        assert_eq!(summary.excluded_loans, 3);
    }

    #[tokio::test]
    async fn test_invalid_shape_pushes_nothing() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = Producer::new(broker.clone(), config(2, 3, Duration::from_secs(1)));

        let err = producer.run().await.unwrap_err();
        assert!(matches!(err, AppError::Domain(_)));
        assert_eq!(broker.depth(JOBS_QUEUE).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_shared_across_results() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = Producer::new(broker.clone(), config(30, 3, Duration::from_secs(10)));

        // Two results arrive 4s apart, the third never does
        let feeder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                for id in 1..=2u64 {
                    tokio::time::sleep(Duration::from_secs(4)).await;
                    let payload = JobResult::new(id, 0).encode().unwrap();
                    broker.push(RESULTS_QUEUE, &payload).await.unwrap();
                }
            })
        };

        let start = Instant::now();
        let err = producer.run().await.unwrap_err();
        feeder.await.unwrap();

        match err {
            AppError::ResultsTimeout {
                expected, received, ..
            } => {
                assert_eq!(expected, 3);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
        // Whole-run budget, not 10s per result
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_malformed_result_is_a_protocol_violation() {
        let broker = Arc::new(MemoryBroker::new());
        broker.push(RESULTS_QUEUE, "{\"id\": 1}").await.unwrap();

        let producer = Producer::new(broker, config(10, 1, Duration::from_secs(1)));
        let err = producer.run().await.unwrap_err();
        assert!(matches!(err, AppError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_result_exceeding_load_is_rejected() {
        let broker = Arc::new(MemoryBroker::new());
        let payload = JobResult::new(1, 11).encode().unwrap();
        broker.push(RESULTS_QUEUE, &payload).await.unwrap();

        let producer = Producer::new(broker, config(20, 2, Duration::from_secs(1)));
        let err = producer.run().await.unwrap_err();
        assert!(err.to_string().contains("11 defaults for a load of 10"));
    }

    #[tokio::test]
    async fn test_result_for_unknown_job_is_rejected() {
        let broker = Arc::new(MemoryBroker::new());
        let payload = JobResult::new(9, 0).encode().unwrap();
        broker.push(RESULTS_QUEUE, &payload).await.unwrap();

        let producer = Producer::new(broker, config(20, 2, Duration::from_secs(1)));
        let err = producer.run().await.unwrap_err();
        assert!(err.to_string().contains("unknown job 9"));
    }
}
