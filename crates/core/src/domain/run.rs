// Run Domain Model - chunking plan and aggregated outcome

use super::error::{DomainError, Result};
use super::job::{Job, JobResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a loan population is split into jobs.
///
/// `chunk_size = total_population / job_count`. The remainder of the integer
/// division is not simulated: `excluded_loans()` reports exactly how many
/// loans are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    total_population: u64,
    job_count: u64,
    chunk_size: u64,
}

impl RunPlan {
    pub fn new(total_population: u64, job_count: u64) -> Result<Self> {
        if job_count == 0 {
            return Err(DomainError::InvalidRunShape(
                "job_count must be at least 1".to_string(),
            ));
        }
        if total_population < job_count {
            return Err(DomainError::InvalidRunShape(format!(
                "total_population ({}) must be >= job_count ({}) so every job has load > 0",
                total_population, job_count
            )));
        }

        Ok(Self {
            total_population,
            job_count,
            chunk_size: total_population / job_count,
        })
    }

    pub fn total_population(&self) -> u64 {
        self.total_population
    }

    pub fn job_count(&self) -> u64 {
        self.job_count
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Loans that are actually handed to workers
    pub fn simulated_loans(&self) -> u64 {
        self.chunk_size * self.job_count
    }

    /// Loans dropped by integer chunking
    pub fn excluded_loans(&self) -> u64 {
        self.total_population - self.simulated_loans()
    }

    /// Jobs in increasing id order, ids 1..=job_count
    pub fn jobs(&self) -> impl Iterator<Item = Job> + '_ {
        (1..=self.job_count).map(move |id| Job::new(id, self.chunk_size))
    }
}

/// Commutative sum of partial default counts
pub fn aggregate_defaults<'a, I>(results: I) -> u64
where
    I: IntoIterator<Item = &'a JobResult>,
{
    results.into_iter().map(|r| r.defaults).sum()
}

/// Outcome of one completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub method: String,
    pub total_population: u64,
    pub simulated_loans: u64,
    pub excluded_loans: u64,
    pub job_count: u64,
    pub chunk_size: u64,
    pub total_defaults: u64,
    pub elapsed: Duration,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RunSummary {
    pub fn new(
        method: impl Into<String>,
        plan: &RunPlan,
        total_defaults: u64,
        elapsed: Duration,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            method: method.into(),
            total_population: plan.total_population(),
            simulated_loans: plan.simulated_loans(),
            excluded_loans: plan.excluded_loans(),
            job_count: plan.job_count(),
            chunk_size: plan.chunk_size(),
            total_defaults,
            elapsed,
            started_at,
        }
    }

    /// Defaults over simulated loans (0.0 when nothing was simulated)
    pub fn default_rate(&self) -> f64 {
        if self.simulated_loans == 0 {
            return 0.0;
        }
        self.total_defaults as f64 / self.simulated_loans as f64
    }
}
