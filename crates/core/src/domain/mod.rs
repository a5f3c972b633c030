// Domain Layer - Pure simulation and protocol types

pub mod error;
pub mod job;
pub mod queue;
pub mod run;
pub mod survival;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobResult};
pub use queue::{QueueName, JOBS_QUEUE, RESULTS_QUEUE};
pub use run::{aggregate_defaults, RunPlan, RunSummary};
pub use survival::{compute_defaults, default_probability, ModelParams};
