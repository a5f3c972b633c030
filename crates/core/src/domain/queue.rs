// Queue Domain Model

/// Queue identifier as understood by the broker
pub type QueueName = &'static str;

/// Producer -> consumers. Fixed name, shared by every process on the broker.
pub const JOBS_QUEUE: QueueName = "simulation_jobs";

/// Consumers -> producer
pub const RESULTS_QUEUE: QueueName = "simulation_results";
