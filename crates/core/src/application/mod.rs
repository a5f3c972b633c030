// Application Layer - Use cases wired to ports

pub mod connection;
pub mod kernel;
pub mod local;
pub mod producer;
pub mod retry;
pub mod worker;

// Re-exports
pub use connection::ConnectionManager;
pub use kernel::HazardKernel;
pub use local::run_local;
pub use producer::Producer;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{
    serve, shutdown_channel, Consumer, JobOutcome, ShutdownSender, ShutdownToken, WorkerStats,
};
