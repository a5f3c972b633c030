// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod kernel;

// Re-exports
pub use broker::{Broker, BrokerConnector, BrokerError};
pub use kernel::{KernelError, SimulationKernel};
