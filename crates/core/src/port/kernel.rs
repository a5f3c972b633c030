// Simulation Kernel Port
// The function a consumer invokes for every job it pops

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Kernel returned {defaults} defaults for a load of {load}")]
    OutOfRange { load: u64, defaults: u64 },

    #[error("Kernel panicked: {0}")]
    Panicked(String),

    #[error("Kernel task aborted: {0}")]
    Aborted(String),
}

/// Computes the default count for one chunk of loans.
///
/// Called from a blocking thread, so implementations may be CPU bound.
pub trait SimulationKernel: Send + Sync {
    /// Must return a value in `0..=load`
    fn compute_defaults(&self, load: u64) -> Result<u64, KernelError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock kernel behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return `load / divisor` (rounded down)
        Fraction(u64),
        /// Echo the load back as the default count
        Echo,
        /// Return more defaults than the load allows
        Overflow,
        /// Fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock kernel that records every load it was asked to compute
    pub struct MockKernel {
        behavior: MockBehavior,
        call_count: AtomicUsize,
        loads: Mutex<Vec<u64>>,
    }

    impl MockKernel {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                call_count: AtomicUsize::new(0),
                loads: Mutex::new(Vec::new()),
            }
        }

        pub fn half() -> Self {
            Self::new(MockBehavior::Fraction(2))
        }

        pub fn echo() -> Self {
            Self::new(MockBehavior::Echo)
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn loads(&self) -> Vec<u64> {
            self.loads.lock().unwrap().clone()
        }
    }

    impl SimulationKernel for MockKernel {
        fn compute_defaults(&self, load: u64) -> Result<u64, KernelError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.loads.lock().unwrap().push(load);

            match &self.behavior {
                MockBehavior::Fraction(divisor) => Ok(load / divisor),
                MockBehavior::Echo => Ok(load),
                MockBehavior::Overflow => Ok(load + 1),
                MockBehavior::Fail(msg) => Err(KernelError::InvalidInput(msg.clone())),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }
}
