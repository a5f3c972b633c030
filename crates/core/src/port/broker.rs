// Broker Port (Interface)
// FIFO queue service shared by producer and consumers

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Broker-level failures
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command failed: {0}")]
    Command(String),
}

/// Named FIFO queues with atomic pop.
///
/// Implementations must guarantee that a single `pop` hands an item to at
/// most one caller, even with many competing consumers.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Liveness check
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Append one payload to the tail of `queue`
    async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError>;

    /// Remove the head of `queue`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError>;

    /// Number of items currently waiting in `queue`
    async fn depth(&self, queue: &str) -> Result<u64, BrokerError>;
}

/// Opens broker connections (used by the connection manager)
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Human readable address, used in logs and errors
    fn endpoint(&self) -> String;

    /// Open a fresh connection. No liveness check is implied.
    async fn open(&self) -> Result<Arc<dyn Broker>, BrokerError>;
}

// ============================================================================
// In-process broker (tests and `hazardq local`)
// ============================================================================

pub mod memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    /// Broker that keeps its queues in process memory.
    ///
    /// Pop atomicity comes from the queue mutex; waiters are woken through a
    /// shared `Notify` on every push.
    #[derive(Default)]
    pub struct MemoryBroker {
        queues: Mutex<HashMap<String, VecDeque<String>>>,
        pushed: Notify,
        offline: AtomicBool,
    }

    impl MemoryBroker {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every operation fail with a connection error
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Snapshot of the items waiting in `queue`, head first
        pub fn snapshot(&self, queue: &str) -> Vec<String> {
            let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            queues
                .get(queue)
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default()
        }

        fn check_online(&self) -> Result<(), BrokerError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(BrokerError::Connection("broker offline".to_string()));
            }
            Ok(())
        }

        fn try_pop(&self, queue: &str) -> Option<String> {
            let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            queues.get_mut(queue).and_then(|q| q.pop_front())
        }
    }

    #[async_trait]
    impl Broker for MemoryBroker {
        async fn ping(&self) -> Result<(), BrokerError> {
            self.check_online()
        }

        async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
            self.check_online()?;
            {
                let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                queues
                    .entry(queue.to_string())
                    .or_default()
                    .push_back(payload.to_string());
            }
            self.pushed.notify_waiters();
            Ok(())
        }

        async fn pop(
            &self,
            queue: &str,
            timeout: Duration,
        ) -> Result<Option<String>, BrokerError> {
            self.check_online()?;
            let deadline = Instant::now() + timeout;

            loop {
                // Register interest before looking, so a push between the
                // check and the wait is not missed.
                let notified = self.pushed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(item) = self.try_pop(queue) {
                    return Ok(Some(item));
                }

                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return Ok(self.try_pop(queue));
                }
            }
        }

        async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
            self.check_online()?;
            let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            Ok(queues.get(queue).map(|q| q.len() as u64).unwrap_or(0))
        }
    }

    /// Connector handing out the same `MemoryBroker`, optionally refusing
    /// the first N attempts.
    pub struct MemoryConnector {
        broker: Arc<MemoryBroker>,
        refuse_first: u32,
        attempts: AtomicU32,
    }

    impl MemoryConnector {
        pub fn new(broker: Arc<MemoryBroker>) -> Self {
            Self::refusing(broker, 0)
        }

        pub fn refusing(broker: Arc<MemoryBroker>, refuse_first: u32) -> Self {
            Self {
                broker,
                refuse_first,
                attempts: AtomicU32::new(0),
            }
        }

        /// Refuse every attempt
        pub fn unreachable() -> Self {
            Self::refusing(Arc::new(MemoryBroker::new()), u32::MAX)
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrokerConnector for MemoryConnector {
        fn endpoint(&self) -> String {
            "memory://local".to_string()
        }

        async fn open(&self) -> Result<Arc<dyn Broker>, BrokerError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.refuse_first {
                return Err(BrokerError::Connection("connection refused".to_string()));
            }
            let broker: Arc<dyn Broker> = self.broker.clone();
            Ok(broker)
        }
    }

}
