// Connection Manager - broker handshake with bounded retries

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::error::{AppError, Result};
use crate::port::{Broker, BrokerConnector, BrokerError};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Opens and verifies a broker connection before any queue operation.
///
/// Only the initial handshake (open + PING) is retried; queue operations on
/// the returned handle are not.
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Connect, sleeping the policy delay between failed attempts.
    ///
    /// # Errors
    /// `AppError::BrokerUnavailable` once the last attempt fails. No sleep
    /// follows the final attempt.
    pub async fn connect(&self) -> Result<Arc<dyn Broker>> {
        let endpoint = self.connector.endpoint();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.try_once().await {
                Ok(broker) => {
                    info!(endpoint = %endpoint, attempt, "Connected to broker");
                    return Ok(broker);
                }
                Err(e) => match self.policy.after_failure(attempt) {
                    RetryDecision::Retry(delay) => {
                        warn!(
                            endpoint = %endpoint,
                            attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Broker not reachable, retrying"
                        );
                        sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        error!(
                            endpoint = %endpoint,
                            attempts = attempt,
                            error = %e,
                            "Broker unavailable, giving up"
                        );
                        return Err(AppError::BrokerUnavailable {
                            endpoint,
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }
    }

    async fn try_once(&self) -> std::result::Result<Arc<dyn Broker>, BrokerError> {
        let broker = self.connector.open().await?;
        broker.ping().await?;
        Ok(broker)
    }
}
