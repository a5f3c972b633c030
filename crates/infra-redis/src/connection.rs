// Redis Connection Setup

use crate::broker::{to_broker_error, RedisBroker};
use async_trait::async_trait;
use hazardq_core::config::BrokerConfig;
use hazardq_core::port::{Broker, BrokerConnector, BrokerError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound for a single TCP connect + handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens multiplexed connections to `redis://host:port/0`
pub struct RedisConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/0", self.host, self.port)
    }
}

#[async_trait]
impl BrokerConnector for RedisConnector {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn open(&self) -> Result<Arc<dyn Broker>, BrokerError> {
        let client = redis::Client::open(self.url())
            .map_err(|e| BrokerError::Connection(format!("invalid address: {}", e)))?;

        debug!(url = %self.url(), "Opening Redis connection");
        let conn = tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            BrokerError::Connection(format!(
                "connect timed out after {}ms",
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(to_broker_error)?;

        let broker: Arc<dyn Broker> = Arc::new(RedisBroker::new(conn));
        Ok(broker)
    }
}
