// Redis Broker Adapter

use async_trait::async_trait;
use hazardq_core::port::{Broker, BrokerError};
use redis::aio::MultiplexedConnection;
use redis::RedisError;
use std::time::Duration;
use tracing::trace;

/// BLPOP treats 0 as "block forever"; never send anything below this
const MIN_BLOCK_SECS: f64 = 0.01;

/// Redis lists as FIFO queues: RPUSH at the tail, BLPOP from the head.
///
/// BLPOP is atomic on the server, which is what makes competing consumers
/// safe. The multiplexed connection is cloned per command.
#[derive(Clone)]
pub struct RedisBroker {
    conn: MultiplexedConnection,
}

impl RedisBroker {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

pub(crate) fn to_broker_error(err: RedisError) -> BrokerError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        BrokerError::Connection(err.to_string())
    } else {
        BrokerError::Command(err.to_string())
    }
}

/// BLPOP timeout argument in seconds (fractional seconds need Redis >= 6)
pub(crate) fn block_seconds(timeout: Duration) -> f64 {
    timeout.as_secs_f64().max(MIN_BLOCK_SECS)
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(to_broker_error)?;
        if pong != "PONG" {
            return Err(BrokerError::Command(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }

    async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(to_broker_error)?;
        trace!(queue, len, "RPUSH");
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        // Reply is nil on timeout, otherwise [key, value]
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(block_seconds(timeout))
            .query_async(&mut conn)
            .await
            .map_err(to_broker_error)?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(to_broker_error)
    }
}
