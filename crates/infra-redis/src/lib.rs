// hazardq Infrastructure - Redis Adapter
// Implements: Broker, BrokerConnector (RPUSH / BLPOP / PING / LLEN)

mod broker;
mod connection;

pub use broker::RedisBroker;
pub use connection::{RedisConnector, CONNECT_TIMEOUT};

// Note: redis::RedisError cannot convert into the core's BrokerError through
// `From` here (orphan rules), so errors are mapped by `broker::to_broker_error`
