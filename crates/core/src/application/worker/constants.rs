// Timing constants (no magic values in the loops)
use std::time::Duration;

/// Blocking pop timeout on the jobs queue. Only bounds how long a consumer
/// goes without checking for cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval for consumers hosted in-process by `run_local`
pub const LOCAL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sleep duration after a broker error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Producer budget for collecting all results (5 minutes)
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection attempts before giving up with `BrokerUnavailable`
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Fixed delay between connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long a stopping process waits for its consumers to drain
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
