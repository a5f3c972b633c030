// Configuration - explicit objects built once at the entry point
//
// The worker layers defaults under environment variables with the `config`
// crate. The CLI reads its run shape from clap flags with env fallbacks.

use crate::application::retry::RetryPolicy;
use crate::application::worker::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RESULT_TIMEOUT, DEFAULT_RETRY_DELAY, POLL_INTERVAL,
};
use crate::domain::survival::{DEFAULT_HAZARD_RATE, DEFAULT_TIME_HORIZON};
use crate::domain::ModelParams;
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_N_LOANS: u64 = 100_000_000;
pub const DEFAULT_N_JOBS: u64 = 10;
pub const DEFAULT_WORKERS: usize = 1;

/// Flat view of the worker's tunables, as read from the environment.
///
/// Environment variable names are the upper-cased field names
/// (`REDIS_HOST`, `HAZARD_RATE`, `HAZARDQ_WORKERS`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub redis_host: String,
    pub redis_port: u16,
    pub hazard_rate: f64,
    pub time_horizon: f64,
    pub broker_max_retries: u32,
    pub broker_retry_delay_ms: u64,
    pub hazardq_workers: usize,
}

impl Settings {
    /// Defaults overlaid with the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default().try_parsing(true))
    }

    fn from_environment(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("redis_host", DEFAULT_REDIS_HOST)?
            .set_default("redis_port", DEFAULT_REDIS_PORT as i64)?
            .set_default("hazard_rate", DEFAULT_HAZARD_RATE)?
            .set_default("time_horizon", DEFAULT_TIME_HORIZON)?
            .set_default("broker_max_retries", DEFAULT_MAX_RETRIES as i64)?
            .set_default("broker_retry_delay_ms", DEFAULT_RETRY_DELAY.as_millis() as i64)?
            .set_default("hazardq_workers", DEFAULT_WORKERS as i64)?
            .add_source(env)
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.redis_host.clone(),
            port: self.redis_port,
            max_retries: self.broker_max_retries,
            retry_delay: Duration::from_millis(self.broker_retry_delay_ms),
        }
    }

    pub fn model(&self) -> Result<ModelParams> {
        Ok(ModelParams::new(self.hazard_rate, self.time_horizon)?)
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            workers: self.hazardq_workers,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Where the broker lives and how hard to try reaching it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BrokerConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

/// Shape of one producer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub total_population: u64,
    pub job_count: u64,
    /// Single budget for collecting every result
    pub result_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_population: DEFAULT_N_LOANS,
            job_count: DEFAULT_N_JOBS,
            result_timeout: DEFAULT_RESULT_TIMEOUT,
        }
    }
}

/// Consumer process settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Consumers hosted by this process
    pub workers: usize,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AppError::Config("HAZARDQ_WORKERS must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::Config("poll interval must be > 0".to_string()));
        }
        Ok(())
    }
}
