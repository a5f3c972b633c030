// Constant-Hazard Survival Model

use super::error::{DomainError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HAZARD_RATE: f64 = 0.05;
pub const DEFAULT_TIME_HORIZON: f64 = 1.0;

/// Model parameters shared by every loan in a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Instantaneous default rate per unit time
    pub hazard_rate: f64,
    /// Horizon in years
    pub time_horizon: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            hazard_rate: DEFAULT_HAZARD_RATE,
            time_horizon: DEFAULT_TIME_HORIZON,
        }
    }
}

impl ModelParams {
    pub fn new(hazard_rate: f64, time_horizon: f64) -> Result<Self> {
        let params = Self {
            hazard_rate,
            time_horizon,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.hazard_rate.is_finite() && self.hazard_rate > 0.0) {
            return Err(DomainError::InvalidModelParameter(format!(
                "hazard_rate must be finite and > 0, got {}",
                self.hazard_rate
            )));
        }
        if !(self.time_horizon.is_finite() && self.time_horizon > 0.0) {
            return Err(DomainError::InvalidModelParameter(format!(
                "time_horizon must be finite and > 0, got {}",
                self.time_horizon
            )));
        }
        Ok(())
    }
}

/// PD = 1 - exp(-hazard_rate * time_horizon)
pub fn default_probability(params: &ModelParams) -> f64 {
    1.0 - (-params.hazard_rate * params.time_horizon).exp()
}

/// Count how many of `load` independent loans default within the horizon.
///
/// PD is derived from `params` on every call; nothing is cached between
/// chunks. Only the count is produced, no per-loan outcome is kept.
pub fn compute_defaults<R: Rng + ?Sized>(
    load: u64,
    params: &ModelParams,
    rng: &mut R,
) -> Result<u64> {
    params.validate()?;
    if load == 0 {
        return Ok(0);
    }

    let pd = default_probability(params);
    let defaults = (0..load).filter(|_| rng.gen::<f64>() < pd).count() as u64;
    Ok(defaults)
}
