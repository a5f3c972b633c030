// Hazard Kernel - production SimulationKernel

use crate::domain::{compute_defaults, ModelParams};
use crate::error::Result;
use crate::port::{KernelError, SimulationKernel};

/// Samples defaults with the thread-local RNG.
///
/// Each consumer owns its parameters; PD is derived from them on every call.
#[derive(Debug, Clone)]
pub struct HazardKernel {
    params: ModelParams,
}

impl HazardKernel {
    pub fn new(params: ModelParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }
}

impl SimulationKernel for HazardKernel {
    fn compute_defaults(&self, load: u64) -> std::result::Result<u64, KernelError> {
        compute_defaults(load, &self.params, &mut rand::thread_rng())
            .map_err(|e| KernelError::InvalidInput(e.to_string()))
    }
}
