//! k-step Contrastive Divergence (Hinton, 2002).
//!
//! The negative chain restarts at the clean data on every call and runs
//! exactly `nsteps` block Gibbs transitions. No state crosses calls.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use models::EnergyModel;
use rand::rngs::StdRng;

use crate::cost::Cost;
use crate::error::Result as CostResult;
use crate::gradients::OnDisconnected;

#[derive(Config, Debug)]
pub struct CdkConfig {
    /// Gibbs transitions from the data to the negative sample.
    #[config(default = 1)]
    pub nsteps: usize,
    #[config(default = "OnDisconnected::Zero")]
    pub on_disconnected: OnDisconnected,
}

impl CdkConfig {
    pub fn init(&self) -> Cdk {
        Cdk {
            nsteps: self.nsteps,
            on_disconnected: self.on_disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cdk {
    nsteps: usize,
    on_disconnected: OnDisconnected,
}

impl Cdk {
    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    /// Negative sample after `nsteps` transitions from `data`, detached.
    pub fn negative_sample<B, M>(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> Tensor<B, 2>
    where
        B: Backend,
        M: EnergyModel<B>,
    {
        let mut v = data.detach();
        for _ in 0..self.nsteps {
            v = model.gibbs_step_for_v(v, rng).v_sample.detach();
        }
        v
    }
}

impl<B, M> Cost<B, M> for Cdk
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
{
    fn on_disconnected(&self) -> OnDisconnected {
        self.on_disconnected
    }

    fn expr(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> CostResult<Tensor<B, 1>> {
        <Self as Cost<B, M>>::data_specs(self, model).validate("data", &data)?;
        tracing::debug!(batch = data.dims()[0], nsteps = self.nsteps, "Building CD objective");

        let neg_v = self.negative_sample(model, data.clone(), rng);
        let pos = model.free_energy(data).mean();
        let neg = model.free_energy(neg_v).mean();
        Ok(pos - neg)
    }
}
