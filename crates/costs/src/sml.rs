//! Stochastic Maximum Likelihood, a.k.a. Persistent Contrastive Divergence.
//!
//! See "Training Restricted Boltzmann Machines using Approximations to the
//! Likelihood Gradient", Tieleman (2008). The negative phase reads a set of
//! persistent Gibbs chains that advance by `nsteps` transitions per training
//! step instead of restarting at the data.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use models::EnergyModel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cost::{Cost, CostGradients};
use crate::error::{CostError, Result as CostResult};
use crate::gradients::OnDisconnected;
use crate::sampler::{BlockGibbsSampler, SamplerUpdates};

#[derive(Config, Debug)]
pub struct SmlConfig {
    /// Number of persistent chains, conventionally the minibatch size.
    pub nchains: usize,
    /// Gibbs transitions per training step.
    #[config(default = 1)]
    pub nsteps: usize,
    #[config(default = "OnDisconnected::Zero")]
    pub on_disconnected: OnDisconnected,
}

impl SmlConfig {
    pub fn init<B: Backend>(&self) -> CostResult<Sml<B>> {
        if self.nchains == 0 {
            return Err(CostError::InvalidConfig("SML needs at least one chain".to_string()));
        }
        Ok(Sml {
            nchains: self.nchains,
            nsteps: self.nsteps,
            on_disconnected: self.on_disconnected,
            sampler: None,
        })
    }
}

/// SML cost. Call [`Sml::initialize`] before the first evaluation.
#[derive(Debug, Clone)]
pub struct Sml<B: Backend> {
    nchains: usize,
    nsteps: usize,
    on_disconnected: OnDisconnected,
    sampler: Option<BlockGibbsSampler<B>>,
}

impl<B: Backend> Sml<B> {
    /// Allocate `nchains` particles filled with 0.5 and bind a sampler whose
    /// generator is seeded from `rng`.
    pub fn initialize<M: EnergyModel<B>>(&mut self, model: &M, device: &B::Device, rng: &mut StdRng) {
        let particles = Tensor::full([self.nchains, model.input_dim()], 0.5, device);
        let sampler_rng = StdRng::seed_from_u64(rng.gen());
        tracing::debug!(nchains = self.nchains, nsteps = self.nsteps, "Initialized SML chains");
        self.sampler = Some(BlockGibbsSampler::new(particles, sampler_rng, self.nsteps));
    }

    pub fn is_initialized(&self) -> bool {
        self.sampler.is_some()
    }

    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    /// Current negative-phase particles, if initialized.
    pub fn particles(&self) -> Option<&Tensor<B, 2>> {
        self.sampler.as_ref().map(|s| s.particles())
    }

    /// Commit the sampler state returned alongside a gradient.
    pub fn apply_updates(&mut self, updates: SamplerUpdates<B>) -> CostResult<()> {
        let sampler = self.sampler.as_mut().ok_or(CostError::NotInitialized("SML"))?;
        sampler.apply(updates);
        Ok(())
    }

    fn sampler(&self) -> CostResult<&BlockGibbsSampler<B>> {
        self.sampler.as_ref().ok_or(CostError::NotInitialized("SML"))
    }
}

impl<B, M> Cost<B, M> for Sml<B>
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
{
    fn on_disconnected(&self) -> OnDisconnected {
        self.on_disconnected
    }

    /// `mean F(data) - mean F(particles)`. The chains own their generator,
    /// so `rng` is not consumed.
    fn expr(&self, model: &M, data: Tensor<B, 2>, _rng: &mut StdRng) -> CostResult<Tensor<B, 1>> {
        let sampler = self.sampler()?;
        let space = <Self as Cost<B, M>>::data_specs(self, model);
        space.validate("data", &data)?;
        space.validate("particles", sampler.particles())?;

        let pos = model.free_energy(data).mean();
        let neg = model.free_energy(sampler.particles().clone()).mean();
        Ok(pos - neg)
    }

    fn get_gradients(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> CostResult<CostGradients<B>> {
        let loss = <Self as Cost<B, M>>::expr(self, model, data, rng)?;
        let updates = self.sampler()?.updates(model);
        Ok(CostGradients {
            updates: Some(updates),
            ..CostGradients::from_loss(loss, model, self.on_disconnected)?
        })
    }
}
