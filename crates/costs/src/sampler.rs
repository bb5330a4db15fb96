use burn::prelude::*;
use models::EnergyModel;
use rand::rngs::StdRng;

/// Next state of a [`BlockGibbsSampler`]: advanced particles and generator.
#[derive(Debug, Clone)]
pub struct SamplerUpdates<B: Backend> {
    pub particles: Tensor<B, 2>,
    pub rng: StdRng,
}

/// Persistent block Gibbs chains over the visible units of a model.
///
/// The sampler owns its particles and generator. [`BlockGibbsSampler::updates`]
/// computes the next state without mutating anything; the caller commits it
/// with [`BlockGibbsSampler::apply`].
#[derive(Debug, Clone)]
pub struct BlockGibbsSampler<B: Backend> {
    particles: Tensor<B, 2>,
    rng: StdRng,
    steps: usize,
}

impl<B: Backend> BlockGibbsSampler<B> {
    pub fn new(particles: Tensor<B, 2>, rng: StdRng, steps: usize) -> Self {
        Self {
            particles: particles.detach(),
            rng,
            steps,
        }
    }

    pub fn particles(&self) -> &Tensor<B, 2> {
        &self.particles
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Run `steps` Gibbs transitions from the current particles.
    pub fn updates<M: EnergyModel<B>>(&self, model: &M) -> SamplerUpdates<B> {
        let mut rng = self.rng.clone();
        let mut particles = self.particles.clone();
        for _ in 0..self.steps {
            particles = model.gibbs_step_for_v(particles, &mut rng).v_sample.detach();
        }
        SamplerUpdates { particles, rng }
    }

    pub fn apply(&mut self, updates: SamplerUpdates<B>) {
        self.particles = updates.particles.detach();
        self.rng = updates.rng;
    }
}
