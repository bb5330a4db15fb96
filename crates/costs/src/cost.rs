use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use models::EnergyModel;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::gradients::{collect_gradients, OnDisconnected};
use crate::sampler::SamplerUpdates;
use crate::space::VectorSpace;

/// Gradients of one cost evaluation plus the state updates that belong to
/// the same training step.
///
/// Apply `gradients` with the optimizer and `updates` to the cost's sampler
/// together; applying only one of them desynchronizes persistent chains from
/// the parameters they were sampled under.
pub struct CostGradients<B: AutodiffBackend> {
    /// Value of the cost the gradients were taken from.
    pub value: f64,
    /// One entry per model parameter.
    pub gradients: GradientsParams,
    /// Next sampler state, for costs that carry one.
    pub updates: Option<SamplerUpdates<B>>,
}

impl<B: AutodiffBackend> CostGradients<B> {
    /// Backpropagate `loss` into every parameter of `model`, with no updates.
    pub fn from_loss<M>(loss: Tensor<B, 1>, model: &M, policy: OnDisconnected) -> Result<Self>
    where
        M: AutodiffModule<B>,
    {
        let value: f64 = loss.clone().into_scalar().elem();
        let gradients = collect_gradients(loss, model, policy)?;
        Ok(Self {
            value,
            gradients,
            updates: None,
        })
    }
}

/// A training objective for an energy-based model `M`.
pub trait Cost<B, M>
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
{
    /// The data contract batches must satisfy.
    fn data_specs(&self, model: &M) -> VectorSpace {
        VectorSpace::new(model.input_dim())
    }

    /// Policy for parameters the cost never reaches.
    fn on_disconnected(&self) -> OnDisconnected {
        OnDisconnected::Zero
    }

    /// Scalar objective to minimize, shape (1,).
    fn expr(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> Result<Tensor<B, 1>>;

    /// Gradients of [`Cost::expr`] with respect to every model parameter.
    fn get_gradients(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> Result<CostGradients<B>> {
        let loss = self.expr(model, data, rng)?;
        CostGradients::from_loss(loss, model, self.on_disconnected())
    }
}
