//! Score Matching (Hyvärinen, 2005).
//!
//! Minimizes `mean(0.5 · score(x)² + ∂score_i/∂x_i)` over the batch and the
//! input dimensions, which avoids the partition function entirely.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use models::EnergyModel;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::cost::{Cost, CostGradients};
use crate::error::{CostError, Result as CostResult};
use crate::space::ensure_shape;

/// Source of the `∂score_i/∂x_i` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondDerivatives {
    /// One backward pass per input dimension. Exact for any model, but the
    /// result carries no gradient back to the parameters, so
    /// [`Cost::get_gradients`] rejects this mode.
    #[default]
    Autodiff,
    /// The model's closed-form Jacobian diagonal. Differentiable in the
    /// parameters, so this is the mode to train with.
    Analytic,
}

#[derive(Config, Debug)]
pub struct ScoreMatchingConfig {
    #[config(default = "SecondDerivatives::Autodiff")]
    pub second_derivatives: SecondDerivatives,
}

impl ScoreMatchingConfig {
    pub fn init(&self) -> ScoreMatching {
        ScoreMatching {
            second_derivatives: self.second_derivatives,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreMatching {
    second_derivatives: SecondDerivatives,
}

impl ScoreMatching {
    pub fn second_derivatives(&self) -> SecondDerivatives {
        self.second_derivatives
    }
}

/// `∂score_i/∂x_i` for every example and dimension, shape `(n, dim)`.
///
/// For each dimension `i`, sums `score_i` over the batch and takes one
/// backward pass with respect to a fresh copy of the input; column `i` of
/// that gradient is row `i` of a `(dim, n)` matrix, transposed at the end.
/// The result is detached from the model parameters.
pub fn score_jacobian_diagonal<B, M>(model: &M, x: Tensor<B, 2>) -> Tensor<B, 2>
where
    B: AutodiffBackend,
    M: EnergyModel<B>,
{
    let [n, dim] = x.dims();
    let device = x.device();
    let x = x.detach();

    let rows: Vec<Tensor<B::InnerBackend, 2>> = (0..dim)
        .map(|i| {
            let leaf = x.clone().require_grad();
            let grads = model.score(leaf.clone()).slice([0..n, i..i + 1]).sum().backward();
            match leaf.grad(&grads) {
                Some(grad) => grad.slice([0..n, i..i + 1]).transpose(),
                // score_i does not depend on the input.
                None => Tensor::zeros([1, n], &device),
            }
        })
        .collect();

    Tensor::from_inner(Tensor::cat(rows, 0).transpose())
}

impl<B, M> Cost<B, M> for ScoreMatching
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
{
    fn expr(&self, model: &M, data: Tensor<B, 2>, _rng: &mut StdRng) -> CostResult<Tensor<B, 1>> {
        <Self as Cost<B, M>>::data_specs(self, model).validate("data", &data)?;
        let dims = data.dims();

        let score = model.score(data.clone());
        ensure_shape("score", &score, dims)?;

        let second = match self.second_derivatives {
            SecondDerivatives::Autodiff => score_jacobian_diagonal(model, data),
            SecondDerivatives::Analytic => model
                .score_jacobian_diagonal(data)
                .ok_or(CostError::MissingSecondDerivatives)?,
        };
        ensure_shape("second derivatives", &second, dims)?;
        tracing::debug!(batch = dims[0], dim = dims[1], mode = ?self.second_derivatives, "Building SM objective");

        Ok((score.powf_scalar(2.0).mul_scalar(0.5) + second).mean())
    }

    fn get_gradients(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> CostResult<CostGradients<B>> {
        if self.second_derivatives == SecondDerivatives::Autodiff {
            return Err(CostError::NotDifferentiable("the autodiff score Jacobian"));
        }
        let loss = <Self as Cost<B, M>>::expr(self, model, data, rng)?;
        CostGradients::from_loss(loss, model, <Self as Cost<B, M>>::on_disconnected(self))
    }
}
