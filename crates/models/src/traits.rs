//! Contracts between training costs and the models or distributions they use.
//!
//! Shapes follow the design-matrix convention: batches are `(n, dim)`, with one
//! example per row. Per-example quantities are `(n,)`.

use burn::module::Module;
use burn::prelude::*;
use rand::rngs::StdRng;

/// Result of one block Gibbs transition started from a visible batch.
#[derive(Debug, Clone)]
pub struct GibbsStep<B: Backend> {
    /// Sampled visible configuration, shape `(n, nvis)`.
    pub v_sample: Tensor<B, 2>,
    /// Conditional mean of the visible units given the sampled hiddens.
    pub v_mean: Tensor<B, 2>,
    /// Conditional mean of the hidden units given the starting visibles.
    pub h_mean: Tensor<B, 2>,
}

/// An energy-based model with an intractable normalizer.
///
/// Parameters are owned by the model and enumerated through [`Module`];
/// costs only read them and produce gradients against them.
pub trait EnergyModel<B: Backend>: Module<B> {
    /// Number of visible dimensions a data batch must have.
    fn input_dim(&self) -> usize;

    /// Free energy per example, shape `(n,)`.
    fn free_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Unnormalized log-density per example, shape `(n,)`.
    fn log_prob(&self, v: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Gradient of the log-density with respect to the input, shape `(n, dim)`.
    fn score(&self, v: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Closed-form `∂score_i / ∂v_i`, shape `(n, dim)`, when the model has one.
    fn score_jacobian_diagonal(&self, _v: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        None
    }

    /// One block Gibbs transition `v -> h -> v'`.
    fn gibbs_step_for_v(&self, v: Tensor<B, 2>, rng: &mut StdRng) -> GibbsStep<B>;
}

/// A tractable distribution used as the reference noise in NCE.
pub trait NoiseDistribution<B: Backend> {
    /// Dimensionality of samples.
    fn dim(&self) -> usize;

    /// Normalized log-density per example, shape `(n,)`.
    fn log_prob(&self, x: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Draw `n` samples as an `(n, dim)` design matrix.
    fn random_design_matrix(&self, n: usize, rng: &mut StdRng, device: &B::Device)
        -> Tensor<B, 2>;
}

/// A corruption process for denoising score matching.
pub trait Corruptor<B: Backend> {
    /// Corrupt a clean batch.
    fn corrupt(&self, x: Tensor<B, 2>, rng: &mut StdRng) -> Tensor<B, 2>;

    /// Energy linking a corrupted batch to its clean source, shape `(n,)`.
    ///
    /// `-∂/∂corrupted` of its sum is the score of the corruption kernel.
    fn corruption_free_energy(&self, corrupted: Tensor<B, 2>, original: Tensor<B, 2>)
        -> Tensor<B, 1>;
}
