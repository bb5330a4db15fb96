//! Diagonal multivariate normal parameterized by mean and precision.

use std::f64::consts::PI;

use burn::module::Param;
use burn::prelude::*;
use rand::rngs::StdRng;

use crate::error::ModelError;
use crate::sampling::standard_normal;
use crate::traits::NoiseDistribution;

/// Configuration for [`DiagonalMnd`].
#[derive(Config, Debug)]
pub struct DiagonalMndConfig {
    /// Dimensionality.
    pub nvis: usize,
    /// Initial precision of every dimension.
    #[config(default = 1.0)]
    pub init_beta: f64,
    /// Initial mean of every dimension.
    #[config(default = 0.0)]
    pub init_mu: f64,
    /// Lower bound enforced by [`DiagonalMnd::censor_updates`].
    #[config(default = 1e-6)]
    pub min_beta: f64,
    /// Upper bound enforced by [`DiagonalMnd::censor_updates`].
    #[config(default = 1e6)]
    pub max_beta: f64,
}

/// `N(mu, diag(1 / beta))`. `beta` is the per-dimension precision.
#[derive(Module, Debug)]
pub struct DiagonalMnd<B: Backend> {
    /// Mean, shape (nvis,).
    pub mu: Param<Tensor<B, 1>>,
    /// Precision, shape (nvis,).
    pub beta: Param<Tensor<B, 1>>,
    min_beta: f64,
    max_beta: f64,
}

impl DiagonalMndConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DiagonalMnd<B> {
        DiagonalMnd::assemble(
            Tensor::full([self.nvis], self.init_mu, device),
            Tensor::full([self.nvis], self.init_beta, device),
            self.min_beta,
            self.max_beta,
        )
    }
}

impl<B: Backend> DiagonalMnd<B> {
    /// Fails unless `mu` and `beta` have the same length.
    pub fn from_tensors(
        mu: Tensor<B, 1>,
        beta: Tensor<B, 1>,
        min_beta: f64,
        max_beta: f64,
    ) -> Result<Self, ModelError> {
        let [expected] = mu.dims();
        let [actual] = beta.dims();
        if expected != actual {
            return Err(ModelError::LengthMismatch {
                what: "beta",
                expected,
                actual,
            });
        }
        Ok(Self::assemble(mu, beta, min_beta, max_beta))
    }

    fn assemble(mu: Tensor<B, 1>, beta: Tensor<B, 1>, min_beta: f64, max_beta: f64) -> Self {
        Self {
            mu: Param::from_tensor(mu),
            beta: Param::from_tensor(beta),
            min_beta,
            max_beta,
        }
    }

    /// Fit mean and precision to the per-column moments of a data batch.
    ///
    /// The precision is clamped to the configured bounds, so constant columns
    /// stay finite.
    pub fn from_moments(data: Tensor<B, 2>, min_beta: f64, max_beta: f64) -> Self {
        let mu: Tensor<B, 2> = data.clone().mean_dim(0);
        let var: Tensor<B, 1> = (data - mu.clone()).powf_scalar(2.0).mean_dim(0).squeeze::<1>(0);
        let beta = var.clamp_min(1.0 / max_beta).recip().clamp(min_beta, max_beta);
        Self::assemble(mu.squeeze::<1>(0), beta, min_beta, max_beta)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min_beta, self.max_beta)
    }

    /// Project `beta` back into `[min_beta, max_beta]` after an update.
    pub fn censor_updates(self) -> Self {
        let (min_beta, max_beta) = self.bounds();
        let beta = self.beta.map(|beta| {
            let require_grad = beta.is_require_grad();
            beta.clamp(min_beta, max_beta)
                .detach()
                .set_require_grad(require_grad)
        });
        Self { beta, ..self }
    }
}

impl<B: Backend> NoiseDistribution<B> for DiagonalMnd<B> {
    fn dim(&self) -> usize {
        self.mu.dims()[0]
    }

    fn log_prob(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        let d = self.dim() as f64;
        let mu = self.mu.val().unsqueeze_dim::<2>(0);
        let beta = self.beta.val();
        let quadratic: Tensor<B, 1> = ((x - mu).powf_scalar(2.0) * beta.clone().unsqueeze_dim::<2>(0))
            .sum_dim(1)
            .squeeze::<1>(1);
        let log_norm = beta.log().sum().mul_scalar(0.5).sub_scalar(0.5 * d * (2.0 * PI).ln());
        quadratic.mul_scalar(-0.5) + log_norm
    }

    fn random_design_matrix(&self, n: usize, rng: &mut StdRng, device: &B::Device) -> Tensor<B, 2> {
        let eps = standard_normal::<B>([n, self.dim()], rng, device);
        let stdev = self.beta.val().sqrt().recip().unsqueeze_dim::<2>(0);
        eps * stdev + self.mu.val().unsqueeze_dim::<2>(0)
    }
}

/// Closed-form `KL(q ‖ p)` between two diagonal normals, shape (1,).
///
/// `0.5 Σ [ln(β_q / β_p) + β_p / β_q + β_p (μ_q - μ_p)² - 1]`
pub fn kl_divergence<B: Backend>(q: &DiagonalMnd<B>, p: &DiagonalMnd<B>) -> Tensor<B, 1> {
    kl_divergence_params(q.mu.val(), q.beta.val(), p.mu.val(), p.beta.val())
}

/// [`kl_divergence`] on raw parameter vectors of equal length.
pub fn kl_divergence_params<B: Backend>(
    mu_q: Tensor<B, 1>,
    beta_q: Tensor<B, 1>,
    mu_p: Tensor<B, 1>,
    beta_p: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let mu_diff = mu_q - mu_p;

    let log_ratio = (beta_q.clone() / beta_p.clone()).log();
    let var_ratio = beta_p.clone() / beta_q;
    let mean_term = beta_p * mu_diff.powf_scalar(2.0);

    (log_ratio + var_ratio + mean_term).sub_scalar(1.0).sum().mul_scalar(0.5)
}
