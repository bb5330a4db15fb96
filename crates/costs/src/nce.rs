//! Noise-Contrastive Estimation.
//!
//! See "Noise-contrastive estimation: A new estimation principle for
//! unnormalized statistical models", Gutmann and Hyvärinen (2010).
//!
//! With `G(x) = ln p_model(x) - ln p_noise(x)`, the paper maximizes
//! `mean ln σ(G(clean)) + mean ln(1 - σ(G(noise)))`. We minimize its negative,
//! using `ln σ(G) = -softplus(-G)` and `ln(1 - σ(G)) = -softplus(G)`.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use models::activation::log_sigmoid;
use models::{EnergyModel, NoiseDistribution};
use rand::rngs::StdRng;

use crate::cost::Cost;
use crate::error::{CostError, Result as CostResult};

/// Configuration for [`Nce`].
#[derive(Config, Debug)]
pub struct NceConfig {
    /// Noise samples generated per clean example.
    #[config(default = 1)]
    pub noise_per_clean: usize,
}

impl NceConfig {
    /// Bind the configuration to a noise distribution.
    pub fn init<N>(&self, noise: N) -> CostResult<Nce<N>> {
        if self.noise_per_clean == 0 {
            return Err(CostError::InvalidConfig(
                "noise_per_clean must be at least 1".to_string(),
            ));
        }
        Ok(Nce {
            noise,
            noise_per_clean: self.noise_per_clean,
        })
    }
}

/// NCE cost against the noise distribution `N`.
#[derive(Debug, Clone)]
pub struct Nce<N> {
    noise: N,
    noise_per_clean: usize,
}

impl<N> Nce<N> {
    pub fn noise(&self) -> &N {
        &self.noise
    }

    pub fn noise_per_clean(&self) -> usize {
        self.noise_per_clean
    }

    /// Log-ratio `G(x) = ln p_model(x) - ln p_noise(x)`, shape (n,).
    ///
    /// The noise density is a fixed reference and contributes no gradient.
    pub fn log_ratio<B, M>(&self, model: &M, x: Tensor<B, 2>) -> Tensor<B, 1>
    where
        B: Backend,
        M: EnergyModel<B>,
        N: NoiseDistribution<B>,
    {
        model.log_prob(x.clone()) - self.noise.log_prob(x).detach()
    }

    /// `h(x) = -σ(G(x))`.
    pub fn h<B, M>(&self, model: &M, x: Tensor<B, 2>) -> Tensor<B, 1>
    where
        B: Backend,
        M: EnergyModel<B>,
        N: NoiseDistribution<B>,
    {
        sigmoid(self.log_ratio(model, x)).neg()
    }

    /// NCE objective with an optional caller-supplied noise batch.
    ///
    /// Passing `noisy_data` keeps the noise fixed across several evaluations
    /// (e.g. during a line search). Otherwise `noise_per_clean × n` samples
    /// are drawn from `rng`.
    pub fn expr_with_noise<B, M>(
        &self,
        model: &M,
        data: Tensor<B, 2>,
        noisy_data: Option<Tensor<B, 2>>,
        rng: &mut StdRng,
    ) -> CostResult<Tensor<B, 1>>
    where
        B: AutodiffBackend,
        M: EnergyModel<B> + AutodiffModule<B>,
        N: NoiseDistribution<B>,
    {
        let space = <Self as Cost<B, M>>::data_specs(self, model);
        space.validate("data", &data)?;

        let [m_data, _] = data.dims();
        let noisy = match noisy_data {
            Some(noisy) => {
                space.validate("noisy data", &noisy)?;
                noisy
            }
            None => {
                let m_noise = m_data * self.noise_per_clean;
                self.noise.random_design_matrix(m_noise, rng, &data.device())
            }
        };
        tracing::debug!(m_data, m_noise = noisy.dims()[0], "Building NCE objective");

        let g_clean = self.log_ratio(model, data);
        let g_noise = self.log_ratio(model, noisy);
        Ok(nce_objective(g_clean, g_noise))
    }
}

/// `-mean ln σ(g_clean) - mean ln(1 - σ(g_noise))` in softplus form.
pub fn nce_objective<B: Backend>(g_clean: Tensor<B, 1>, g_noise: Tensor<B, 1>) -> Tensor<B, 1> {
    let log_hx = log_sigmoid(g_clean);
    // ln(1 - σ(g)) = ln σ(-g)
    let log_one_minus_hy = log_sigmoid(g_noise.neg());
    log_hx.mean().neg() - log_one_minus_hy.mean()
}

impl<B, M, N> Cost<B, M> for Nce<N>
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
    N: NoiseDistribution<B>,
{
    fn expr(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> CostResult<Tensor<B, 1>> {
        self.expr_with_noise(model, data, None, rng)
    }
}
