use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::Distribution;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::activation::softplus;
use crate::error::ModelError;
use crate::sampling::{bernoulli, standard_normal};
use crate::traits::{EnergyModel, GibbsStep};

/// Conditional distribution of the visible units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibleUnits {
    /// Bernoulli visibles, `p(v_i = 1 | h) = σ(b_i + W_i·h)`.
    Binary,
    /// Gaussian visibles with fixed standard deviation `sigma`.
    Gaussian,
}

/// Configuration for a restricted Boltzmann machine.
///
/// ```text
/// binary:   F(v) = -v·b - Σ_j softplus(c_j + (vW)_j)
/// gaussian: F(v) = ‖v - b‖² / 2σ² - Σ_j softplus(c_j + (vW)_j / σ²)
/// ```
#[derive(Config, Debug)]
pub struct RbmConfig {
    /// Number of visible units.
    pub nvis: usize,
    /// Number of hidden units.
    pub nhid: usize,
    /// Visible unit type.
    #[config(default = "VisibleUnits::Binary")]
    pub visible: VisibleUnits,
    /// Standard deviation of Gaussian visibles. Ignored for binary visibles.
    #[config(default = 1.0)]
    pub sigma: f64,
    /// Standard deviation of the initial weights.
    #[config(default = 0.01)]
    pub init_weight_std: f64,
}

/// Restricted Boltzmann machine with binary hidden units.
///
/// `log_partition` is a learned estimate of `ln Z` that only enters
/// [`EnergyModel::log_prob`]. Costs built on free energies alone (CD, PCD)
/// never reach it.
#[derive(Module, Debug)]
pub struct Rbm<B: Backend> {
    /// Weights, shape (nvis, nhid).
    weights: Param<Tensor<B, 2>>,
    /// Visible biases, shape (nvis,).
    vbias: Param<Tensor<B, 1>>,
    /// Hidden biases, shape (nhid,).
    hbias: Param<Tensor<B, 1>>,
    /// Learned log-normalizer, shape (1,).
    log_partition: Param<Tensor<B, 1>>,
    gaussian_visible: bool,
    sigma: f64,
}

impl RbmConfig {
    /// Initialize an RBM with small random weights and zero biases.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Rbm<B> {
        let weights = Tensor::random(
            [self.nvis, self.nhid],
            Distribution::Normal(0.0, self.init_weight_std),
            device,
        );
        Rbm::assemble(
            weights,
            Tensor::zeros([self.nvis], device),
            Tensor::zeros([self.nhid], device),
            self.visible,
            self.sigma,
        )
    }
}

impl<B: Backend> Rbm<B> {
    /// Build an RBM from explicit parameter values. `log_partition` starts at 0.
    ///
    /// Bias lengths must match the weight shape and `sigma` must be positive.
    pub fn from_tensors(
        weights: Tensor<B, 2>,
        vbias: Tensor<B, 1>,
        hbias: Tensor<B, 1>,
        visible: VisibleUnits,
        sigma: f64,
    ) -> Result<Self, ModelError> {
        let [nvis, nhid] = weights.dims();
        for (what, expected, actual) in [("vbias", nvis, vbias.dims()[0]), ("hbias", nhid, hbias.dims()[0])] {
            if actual != expected {
                return Err(ModelError::LengthMismatch { what, expected, actual });
            }
        }
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(ModelError::InvalidParameter {
                name: "sigma",
                reason: format!("must be finite and positive, got {sigma}"),
            });
        }
        Ok(Self::assemble(weights, vbias, hbias, visible, sigma))
    }

    fn assemble(
        weights: Tensor<B, 2>,
        vbias: Tensor<B, 1>,
        hbias: Tensor<B, 1>,
        visible: VisibleUnits,
        sigma: f64,
    ) -> Self {
        let device = weights.device();
        Self {
            weights: Param::from_tensor(weights),
            vbias: Param::from_tensor(vbias),
            hbias: Param::from_tensor(hbias),
            log_partition: Param::from_tensor(Tensor::zeros([1], &device)),
            gaussian_visible: visible == VisibleUnits::Gaussian,
            sigma,
        }
    }

    pub fn weights(&self) -> &Param<Tensor<B, 2>> {
        &self.weights
    }

    pub fn vbias(&self) -> &Param<Tensor<B, 1>> {
        &self.vbias
    }

    pub fn hbias(&self) -> &Param<Tensor<B, 1>> {
        &self.hbias
    }

    pub fn log_partition(&self) -> &Param<Tensor<B, 1>> {
        &self.log_partition
    }

    pub fn visible(&self) -> VisibleUnits {
        if self.gaussian_visible {
            VisibleUnits::Gaussian
        } else {
            VisibleUnits::Binary
        }
    }

    pub fn num_hidden(&self) -> usize {
        self.hbias.dims()[0]
    }

    /// Scale applied to `vW` inside the hidden pre-activation.
    fn visible_scale(&self) -> f64 {
        if self.gaussian_visible {
            1.0 / (self.sigma * self.sigma)
        } else {
            1.0
        }
    }

    /// Hidden pre-activation `c + (vW) * scale`, shape (n, nhid).
    fn hidden_input(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        let pre = v.matmul(self.weights.val()).mul_scalar(self.visible_scale());
        pre + self.hbias.val().unsqueeze_dim::<2>(0)
    }

    /// `p(h = 1 | v)`, shape (n, nhid).
    pub fn mean_h_given_v(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.hidden_input(v))
    }

    /// Conditional mean of the visibles given hiddens, shape (n, nvis).
    pub fn mean_v_given_h(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let pre = h.matmul(self.weights.val().transpose()) + self.vbias.val().unsqueeze_dim::<2>(0);
        if self.gaussian_visible {
            pre
        } else {
            sigmoid(pre)
        }
    }

    /// Per-example mean squared error of a deterministic `v -> E[h] -> E[v]`
    /// pass, shape (n,).
    pub fn reconstruction_error(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let recon = self.mean_v_given_h(self.mean_h_given_v(v.clone()));
        (recon - v).powf_scalar(2.0).mean_dim(1).squeeze::<1>(1)
    }
}

impl<B: Backend> EnergyModel<B> for Rbm<B> {
    fn input_dim(&self) -> usize {
        self.vbias.dims()[0]
    }

    fn free_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        let hidden_term: Tensor<B, 1> = softplus(self.hidden_input(v.clone()))
            .sum_dim(1)
            .squeeze::<1>(1);
        let bias = self.vbias.val().unsqueeze_dim::<2>(0);
        let visible_term: Tensor<B, 1> = if self.gaussian_visible {
            (v - bias)
                .powf_scalar(2.0)
                .sum_dim(1)
                .squeeze::<1>(1)
                .mul_scalar(0.5 * self.visible_scale())
        } else {
            (v * bias).sum_dim(1).squeeze::<1>(1).neg()
        };
        visible_term - hidden_term
    }

    fn log_prob(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        self.free_energy(v).neg() - self.log_partition.val()
    }

    fn score(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        let h_mean = self.mean_h_given_v(v.clone());
        let pull = h_mean.matmul(self.weights.val().transpose()) + self.vbias.val().unsqueeze_dim::<2>(0);
        if self.gaussian_visible {
            (pull - v).mul_scalar(self.visible_scale())
        } else {
            pull
        }
    }

    fn score_jacobian_diagonal(&self, v: Tensor<B, 2>) -> Option<Tensor<B, 2>> {
        let h_mean = self.mean_h_given_v(v);
        let h_var = h_mean.clone() * (h_mean.neg() + 1.0);
        let w_sq = self.weights.val().powf_scalar(2.0);
        let curvature = h_var.matmul(w_sq.transpose());
        let diag = if self.gaussian_visible {
            let scale = self.visible_scale();
            curvature.mul_scalar(scale * scale).sub_scalar(scale)
        } else {
            curvature
        };
        Some(diag)
    }

    fn gibbs_step_for_v(&self, v: Tensor<B, 2>, rng: &mut StdRng) -> GibbsStep<B> {
        let h_mean = self.mean_h_given_v(v);
        let h_sample = bernoulli(h_mean.clone(), rng);
        let v_mean = self.mean_v_given_h(h_sample);
        let v_sample = if self.gaussian_visible {
            let device = v_mean.device();
            let noise = standard_normal::<B>(v_mean.dims(), rng, &device);
            v_mean.clone() + noise.mul_scalar(self.sigma)
        } else {
            bernoulli(v_mean.clone(), rng)
        };
        GibbsStep {
            v_sample,
            v_mean,
            h_mean,
        }
    }
}
