use burn::prelude::*;
use rand::rngs::StdRng;

use crate::error::ModelError;
use crate::sampling::standard_normal;
use crate::traits::Corruptor;

/// Additive isotropic Gaussian corruption `x + stdev · ε`.
///
/// `stdev = 0` is the uncorrupted limit: the data passes through unchanged
/// and the kernel energy is identically zero, so its implied score is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianCorruptor {
    stdev: f64,
}

impl GaussianCorruptor {
    /// Fails unless `stdev` is finite and non-negative.
    pub fn new(stdev: f64) -> Result<Self, ModelError> {
        if !stdev.is_finite() || stdev < 0.0 {
            return Err(ModelError::InvalidParameter {
                name: "stdev",
                reason: format!("must be finite and non-negative, got {stdev}"),
            });
        }
        Ok(Self { stdev })
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }
}

impl<B: Backend> Corruptor<B> for GaussianCorruptor {
    fn corrupt(&self, x: Tensor<B, 2>, rng: &mut StdRng) -> Tensor<B, 2> {
        if self.stdev == 0.0 {
            return x;
        }
        let device = x.device();
        let noise = standard_normal::<B>(x.dims(), rng, &device);
        x + noise.mul_scalar(self.stdev)
    }

    /// `‖corrupted - original‖² / 2σ²`, the negative log of the Gaussian kernel
    /// up to a constant.
    fn corruption_free_energy(&self, corrupted: Tensor<B, 2>, original: Tensor<B, 2>) -> Tensor<B, 1> {
        if self.stdev == 0.0 {
            // Point mass at `original`: a constant energy with zero score,
            // kept on the graph of `corrupted`.
            return (corrupted - original).mul_scalar(0.0).sum_dim(1).squeeze::<1>(1);
        }
        (corrupted - original)
            .powf_scalar(2.0)
            .sum_dim(1)
            .squeeze::<1>(1)
            .div_scalar(2.0 * self.stdev * self.stdev)
    }
}
