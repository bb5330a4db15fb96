//! Numerically stable activations shared by models and costs.

use burn::prelude::*;

/// Softplus `ln(1 + e^x)` evaluated as `max(x, 0) + ln(1 + e^-|x|)`.
///
/// The naive form overflows for large positive `x` in f32; this form stays
/// finite over the whole float range and keeps a well-defined gradient.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let positive_part = x.clone().clamp_min(0.0);
    let tail = x.abs().neg().exp().log1p();
    positive_part + tail
}

/// `ln σ(x) = -softplus(-x)`.
pub fn log_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    softplus(x.neg()).neg()
}
