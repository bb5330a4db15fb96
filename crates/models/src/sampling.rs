//! Random draws from an injected generator, materialized as burn tensors.
//!
//! Every stochastic operation in this workspace takes a `&mut StdRng` instead
//! of relying on the backend's global seed, so chains are reproducible from
//! the caller's generator alone.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Uniform samples on `[0, 1)` with the given shape.
pub fn uniform<B: Backend>(shape: [usize; 2], rng: &mut StdRng, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..shape[0] * shape[1]).map(|_| rng.gen::<f32>()).collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Standard normal samples with the given shape.
pub fn standard_normal<B: Backend>(
    shape: [usize; 2],
    rng: &mut StdRng,
    device: &B::Device,
) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..shape[0] * shape[1])
        .map(|_| rng.sample::<f32, _>(StandardNormal))
        .collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Elementwise Bernoulli draws with success probabilities `probs`.
///
/// The result carries no autodiff history.
pub fn bernoulli<B: Backend>(probs: Tensor<B, 2>, rng: &mut StdRng) -> Tensor<B, 2> {
    let device = probs.device();
    let u = uniform::<B>(probs.dims(), rng, &device);
    u.lower(probs.detach()).float()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_same_seed_same_draws() {
        let device = Default::default();
        let a = uniform::<TestBackend>([4, 3], &mut StdRng::seed_from_u64(11), &device);
        let b = uniform::<TestBackend>([4, 3], &mut StdRng::seed_from_u64(11), &device);
        let diff: f32 = (a - b).abs().sum().into_scalar().elem();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_bernoulli_extremes() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(3);
        let ones = bernoulli(Tensor::<TestBackend, 2>::ones([5, 4], &device), &mut rng);
        let zeros = bernoulli(Tensor::<TestBackend, 2>::zeros([5, 4], &device), &mut rng);
        let ones_sum: f32 = ones.sum().into_scalar().elem();
        let zeros_sum: f32 = zeros.sum().into_scalar().elem();
        assert_eq!(ones_sum, 20.0);
        assert_eq!(zeros_sum, 0.0);
    }

    #[test]
    fn test_standard_normal_moments() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(5);
        let x = standard_normal::<TestBackend>([2000, 2], &mut rng, &device);
        let mean: f32 = x.clone().mean().into_scalar().elem();
        let var: f32 = x.powf_scalar(2.0).mean().into_scalar().elem();
        assert!(mean.abs() < 0.1, "mean {mean}");
        assert!((var - 1.0).abs() < 0.1, "variance {var}");
    }
}
