//! Denoising Score Matching (Vincent, 2011).
//!
//! Matches the model score at a corrupted point to the score of the
//! corruption kernel pointing back at the clean example.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use models::{Corruptor, EnergyModel};
use rand::rngs::StdRng;

use crate::cost::Cost;
use crate::error::Result;
use crate::space::ensure_shape;

#[derive(Debug, Clone)]
pub struct DenoisingScoreMatching<C> {
    corruptor: C,
}

impl<C> DenoisingScoreMatching<C> {
    pub fn new(corruptor: C) -> Self {
        Self { corruptor }
    }

    pub fn corruptor(&self) -> &C {
        &self.corruptor
    }
}

/// `-∂/∂corrupted Σ corruption_free_energy(corrupted, clean)`, detached.
fn parzen_score<B, C>(corruptor: &C, corrupted: Tensor<B, 2>, clean: Tensor<B, 2>) -> Tensor<B, 2>
where
    B: AutodiffBackend,
    C: Corruptor<B>,
{
    let leaf = corrupted.detach().require_grad();
    let grads = corruptor
        .corruption_free_energy(leaf.clone(), clean.detach())
        .sum()
        .neg()
        .backward();
    let grad = leaf
        .grad(&grads)
        .unwrap_or_else(|| leaf.clone().inner().zeros_like());
    Tensor::from_inner(grad)
}

impl<B, M, C> Cost<B, M> for DenoisingScoreMatching<C>
where
    B: AutodiffBackend,
    M: EnergyModel<B> + AutodiffModule<B>,
    C: Corruptor<B>,
{
    fn expr(&self, model: &M, data: Tensor<B, 2>, rng: &mut StdRng) -> Result<Tensor<B, 1>> {
        <Self as Cost<B, M>>::data_specs(self, model).validate("data", &data)?;
        let dims = data.dims();

        let corrupted = self.corruptor.corrupt(data.clone(), rng);
        ensure_shape("corrupted data", &corrupted, dims)?;

        let model_score = model.score(corrupted.clone());
        ensure_shape("model score", &model_score, dims)?;
        let parzen = parzen_score(&self.corruptor, corrupted, data);
        ensure_shape("parzen score", &parzen, dims)?;
        tracing::debug!(batch = dims[0], dim = dims[1], "Building SMD objective");

        Ok((model_score - parzen).powf_scalar(2.0).mean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CostError;
    use crate::sm::tests::Quadratic;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use models::{GaussianCorruptor, RbmConfig, VisibleUnits};
    use rand::SeedableRng;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    /// Leaves the data untouched; kernel energy `‖c - x‖² / 2`.
    struct Identity;

    impl<B: Backend> Corruptor<B> for Identity {
        fn corrupt(&self, x: Tensor<B, 2>, _rng: &mut StdRng) -> Tensor<B, 2> {
            x
        }

        fn corruption_free_energy(&self, corrupted: Tensor<B, 2>, original: Tensor<B, 2>) -> Tensor<B, 1> {
            (corrupted - original).powf_scalar(2.0).sum_dim(1).squeeze::<1>(1).mul_scalar(0.5)
        }
    }

    /// Appends a column, breaking the shape contract.
    struct Widening;

    impl<B: Backend> Corruptor<B> for Widening {
        fn corrupt(&self, x: Tensor<B, 2>, _rng: &mut StdRng) -> Tensor<B, 2> {
            let [n, _] = x.dims();
            let extra = Tensor::zeros([n, 1], &x.device());
            Tensor::cat(vec![x, extra], 1)
        }

        fn corruption_free_energy(&self, corrupted: Tensor<B, 2>, _original: Tensor<B, 2>) -> Tensor<B, 1> {
            corrupted.sum_dim(1).squeeze::<1>(1)
        }
    }

    fn batch() -> Tensor<TestAutodiffBackend, 2> {
        Tensor::from_data(
            TensorData::from([[1.0_f32, 0.0, 1.0], [0.0, 1.0, 1.0], [0.3, -0.4, 0.9]]),
            &Default::default(),
        )
    }

    #[test]
    fn test_zero_corruption_compares_model_score_with_zero() {
        let device = Default::default();
        let model = RbmConfig::new(3, 4)
            .with_visible(VisibleUnits::Gaussian)
            .with_init_weight_std(0.3)
            .init::<TestAutodiffBackend>(&device);
        let cost = DenoisingScoreMatching::new(Identity);

        let value: f32 = cost
            .expr(&model, batch(), &mut StdRng::seed_from_u64(0))
            .unwrap()
            .into_scalar()
            .elem();
        let expected: f32 = model.score(batch()).powf_scalar(2.0).mean().into_scalar().elem();
        assert!((value - expected).abs() < 1e-6, "got {value}, expected {expected}");
    }

    #[test]
    fn test_zero_stdev_gaussian_matches_identity() {
        let device = Default::default();
        let model = RbmConfig::new(3, 4)
            .with_visible(VisibleUnits::Gaussian)
            .with_init_weight_std(0.3)
            .init::<TestAutodiffBackend>(&device);
        let gaussian = DenoisingScoreMatching::new(GaussianCorruptor::new(0.0).unwrap());
        assert_eq!(gaussian.corruptor().stdev(), 0.0);

        let a: f32 = gaussian
            .expr(&model, batch(), &mut StdRng::seed_from_u64(0))
            .unwrap()
            .into_scalar()
            .elem();
        let b: f32 = DenoisingScoreMatching::new(Identity)
            .expr(&model, batch(), &mut StdRng::seed_from_u64(0))
            .unwrap()
            .into_scalar()
            .elem();
        assert!(a.is_finite());
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }

    #[test]
    fn test_quadratic_model_matches_gaussian_kernel() {
        // Model score -(c - μ) equals the kernel score -(c - x)/σ² when σ = 1 and μ = x.
        let device = Default::default();
        let x = Tensor::<TestAutodiffBackend, 2>::from_data(TensorData::from([[0.5_f32, -1.0]]), &device);
        let model = Quadratic::<TestAutodiffBackend>::new(Tensor::from_data(TensorData::from([0.5_f32, -1.0]), &device));
        let cost = DenoisingScoreMatching::new(GaussianCorruptor::new(1.0).unwrap());

        let value: f32 = cost
            .expr(&model, x, &mut StdRng::seed_from_u64(5))
            .unwrap()
            .into_scalar()
            .elem();
        assert!(value.abs() < 1e-10, "got {value}");
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let device = Default::default();
        let model = RbmConfig::new(3, 2).init::<TestAutodiffBackend>(&device);
        let cost = DenoisingScoreMatching::new(Widening);
        let err = cost
            .expr(&model, batch(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, CostError::ShapeMismatch { what: "corrupted data", .. }));
    }

    #[test]
    fn test_gradients_flow_to_model_only() {
        let device = Default::default();
        let model = RbmConfig::new(3, 2)
            .with_visible(VisibleUnits::Gaussian)
            .with_init_weight_std(0.3)
            .init::<TestAutodiffBackend>(&device);
        let cost = DenoisingScoreMatching::new(GaussianCorruptor::new(0.5).unwrap());
        let out = cost
            .get_gradients(&model, batch(), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!(out.value.is_finite() && out.value >= 0.0);
        assert!(out.updates.is_none());
        let lp: f32 = out
            .gradients
            .get::<NdArray<f32>, 1>(model.log_partition().id)
            .unwrap()
            .abs()
            .sum()
            .into_scalar()
            .elem();
        assert_eq!(lp, 0.0);
    }
}
