//! Integration tests for the costs crate.
//!
//! Each cost is driven through full training steps: cost -> gradients ->
//! optimizer -> (sampler updates). All use the NdArray backend and small
//! synthetic batches.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, Optimizer};
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::SeedableRng;

use costs::{
    collect_gradients, CdkConfig, Cost, CostError, DenoisingScoreMatching, NceConfig, OnDisconnected,
    ScoreMatchingConfig, SecondDerivatives, SmlConfig,
};
use models::{
    DiagonalMnd, EnergyModel, GaussianCorruptor, NoiseDistribution, Rbm, RbmConfig, VisibleUnits,
};

type TestAutodiffBackend = Autodiff<NdArray<f32>>;

fn binary_batch() -> Tensor<TestAutodiffBackend, 2> {
    Tensor::from_data(
        TensorData::from([
            [1.0_f32, 1.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        ]),
        &Default::default(),
    )
}

fn real_batch() -> Tensor<TestAutodiffBackend, 2> {
    Tensor::from_data(
        TensorData::from([
            [0.9_f32, -0.2, 1.4],
            [1.1, 0.1, 0.8],
            [-0.4, 0.7, 1.0],
            [0.2, -0.9, 1.6],
            [0.5, 0.3, 0.4],
            [1.3, -0.5, 1.1],
        ]),
        &Default::default(),
    )
}

fn values<const D: usize>(t: Tensor<TestAutodiffBackend, D>) -> Vec<f32> {
    t.into_data().to_vec().unwrap()
}

// ---------------------------------------------------------------------------
// Test 1: CD-k training step leaves the disconnected log-partition untouched
// ---------------------------------------------------------------------------

#[test]
fn test_cd_training_step() {
    let device = Default::default();
    let mut model = RbmConfig::new(6, 4)
        .with_init_weight_std(0.1)
        .init::<TestAutodiffBackend>(&device);
    let cost = CdkConfig::new().with_nsteps(2).init();
    assert_eq!(cost.nsteps(), 2);
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(7);

    let log_z_before = values(model.log_partition().val());
    let weights_before = values(model.weights().val());

    for _ in 0..3 {
        let out = cost.get_gradients(&model, binary_batch(), &mut rng).unwrap();
        assert!(out.value.is_finite(), "CD cost should be finite");
        assert!(out.updates.is_none(), "CD carries no sampler state");
        model = optim.step(0.01.into(), model, out.gradients);
    }

    assert_eq!(log_z_before, values(model.log_partition().val()));
    assert_ne!(weights_before, values(model.weights().val()));
}

// ---------------------------------------------------------------------------
// Test 2: PCD applies parameter gradients and chain updates together
// ---------------------------------------------------------------------------

#[test]
fn test_pcd_training_loop_advances_chains() {
    let device = Default::default();
    let mut model = RbmConfig::new(6, 4)
        .with_init_weight_std(0.1)
        .init::<TestAutodiffBackend>(&device);
    let mut sml = SmlConfig::new(4).with_nsteps(2).init::<TestAutodiffBackend>().unwrap();
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(11);
    assert!(!sml.is_initialized());
    sml.initialize(&model, &device, &mut rng);
    assert!(sml.is_initialized());
    assert_eq!(sml.nsteps(), 2);

    let mut history = Vec::new();
    for _ in 0..4 {
        let out = sml.get_gradients(&model, binary_batch(), &mut rng).unwrap();
        assert!(out.value.is_finite());
        model = optim.step(0.01.into(), model, out.gradients);
        sml.apply_updates(out.updates.expect("PCD returns sampler updates")).unwrap();
        history.push(values(sml.particles().unwrap().clone()));
    }

    for particles in &history {
        assert_eq!(particles.len(), 24);
        assert!(particles.iter().all(|&x| x == 0.0 || x == 1.0));
    }
}

#[test]
fn test_pcd_chains_reproducible_from_seed() {
    let device = Default::default();
    let model = RbmConfig::new(6, 4)
        .with_init_weight_std(0.5)
        .init::<TestAutodiffBackend>(&device);

    let run = |seed: u64| {
        let mut sml = SmlConfig::new(3).init::<TestAutodiffBackend>().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        sml.initialize(&model, &device, &mut rng);
        for _ in 0..3 {
            let out = sml.get_gradients(&model, binary_batch(), &mut rng).unwrap();
            sml.apply_updates(out.updates.unwrap()).unwrap();
        }
        values(sml.particles().unwrap().clone())
    };
    assert_eq!(run(5), run(5));
}

// ---------------------------------------------------------------------------
// Test 3: NCE against a moment-matched Gaussian, fixed noise batch
// ---------------------------------------------------------------------------

#[test]
fn test_nce_objective_decreases_with_fixed_noise() {
    let device = Default::default();
    let mut model = RbmConfig::new(3, 4)
        .with_visible(VisibleUnits::Gaussian)
        .with_init_weight_std(0.1)
        .init::<TestAutodiffBackend>(&device);
    let noise = DiagonalMnd::from_moments(real_batch(), 1e-6, 1e6);
    let nce = NceConfig::new().with_noise_per_clean(2).init(noise).unwrap();
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(3);

    let noisy = nce.noise().random_design_matrix(12, &mut rng, &device);

    let mut losses = Vec::new();
    for _ in 0..30 {
        let loss = nce
            .expr_with_noise(&model, real_batch(), Some(noisy.clone()), &mut rng)
            .unwrap();
        losses.push(loss.clone().into_scalar().elem::<f32>());
        let grads = collect_gradients(loss, &model, OnDisconnected::Error).unwrap();
        model = optim.step(0.01.into(), model, grads);
    }

    let first = losses[0];
    let last = *losses.last().unwrap();
    assert!(losses.iter().all(|l| l.is_finite()));
    assert!(last < first, "NCE objective should decrease: {first} -> {last}");
}

#[test]
fn test_nce_reaches_log_partition() {
    let device = Default::default();
    let model = RbmConfig::new(3, 2)
        .with_visible(VisibleUnits::Gaussian)
        .init::<TestAutodiffBackend>(&device);
    let nce = NceConfig::new()
        .init(DiagonalMnd::from_moments(real_batch(), 1e-6, 1e6))
        .unwrap();
    let out = nce
        .get_gradients(&model, real_batch(), &mut StdRng::seed_from_u64(0))
        .unwrap();
    let g: f32 = out
        .gradients
        .get::<NdArray<f32>, 1>(model.log_partition().id)
        .unwrap()
        .abs()
        .sum()
        .into_scalar()
        .elem();
    assert!(g > 0.0, "NCE should train the log-partition estimate");
}

// ---------------------------------------------------------------------------
// Test 4: Score matching with closed-form second derivatives trains
// ---------------------------------------------------------------------------

#[test]
fn test_score_matching_training_decreases_objective() {
    let device = Default::default();
    let mut model = RbmConfig::new(3, 4)
        .with_visible(VisibleUnits::Gaussian)
        .with_init_weight_std(0.1)
        .init::<TestAutodiffBackend>(&device);
    let cost = ScoreMatchingConfig::new()
        .with_second_derivatives(SecondDerivatives::Analytic)
        .init();
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(0);

    let mut losses = Vec::new();
    for _ in 0..30 {
        let out = cost.get_gradients(&model, real_batch(), &mut rng).unwrap();
        losses.push(out.value);
        model = optim.step(0.02.into(), model, out.gradients);
    }
    let first = losses[0];
    let last = *losses.last().unwrap();
    assert!(last < first, "SM objective should decrease: {first} -> {last}");
}

// ---------------------------------------------------------------------------
// Test 5: Denoising score matching step
// ---------------------------------------------------------------------------

#[test]
fn test_smd_training_step() {
    let device = Default::default();
    let model = RbmConfig::new(3, 4)
        .with_visible(VisibleUnits::Gaussian)
        .with_init_weight_std(0.1)
        .init::<TestAutodiffBackend>(&device);
    let cost = DenoisingScoreMatching::new(GaussianCorruptor::new(0.3).unwrap());
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(21);

    let out = cost.get_gradients(&model, real_batch(), &mut rng).unwrap();
    assert!(out.value.is_finite() && out.value >= 0.0);
    let before = values(model.vbias().val());
    let model = optim.step(0.01.into(), model, out.gradients);
    assert_ne!(before, values(model.vbias().val()));
}

// ---------------------------------------------------------------------------
// Test 6: Every cost validates batches against the model's data space
// ---------------------------------------------------------------------------

#[test]
fn test_all_costs_reject_wrong_width() {
    let device = Default::default();
    let model: Rbm<TestAutodiffBackend> = RbmConfig::new(3, 2)
        .with_visible(VisibleUnits::Gaussian)
        .init(&device);
    let wrong = Tensor::<TestAutodiffBackend, 2>::zeros([2, 4], &device);
    let mut rng = StdRng::seed_from_u64(0);

    let mut sml = SmlConfig::new(2).init::<TestAutodiffBackend>().unwrap();
    sml.initialize(&model, &device, &mut rng);
    let nce = NceConfig::new()
        .init(DiagonalMnd::from_moments(real_batch(), 1e-6, 1e6))
        .unwrap();

    let costs: Vec<Box<dyn Cost<TestAutodiffBackend, Rbm<TestAutodiffBackend>>>> = vec![
        Box::new(CdkConfig::new().init()),
        Box::new(sml),
        Box::new(nce),
        Box::new(ScoreMatchingConfig::new().init()),
        Box::new(DenoisingScoreMatching::new(GaussianCorruptor::new(0.1).unwrap())),
    ];
    for cost in &costs {
        assert_eq!(cost.data_specs(&model).dim, model.input_dim());
        assert!(matches!(
            cost.expr(&model, wrong.clone(), &mut rng),
            Err(CostError::ShapeMismatch { what: "data", .. })
        ));
    }
}
