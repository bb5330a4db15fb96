//! Subcommand pipelines: RBM training with a chosen cost, and the KL check.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use costs::{
    CdkConfig, Cost, DenoisingScoreMatching, Nce, NceConfig, SamplerUpdates, ScoreMatching,
    ScoreMatchingConfig, Sml, SmlConfig,
};
use models::mnd::{kl_divergence_params, DiagonalMnd};
use models::optim::BatchGradientDescentConfig;
use models::{GaussianCorruptor, Rbm, RbmConfig, VisibleUnits};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::{apply_overrides, load_train_toml, CostKind, CostSection, TrainToml};
use crate::data::{rows_to_tensor, Dataset};
use crate::metrics::{RunningAvg, TrainMetrics};

pub type TrainBackend = Autodiff<NdArray<f32>>;
type KlBackend = Autodiff<NdArray<f64>>;

const MIN_BETA: f64 = 1e-6;
const MAX_BETA: f64 = 1e6;

/// Configuration for the training loop.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Base learning rate for AdamW.
    #[config(default = 1e-3)]
    pub lr: f64,
    /// Weight decay for AdamW.
    #[config(default = 0.0)]
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping.
    #[config(default = 1.0)]
    pub max_grad_norm: f64,
    #[config(default = 1_000)]
    pub total_steps: usize,
    /// Number of linear warmup steps.
    #[config(default = 50)]
    pub warmup_steps: usize,
    /// Rows per minibatch; also the number of persistent chains for PCD.
    #[config(default = 32)]
    pub batch_size: usize,
    /// Steps between metric logging.
    #[config(default = 100)]
    pub log_interval: usize,
    /// Steps between checkpoint saves.
    #[config(default = 500)]
    pub checkpoint_interval: usize,
    #[config(default = "String::from(\"checkpoints/rbm\")")]
    pub checkpoint_dir: String,
}

/// Metadata saved alongside each checkpoint.
#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
pub struct CheckpointMeta {
    pub step: usize,
    pub cost: String,
    pub last_cost: f64,
}

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub cost: Option<CostKind>,
    pub steps: Option<usize>,
    pub output_dir: PathBuf,
}

/// Arguments for the `kl` subcommand.
#[derive(Debug)]
pub struct KlArgs {
    pub dim: usize,
    pub seed: u64,
    pub max_iters: usize,
}

/// Compute the learning rate at a given step using warmup + cosine decay.
///
/// - Warmup phase (`step < warmup_steps`): linearly ramps from 0 to `base_lr`.
/// - Cosine phase: decays from `base_lr` to 0 following a cosine schedule.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps) as f64 / decay_steps as f64).min(1.0);
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// The cost selected in `[cost]`, bound to this run's model and data.
enum TrainingCost<B: AutodiffBackend> {
    Cd(costs::Cdk),
    Pcd(Sml<B>),
    Nce(Nce<DiagonalMnd<B>>),
    Sm(ScoreMatching),
    Smd(DenoisingScoreMatching<GaussianCorruptor>),
}

impl<B: AutodiffBackend> TrainingCost<B> {
    fn build(
        section: &CostSection,
        model: &Rbm<B>,
        dataset: &Dataset,
        nchains: usize,
        device: &B::Device,
        rng: &mut StdRng,
    ) -> anyhow::Result<Self> {
        if matches!(section.kind, CostKind::Sm | CostKind::Smd) && model.visible() == VisibleUnits::Binary {
            tracing::warn!(cost = %section.kind, "Score matching assumes continuous visibles; use visible = \"gaussian\"");
        }
        let cost = match section.kind {
            CostKind::Cd => TrainingCost::Cd(
                CdkConfig::new()
                    .with_nsteps(section.nsteps)
                    .with_on_disconnected(section.on_disconnected)
                    .init(),
            ),
            CostKind::Pcd => {
                let mut sml = SmlConfig::new(nchains)
                    .with_nsteps(section.nsteps)
                    .with_on_disconnected(section.on_disconnected)
                    .init()?;
                sml.initialize(model, device, rng);
                TrainingCost::Pcd(sml)
            }
            CostKind::Nce => {
                let noise = DiagonalMnd::from_moments(dataset.to_tensor::<B>(device), MIN_BETA, MAX_BETA);
                let nce = NceConfig::new()
                    .with_noise_per_clean(section.noise_per_clean)
                    .init(noise)?;
                TrainingCost::Nce(nce)
            }
            CostKind::Sm => TrainingCost::Sm(
                ScoreMatchingConfig::new()
                    .with_second_derivatives(section.second_derivatives)
                    .init(),
            ),
            CostKind::Smd => {
                let corruptor =
                    GaussianCorruptor::new(section.corruption_stdev).context("Invalid [cost] corruption_stdev")?;
                TrainingCost::Smd(DenoisingScoreMatching::new(corruptor))
            }
        };
        Ok(cost)
    }

    fn as_cost(&self) -> &dyn Cost<B, Rbm<B>> {
        match self {
            TrainingCost::Cd(c) => c,
            TrainingCost::Pcd(c) => c,
            TrainingCost::Nce(c) => c,
            TrainingCost::Sm(c) => c,
            TrainingCost::Smd(c) => c,
        }
    }

    /// Commit sampler state for the step whose gradients were just applied.
    fn apply_updates(&mut self, updates: Option<SamplerUpdates<B>>) -> anyhow::Result<()> {
        if let (TrainingCost::Pcd(sml), Some(updates)) = (self, updates) {
            sml.apply_updates(updates)?;
        }
        Ok(())
    }
}

/// Run the RBM training loop.
///
/// Each step samples a minibatch, asks the cost for gradients, applies them
/// with AdamW and then commits any sampler updates, so parameters and
/// persistent chains always advance together.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    cost_section: &CostSection,
    model_config: &RbmConfig,
    mut model: Rbm<B>,
    dataset: &Dataset,
    device: &B::Device,
    rng: &mut StdRng,
) -> anyhow::Result<Rbm<B>> {
    std::fs::create_dir_all(&config.checkpoint_dir)?;

    let mut cost = TrainingCost::build(cost_section, &model, dataset, config.batch_size, device, rng)?;
    tracing::info!(
        cost = %cost_section.kind,
        nvis = model_config.nvis,
        nhid = model_config.nhid,
        rows = dataset.len(),
        "Training RBM"
    );

    let optim_config = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm as f32)));
    let mut optimizer = optim_config.init();

    let mut running_avg = RunningAvg::new();
    let train_start = Instant::now();
    let mut last_cost = f64::NAN;

    for step in 0..config.total_steps {
        let lr = lr_schedule(config.lr, config.warmup_steps, config.total_steps, step);

        let rows = dataset.sample_batch(config.batch_size, rng);
        let batch = rows_to_tensor::<B>(&rows, dataset.dim(), device);

        let out = cost
            .as_cost()
            .get_gradients(&model, batch.clone(), rng)
            .with_context(|| format!("{} cost failed at step {step}", cost_section.kind))?;
        last_cost = out.value;

        model = optimizer.step(lr, model, out.gradients);
        cost.apply_updates(out.updates)?;

        running_avg.update(&TrainMetrics::compute(&model.valid(), batch.inner(), last_cost));

        if config.log_interval > 0 && step % config.log_interval == 0 {
            if let Some(m) = running_avg.avg_metrics() {
                let warnings = m.health_check();
                if !warnings.is_empty() {
                    tracing::warn!(step, "Health check warnings: {:?}", warnings);
                }
            }
            let lr_str = format!("{lr:.2e}");
            tracing::info!(step, lr = %lr_str, "avg({}) {}", running_avg.count, running_avg.display());
            running_avg.reset();
        }

        if config.checkpoint_interval > 0 && step > 0 && step % config.checkpoint_interval == 0 {
            let step_dir = Path::new(&config.checkpoint_dir).join(format!("step_{step}"));
            let meta = CheckpointMeta {
                step,
                cost: cost_section.kind.to_string(),
                last_cost,
            };
            save_checkpoint(&step_dir, &model, model_config, &optimizer, &meta)?;
            tracing::info!(step, "Checkpoint saved (model + optimizer + meta)");
        }
    }

    tracing::info!(
        total_steps = config.total_steps,
        last_cost,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    let final_dir = Path::new(&config.checkpoint_dir).join("final");
    let meta = CheckpointMeta {
        step: config.total_steps,
        cost: cost_section.kind.to_string(),
        last_cost,
    };
    save_checkpoint(&final_dir, &model, model_config, &optimizer, &meta)?;
    tracing::info!(dir = %final_dir.display(), "Training complete. Final checkpoint saved.");

    Ok(model)
}

/// Write `model`, `optimizer`, `rbm_config.json` and `meta.json` into `dir`.
fn save_checkpoint<B, O>(
    dir: &Path,
    model: &Rbm<B>,
    model_config: &RbmConfig,
    optimizer: &O,
    meta: &CheckpointMeta,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Rbm<B>, B>,
{
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    model
        .clone()
        .save_file(dir.join("model"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {e}", dir.display()))?;
    Recorder::<B>::record(&recorder, optimizer.to_record(), dir.join("optimizer"))
        .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {}: {e}", dir.display()))?;
    model_config
        .save(dir.join("rbm_config.json"))
        .with_context(|| format!("Failed to save model config to {}", dir.display()))?;
    serde_json::to_writer_pretty(std::fs::File::create(dir.join("meta.json"))?, meta)?;
    Ok(())
}

/// Load an RBM from a checkpoint directory written by [`train`].
///
/// Rebuilds the model from `rbm_config.json`, then loads saved weights on top.
pub fn load_checkpoint<B: Backend>(dir: &Path, device: &B::Device) -> anyhow::Result<Rbm<B>> {
    let config_path = dir.join("rbm_config.json");
    let config = RbmConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", config_path.display()))?;
    config
        .init::<B>(device)
        .load_file(dir.join("model"), &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))
}

/// Read checkpoint metadata.
pub fn load_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let path = dir.join("meta.json");
    let file = std::fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Train an RBM from a TOML config, a data matrix (or synthetic data) and
/// CLI overrides.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut toml = match &args.config {
        Some(path) => load_train_toml(path)?,
        None => TrainToml::default(),
    };
    apply_overrides(&mut toml, args.cost, args.steps);

    let device = Default::default();
    TrainBackend::seed(toml.training.seed);
    let mut rng = StdRng::seed_from_u64(toml.training.seed);

    let dataset = match &args.data {
        Some(path) => Dataset::from_csv(path)?,
        None => {
            // Gaussian toy data has no natural width; pick one small enough to inspect.
            let dim = 16;
            tracing::info!(dim, rows = toml.training.synthetic_examples, "No data file given, using synthetic data");
            Dataset::synthetic(toml.model.visible, dim, toml.training.synthetic_examples, &mut rng)?
        }
    };

    let model_config = RbmConfig::new(dataset.dim(), toml.model.nhid)
        .with_visible(toml.model.visible)
        .with_sigma(toml.model.sigma)
        .with_init_weight_std(toml.model.init_weight_std);
    let model = model_config.init::<TrainBackend>(&device);
    let training = toml.training.to_config(&args.output_dir);

    let model = train(&training, &toml.cost, &model_config, model, &dataset, &device, &mut rng)?;

    let eval = TrainMetrics::compute(&model.valid(), dataset.to_tensor(&device), f64::NAN);
    println!("\n--- Training Summary ---");
    println!("Cost: {}", toml.cost.kind);
    println!("Steps: {}", training.total_steps);
    println!("Data free energy: {:.4}", eval.data_free_energy);
    println!("Reconstruction error: {:.4}", eval.reconstruction_error);
    println!("Checkpoints: {}", args.output_dir.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Outcome of [`optimize_kl`].
#[derive(Debug)]
pub struct KlReport {
    pub initial: f64,
    pub value: f64,
    pub iterations: usize,
}

/// `KL(q ‖ p)` with parameters ordered `[mu_p, beta_p, mu_q, beta_q]`.
fn kl_of_params<B: Backend>(params: &[Tensor<B, 1>]) -> Tensor<B, 1> {
    kl_divergence_params(params[2].clone(), params[3].clone(), params[0].clone(), params[1].clone())
}

/// Sample two diagonal normals and minimize the KL divergence between them
/// over all four parameter vectors, clamping precisions after every step.
pub fn optimize_kl(dim: usize, seed: u64, max_iters: usize) -> KlReport {
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vector = |beta: bool| -> Tensor<NdArray<f64>, 1> {
        let values: Vec<f64> = (0..dim)
            .map(|_| {
                if beta {
                    rng.gen_range(0.1..10.0)
                } else {
                    rng.sample(StandardNormal)
                }
            })
            .collect();
        Tensor::from_data(TensorData::new(values, [dim]), &device)
    };
    let mu_p = vector(false);
    let beta_p = vector(true);
    let mu_q = vector(false);
    let beta_q = vector(true);

    let start = vec![mu_p, beta_p, mu_q, beta_q];
    let initial: f64 = kl_of_params(&start).into_scalar().elem();

    let result = BatchGradientDescentConfig::new()
        .with_max_iters(max_iters)
        .init()
        .minimize::<KlBackend, _, _>(kl_of_params::<KlBackend>, start, |params| {
            params
                .into_iter()
                .enumerate()
                .map(|(i, t)| if i % 2 == 1 { t.clamp(MIN_BETA, MAX_BETA) } else { t })
                .collect()
        });

    KlReport {
        initial,
        value: result.value,
        iterations: result.iterations,
    }
}

/// Print the KL divergence before and after optimization.
pub fn run_kl(args: KlArgs) -> anyhow::Result<()> {
    if args.dim == 0 {
        bail!("--dim must be at least 1");
    }
    let report = optimize_kl(args.dim, args.seed, args.max_iters);
    tracing::info!(iterations = report.iterations, value = report.value, "KL optimization finished");

    println!("--- KL Divergence ---");
    println!("Dimensions: {}", args.dim);
    println!("Initial: {:.6e}", report.initial);
    println!("Final: {:.6e}", report.value);
    println!("Iterations: {}", report.iterations);
    Ok(())
}
