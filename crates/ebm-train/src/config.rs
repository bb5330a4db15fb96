//! TOML config loading for the trainer CLI.
//!
//! Deserializes `configs/train.toml`, which has `[model]`, `[cost]` and
//! `[training]` sections. Every field has a default, so an empty file (or no
//! file) is a valid configuration. CLI flags are merged on top.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use costs::{OnDisconnected, SecondDerivatives};
use models::VisibleUnits;
use serde::Deserialize;

use crate::pipeline::TrainingConfig;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct TrainToml {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub cost: CostSection,
    #[serde(default)]
    pub training: TrainingSection,
}

/// RBM hyperparameters. The visible count comes from the data.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_nhid")]
    pub nhid: usize,
    #[serde(default = "default_visible")]
    pub visible: VisibleUnits,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_init_weight_std")]
    pub init_weight_std: f64,
}

fn default_nhid() -> usize {
    16
}
fn default_visible() -> VisibleUnits {
    VisibleUnits::Binary
}
fn default_sigma() -> f64 {
    1.0
}
fn default_init_weight_std() -> f64 {
    0.01
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            nhid: default_nhid(),
            visible: default_visible(),
            sigma: default_sigma(),
            init_weight_std: default_init_weight_std(),
        }
    }
}

/// Which training objective to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CostKind {
    /// k-step contrastive divergence.
    Cd,
    /// Persistent contrastive divergence (stochastic maximum likelihood).
    Pcd,
    /// Noise-contrastive estimation against a moment-matched Gaussian.
    Nce,
    /// Score matching.
    Sm,
    /// Denoising score matching with Gaussian corruption.
    Smd,
}

impl fmt::Display for CostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CostKind::Cd => "cd",
            CostKind::Pcd => "pcd",
            CostKind::Nce => "nce",
            CostKind::Sm => "sm",
            CostKind::Smd => "smd",
        };
        f.write_str(name)
    }
}

/// Cost selection and cost-specific hyperparameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CostSection {
    #[serde(default = "default_kind")]
    pub kind: CostKind,
    /// Gibbs transitions per step (CD and PCD).
    #[serde(default = "default_nsteps")]
    pub nsteps: usize,
    /// Noise samples per clean example (NCE).
    #[serde(default = "default_noise_per_clean")]
    pub noise_per_clean: usize,
    /// Corruption standard deviation (SMD).
    #[serde(default = "default_corruption_stdev")]
    pub corruption_stdev: f64,
    /// Second-derivative source (SM). Training needs `analytic`.
    #[serde(default = "default_second_derivatives")]
    pub second_derivatives: SecondDerivatives,
    #[serde(default)]
    pub on_disconnected: OnDisconnected,
}

fn default_kind() -> CostKind {
    CostKind::Cd
}
fn default_nsteps() -> usize {
    1
}
fn default_noise_per_clean() -> usize {
    1
}
fn default_corruption_stdev() -> f64 {
    0.1
}
fn default_second_derivatives() -> SecondDerivatives {
    SecondDerivatives::Analytic
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            nsteps: default_nsteps(),
            noise_per_clean: default_noise_per_clean(),
            corruption_stdev: default_corruption_stdev(),
            second_derivatives: default_second_derivatives(),
            on_disconnected: OnDisconnected::default(),
        }
    }
}

/// Optimizer and loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSection {
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    #[serde(default = "default_total_steps")]
    pub total_steps: usize,
    #[serde(default = "default_warmup_steps")]
    pub warmup_steps: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default)]
    pub seed: u64,
    /// Rows generated when no data file is given.
    #[serde(default = "default_synthetic_examples")]
    pub synthetic_examples: usize,
}

fn default_lr() -> f64 {
    1e-3
}
fn default_max_grad_norm() -> f64 {
    1.0
}
fn default_total_steps() -> usize {
    1_000
}
fn default_warmup_steps() -> usize {
    50
}
fn default_batch_size() -> usize {
    32
}
fn default_log_interval() -> usize {
    100
}
fn default_checkpoint_interval() -> usize {
    500
}
fn default_synthetic_examples() -> usize {
    512
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            lr: default_lr(),
            weight_decay: 0.0,
            max_grad_norm: default_max_grad_norm(),
            total_steps: default_total_steps(),
            warmup_steps: default_warmup_steps(),
            batch_size: default_batch_size(),
            log_interval: default_log_interval(),
            checkpoint_interval: default_checkpoint_interval(),
            seed: 0,
            synthetic_examples: default_synthetic_examples(),
        }
    }
}

impl TrainingSection {
    /// Build the loop configuration, writing checkpoints under `checkpoint_dir`.
    pub fn to_config(&self, checkpoint_dir: &Path) -> TrainingConfig {
        TrainingConfig::new()
            .with_lr(self.lr)
            .with_weight_decay(self.weight_decay)
            .with_max_grad_norm(self.max_grad_norm)
            .with_total_steps(self.total_steps)
            .with_warmup_steps(self.warmup_steps)
            .with_batch_size(self.batch_size)
            .with_log_interval(self.log_interval)
            .with_checkpoint_interval(self.checkpoint_interval)
            .with_checkpoint_dir(checkpoint_dir.display().to_string())
    }
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: TrainToml =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded train config");
    Ok(config)
}

/// Apply CLI overrides. Priority: defaults < TOML < CLI.
pub fn apply_overrides(config: &mut TrainToml, cost: Option<CostKind>, steps: Option<usize>) {
    if let Some(kind) = cost {
        config.cost.kind = kind;
    }
    if let Some(n) = steps {
        config.training.total_steps = n;
        config.training.warmup_steps = config.training.warmup_steps.min(n);
    }
}
