use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ebm_train::config::CostKind;
use ebm_train::pipeline::{self, KlArgs, TrainArgs};

/// ebm-train: fit energy-based models with NCE, score matching, CD or PCD.
#[derive(Parser)]
#[command(name = "ebm-train", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train an RBM on a data matrix.
    Train {
        /// Path to train config TOML file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Data matrix, one example per line. Synthetic data when omitted.
        #[arg(long)]
        data: Option<PathBuf>,
        /// Override the training cost.
        #[arg(long, value_enum)]
        cost: Option<CostKind>,
        /// Override total training steps.
        #[arg(long)]
        steps: Option<usize>,
        /// Directory for saving checkpoints.
        #[arg(long, default_value = "checkpoints/rbm")]
        output_dir: PathBuf,
    },
    /// Minimize the KL divergence between two random diagonal normals.
    Kl {
        /// Dimensionality of the two distributions.
        #[arg(long, default_value_t = 3)]
        dim: usize,
        /// Seed for the sampled parameters.
        #[arg(long, default_value_t = 123)]
        seed: u64,
        /// Maximum accepted gradient steps.
        #[arg(long, default_value_t = 10_000)]
        max_iters: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            data,
            cost,
            steps,
            output_dir,
        } => pipeline::run_train(TrainArgs {
            config,
            data,
            cost,
            steps,
            output_dir,
        }),
        Command::Kl {
            dim,
            seed,
            max_iters,
        } => pipeline::run_kl(KlArgs {
            dim,
            seed,
            max_iters,
        }),
    }
}
