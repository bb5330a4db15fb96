//! Energy-based models and the distributions their training costs consume.
//!
//! Provides the collaborator contracts used by the `costs` crate
//! ([`EnergyModel`], [`NoiseDistribution`], [`Corruptor`]), a restricted
//! Boltzmann machine with binary or Gaussian visible units, a diagonal
//! multivariate normal with closed-form KL divergence, and a line-search
//! batch gradient descent used to fit small parameter sets.

pub mod activation;
pub mod corruption;
pub mod error;
pub mod mnd;
pub mod optim;
pub mod rbm;
pub mod sampling;
pub mod traits;

pub use corruption::GaussianCorruptor;
pub use error::ModelError;
pub use mnd::{kl_divergence, kl_divergence_params, DiagonalMnd, DiagonalMndConfig};
pub use rbm::{Rbm, RbmConfig, VisibleUnits};
pub use traits::{Corruptor, EnergyModel, GibbsStep, NoiseDistribution};
