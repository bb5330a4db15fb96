//! Training costs for unsupervised learning of energy-based models.
//!
//! Every cost turns a model and a data batch into a scalar objective to
//! minimize, and can produce parameter gradients together with any sampler
//! state updates the caller must apply in the same training step.
//!
//! - [`Nce`]: noise-contrastive estimation against a tractable noise model
//! - [`ScoreMatching`]: exact score matching via per-dimension backward passes
//! - [`DenoisingScoreMatching`]: score matching against a corruption kernel
//! - [`Sml`]: stochastic maximum likelihood (persistent contrastive divergence)
//! - [`Cdk`]: k-step contrastive divergence started at the data

pub mod cd;
pub mod cost;
pub mod error;
pub mod gradients;
pub mod nce;
pub mod sampler;
pub mod smd;
pub mod sm;
pub mod sml;
pub mod space;

pub use cd::{Cdk, CdkConfig};
pub use cost::{Cost, CostGradients};
pub use error::{CostError, Result};
pub use gradients::{collect_gradients, OnDisconnected};
pub use nce::{Nce, NceConfig};
pub use sampler::{BlockGibbsSampler, SamplerUpdates};
pub use sm::{ScoreMatching, ScoreMatchingConfig, SecondDerivatives};
pub use smd::DenoisingScoreMatching;
pub use sml::{Sml, SmlConfig};
pub use space::VectorSpace;
