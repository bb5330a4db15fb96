use burn::module::ParamId;

/// Errors raised while building a cost or its gradients.
///
/// All of them are fatal for the current call; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum CostError {
    /// A batch or intermediate tensor does not have the shape the cost requires.
    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A batch with no rows or no columns.
    #[error("{0} is empty")]
    EmptyBatch(&'static str),

    /// Rejected hyperparameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stateful cost was used before `initialize`.
    #[error("{0} used before initialize()")]
    NotInitialized(&'static str),

    /// Parameters unreachable from the cost graph under `OnDisconnected::Error`.
    #[error("{} parameter(s) not connected to the cost: {0:?}", .0.len())]
    DisconnectedParameter(Vec<ParamId>),

    /// Parameter gradients requested through a term that has none.
    #[error("{0} carries no gradient to the model parameters")]
    NotDifferentiable(&'static str),

    /// Analytic second derivatives requested from a model without a closed form.
    #[error("Model does not provide a closed-form score Jacobian")]
    MissingSecondDerivatives,
}

pub type Result<T> = std::result::Result<T, CostError>;
