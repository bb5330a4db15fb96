//! Parameter gradients of a scalar cost, with an explicit policy for
//! parameters the cost never touches.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};

/// What to do with a parameter that has no path to the cost.
///
/// CD and PCD never reach an RBM's `log_partition`, so the default reports a
/// zero gradient for it instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDisconnected {
    /// Register an all-zero gradient of the parameter's shape.
    #[default]
    Zero,
    /// Fail with [`CostError::DisconnectedParameter`].
    Error,
}

/// Run one backward pass from `loss` and collect a gradient for every
/// parameter of `model`.
pub fn collect_gradients<B, M>(loss: Tensor<B, 1>, model: &M, policy: OnDisconnected) -> Result<GradientsParams>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut grads = GradientsParams::from_grads(loss.backward(), model);
    let mut filler = DisconnectedFiller::<B> {
        grads: &mut grads,
        disconnected: Vec::new(),
        _backend: PhantomData,
    };
    model.visit(&mut filler);
    let disconnected = filler.disconnected;

    if !disconnected.is_empty() {
        match policy {
            OnDisconnected::Zero => {
                tracing::debug!(count = disconnected.len(), "Zero gradients for disconnected parameters");
            }
            OnDisconnected::Error => return Err(CostError::DisconnectedParameter(disconnected)),
        }
    }
    Ok(grads)
}

/// Registers a zero gradient for every float parameter missing from `grads`.
struct DisconnectedFiller<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    disconnected: Vec<ParamId>,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for DisconnectedFiller<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        if self.grads.get::<B::InnerBackend, D>(id).is_none() {
            self.grads
                .register::<B::InnerBackend, D>(id, tensor.clone().inner().zeros_like());
            self.disconnected.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use models::{EnergyModel, Rbm, VisibleUnits};

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;
    type Inner = NdArray<f32>;

    fn rbm(device: &<TestAutodiffBackend as Backend>::Device) -> Rbm<TestAutodiffBackend> {
        Rbm::from_tensors(
            Tensor::from_data(TensorData::from([[0.3_f32, -0.2], [0.1, 0.4]]), device),
            Tensor::from_data(TensorData::from([0.1_f32, -0.1]), device),
            Tensor::from_data(TensorData::from([0.0_f32, 0.2]), device),
            VisibleUnits::Binary,
            1.0,
        )
        .unwrap()
    }

    fn free_energy_loss(model: &Rbm<TestAutodiffBackend>) -> Tensor<TestAutodiffBackend, 1> {
        let device = Default::default();
        let v = Tensor::from_data(TensorData::from([[1.0_f32, 0.0], [0.0, 1.0]]), &device);
        model.free_energy(v).mean()
    }

    #[test]
    fn test_zero_policy_fills_disconnected() {
        let device = Default::default();
        let model = rbm(&device);
        let grads = collect_gradients(free_energy_loss(&model), &model, OnDisconnected::Zero).unwrap();

        let lp_grad = grads
            .get::<Inner, 1>(model.log_partition().id)
            .expect("disconnected parameter should still get a gradient");
        assert_eq!(lp_grad.dims(), [1]);
        let lp_sum: f32 = lp_grad.abs().sum().into_scalar().elem();
        assert_eq!(lp_sum, 0.0);

        let w_grad = grads
            .get::<Inner, 2>(model.weights().id)
            .expect("weights should have a gradient");
        let w_sum: f32 = w_grad.abs().sum().into_scalar().elem();
        assert!(w_sum > 0.0);
    }

    #[test]
    fn test_error_policy_reports_disconnected() {
        let device = Default::default();
        let model = rbm(&device);
        let err = collect_gradients(free_energy_loss(&model), &model, OnDisconnected::Error).unwrap_err();
        match err {
            CostError::DisconnectedParameter(ids) => {
                assert_eq!(ids, vec![model.log_partition().id]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fully_connected_passes_error_policy() {
        let device = Default::default();
        let model = rbm(&device);
        let v = Tensor::from_data(TensorData::from([[1.0_f32, 0.0]]), &device);
        let loss = model.log_prob(v).mean();
        let grads = collect_gradients(loss, &model, OnDisconnected::Error).unwrap();
        assert_eq!(grads.len(), 4);
    }
}
