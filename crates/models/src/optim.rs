//! Full-batch gradient descent with a backtracking line search.
//!
//! Operates on a flat list of 1-D parameter tensors rather than a module, so
//! objectives that couple several modules (e.g. a KL divergence between two
//! distributions) can be minimized jointly. A constrainer runs after every
//! accepted and every trial step.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Configuration for [`BatchGradientDescent`].
#[derive(Config, Debug)]
pub struct BatchGradientDescentConfig {
    /// Maximum number of accepted steps.
    #[config(default = 5_000)]
    pub max_iters: usize,
    /// Initial step size; each iteration starts from twice the last accepted step.
    #[config(default = 1.0)]
    pub init_step: f64,
    /// Armijo sufficient-decrease constant.
    #[config(default = 1e-4)]
    pub armijo: f64,
    /// Line search gives up (and the optimizer stops) below this step size.
    #[config(default = 1e-12)]
    pub min_step: f64,
    /// Stop as soon as the objective drops to this value or below.
    #[config(default = 0.0)]
    pub target: f64,
}

/// Outcome of [`BatchGradientDescent::minimize`].
#[derive(Debug)]
pub struct Minimized<B: AutodiffBackend> {
    pub params: Vec<Tensor<B::InnerBackend, 1>>,
    pub value: f64,
    pub iterations: usize,
}

pub struct BatchGradientDescent {
    config: BatchGradientDescentConfig,
}

impl BatchGradientDescentConfig {
    pub fn init(&self) -> BatchGradientDescent {
        BatchGradientDescent {
            config: self.clone(),
        }
    }
}

impl BatchGradientDescent {
    /// Minimize `objective` starting from `params`.
    ///
    /// `objective` receives autodiff leaves and must return a scalar tensor of
    /// shape (1,). `constrain` projects parameter values back onto the feasible
    /// set.
    pub fn minimize<B, F, C>(
        &self,
        objective: F,
        params: Vec<Tensor<B::InnerBackend, 1>>,
        constrain: C,
    ) -> Minimized<B>
    where
        B: AutodiffBackend,
        F: Fn(&[Tensor<B, 1>]) -> Tensor<B, 1>,
        C: Fn(Vec<Tensor<B::InnerBackend, 1>>) -> Vec<Tensor<B::InnerBackend, 1>>,
    {
        let config = &self.config;
        let evaluate = |values: &[Tensor<B::InnerBackend, 1>]| -> f64 {
            let leaves: Vec<Tensor<B, 1>> = values
                .iter()
                .cloned()
                .map(|p| Tensor::<B, 1>::from_inner(p))
                .collect();
            objective(&leaves).into_scalar().elem::<f64>()
        };

        let mut params = constrain(params);
        let mut value = evaluate(&params);
        let mut step = config.init_step / 2.0;
        let mut iterations = 0;

        while iterations < config.max_iters && value > config.target {
            let leaves: Vec<Tensor<B, 1>> = params
                .iter()
                .cloned()
                .map(|p| Tensor::<B, 1>::from_inner(p).require_grad())
                .collect();
            let grads = objective(&leaves).backward();
            let gradient: Vec<Tensor<B::InnerBackend, 1>> = leaves
                .iter()
                .zip(&params)
                .map(|(leaf, p)| leaf.grad(&grads).unwrap_or_else(|| p.zeros_like()))
                .collect();
            let grad_sq: f64 = gradient
                .iter()
                .map(|g| g.clone().powf_scalar(2.0).sum().into_scalar().elem::<f64>())
                .sum();
            if grad_sq == 0.0 {
                break;
            }

            step *= 2.0;
            let accepted = loop {
                let trial: Vec<_> = params
                    .iter()
                    .zip(&gradient)
                    .map(|(p, g)| p.clone() - g.clone().mul_scalar(step))
                    .collect();
                let trial = constrain(trial);
                let trial_value = evaluate(&trial);
                if trial_value.is_finite() && trial_value <= value - config.armijo * step * grad_sq {
                    break Some((trial, trial_value));
                }
                step /= 2.0;
                if step < config.min_step {
                    break None;
                }
            };

            match accepted {
                Some((trial, trial_value)) => {
                    params = trial;
                    value = trial_value;
                    iterations += 1;
                }
                None => {
                    tracing::debug!(iterations, value, "Line search stalled");
                    break;
                }
            }
        }

        tracing::debug!(iterations, value, "Batch gradient descent finished");
        Minimized {
            params,
            value,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;

    type TestAutodiffBackend = Autodiff<NdArray<f64>>;
    type Inner = NdArray<f64>;

    #[test]
    fn test_minimizes_quadratic() {
        let device = Default::default();
        let start = Tensor::<Inner, 1>::from_data(TensorData::from([3.0_f64, -2.0]), &device);
        let result = BatchGradientDescentConfig::new().init().minimize::<TestAutodiffBackend, _, _>(
            |p| (p[0].clone().sub_scalar(1.0)).powf_scalar(2.0).sum(),
            vec![start],
            |p| p,
        );
        assert!(result.value < 1e-10, "value {}", result.value);
        let x: Vec<f64> = result.params[0].clone().into_data().to_vec().unwrap();
        assert!((x[0] - 1.0).abs() < 1e-4 && (x[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_constrainer_applied() {
        let device = Default::default();
        let start = Tensor::<Inner, 1>::from_data(TensorData::from([3.0_f64]), &device);
        let result = BatchGradientDescentConfig::new()
            .with_max_iters(200)
            .init()
            .minimize::<TestAutodiffBackend, _, _>(
                |p| p[0].clone().powf_scalar(2.0).sum(),
                vec![start],
                |p| p.into_iter().map(|t| t.clamp_min(0.5)).collect(),
            );
        assert!((result.value - 0.25).abs() < 1e-9, "value {}", result.value);
    }
}
