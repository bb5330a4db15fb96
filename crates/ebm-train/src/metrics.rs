//! Training metrics for RBM training with health checks.

use burn::prelude::*;
use models::{EnergyModel, Rbm};

/// Per-step metrics, computed on the non-autodiff copy of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainMetrics {
    /// Value of the training cost.
    pub cost: f64,
    /// Mean free energy of the data batch.
    pub data_free_energy: f64,
    /// Mean squared error of the mean-field reconstruction `v -> h -> v`.
    pub reconstruction_error: f64,
}

impl TrainMetrics {
    pub fn compute<B: Backend>(model: &Rbm<B>, batch: Tensor<B, 2>, cost: f64) -> Self {
        let data_free_energy: f64 = model.free_energy(batch.clone()).mean().into_scalar().elem();
        let reconstruction_error: f64 = model.reconstruction_error(batch).mean().into_scalar().elem();
        Self {
            cost,
            data_free_energy,
            reconstruction_error,
        }
    }

    /// Human-readable problems with these metrics. Empty means healthy.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.cost.is_finite() {
            warnings.push(format!("cost is not finite ({})", self.cost));
        }
        if !self.data_free_energy.is_finite() {
            warnings.push(format!("free energy is not finite ({})", self.data_free_energy));
        } else if self.data_free_energy.abs() > 1e4 {
            warnings.push(format!(
                "free energy {:.1} is diverging; lower the learning rate",
                self.data_free_energy
            ));
        }
        if !self.reconstruction_error.is_finite() {
            warnings.push("reconstruction error is not finite".to_string());
        }
        warnings
    }
}

/// Running average of [`TrainMetrics`] over a logging interval.
#[derive(Debug, Default)]
pub struct RunningAvg {
    cost: f64,
    free_energy: f64,
    recon: f64,
    pub count: usize,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, m: &TrainMetrics) {
        self.cost += m.cost;
        self.free_energy += m.data_free_energy;
        self.recon += m.reconstruction_error;
        self.count += 1;
    }

    pub fn avg_metrics(&self) -> Option<TrainMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(TrainMetrics {
            cost: self.cost / n,
            data_free_energy: self.free_energy / n,
            reconstruction_error: self.recon / n,
        })
    }

    pub fn display(&self) -> String {
        match self.avg_metrics() {
            Some(m) => format!(
                "cost={:.4} free_energy={:.3} recon={:.4}",
                m.cost, m.data_free_energy, m.reconstruction_error
            ),
            None => "no data".to_string(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
