//! Training data: a dense `(n, dim)` matrix of f32 rows.
//!
//! Rows come from a CSV/whitespace-separated text file or from a small
//! synthetic generator, and are drawn into burn tensors one minibatch at a
//! time.

use std::path::Path;

use anyhow::{bail, Context};
use burn::prelude::*;
use burn::tensor::TensorData;
use models::VisibleUnits;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use rand_distr::StandardNormal;

#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Vec<f32>>,
    dim: usize,
}

impl Dataset {
    /// Build from rows of equal, non-zero width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> anyhow::Result<Self> {
        let Some(first) = rows.first() else {
            bail!("dataset has no rows");
        };
        let dim = first.len();
        if dim == 0 {
            bail!("dataset rows have no columns");
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            bail!("row {i} has {} columns, expected {dim}", row.len());
        }
        Ok(Self { rows, dim })
    }

    /// Read a matrix with one example per line. Values are separated by
    /// commas and/or whitespace; blank lines and lines starting with `#` are
    /// skipped.
    pub fn from_csv(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data {}", path.display()))?;
        let mut rows = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<f32>()
                        .with_context(|| format!("{}:{}: bad value {tok:?}", path.display(), lineno + 1))
                })
                .collect::<anyhow::Result<Vec<f32>>>()?;
            rows.push(row);
        }
        let dataset = Self::from_rows(rows).with_context(|| format!("Invalid data in {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = dataset.len(), dim = dataset.dim(), "Loaded data matrix");
        Ok(dataset)
    }

    /// Two-prototype toy data matching the visible unit type.
    ///
    /// Binary: the prototypes are the first and second half of the bits set,
    /// with each bit flipped with probability 0.05. Gaussian: two clusters at
    /// `±1` with unit noise.
    pub fn synthetic(visible: VisibleUnits, dim: usize, n: usize, rng: &mut StdRng) -> anyhow::Result<Self> {
        let rows = (0..n)
            .map(|i| {
                let first_half = i % 2 == 0;
                (0..dim)
                    .map(|j| {
                        let on = (j < dim / 2) == first_half;
                        match visible {
                            VisibleUnits::Binary => {
                                let flip = rng.gen_bool(0.05);
                                if on != flip {
                                    1.0
                                } else {
                                    0.0
                                }
                            }
                            VisibleUnits::Gaussian => {
                                let center = if on { 1.0 } else { -1.0 };
                                center + rng.sample::<f32, _>(StandardNormal)
                            }
                        }
                    })
                    .collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Draw `batch_size` distinct rows (all rows if the dataset is smaller).
    pub fn sample_batch(&self, batch_size: usize, rng: &mut StdRng) -> Vec<&[f32]> {
        let amount = batch_size.min(self.len());
        sample(rng, self.len(), amount)
            .into_iter()
            .map(|i| self.rows[i].as_slice())
            .collect()
    }

    /// The whole dataset as one `(n, dim)` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let rows: Vec<&[f32]> = self.rows.iter().map(Vec::as_slice).collect();
        rows_to_tensor(&rows, self.dim, device)
    }
}

/// Stack equal-width rows into a `(rows, dim)` tensor.
pub fn rows_to_tensor<B: Backend>(rows: &[&[f32]], dim: usize, device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [rows.len(), dim]), device)
}
