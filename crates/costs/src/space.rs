use burn::prelude::*;

use crate::error::{CostError, Result};

/// Data contract of a model: batches are `(n, dim)` design matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSpace {
    pub dim: usize,
}

impl VectorSpace {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Check that `batch` is a non-empty `(n, dim)` matrix.
    pub fn validate<B: Backend>(&self, what: &'static str, batch: &Tensor<B, 2>) -> Result<()> {
        let [rows, cols] = batch.dims();
        if cols != self.dim {
            return Err(CostError::ShapeMismatch {
                what,
                expected: vec![rows, self.dim],
                actual: vec![rows, cols],
            });
        }
        if rows == 0 || cols == 0 {
            return Err(CostError::EmptyBatch(what));
        }
        Ok(())
    }
}

/// Fail unless `tensor` has exactly `expected` as its shape. No broadcasting.
pub(crate) fn ensure_shape<B: Backend, const D: usize>(
    what: &'static str,
    tensor: &Tensor<B, D>,
    expected: [usize; D],
) -> Result<()> {
    let actual = tensor.dims();
    if actual != expected {
        return Err(CostError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_validate_accepts_matching_width() {
        let device = Default::default();
        let batch = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        assert!(VectorSpace::new(3).validate("data", &batch).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_width() {
        let device = Default::default();
        let batch = Tensor::<TestBackend, 2>::zeros([4, 5], &device);
        let err = VectorSpace::new(3).validate("noisy data", &batch).unwrap_err();
        assert!(matches!(err, CostError::ShapeMismatch { what: "noisy data", .. }));
        assert_eq!(err.to_string(), "noisy data has shape [4, 5], expected [4, 3]");
    }
}
