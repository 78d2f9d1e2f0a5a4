//! Closed-form row generators for the structural sub-kernels.
//!
//! With `kX = κ ⊙ X` and `s_ij = kX_i · kX_j`, the kernel splits into an
//! identity-shifted square term `(1 + s_ij)²`, a cross square term built from
//! `kX²`, a linear term `s_ij` and a constant. The linear and cross square
//! terms factor through `quad_mvm_dil`; the shifted square term (and, for
//! derivatives, the cross term `s_ij · (kX_i · dkX_j)`) need the providers
//! below.

use std::ops::Range;

use scirs2_core::ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::config::MvmConfig;
use crate::error::{KernelMvmError, Result};
use crate::partitioned::{partitioned_mvm, RowProvider};

/// Rows of `(1 + kX kXᵗ)²` (elementwise square).
#[derive(Debug, Clone, Copy)]
pub struct ShiftedSquareRows<'a> {
    kx: ArrayView2<'a, f64>,
}

impl<'a> ShiftedSquareRows<'a> {
    /// Build the provider over scaled features `kx` (N × P).
    pub fn new(kx: ArrayView2<'a, f64>) -> Self {
        Self { kx }
    }
}

impl RowProvider for ShiftedSquareRows<'_> {
    fn num_rows(&self) -> usize {
        self.kx.nrows()
    }

    fn row_len(&self) -> usize {
        self.kx.nrows()
    }

    fn rows(&self, range: Range<usize>) -> Array2<f64> {
        let gram = self.kx.slice(s![range, ..]).dot(&self.kx.t());
        gram.mapv_into(|v| (1.0 + v) * (1.0 + v))
    }

    fn name(&self) -> &str {
        "kxkx-sq"
    }
}

/// Rows of `(kX kXᵗ) ⊙ (dkX kXᵗ)`: entry `(i, j)` is `(kX_j · kX_i)(kX_j · dkX_i)`.
///
/// Only needed by the derivative rule.
#[derive(Debug, Clone, Copy)]
pub struct CrossSquareRows<'a> {
    kx: ArrayView2<'a, f64>,
    dkx: ArrayView2<'a, f64>,
}

impl<'a> CrossSquareRows<'a> {
    /// Build the provider; `kx` and `dkx` must share their shape.
    pub fn new(kx: ArrayView2<'a, f64>, dkx: ArrayView2<'a, f64>) -> Result<Self> {
        if kx.dim() != dkx.dim() {
            return Err(KernelMvmError::DimensionMismatch {
                expected: kx.shape().to_vec(),
                got: dkx.shape().to_vec(),
                context: "cross square rows (kX vs dkX)".to_string(),
            });
        }
        Ok(Self { kx, dkx })
    }
}

impl RowProvider for CrossSquareRows<'_> {
    fn num_rows(&self) -> usize {
        self.kx.nrows()
    }

    fn row_len(&self) -> usize {
        self.kx.nrows()
    }

    fn rows(&self, range: Range<usize>) -> Array2<f64> {
        let gram = self.kx.slice(s![range.clone(), ..]).dot(&self.kx.t());
        let cross = self.dkx.slice(s![range, ..]).dot(&self.kx.t());
        gram * cross
    }

    fn name(&self) -> &str {
        "kxdkx-sq"
    }
}

/// `(1 + kX kXᵗ)² b` without forming the `N × N` matrix.
pub fn kxkx_sq_mvm(
    b: ArrayView1<'_, f64>,
    kx: ArrayView2<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    partitioned_mvm(&ShiftedSquareRows::new(kx), b, config)
}

/// `((kX kXᵗ) ⊙ (dkX kXᵗ)) b` without forming the `N × N` matrix.
pub fn kxdkx_sq_mvm(
    b: ArrayView1<'_, f64>,
    kx: ArrayView2<'_, f64>,
    dkx: ArrayView2<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    partitioned_mvm(&CrossSquareRows::new(kx, dkx)?, b, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioned::vanilla_mvm;
    use approx::assert_relative_eq;

    fn features(n: usize, p: usize, phase: f64) -> Array2<f64> {
        Array2::from_shape_fn((n, p), |(i, j)| ((i * p + j) as f64 * 0.61 + phase).sin())
    }

    #[test]
    fn test_shifted_square_row_closed_form() {
        let kx = features(5, 3, 0.0);
        let provider = ShiftedSquareRows::new(kx.view());
        let row = provider.row(2);
        for j in 0..5 {
            let s = kx.row(2).dot(&kx.row(j));
            assert_relative_eq!(row[j], (1.0 + s) * (1.0 + s), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cross_square_row_closed_form() {
        let kx = features(6, 4, 0.0);
        let dkx = features(6, 4, 1.3);
        let provider = CrossSquareRows::new(kx.view(), dkx.view()).unwrap();
        let row = provider.row(3);
        for j in 0..6 {
            let expected = kx.row(j).dot(&kx.row(3)) * kx.row(j).dot(&dkx.row(3));
            assert_relative_eq!(row[j], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cross_square_shape_mismatch() {
        let kx = features(6, 4, 0.0);
        let dkx = features(6, 3, 0.0);
        assert!(CrossSquareRows::new(kx.view(), dkx.view()).is_err());
    }

    #[test]
    fn test_kxkx_sq_mvm_matches_materialized() {
        let kx = features(11, 4, 0.2);
        let b = Array1::from_shape_fn(11, |i| (i as f64).sin() / 11.0);
        let expected = vanilla_mvm(&ShiftedSquareRows::new(kx.view()), b.view()).unwrap();
        for dilation in [1, 2, 3, 5] {
            let got = kxkx_sq_mvm(b.view(), kx.view(), &MvmConfig::new(dilation)).unwrap();
            for (g, e) in got.iter().zip(expected.iter()) {
                assert_relative_eq!(g, e, epsilon = 1e-12, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_kxdkx_sq_mvm_matches_materialized() {
        let kx = features(9, 3, 0.0);
        let dkx = features(9, 3, 0.7);
        let b = Array1::from_shape_fn(9, |i| (i as f64).cos() / 9.0);
        let gram = kx.dot(&kx.t());
        let cross = dkx.dot(&kx.t());
        let expected = (&gram * &cross).dot(&b);
        let got = kxdkx_sq_mvm(b.view(), kx.view(), dkx.view(), &MvmConfig::new(4)).unwrap();
        for (g, e) in got.iter().zip(expected.iter()) {
            assert_relative_eq!(g, e, epsilon = 1e-12, max_relative = 1e-10);
        }
    }
}
