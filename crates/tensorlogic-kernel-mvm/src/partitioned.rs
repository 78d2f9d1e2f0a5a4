//! Partitioned matrix-vector products over implicitly defined matrices.
//!
//! An implicit matrix is described by a [`RowProvider`]: something that can
//! produce any contiguous block of its rows on demand. The partitioned MVM
//! asks for one block per chunk, contracts it against the right-hand side and
//! drops it, so peak memory is `O(chunk_size × row_len)` instead of the full
//! matrix.

use std::ops::Range;

use scirs2_core::ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::chunking::chunk_map;
use crate::config::MvmConfig;
use crate::error::{KernelMvmError, Result};

/// Row-by-row description of an implicit matrix.
///
/// Blocks must be closed-form batched expressions of the row indices (no
/// per-row branching) so that one chunk is a single dense evaluation.
pub trait RowProvider: Send + Sync {
    /// Number of rows of the implicit matrix.
    fn num_rows(&self) -> usize;

    /// Length of each row (the contraction dimension).
    fn row_len(&self) -> usize;

    /// Rows `range` as a `range.len() × row_len()` block.
    fn rows(&self, range: Range<usize>) -> Array2<f64>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// A single row.
    fn row(&self, i: usize) -> Array1<f64> {
        self.rows(i..i + 1).row(0).to_owned()
    }

    /// Product of the row block `range` with `rhs`.
    ///
    /// Providers backed by stored data override this to contract in place.
    fn rows_dot(&self, range: Range<usize>, rhs: &ArrayView1<'_, f64>) -> Array1<f64> {
        self.rows(range).dot(rhs)
    }
}

/// Rows of a stored dense matrix.
#[derive(Debug, Clone, Copy)]
pub struct DenseRows<'a> {
    matrix: ArrayView2<'a, f64>,
}

impl<'a> DenseRows<'a> {
    /// Wrap a dense `N × P` matrix; row `i` is `matrix[i, ..]`.
    pub fn new(matrix: ArrayView2<'a, f64>) -> Self {
        Self { matrix }
    }
}

impl RowProvider for DenseRows<'_> {
    fn num_rows(&self) -> usize {
        self.matrix.nrows()
    }

    fn row_len(&self) -> usize {
        self.matrix.ncols()
    }

    fn rows(&self, range: Range<usize>) -> Array2<f64> {
        self.matrix.slice(s![range, ..]).to_owned()
    }

    fn name(&self) -> &str {
        "dense-rows"
    }

    fn rows_dot(&self, range: Range<usize>, rhs: &ArrayView1<'_, f64>) -> Array1<f64> {
        self.matrix.slice(s![range, ..]).dot(rhs)
    }
}

/// Columns of a stored dense matrix, addressed as rows of its transpose.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRows<'a> {
    matrix: ArrayView2<'a, f64>,
}

impl<'a> ColumnRows<'a> {
    /// Wrap a dense `N × P` matrix; row `p` is `matrix[.., p]`.
    pub fn new(matrix: ArrayView2<'a, f64>) -> Self {
        Self { matrix }
    }
}

impl RowProvider for ColumnRows<'_> {
    fn num_rows(&self) -> usize {
        self.matrix.ncols()
    }

    fn row_len(&self) -> usize {
        self.matrix.nrows()
    }

    fn rows(&self, range: Range<usize>) -> Array2<f64> {
        self.matrix.slice(s![.., range]).t().to_owned()
    }

    fn name(&self) -> &str {
        "column-rows"
    }

    fn rows_dot(&self, range: Range<usize>, rhs: &ArrayView1<'_, f64>) -> Array1<f64> {
        self.matrix.slice(s![.., range]).t().dot(rhs)
    }
}

/// `M @ rhs` for the implicit matrix `M`, one chunk of rows at a time.
///
/// The chunk size is `num_rows / config.dilation`.
pub fn partitioned_mvm<R>(
    provider: &R,
    rhs: ArrayView1<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>>
where
    R: RowProvider + ?Sized,
{
    if rhs.len() != provider.row_len() {
        return Err(KernelMvmError::mismatch(
            provider.row_len(),
            rhs.len(),
            format!("partitioned_mvm({}) right-hand side", provider.name()),
        ));
    }

    let num_rows = provider.num_rows();
    let chunk_size = config.chunk_size(num_rows)?;
    tracing::trace!(
        provider = provider.name(),
        num_rows,
        chunk_size,
        "partitioned_mvm"
    );

    chunk_map(num_rows, chunk_size, config.parallel, |range| {
        provider.rows_dot(range, &rhs)
    })
}

/// `M @ rhs` after materializing every row of `M`.
///
/// Memory is `O(num_rows × row_len)`; meant for validating [`partitioned_mvm`].
pub fn vanilla_mvm<R>(provider: &R, rhs: ArrayView1<'_, f64>) -> Result<Array1<f64>>
where
    R: RowProvider + ?Sized,
{
    if rhs.len() != provider.row_len() {
        return Err(KernelMvmError::mismatch(
            provider.row_len(),
            rhs.len(),
            format!("vanilla_mvm({}) right-hand side", provider.name()),
        ));
    }
    Ok(provider.rows(0..provider.num_rows()).dot(&rhs))
}

/// `kXᵗ b` (length P), partitioned over the columns of `kx`.
///
/// `b` is a single right-hand-side vector of length N. Batched right-hand
/// sides (a `k × N` block) are not supported; call once per vector.
pub fn kx_mvm(
    b: ArrayView1<'_, f64>,
    kx: ArrayView2<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    partitioned_mvm(&ColumnRows::new(kx), b, config)
}

/// `kX v` (length N), partitioned over the rows of `kx`.
pub fn kx_mvm_rows(
    v: ArrayView1<'_, f64>,
    kx: ArrayView2<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    partitioned_mvm(&DenseRows::new(kx), v, config)
}

/// `X (Xᵗ b)` computed directly.
pub fn quad_mvm(b: ArrayView1<'_, f64>, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    if b.len() != x.nrows() {
        return Err(KernelMvmError::mismatch(x.nrows(), b.len(), "quad_mvm"));
    }
    Ok(x.dot(&x.t().dot(&b)))
}

/// `X (Xᵗ b)` in two partitioned passes: reduce over N into a length-P
/// intermediate (chunks of `P / dilation` columns), then reduce over P
/// (chunks of `N / dilation` rows). The `N × N` product `X Xᵗ` never exists.
pub fn quad_mvm_dil(
    b: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    let partial = kx_mvm(b, x, config)?;
    kx_mvm_rows(partial.view(), x, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use scirs2_core::ndarray::array;

    fn sample_matrix() -> Array2<f64> {
        Array2::from_shape_fn((7, 3), |(i, j)| ((i * 3 + j) as f64 * 0.37).sin())
    }

    #[test]
    fn test_dense_rows_provider() {
        let m = sample_matrix();
        let rows = DenseRows::new(m.view());
        assert_eq!(rows.num_rows(), 7);
        assert_eq!(rows.row_len(), 3);
        assert_eq!(rows.row(4), m.row(4).to_owned());
        assert_eq!(rows.rows(2..5), m.slice(s![2..5, ..]).to_owned());
    }

    #[test]
    fn test_column_rows_provider() {
        let m = sample_matrix();
        let cols = ColumnRows::new(m.view());
        assert_eq!(cols.num_rows(), 3);
        assert_eq!(cols.row_len(), 7);
        assert_eq!(cols.row(1), m.column(1).to_owned());
    }

    #[test]
    fn test_partitioned_matches_vanilla() {
        let m = sample_matrix();
        let rhs = array![0.5, -1.0, 2.0];
        let rows = DenseRows::new(m.view());
        let expected = vanilla_mvm(&rows, rhs.view()).unwrap();
        for dilation in 1..=7 {
            let config = MvmConfig::new(dilation).with_parallel(false);
            let got = partitioned_mvm(&rows, rhs.view(), &config).unwrap();
            for (g, e) in got.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(g, e, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_partitioned_rhs_mismatch() {
        let m = sample_matrix();
        let rhs = array![1.0, 2.0];
        let result = partitioned_mvm(&DenseRows::new(m.view()), rhs.view(), &MvmConfig::new(2));
        assert!(matches!(
            result,
            Err(KernelMvmError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_kx_mvm_is_transpose_product() {
        let m = sample_matrix();
        let b = Array1::from_shape_fn(7, |i| (i as f64 + 1.0).recip());
        let got = kx_mvm(b.view(), m.view(), &MvmConfig::new(3)).unwrap();
        let expected = m.t().dot(&b);
        for (g, e) in got.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(g, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_kx_mvm_rejects_stacked_rhs() {
        let m = sample_matrix();
        let stacked = Array1::from_elem(3 * m.nrows(), 1.0);
        let result = kx_mvm(stacked.view(), m.view(), &MvmConfig::new(1));
        match result {
            Err(KernelMvmError::DimensionMismatch { expected, got, .. }) => {
                assert_eq!(expected, vec![7]);
                assert_eq!(got, vec![21]);
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_quad_mvm_dil_matches_direct() {
        let m = sample_matrix();
        let b = Array1::from_shape_fn(7, |i| (i as f64).cos());
        let expected = quad_mvm(b.view(), m.view()).unwrap();
        for dilation in [1, 2, 3] {
            let got = quad_mvm_dil(b.view(), m.view(), &MvmConfig::new(dilation)).unwrap();
            for (g, e) in got.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(g, e, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_quad_mvm_dil_rejects_large_dilation() {
        let m = sample_matrix();
        let b = Array1::ones(7);
        // P = 3 columns cannot be split into 4 chunks
        assert!(quad_mvm_dil(b.view(), m.view(), &MvmConfig::new(4)).is_err());
    }
}
