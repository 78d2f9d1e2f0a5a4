//! Property-based tests for chunking and partitioned products.

use proptest::prelude::*;
use scirs2_core::ndarray::{Array1, Array2};
use tensorlogic_kernel_mvm::chunking::{chunk_map, get_chunks};
use tensorlogic_kernel_mvm::{
    kx_mvm, kx_mvm_rows, partitioned_mvm, vanilla_mvm, DenseRows, MvmConfig,
};

/// Strategy for a small dense matrix with a matching right-hand side.
fn matrix_strategy() -> impl Strategy<Value = (Array2<f64>, Array1<f64>)> {
    (1usize..=24, 1usize..=8).prop_flat_map(|(n, p)| {
        (
            prop::collection::vec(-10.0..10.0f64, n * p),
            prop::collection::vec(-10.0..10.0f64, p),
        )
            .prop_map(move |(data, rhs)| {
                (
                    Array2::from_shape_vec((n, p), data).unwrap(),
                    Array1::from_vec(rhs),
                )
            })
    })
}

proptest! {
    /// Chunks tile `0..len` in order, without gaps or overlap.
    #[test]
    fn test_chunks_tile_range(len in 1usize..500, chunk_size in 1usize..64) {
        let chunks = get_chunks(len, chunk_size).unwrap();
        let mut next = 0;
        for chunk in &chunks {
            prop_assert_eq!(chunk.start, next);
            prop_assert!(chunk.end > chunk.start);
            prop_assert!(chunk.len() <= chunk_size);
            next = chunk.end;
        }
        prop_assert_eq!(next, len);
        prop_assert_eq!(chunks.len(), len.div_ceil(chunk_size));
    }

    /// Concatenated chunk results equal the unchunked map.
    #[test]
    fn test_chunk_map_preserves_order(
        len in 1usize..200,
        chunk_size in 1usize..50,
        parallel in any::<bool>()
    ) {
        let mapped: Array1<f64> = chunk_map(len, chunk_size, parallel, |range| {
            range.map(|i| (i * i) as f64).collect::<Array1<f64>>()
        })
        .unwrap();
        let expected: Array1<f64> = (0..len).map(|i| (i * i) as f64).collect();
        prop_assert_eq!(mapped, expected);
    }

    /// Partitioned and one-shot products agree for every valid dilation.
    #[test]
    fn test_partitioned_matches_vanilla((x, rhs) in matrix_strategy(), seed in 0usize..24) {
        let dilation = 1 + seed % x.nrows();
        let provider = DenseRows::new(x.view());
        let config = MvmConfig::new(dilation);
        let chunked = partitioned_mvm(&provider, rhs.view(), &config).unwrap();
        let whole = vanilla_mvm(&provider, rhs.view()).unwrap();
        for (c, w) in chunked.iter().zip(whole.iter()) {
            prop_assert!((c - w).abs() <= 1e-9 * (1.0 + w.abs()));
        }
    }

    /// `kX v` then `kXᵗ b` match the dense products.
    #[test]
    fn test_kx_products_match_dense((x, v) in matrix_strategy()) {
        let config = MvmConfig::new(1);
        let rows = kx_mvm_rows(v.view(), x.view(), &config).unwrap();
        let dense_rows = x.dot(&v);
        for (a, e) in rows.iter().zip(dense_rows.iter()) {
            prop_assert!((a - e).abs() <= 1e-9 * (1.0 + e.abs()));
        }

        let b = Array1::from_elem(x.nrows(), 0.5);
        let cols = kx_mvm(b.view(), x.view(), &config).unwrap();
        let dense_cols = x.t().dot(&b);
        for (a, e) in cols.iter().zip(dense_cols.iter()) {
            prop_assert!((a - e).abs() <= 1e-9 * (1.0 + e.abs()));
        }
    }

    /// A dilation larger than the range is rejected rather than silently clamped.
    #[test]
    fn test_oversized_dilation_rejected(len in 1usize..50, extra in 1usize..10) {
        let config = MvmConfig::new(len + extra);
        prop_assert!(config.chunk_size(len).is_err());
    }
}
