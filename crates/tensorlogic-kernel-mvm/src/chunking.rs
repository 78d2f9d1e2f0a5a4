//! Index-range chunking and the chunked map-and-concatenate engine.
//!
//! A per-index function is evaluated one contiguous block of indices at a
//! time. Each block is a single batched (dense) expression, and block outputs
//! are stitched back together along the leading axis in index order. The
//! result equals evaluating the function over the whole range at once; only
//! peak memory and batch granularity change.

use std::ops::Range;

use scirs2_core::ndarray::{concatenate, Array, ArrayView, Axis, RemoveAxis};

use crate::error::{KernelMvmError, Result};

#[cfg(feature = "parallel")]
use scirs2_core::parallel_ops::*;

/// Split `0..len` into `len / chunk_size` blocks of `chunk_size` indices,
/// followed by one block holding the `len % chunk_size` leftover indices when
/// that remainder is nonzero.
///
/// ```rust
/// use tensorlogic_kernel_mvm::chunking::get_chunks;
///
/// let chunks = get_chunks(9, 4).unwrap();
/// assert_eq!(chunks, vec![0..4, 4..8, 8..9]);
/// ```
pub fn get_chunks(len: usize, chunk_size: usize) -> Result<Vec<Range<usize>>> {
    if chunk_size == 0 {
        return Err(KernelMvmError::InvalidParameter {
            parameter: "chunk_size".to_string(),
            value: "0".to_string(),
            reason: "chunk size must be at least 1".to_string(),
        });
    }

    let num_chunks = len / chunk_size;
    let mut chunks: Vec<Range<usize>> = (0..num_chunks)
        .map(|i| i * chunk_size..(i + 1) * chunk_size)
        .collect();
    if len % chunk_size != 0 {
        chunks.push(len - len % chunk_size..len);
    }
    Ok(chunks)
}

/// Evaluate `f` block by block over `0..len` and concatenate the blocks.
///
/// `f` receives a contiguous index range and must return an array whose
/// leading axis has exactly one entry per index in that range. When
/// `chunk_size >= len` the whole range is evaluated as a single batch.
///
/// With the `parallel` feature and `parallel == true`, blocks are evaluated on
/// the rayon pool; the output order is index order regardless.
pub fn chunk_map<D, F>(len: usize, chunk_size: usize, parallel: bool, f: F) -> Result<Array<f64, D>>
where
    D: RemoveAxis,
    F: Fn(Range<usize>) -> Array<f64, D> + Send + Sync,
{
    if chunk_size == 0 {
        return Err(KernelMvmError::InvalidParameter {
            parameter: "chunk_size".to_string(),
            value: "0".to_string(),
            reason: "chunk size must be at least 1".to_string(),
        });
    }

    if chunk_size >= len {
        tracing::trace!(len, "chunk_map: single batch");
        let out = f(0..len);
        check_block(&out, &(0..len))?;
        return Ok(out);
    }

    let chunks = get_chunks(len, chunk_size)?;
    tracing::debug!(
        len,
        chunk_size,
        num_chunks = chunks.len(),
        parallel,
        "chunk_map"
    );

    let blocks = evaluate_blocks(&chunks, parallel, &f);
    for (block, range) in blocks.iter().zip(chunks.iter()) {
        check_block(block, range)?;
    }

    let views: Vec<ArrayView<'_, f64, D>> = blocks.iter().map(|b| b.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

#[cfg(feature = "parallel")]
fn evaluate_blocks<D, F>(chunks: &[Range<usize>], parallel: bool, f: &F) -> Vec<Array<f64, D>>
where
    D: RemoveAxis,
    F: Fn(Range<usize>) -> Array<f64, D> + Send + Sync,
{
    if parallel {
        chunks.par_iter().map(|range| f(range.clone())).collect()
    } else {
        chunks.iter().map(|range| f(range.clone())).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn evaluate_blocks<D, F>(chunks: &[Range<usize>], parallel: bool, f: &F) -> Vec<Array<f64, D>>
where
    D: RemoveAxis,
    F: Fn(Range<usize>) -> Array<f64, D> + Send + Sync,
{
    let _ = parallel; // sequential fallback without rayon
    chunks.iter().map(|range| f(range.clone())).collect()
}

fn check_block<D: RemoveAxis>(block: &Array<f64, D>, range: &Range<usize>) -> Result<()> {
    let got = block.len_of(Axis(0));
    if got != range.len() {
        return Err(KernelMvmError::DimensionMismatch {
            expected: vec![range.len()],
            got: vec![got],
            context: format!("chunk {}..{} output", range.start, range.end),
        });
    }
    Ok(())
}
