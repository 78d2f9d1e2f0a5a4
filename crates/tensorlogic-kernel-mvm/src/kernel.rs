//! Primal kernel matrix-vector product.
//!
//! The kernel over scaled features `kX = κ ⊙ X` is
//!
//! ```text
//! K = 0.5·η2²·(1 + kX kXᵗ)²  −  0.5·η2²·(kX²)(kX²)ᵗ  +  (η1² − η2²)·kX kXᵗ  +  (c² − 0.5·η2²)
//! ```
//!
//! (squares elementwise, the last term a broadcast constant). `K b` is the
//! weighted sum of four partitioned products, none of which stores `K`.

use scirs2_core::ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::MvmConfig;
use crate::derivative::{KernelMvm, KernelPrimals};
use crate::error::{KernelMvmError, Result};
use crate::partitioned::quad_mvm_dil;
use crate::rows::kxkx_sq_mvm;

/// Kernel hyperparameters `η1`, `η2` and `c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelHyperparams {
    /// Linear-term scale
    pub eta1: f64,
    /// Quadratic-term scale
    pub eta2: f64,
    /// Constant offset
    pub c: f64,
}

impl KernelHyperparams {
    /// Create hyperparameters.
    pub fn new(eta1: f64, eta2: f64, c: f64) -> Self {
        Self { eta1, eta2, c }
    }

    /// Reject non-finite values.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("eta1", self.eta1), ("eta2", self.eta2), ("c", self.c)] {
            if !value.is_finite() {
                return Err(KernelMvmError::InvalidParameter {
                    parameter: name.to_string(),
                    value: value.to_string(),
                    reason: "hyperparameters must be finite".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The four unweighted sub-kernel products.
#[derive(Debug, Clone)]
pub(crate) struct PrimalTerms {
    /// `(1 + kX kXᵗ)² b`
    pub k1b: Array1<f64>,
    /// `(kX²)(kX²)ᵗ b`
    pub k2b: Array1<f64>,
    /// `kX kXᵗ b`
    pub k3b: Array1<f64>,
    /// `sum(b) · 1`
    pub k4b: Array1<f64>,
}

impl PrimalTerms {
    pub(crate) fn compute(
        b: ArrayView1<'_, f64>,
        kx: ArrayView2<'_, f64>,
        config: &MvmConfig,
    ) -> Result<Self> {
        let kx_sq = kx.mapv(|v| v * v);
        Ok(Self {
            k1b: kxkx_sq_mvm(b, kx, config)?,
            k2b: quad_mvm_dil(b, kx_sq.view(), config)?,
            k3b: quad_mvm_dil(b, kx, config)?,
            k4b: Array1::from_elem(b.len(), b.sum()),
        })
    }

    /// Hyperparameter-weighted sum, i.e. `K b`.
    pub(crate) fn combine(&self, eta1: f64, eta2: f64, c: f64) -> Array1<f64> {
        let eta1sq = eta1 * eta1;
        let eta2sq = eta2 * eta2;
        &self.k1b * (0.5 * eta2sq) - &self.k2b * (0.5 * eta2sq)
            + &self.k3b * (eta1sq - eta2sq)
            + &self.k4b * (c * c - 0.5 * eta2sq)
    }

    /// Directional derivative of [`combine`](Self::combine) along `η2` per unit `η2·η̇2`.
    pub(crate) fn eta2_direction(&self) -> Array1<f64> {
        &self.k1b - &self.k2b - &self.k3b * 2.0 - &self.k4b
    }
}

/// `K(κ⊙X, κ⊙X) b` for the kernel above, without materializing `K`.
///
/// # Arguments
/// * `b` - Right-hand side, length N
/// * `kappa` - Per-feature scaling, length P
/// * `x` - Raw features, N × P
/// * `hyper` - `η1`, `η2`, `c`
/// * `config` - Dilation, parallelism and device
///
/// # Example
/// ```rust
/// use scirs2_core::ndarray::{Array1, Array2};
/// use tensorlogic_kernel_mvm::{kernel_mvm, KernelHyperparams, MvmConfig};
///
/// let x = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as f64 * 0.1);
/// let b = Array1::ones(6);
/// let kappa = Array1::from_elem(2, 0.5);
/// let hyper = KernelHyperparams::new(0.55, 0.22, 0.9);
///
/// let kb = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &MvmConfig::new(2)).unwrap();
/// assert_eq!(kb.len(), 6);
/// ```
pub fn kernel_mvm(
    b: ArrayView1<'_, f64>,
    kappa: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    use crate::autodiff::CustomJvp;

    let op = KernelMvm::new(b, x, hyper.c, config.clone())?;
    op.evaluate(&KernelPrimals::new(kappa.to_owned(), hyper.eta1, hyper.eta2))
}

/// `(K(kX, kX) + diag·I) b` over features that are already scaled.
pub fn kernel_mvm_diag(
    b: ArrayView1<'_, f64>,
    kx: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
    diag: f64,
    config: &MvmConfig,
) -> Result<Array1<f64>> {
    config.validate()?;
    hyper.validate()?;
    if b.len() != kx.nrows() {
        return Err(KernelMvmError::mismatch(kx.nrows(), b.len(), "kernel_mvm_diag"));
    }
    tracing::debug!(
        n = kx.nrows(),
        p = kx.ncols(),
        dilation = config.dilation,
        "kernel_mvm_diag"
    );

    let terms = PrimalTerms::compute(b, kx, config)?;
    Ok(terms.combine(hyper.eta1, hyper.eta2, hyper.c) + &b * diag)
}
