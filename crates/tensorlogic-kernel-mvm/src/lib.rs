//! # Tensorlogic-Kernel-MVM
//!
//! **Version**: 0.1.0-alpha.2 | **Status**: Alpha
//!
//! Memory-bounded kernel matrix-vector products with custom derivative rules.
//!
//! For a feature matrix `X` (N × P), per-feature scales `κ` and scalar
//! hyperparameters `η1`, `η2`, `c`, this crate computes `K b` for the
//! dimension-wise quadratic kernel
//!
//! ```text
//! K = 0.5·η2²·(1 + kX kXᵗ)²  −  0.5·η2²·(kX²)(kX²)ᵗ  +  (η1² − η2²)·kX kXᵗ  +  (c² − 0.5·η2²)
//! ```
//!
//! with `kX = κ ⊙ X`, without ever holding the N × N matrix. Rows are produced
//! in blocks of `N / dilation`, so peak memory is `O(N²/dilation)`.
//!
//! ## Features
//!
//! - **Partitioned products** - row-chunked `A b` for any implicit matrix ([`partitioned`])
//! - **Kernel MVM** - [`kernel_mvm`] and the shifted variant [`kernel_mvm_diag`]
//! - **Forward mode** - closed-form JVP through [`KernelMvm`] and [`autodiff::jvp`]
//! - **Reverse mode** - explicit adjoint plus JVP transposition ([`autodiff::transpose_jvp`])
//! - **Validation** - dense references ([`reference`]) and finite differences ([`gradient_check`])
//!
//! ## Quick Start
//!
//! ```rust
//! use scirs2_core::ndarray::{Array1, Array2};
//! use tensorlogic_kernel_mvm::{kernel_mvm, KernelHyperparams, MvmConfig};
//!
//! let x = Array2::from_shape_fn((12, 4), |(i, j)| ((i + 2 * j) as f64 * 0.3).sin());
//! let b = Array1::ones(12);
//! let kappa = Array1::from_elem(4, 0.8);
//! let hyper = KernelHyperparams::new(0.55, 0.22, 0.9);
//!
//! let coarse = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &MvmConfig::new(1)).unwrap();
//! let fine = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &MvmConfig::new(4)).unwrap();
//! for (a, f) in coarse.iter().zip(fine.iter()) {
//!     assert!((a - f).abs() < 1e-10);
//! }
//! ```
//!
//! ## Differentiation
//!
//! ```rust
//! use scirs2_core::ndarray::{Array1, Array2};
//! use tensorlogic_kernel_mvm::autodiff::{jvp, value_and_grad};
//! use tensorlogic_kernel_mvm::{KernelMvm, KernelPrimals, KernelTangents, MvmConfig};
//!
//! let x = Array2::from_shape_fn((10, 3), |(i, j)| ((i * 3 + j) as f64).cos());
//! let b = Array1::from_elem(10, 0.1);
//! let op = KernelMvm::new(b.view(), x.view(), 0.9, MvmConfig::new(2)).unwrap();
//!
//! let primals = KernelPrimals::new(Array1::from_elem(3, 0.5), 0.55, 0.22);
//! let tangents = KernelTangents::new(Array1::from_elem(3, 0.7), 0.1, 0.2);
//! let (_kb, _dkb) = jvp(&op, &primals, &tangents).unwrap();
//!
//! let a = Array1::ones(10);
//! let (_value, grads) = value_and_grad(&op, &primals, a.view()).unwrap();
//! assert_eq!(grads.kappa.len(), 3);
//! ```
//!
//! `b`, `X` and `c` are held by the operation and never receive derivatives.

pub mod autodiff;
pub mod chunking;
pub mod config;
pub mod derivative;
pub mod device;
pub mod error;
pub mod gradient_check;
pub mod kernel;
pub mod partitioned;
pub mod reference;
pub mod rows;

pub use autodiff::{CustomJvp, CustomVjp, TangentSpace};
pub use chunking::get_chunks;
pub use config::MvmConfig;
pub use derivative::{KernelCotangents, KernelMvm, KernelPrimals, KernelTangents};
pub use device::{Device, DeviceType};
pub use error::{KernelMvmError, Result};
pub use gradient_check::{GradientCheckConfig, GradientCheckResult};
pub use kernel::{kernel_mvm, kernel_mvm_diag, KernelHyperparams};
pub use partitioned::{
    kx_mvm, kx_mvm_rows, partitioned_mvm, quad_mvm, quad_mvm_dil, vanilla_mvm, ColumnRows,
    DenseRows, RowProvider,
};
pub use rows::{kxdkx_sq_mvm, kxkx_sq_mvm, CrossSquareRows, ShiftedSquareRows};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::reference_kernel_mvm;
    use scirs2_core::ndarray::{Array1, Array2};

    #[test]
    fn test_public_api_round() {
        let x = Array2::from_shape_fn((5, 2), |(i, j)| (i + j) as f64 * 0.2);
        let b = Array1::ones(5);
        let kappa = Array1::from_elem(2, 1.0);
        let hyper = KernelHyperparams::new(0.5, 0.3, 1.0);
        let config = MvmConfig::default();

        let fast = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &config).unwrap();
        let slow = reference_kernel_mvm(b.view(), kappa.view(), x.view(), &hyper).unwrap();
        for (f, s) in fast.iter().zip(slow.iter()) {
            assert!((f - s).abs() < 1e-10);
        }
    }

    #[test]
    fn test_invalid_dilation_surfaces_as_error() {
        let x = Array2::<f64>::zeros((3, 2));
        let b = Array1::ones(3);
        let kappa = Array1::ones(2);
        let hyper = KernelHyperparams::new(0.5, 0.3, 1.0);
        let result = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &MvmConfig::new(4));
        assert!(matches!(result, Err(KernelMvmError::InvalidParameter { .. })));
    }
}
