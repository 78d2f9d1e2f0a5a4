//! Dense O(N²) reference implementations.
//!
//! These build the kernel matrix (and its derivatives) explicitly. They exist
//! to validate the partitioned path and are only practical for small N.

use scirs2_core::ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::derivative::{KernelCotangents, KernelTangents};
use crate::error::{KernelMvmError, Result};
use crate::kernel::KernelHyperparams;

/// Dense kernel matrix between the rows of `x` (N × P) and `z` (M × P).
pub fn kernel_matrix(
    x: ArrayView2<'_, f64>,
    z: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
) -> Result<Array2<f64>> {
    if x.ncols() != z.ncols() {
        return Err(KernelMvmError::mismatch(x.ncols(), z.ncols(), "kernel_matrix feature count"));
    }
    let eta1sq = hyper.eta1 * hyper.eta1;
    let eta2sq = hyper.eta2 * hyper.eta2;

    let dot = x.dot(&z.t());
    let dot_sq = x.mapv(|v| v * v).dot(&z.mapv(|v| v * v).t());

    let k1 = dot.mapv(|s| 0.5 * eta2sq * (1.0 + s) * (1.0 + s));
    let k2 = dot_sq * (-0.5 * eta2sq);
    let k3 = &dot * (eta1sq - eta2sq);
    let k4 = hyper.c * hyper.c - 0.5 * eta2sq;
    Ok(k1 + k2 + k3 + k4)
}

fn scale(kappa: ArrayView1<'_, f64>, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    if kappa.len() != x.ncols() {
        return Err(KernelMvmError::mismatch(x.ncols(), kappa.len(), "reference kappa"));
    }
    Ok(&x * &kappa)
}

/// `K(κ⊙X, κ⊙X) b` with the matrix materialized.
pub fn reference_kernel_mvm(
    b: ArrayView1<'_, f64>,
    kappa: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
) -> Result<Array1<f64>> {
    if b.len() != x.nrows() {
        return Err(KernelMvmError::mismatch(x.nrows(), b.len(), "reference right-hand side"));
    }
    let kx = scale(kappa, x)?;
    Ok(kernel_matrix(kx.view(), kx.view(), hyper)?.dot(&b))
}

/// Dense `dK` along `(κ̇, η̇1, η̇2)`, by the product rule on each sub-kernel.
pub fn kernel_matrix_tangent(
    kappa: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
    tangents: &KernelTangents,
) -> Result<Array2<f64>> {
    let kx = scale(kappa, x)?;
    let dkx = scale(tangents.kappa_dot.view(), x)?;
    let (eta1, eta2) = (hyper.eta1, hyper.eta2);
    let eta2sq = eta2 * eta2;

    let s = kx.dot(&kx.t());
    let ds = dkx.dot(&kx.t()) + kx.dot(&dkx.t());

    let kx_sq = kx.mapv(|v| v * v);
    let dkx_sq = &kx * &dkx * 2.0;
    let q = kx_sq.dot(&kx_sq.t());
    let dq = dkx_sq.dot(&kx_sq.t()) + kx_sq.dot(&dkx_sq.t());

    let shifted = s.mapv(|v| 1.0 + v);
    let d_kappa = &shifted * &ds * eta2sq - &dq * (0.5 * eta2sq) + &ds * (eta1 * eta1 - eta2sq);
    let d_eta1 = &s * (2.0 * eta1 * tangents.eta1_dot);
    let d_eta2 = (&shifted * &shifted - &q - &s * 2.0 - 1.0) * (eta2 * tangents.eta2_dot);
    Ok(d_kappa + d_eta1 + d_eta2)
}

/// `(K b, dK b)` with both matrices materialized.
pub fn reference_kernel_mvm_jvp(
    b: ArrayView1<'_, f64>,
    kappa: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
    tangents: &KernelTangents,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let primal = reference_kernel_mvm(b, kappa, x, hyper)?;
    let tangent = kernel_matrix_tangent(kappa, x, hyper, tangents)?.dot(&b);
    Ok((primal, tangent))
}

/// Value and gradient of `aᵗ K(κ⊙X, κ⊙X) b` with respect to `(κ, η1, η2)`.
///
/// Differentiates each dense matrix entry: with `S = kX kXᵗ`,
/// `∂K_ij/∂κ_p = 2κ_p (η1² + η2² S_ij) X_ip X_jp − 2η2² κ_p³ X_ip² X_jp²`.
pub fn reference_value_and_grad(
    a: ArrayView1<'_, f64>,
    b: ArrayView1<'_, f64>,
    kappa: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    hyper: &KernelHyperparams,
) -> Result<(f64, KernelCotangents)> {
    let n = x.nrows();
    if a.len() != n || b.len() != n {
        return Err(KernelMvmError::DimensionMismatch {
            expected: vec![n, n],
            got: vec![a.len(), b.len()],
            context: "reference_value_and_grad".to_string(),
        });
    }
    let kx = scale(kappa, x)?;
    let (eta1, eta2) = (hyper.eta1, hyper.eta2);
    let eta1sq = eta1 * eta1;
    let eta2sq = eta2 * eta2;

    let k = kernel_matrix(kx.view(), kx.view(), hyper)?;
    let value = a.dot(&k.dot(&b));

    let s = kx.dot(&kx.t());
    let kx_sq = kx.mapv(|v| v * v);
    let q = kx_sq.dot(&kx_sq.t());

    // weight_ij = a_i b_j (η1² + η2² S_ij)
    let outer = Array2::from_shape_fn((n, n), |(i, j)| a[i] * b[j]);
    let weight = &outer * &s.mapv(|v| eta1sq + eta2sq * v);

    let x_sq = x.mapv(|v| v * v);
    let x_sq_t_a = x_sq.t().dot(&a);
    let x_sq_t_b = x_sq.t().dot(&b);

    let grad_kappa = Array1::from_shape_fn(x.ncols(), |p| {
        let col = x.column(p);
        let kp = kappa[p];
        2.0 * kp * col.dot(&weight.dot(&col))
            - 2.0 * eta2sq * kp.powi(3) * x_sq_t_a[p] * x_sq_t_b[p]
    });

    let grad_eta1 = 2.0 * eta1 * a.dot(&s.dot(&b));
    let shifted = s.mapv(|v| 1.0 + v);
    let d_eta2 = (&shifted * &shifted - &q - &s * 2.0 - 1.0) * eta2;
    let grad_eta2 = a.dot(&d_eta2.dot(&b));

    Ok((
        value,
        KernelCotangents {
            kappa: grad_kappa,
            eta1: grad_eta1,
            eta2: grad_eta2,
        },
    ))
}
