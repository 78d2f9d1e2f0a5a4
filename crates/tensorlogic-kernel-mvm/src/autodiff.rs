//! Differentiation hooks for operations with hand-written derivative rules.
//!
//! An operation registers two behaviours: plain evaluation and evaluation
//! together with a directional derivative (JVP). Reverse mode is available
//! either through an explicitly supplied adjoint ([`CustomVjp`]) or by
//! transposing the forward rule one basis direction at a time
//! ([`transpose_jvp`]). Arguments an operation treats as static live inside
//! the operation value itself and never receive tangents.
//!
//! ## Example
//!
//! ```rust
//! use scirs2_core::ndarray::{array, Array1};
//! use tensorlogic_kernel_mvm::autodiff::{jvp, CustomJvp};
//! use tensorlogic_kernel_mvm::Result;
//!
//! /// y = θ² ⊙ w
//! struct Square {
//!     w: Array1<f64>,
//! }
//!
//! impl CustomJvp for Square {
//!     type Primals = f64;
//!     type Tangents = f64;
//!
//!     fn name(&self) -> &str {
//!         "square"
//!     }
//!
//!     fn evaluate(&self, theta: &f64) -> Result<Array1<f64>> {
//!         Ok(&self.w * (theta * theta))
//!     }
//!
//!     fn evaluate_with_tangent(&self, theta: &f64, dtheta: &f64) -> Result<(Array1<f64>, Array1<f64>)> {
//!         Ok((self.evaluate(theta)?, &self.w * (2.0 * theta * dtheta)))
//!     }
//! }
//!
//! let op = Square { w: array![1.0, 2.0] };
//! let (y, dy) = jvp(&op, &3.0, &1.0).unwrap();
//! assert_eq!(y, array![9.0, 18.0]);
//! assert_eq!(dy, array![6.0, 12.0]);
//! ```

use scirs2_core::ndarray::{Array1, ArrayView1};

use crate::error::{KernelMvmError, Result};

/// An operation with a hand-written forward-mode derivative rule.
pub trait CustomJvp: Send + Sync {
    /// Differentiable inputs.
    type Primals;
    /// One tangent direction in the space of `Primals`.
    type Tangents;

    /// Operation name for logging.
    fn name(&self) -> &str;

    /// Primal value, used outside any differentiation context.
    fn evaluate(&self, primals: &Self::Primals) -> Result<Array1<f64>>;

    /// Primal value and its directional derivative along `tangents`.
    fn evaluate_with_tangent(
        &self,
        primals: &Self::Primals,
        tangents: &Self::Tangents,
    ) -> Result<(Array1<f64>, Array1<f64>)>;
}

/// Coordinates on the tangent space of a [`CustomJvp`] operation.
///
/// This is what lets the forward rule be transposed and checked numerically.
pub trait TangentSpace: CustomJvp {
    /// Gradient of a scalar with respect to `Primals`.
    type Cotangents;

    /// Dimension of the differentiable input space at `primals`.
    fn tangent_dim(&self, primals: &Self::Primals) -> usize;

    /// The `k`-th unit tangent direction.
    fn basis_tangent(&self, primals: &Self::Primals, k: usize) -> Self::Tangents;

    /// `primals + step * tangents`.
    fn displace(
        &self,
        primals: &Self::Primals,
        tangents: &Self::Tangents,
        step: f64,
    ) -> Self::Primals;

    /// Assemble cotangents from per-basis components.
    fn cotangent_from_components(
        &self,
        primals: &Self::Primals,
        components: &[f64],
    ) -> Self::Cotangents;

    /// Flatten cotangents back into per-basis components.
    fn cotangent_components(&self, cotangents: &Self::Cotangents) -> Array1<f64>;
}

/// An operation with an explicitly supplied adjoint (reverse-mode) rule.
pub trait CustomVjp: TangentSpace {
    /// Primal value and `Jᵗ cotangent`.
    fn vjp(
        &self,
        primals: &Self::Primals,
        cotangent: ArrayView1<'_, f64>,
    ) -> Result<(Array1<f64>, Self::Cotangents)>;
}

/// Forward-mode entry point: primal output and tangent output.
pub fn jvp<O>(
    op: &O,
    primals: &O::Primals,
    tangents: &O::Tangents,
) -> Result<(Array1<f64>, Array1<f64>)>
where
    O: CustomJvp + ?Sized,
{
    tracing::debug!(op = op.name(), mode = "jvp", "custom derivative rule");
    let (primal_out, tangent_out) = op.evaluate_with_tangent(primals, tangents)?;
    if primal_out.len() != tangent_out.len() {
        return Err(KernelMvmError::mismatch(
            primal_out.len(),
            tangent_out.len(),
            format!("{} tangent output", op.name()),
        ));
    }
    Ok((primal_out, tangent_out))
}

/// Reverse-mode entry point using the explicit adjoint.
pub fn vjp<O>(
    op: &O,
    primals: &O::Primals,
    cotangent: ArrayView1<'_, f64>,
) -> Result<(Array1<f64>, O::Cotangents)>
where
    O: CustomVjp + ?Sized,
{
    tracing::debug!(op = op.name(), mode = "vjp", "custom derivative rule");
    op.vjp(primals, cotangent)
}

/// Value and gradient of the scalar `weights · op(primals)`.
pub fn value_and_grad<O>(
    op: &O,
    primals: &O::Primals,
    weights: ArrayView1<'_, f64>,
) -> Result<(f64, O::Cotangents)>
where
    O: CustomVjp + ?Sized,
{
    let (primal_out, cotangents) = vjp(op, primals, weights)?;
    if primal_out.len() != weights.len() {
        return Err(KernelMvmError::mismatch(
            primal_out.len(),
            weights.len(),
            format!("{} scalar reduction weights", op.name()),
        ));
    }
    Ok((weights.dot(&primal_out), cotangents))
}

/// Reverse mode derived from the forward rule alone.
///
/// The tangent output is linear in the tangent direction, so component `k` of
/// `Jᵗ cotangent` is `cotangent · jvp(e_k)`. Costs one JVP per input
/// dimension; use [`CustomVjp`] when an adjoint is available.
pub fn transpose_jvp<O>(
    op: &O,
    primals: &O::Primals,
    cotangent: ArrayView1<'_, f64>,
) -> Result<(Array1<f64>, O::Cotangents)>
where
    O: TangentSpace + ?Sized,
{
    let dim = op.tangent_dim(primals);
    tracing::debug!(
        op = op.name(),
        mode = "transpose",
        dim,
        "custom derivative rule"
    );

    let mut primal_out = None;
    let mut components = Vec::with_capacity(dim);
    for k in 0..dim {
        let tangents = op.basis_tangent(primals, k);
        let (out, tangent_out) = jvp(op, primals, &tangents)?;
        if tangent_out.len() != cotangent.len() {
            return Err(KernelMvmError::mismatch(
                tangent_out.len(),
                cotangent.len(),
                format!("{} cotangent", op.name()),
            ));
        }
        components.push(cotangent.dot(&tangent_out));
        primal_out.get_or_insert(out);
    }

    let primal_out = match primal_out {
        Some(out) => out,
        None => op.evaluate(primals)?,
    };
    Ok((
        primal_out,
        op.cotangent_from_components(primals, &components),
    ))
}
