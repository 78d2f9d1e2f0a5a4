//! Finite-difference checks for custom derivative rules.
//!
//! Forward rules are compared against central differences along the supplied
//! tangent; reverse rules against central differences of `uᵗ f` along every
//! basis direction of the tangent space.

use scirs2_core::ndarray::{Array1, ArrayView1};
use tracing::debug;

use crate::autodiff::{CustomVjp, TangentSpace};
use crate::error::{KernelMvmError, Result};

/// Configuration for gradient checking
#[derive(Clone, Copy, Debug)]
pub struct GradientCheckConfig {
    /// Step for central differences
    pub epsilon: f64,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        GradientCheckConfig {
            epsilon: 1e-5,
            rtol: 1e-3,
            atol: 1e-5,
        }
    }
}

/// Outcome of one comparison.
#[derive(Debug, Clone)]
pub struct GradientCheckResult {
    /// Name of the checked quantity
    pub name: String,
    pub max_abs_diff: f64,
    pub max_rel_diff: f64,
    pub passed: bool,
    pub num_elements: usize,
}

impl GradientCheckResult {
    /// Check if the derivatives match within tolerance
    pub fn is_close(&self, config: &GradientCheckConfig) -> bool {
        self.max_abs_diff < config.atol || self.max_rel_diff < config.rtol
    }

    /// Turn a failed comparison into an error.
    pub fn ensure_passed(self) -> Result<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(KernelMvmError::GradientCheck(format!(
                "{}: max abs diff {:.3e}, max rel diff {:.3e} over {} elements",
                self.name, self.max_abs_diff, self.max_rel_diff, self.num_elements
            )))
        }
    }
}

/// Element-wise comparison of an analytic derivative against a numeric one.
pub fn compare_arrays(
    analytical: ArrayView1<'_, f64>,
    numeric: ArrayView1<'_, f64>,
    name: &str,
    config: &GradientCheckConfig,
) -> Result<GradientCheckResult> {
    if analytical.len() != numeric.len() {
        return Err(KernelMvmError::mismatch(numeric.len(), analytical.len(), name));
    }

    let mut max_abs_diff: f64 = 0.0;
    let mut max_rel_diff: f64 = 0.0;
    for (a, n) in analytical.iter().zip(numeric.iter()) {
        let abs_diff = (a - n).abs();
        let rel_diff = if n.abs() > 1e-10 {
            abs_diff / n.abs()
        } else {
            abs_diff
        };
        max_abs_diff = max_abs_diff.max(abs_diff);
        max_rel_diff = max_rel_diff.max(rel_diff);
    }

    let passed = max_abs_diff < config.atol || max_rel_diff < config.rtol;
    debug!(
        name,
        max_abs_diff,
        max_rel_diff,
        passed,
        "gradient comparison"
    );

    Ok(GradientCheckResult {
        name: name.to_string(),
        max_abs_diff,
        max_rel_diff,
        passed,
        num_elements: analytical.len(),
    })
}

/// Directional derivative `(f(p + εt) − f(p − εt)) / 2ε`.
pub fn numeric_jvp<O>(
    op: &O,
    primals: &O::Primals,
    tangents: &O::Tangents,
    epsilon: f64,
) -> Result<Array1<f64>>
where
    O: TangentSpace,
{
    if epsilon.is_nan() || epsilon <= 0.0 {
        return Err(KernelMvmError::InvalidParameter {
            parameter: "epsilon".to_string(),
            value: epsilon.to_string(),
            reason: "finite-difference step must be positive".to_string(),
        });
    }
    let plus = op.evaluate(&op.displace(primals, tangents, epsilon))?;
    let minus = op.evaluate(&op.displace(primals, tangents, -epsilon))?;
    Ok((plus - minus) / (2.0 * epsilon))
}

/// Check the forward rule of `op` along one tangent.
pub fn check_jvp<O>(
    op: &O,
    primals: &O::Primals,
    tangents: &O::Tangents,
    config: Option<GradientCheckConfig>,
) -> Result<GradientCheckResult>
where
    O: TangentSpace,
{
    let config = config.unwrap_or_default();
    let (_, analytical) = op.evaluate_with_tangent(primals, tangents)?;
    let numeric = numeric_jvp(op, primals, tangents, config.epsilon)?;
    let name = format!("{} jvp", op.name());
    compare_arrays(analytical.view(), numeric.view(), &name, &config)
}

/// Check the reverse rule of `op` for cotangent `u`.
pub fn check_vjp<O>(
    op: &O,
    primals: &O::Primals,
    cotangent: ArrayView1<'_, f64>,
    config: Option<GradientCheckConfig>,
) -> Result<GradientCheckResult>
where
    O: CustomVjp,
{
    let config = config.unwrap_or_default();
    let (_, grads) = op.vjp(primals, cotangent)?;
    let analytical = op.cotangent_components(&grads);

    let dim = op.tangent_dim(primals);
    let mut numeric = Array1::zeros(dim);
    for k in 0..dim {
        let direction = op.basis_tangent(primals, k);
        let column = numeric_jvp(op, primals, &direction, config.epsilon)?;
        if column.len() != cotangent.len() {
            return Err(KernelMvmError::mismatch(
                column.len(),
                cotangent.len(),
                "check_vjp cotangent",
            ));
        }
        numeric[k] = cotangent.dot(&column);
    }
    let name = format!("{} vjp", op.name());
    compare_arrays(analytical.view(), numeric.view(), &name, &config)
}

/// Run a forward check along every basis tangent and one reverse check.
pub fn check_gradients<O>(
    op: &O,
    primals: &O::Primals,
    cotangent: ArrayView1<'_, f64>,
    config: Option<GradientCheckConfig>,
) -> Result<Vec<GradientCheckResult>>
where
    O: CustomVjp,
{
    let mut results = Vec::new();
    for k in 0..op.tangent_dim(primals) {
        let direction = op.basis_tangent(primals, k);
        let mut result = check_jvp(op, primals, &direction, config)?;
        result.name = format!("{} basis {}", result.name, k);
        results.push(result);
    }
    results.push(check_vjp(op, primals, cotangent, config)?);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MvmConfig;
    use crate::derivative::{KernelMvm, KernelPrimals, KernelTangents};
    use scirs2_core::ndarray::{array, Array2};

    #[test]
    fn test_compare_arrays_identical() {
        let a = array![1.0, 2.0, 3.0];
        let config = GradientCheckConfig::default();
        let result = compare_arrays(a.view(), a.view(), "same", &config).unwrap();
        assert!(result.passed);
        assert_eq!(result.max_abs_diff, 0.0);
        assert_eq!(result.num_elements, 3);
    }

    #[test]
    fn test_compare_arrays_detects_difference() {
        let a = array![1.0, 2.0];
        let b = array![1.0, 2.5];
        let config = GradientCheckConfig::default();
        let result = compare_arrays(a.view(), b.view(), "diff", &config).unwrap();
        assert!(!result.passed);
        assert!(!result.is_close(&config));
        assert!(matches!(
            result.ensure_passed(),
            Err(KernelMvmError::GradientCheck(_))
        ));
    }

    #[test]
    fn test_compare_arrays_length_mismatch() {
        let a = array![1.0, 2.0];
        let b = array![1.0];
        let config = GradientCheckConfig::default();
        assert!(compare_arrays(a.view(), b.view(), "len", &config).is_err());
    }

    #[test]
    fn test_numeric_jvp_rejects_bad_step() {
        let x = Array2::from_elem((4, 2), 0.5);
        let b = Array1::ones(4);
        let op = KernelMvm::new(b.view(), x.view(), 0.9, MvmConfig::new(2)).unwrap();
        let primals = KernelPrimals::new(array![1.0, 1.0], 0.5, 0.2);
        assert!(numeric_jvp(&op, &primals, &KernelTangents::zeros(2), 0.0).is_err());
    }

    #[test]
    fn test_kernel_mvm_rules_pass() {
        let x = Array2::from_shape_fn((10, 3), |(i, j)| ((i * 3 + j) as f64 * 0.37).sin());
        let b = Array1::from_shape_fn(10, |i| (i as f64 * 0.5).cos());
        let u = Array1::from_shape_fn(10, |i| 0.1 * i as f64 - 0.4);
        let op = KernelMvm::new(b.view(), x.view(), 0.9, MvmConfig::new(3)).unwrap();
        let primals = KernelPrimals::new(array![0.8, 1.1, 0.6], 0.55, 0.22);

        let results = check_gradients(&op, &primals, u.view(), None).unwrap();
        assert_eq!(results.len(), 6);
        for result in results {
            assert!(result.passed, "{:?}", result);
        }
    }
}
