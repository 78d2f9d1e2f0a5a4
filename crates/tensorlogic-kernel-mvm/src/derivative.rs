//! Analytic forward- and reverse-mode rules for the kernel matrix-vector product.
//!
//! [`KernelMvm`] holds the non-differentiable context (`b`, `X`, `c` and the
//! chunking configuration). Only `(κ, η1, η2)` carry tangents. Supplying
//! perturbed `b`, `X` or `c` through this rule is a precondition violation:
//! the rule has no terms for them and silently ignores such changes.
//!
//! With `kX = κ⊙X`, `dkX = κ̇⊙X` and `s_ij = kX_i·kX_j`, the tangent of `K b`
//! along `(κ̇, η̇1, η̇2)` is
//!
//! ```text
//! 2η1²·kX(dkXᵗ b) − 2η2²·[(κ³⊙X²)((κ̇⊙X²)ᵗ b) − ((kX kXᵗ)⊙(dkX kXᵗ)) b]
//!   + 2η1·η̇1·k3b
//!   + η2·η̇2·(k1b − k2b − 2·k3b − k4b)
//! ```
//!
//! and every product in it is a partitioned MVM.

use scirs2_core::ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::autodiff::{CustomJvp, CustomVjp, TangentSpace};
use crate::chunking::chunk_map;
use crate::config::MvmConfig;
use crate::error::{KernelMvmError, Result};
use crate::kernel::PrimalTerms;
use crate::partitioned::{kx_mvm, kx_mvm_rows};
use crate::rows::kxdkx_sq_mvm;

/// Differentiable inputs of the kernel MVM.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPrimals {
    /// Per-feature scaling, length P
    pub kappa: Array1<f64>,
    /// Linear-term scale
    pub eta1: f64,
    /// Quadratic-term scale
    pub eta2: f64,
}

impl KernelPrimals {
    pub fn new(kappa: Array1<f64>, eta1: f64, eta2: f64) -> Self {
        Self { kappa, eta1, eta2 }
    }
}

/// Tangent direction `(κ̇, η̇1, η̇2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelTangents {
    pub kappa_dot: Array1<f64>,
    pub eta1_dot: f64,
    pub eta2_dot: f64,
}

impl KernelTangents {
    pub fn new(kappa_dot: Array1<f64>, eta1_dot: f64, eta2_dot: f64) -> Self {
        Self {
            kappa_dot,
            eta1_dot,
            eta2_dot,
        }
    }

    /// The zero tangent for `p` features.
    pub fn zeros(p: usize) -> Self {
        Self::new(Array1::zeros(p), 0.0, 0.0)
    }
}

/// Gradient of a scalar with respect to `(κ, η1, η2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelCotangents {
    pub kappa: Array1<f64>,
    pub eta1: f64,
    pub eta2: f64,
}

/// Kernel matrix-vector product `K(κ⊙X, κ⊙X; η1, η2, c) b` as a
/// differentiable operation.
///
/// # Example
/// ```rust
/// use scirs2_core::ndarray::{Array1, Array2};
/// use tensorlogic_kernel_mvm::autodiff::jvp;
/// use tensorlogic_kernel_mvm::{KernelMvm, KernelPrimals, KernelTangents, MvmConfig};
///
/// let x = Array2::from_shape_fn((8, 3), |(i, j)| ((i * 3 + j) as f64).sin());
/// let b = Array1::from_elem(8, 0.125);
/// let op = KernelMvm::new(b.view(), x.view(), 0.9, MvmConfig::new(2)).unwrap();
///
/// let kappa = Array1::from_elem(3, 0.5);
/// let primals = KernelPrimals::new(kappa.clone(), 0.55, 0.22);
/// let tangents = KernelTangents::new(&kappa * 1.4, 0.1, 0.2);
/// let (kb, dkb) = jvp(&op, &primals, &tangents).unwrap();
/// assert_eq!(kb.len(), 8);
/// assert_eq!(dkb.len(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct KernelMvm<'a> {
    b: ArrayView1<'a, f64>,
    x: ArrayView2<'a, f64>,
    c: f64,
    config: MvmConfig,
}

impl<'a> KernelMvm<'a> {
    /// Bind the non-differentiable context.
    pub fn new(
        b: ArrayView1<'a, f64>,
        x: ArrayView2<'a, f64>,
        c: f64,
        config: MvmConfig,
    ) -> Result<Self> {
        config.validate()?;
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(KernelMvmError::InvalidParameter {
                parameter: "x".to_string(),
                value: format!("{:?}", x.shape()),
                reason: "feature matrix must be non-empty".to_string(),
            });
        }
        if b.len() != x.nrows() {
            return Err(KernelMvmError::mismatch(
                x.nrows(),
                b.len(),
                "kernel_mvm right-hand side",
            ));
        }
        if !c.is_finite() {
            return Err(KernelMvmError::InvalidParameter {
                parameter: "c".to_string(),
                value: c.to_string(),
                reason: "hyperparameters must be finite".to_string(),
            });
        }
        Ok(Self { b, x, c, config })
    }

    /// Number of samples N.
    pub fn num_samples(&self) -> usize {
        self.x.nrows()
    }

    /// Number of features P.
    pub fn num_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn config(&self) -> &MvmConfig {
        &self.config
    }

    fn check_primals(&self, primals: &KernelPrimals) -> Result<()> {
        if primals.kappa.len() != self.num_features() {
            return Err(KernelMvmError::mismatch(self.num_features(), primals.kappa.len(), "kappa"));
        }
        for (name, value) in [("eta1", primals.eta1), ("eta2", primals.eta2)] {
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

    fn scaled(&self, kappa: &Array1<f64>) -> Array2<f64> {
        &self.x * kappa
    }

    fn primal_terms(&self, kx: &Array2<f64>) -> Result<PrimalTerms> {
        tracing::debug!(
            n = self.num_samples(),
            p = self.num_features(),
            dilation = self.config.dilation,
            "kernel_mvm primal terms"
        );
        PrimalTerms::compute(self.b, kx.view(), &self.config)
    }

    /// `Σ_i u_i X_ip (S (b⊙X))_ip` with `S = kX kXᵗ`, computed one row block of
    /// `S` at a time.
    fn gram_weighted_cross(&self, u: ArrayView1<'_, f64>, kx: &Array2<f64>) -> Result<Array1<f64>> {
        let weighted = &self.x * &self.b.insert_axis(Axis(1));
        let n = self.num_samples();
        let chunk_size = self.config.chunk_size(n)?;
        let t = chunk_map(n, chunk_size, self.config.parallel, |range| {
            kx.slice(s![range, ..]).dot(&kx.t()).dot(&weighted)
        })?;
        let ux = &self.x * &u.insert_axis(Axis(1));
        Ok((ux * t).sum_axis(Axis(0)))
    }
}

impl CustomJvp for KernelMvm<'_> {
    type Primals = KernelPrimals;
    type Tangents = KernelTangents;

    fn name(&self) -> &str {
        "kernel_mvm"
    }

    fn evaluate(&self, primals: &KernelPrimals) -> Result<Array1<f64>> {
        self.check_primals(primals)?;
        let kx = self.scaled(&primals.kappa);
        let terms = self.primal_terms(&kx)?;
        Ok(terms.combine(primals.eta1, primals.eta2, self.c))
    }

    fn evaluate_with_tangent(
        &self,
        primals: &KernelPrimals,
        tangents: &KernelTangents,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_primals(primals)?;
        if tangents.kappa_dot.len() != self.num_features() {
            return Err(KernelMvmError::mismatch(
                self.num_features(),
                tangents.kappa_dot.len(),
                "kappa tangent",
            ));
        }

        let KernelPrimals { kappa, eta1, eta2 } = primals;
        let (eta1, eta2) = (*eta1, *eta2);
        let eta1sq = eta1 * eta1;
        let eta2sq = eta2 * eta2;
        let config = &self.config;

        let kx = self.scaled(kappa);
        let x_sq = self.x.mapv(|v| v * v);
        let dkx = &self.x * &tangents.kappa_dot;
        let dkx_sq = &x_sq * &tangents.kappa_dot;
        let k3x_sq = &x_sq * &kappa.mapv(|k| k * k * k);

        let terms = self.primal_terms(&kx)?;
        let primal_out = terms.combine(eta1, eta2, self.c);

        let b_dkx = kx_mvm(self.b, dkx.view(), config)?;
        let b_dkx_sq = kx_mvm(self.b, dkx_sq.view(), config)?;
        let kxdkx_sq_b = kxdkx_sq_mvm(self.b, kx.view(), dkx.view(), config)?;
        let kx_b_dkx = kx_mvm_rows(b_dkx.view(), kx.view(), config)?;
        let k3x_sq_b_dkx_sq = kx_mvm_rows(b_dkx_sq.view(), k3x_sq.view(), config)?;

        let tangent_kappa =
            kx_b_dkx * (2.0 * eta1sq) - (k3x_sq_b_dkx_sq - kxdkx_sq_b) * (2.0 * eta2sq);
        let tangent_eta1 = &terms.k3b * (2.0 * eta1 * tangents.eta1_dot);
        let tangent_eta2 = terms.eta2_direction() * (eta2 * tangents.eta2_dot);

        Ok((primal_out, tangent_kappa + tangent_eta1 + tangent_eta2))
    }
}

impl TangentSpace for KernelMvm<'_> {
    type Cotangents = KernelCotangents;

    fn tangent_dim(&self, primals: &KernelPrimals) -> usize {
        primals.kappa.len() + 2
    }

    fn basis_tangent(&self, primals: &KernelPrimals, k: usize) -> KernelTangents {
        let p = primals.kappa.len();
        let mut tangents = KernelTangents::zeros(p);
        match k {
            k if k < p => tangents.kappa_dot[k] = 1.0,
            k if k == p => tangents.eta1_dot = 1.0,
            _ => tangents.eta2_dot = 1.0,
        }
        tangents
    }

    fn displace(
        &self,
        primals: &KernelPrimals,
        tangents: &KernelTangents,
        step: f64,
    ) -> KernelPrimals {
        KernelPrimals {
            kappa: &primals.kappa + &(&tangents.kappa_dot * step),
            eta1: primals.eta1 + step * tangents.eta1_dot,
            eta2: primals.eta2 + step * tangents.eta2_dot,
        }
    }

    fn cotangent_from_components(
        &self,
        primals: &KernelPrimals,
        components: &[f64],
    ) -> KernelCotangents {
        let p = primals.kappa.len();
        debug_assert_eq!(components.len(), p + 2, "one component per basis direction");
        KernelCotangents {
            kappa: Array1::from_vec(components[..p].to_vec()),
            eta1: components[p],
            eta2: components[p + 1],
        }
    }

    fn cotangent_components(&self, cotangents: &KernelCotangents) -> Array1<f64> {
        cotangents
            .kappa
            .iter()
            .copied()
            .chain([cotangents.eta1, cotangents.eta2])
            .collect()
    }
}

impl CustomVjp for KernelMvm<'_> {
    /// `uᵗ ∂(K b)/∂κ_p = 2κ_p[η1²(Xᵗu)_p(Xᵗb)_p + η2²·B_p] − 2η2²κ_p³(X²ᵗu)_p(X²ᵗb)_p`
    /// where `B_p = Σ_i u_i X_ip (S (b⊙X))_ip`.
    fn vjp(
        &self,
        primals: &KernelPrimals,
        cotangent: ArrayView1<'_, f64>,
    ) -> Result<(Array1<f64>, KernelCotangents)> {
        self.check_primals(primals)?;
        if cotangent.len() != self.num_samples() {
            return Err(KernelMvmError::mismatch(
                self.num_samples(),
                cotangent.len(),
                "kernel_mvm cotangent",
            ));
        }

        let KernelPrimals { kappa, eta1, eta2 } = primals;
        let (eta1, eta2) = (*eta1, *eta2);
        let eta1sq = eta1 * eta1;
        let eta2sq = eta2 * eta2;
        let config = &self.config;

        let kx = self.scaled(kappa);
        let x_sq = self.x.mapv(|v| v * v);

        let terms = self.primal_terms(&kx)?;
        let primal_out = terms.combine(eta1, eta2, self.c);

        let xt_u = kx_mvm(cotangent, self.x, config)?;
        let xt_b = kx_mvm(self.b, self.x, config)?;
        let x_sq_t_u = kx_mvm(cotangent, x_sq.view(), config)?;
        let x_sq_t_b = kx_mvm(self.b, x_sq.view(), config)?;
        let cross = self.gram_weighted_cross(cotangent, &kx)?;

        let linear = (xt_u * xt_b) * eta1sq + cross * eta2sq;
        let quartic = x_sq_t_u * x_sq_t_b * kappa.mapv(|k| k * k * k);
        let grad_kappa = kappa * &linear * 2.0 - quartic * (2.0 * eta2sq);

        let grad_eta1 = 2.0 * eta1 * cotangent.dot(&terms.k3b);
        let grad_eta2 = eta2 * cotangent.dot(&terms.eta2_direction());

        Ok((
            primal_out,
            KernelCotangents {
                kappa: grad_kappa,
                eta1: grad_eta1,
                eta2: grad_eta2,
            },
        ))
    }
}
