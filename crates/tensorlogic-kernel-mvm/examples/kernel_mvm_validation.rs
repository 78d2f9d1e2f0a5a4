//! Validate the partitioned kernel product and its derivative rules.
//!
//! This example demonstrates:
//! - Computing `K b` at several dilations
//! - Comparing against the dense reference
//! - Forward-mode tangents and reverse-mode gradients
//! - Finite-difference checks of both rules
//!
//! Run with `RUST_LOG=tensorlogic_kernel_mvm=debug` to see chunking decisions.

use scirs2_core::ndarray::{Array1, Array2};
use tensorlogic_kernel_mvm::autodiff::{jvp, value_and_grad};
use tensorlogic_kernel_mvm::gradient_check::check_gradients;
use tensorlogic_kernel_mvm::reference::{reference_kernel_mvm, reference_value_and_grad};
use tensorlogic_kernel_mvm::{
    kernel_mvm, KernelHyperparams, KernelMvm, KernelPrimals, KernelTangents, MvmConfig,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .try_init()?;

    println!("=== Kernel MVM Validation ===\n");

    let (n, p) = (120, 12);
    let x = Array2::from_shape_fn((n, p), |(i, j)| ((i * p + j) as f64 * 0.37).sin());
    let b = Array1::from_shape_fn(n, |i| (i as f64 * 0.11).cos());
    let kappa = Array1::from_shape_fn(p, |j| 0.5 + 0.1 * j as f64);
    let hyper = KernelHyperparams::new(0.55, 0.22, 0.9);

    let dense = reference_kernel_mvm(b.view(), kappa.view(), x.view(), &hyper)?;
    println!("Primal (N = {}, P = {}):", n, p);
    for dilation in [1, 2, 4, 8] {
        let config = MvmConfig::new(dilation);
        let kb = kernel_mvm(b.view(), kappa.view(), x.view(), &hyper, &config)?;
        println!(
            "  dilation {:>2} (chunk {:>3}): max |Δ| vs dense = {:.3e}",
            dilation,
            config.chunk_size(n)?,
            max_abs_diff(&kb, &dense)
        );
    }

    let op = KernelMvm::new(b.view(), x.view(), hyper.c, MvmConfig::new(4))?;
    let primals = KernelPrimals::new(kappa.clone(), hyper.eta1, hyper.eta2);

    let tangents = KernelTangents::new(&kappa * 1.4, 0.1, 0.2);
    let (_, dkb) = jvp(&op, &primals, &tangents)?;
    println!("\nForward mode: ‖dK b‖ = {:.6}", dkb.dot(&dkb).sqrt());

    let weights = Array1::ones(n);
    let (value, grads) = value_and_grad(&op, &primals, weights.view())?;
    let (_, dense_grads) =
        reference_value_and_grad(weights.view(), b.view(), kappa.view(), x.view(), &hyper)?;
    println!("Reverse mode: 1ᵗK b = {:.6}", value);
    println!(
        "  max |Δ grad κ| vs dense = {:.3e}",
        max_abs_diff(&grads.kappa, &dense_grads.kappa)
    );
    println!(
        "  grad η1 = {:.6} (dense {:.6}), grad η2 = {:.6} (dense {:.6})",
        grads.eta1, dense_grads.eta1, grads.eta2, dense_grads.eta2
    );

    println!("\nFinite-difference checks:");
    for result in check_gradients(&op, &primals, weights.view(), None)? {
        println!(
            "  {:<24} max abs {:.3e}  max rel {:.3e}  {}",
            result.name,
            result.max_abs_diff,
            result.max_rel_diff,
            if result.passed { "ok" } else { "FAILED" }
        );
    }

    Ok(())
}
