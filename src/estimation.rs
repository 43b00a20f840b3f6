//! Ability estimation by bracketed root finding on the likelihood equation.
//!
//! This module provides:
//! - A Brent-style bracketing root finder with a diagnostic result
//! - Single-pattern ability estimation (MLE or Warm's WLE)
//! - Parallel estimation over the rows of a response matrix

use log::{debug, warn};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CatError, CatResult};
use crate::information::{item_information, InformationType};
use crate::likelihood::{curvature, score, warm_correction, Weighting};
use crate::params::{usable_pattern, ItemParams, Model, UsablePattern};
use crate::utils::{validate_range, DEFAULT_RANGE};

/// Default absolute tolerance of [`find_root`], `f64::EPSILON^0.25`.
pub const ROOT_TOLERANCE: f64 = 1.220_703_125e-4;

/// Default iteration cap of [`find_root`].
pub const MAX_ITERATIONS: usize = 1000;

/// Outcome of a root search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RootResult {
    pub root: f64,
    pub f_root: f64,
    pub iterations: usize,
    /// Width of the final bracket.
    pub estim_prec: f64,
    /// False when the iteration cap was hit or the interval held no sign change.
    pub converged: bool,
}

/// Find a zero of `f` in `[lower, upper]`.
///
/// Brent's method: inverse quadratic or secant steps, falling back to
/// bisection whenever the interpolated step is not safe.
///
/// `f` is treated as a gradient. If it has the same sign at both ends, the
/// end it points toward is returned (`upper` for positive values, `lower`
/// otherwise) with `converged == false`.
pub fn find_root<F>(mut f: F, lower: f64, upper: f64, tol: f64, max_iter: usize) -> RootResult
where
    F: FnMut(f64) -> f64,
{
    let mut a = lower;
    let mut b = upper;
    let mut fa = f(a);
    if fa == 0.0 {
        return RootResult {
            root: a,
            f_root: fa,
            iterations: 0,
            estim_prec: 0.0,
            converged: true,
        };
    }
    let mut fb = f(b);
    if fb == 0.0 {
        return RootResult {
            root: b,
            f_root: fb,
            iterations: 0,
            estim_prec: 0.0,
            converged: true,
        };
    }

    if fa.signum() == fb.signum() {
        let (root, f_root) = if fb > 0.0 { (b, fb) } else { (a, fa) };
        warn!("no sign change on [{lower}, {upper}], clamping root to {root}");
        return RootResult {
            root,
            f_root,
            iterations: 0,
            estim_prec: f64::NAN,
            converged: false,
        };
    }

    let mut c = a;
    let mut fc = fa;

    for iteration in 0..=max_iter {
        let prev_step = b - a;

        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol_act = 2.0 * f64::EPSILON * b.abs() + tol / 2.0;
        let mut new_step = (c - b) / 2.0;

        if new_step.abs() <= tol_act || fb == 0.0 {
            return RootResult {
                root: b,
                f_root: fb,
                iterations: iteration,
                estim_prec: (c - b).abs(),
                converged: true,
            };
        }

        if prev_step.abs() >= tol_act && fa.abs() > fb.abs() {
            let cb = c - b;
            let mut p;
            let mut q;
            if a == c {
                let t1 = fb / fa;
                p = cb * t1;
                q = 1.0 - t1;
            } else {
                let qa = fa / fc;
                let t1 = fb / fc;
                let t2 = fb / fa;
                p = t2 * (cb * qa * (qa - t1) - (b - a) * (t1 - 1.0));
                q = (qa - 1.0) * (t1 - 1.0) * (t2 - 1.0);
            }
            if p > 0.0 {
                q = -q;
            } else {
                p = -p;
            }
            if p < 0.75 * cb * q - (tol_act * q).abs() / 2.0 && p < (prev_step * q / 2.0).abs() {
                new_step = p / q;
            }
        }

        if new_step.abs() < tol_act {
            new_step = if new_step > 0.0 { tol_act } else { -tol_act };
        }

        a = b;
        fa = fb;
        b += new_step;
        fb = f(b);

        if (fb > 0.0 && fc > 0.0) || (fb < 0.0 && fc < 0.0) {
            c = a;
            fc = fa;
        }
    }

    warn!("root finder reached {max_iter} iterations without converging");
    RootResult {
        root: b,
        f_root: fb,
        iterations: max_iter,
        estim_prec: (c - b).abs(),
        converged: false,
    }
}

/// Ability estimator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Closed search interval for θ.
    pub range: [f64; 2],
    pub weighting: Weighting,
    /// Information reported alongside θ.
    pub information: InformationType,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        EstimatorOptions {
            range: DEFAULT_RANGE,
            weighting: Weighting::Wle,
            information: InformationType::Observed,
        }
    }
}

impl EstimatorOptions {
    pub fn with_range(mut self, range: [f64; 2]) -> Self {
        self.range = range;
        self
    }

    pub fn validate(&self) -> CatResult<()> {
        validate_range(self.range)
    }
}

/// Estimated ability with its information and standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub info: f64,
    pub sem: f64,
}

impl AbilityEstimate {
    /// Estimate reported when no response is usable: θ = 0, NaN info and sem.
    pub fn unestimated() -> Self {
        AbilityEstimate {
            theta: 0.0,
            info: f64::NAN,
            sem: f64::NAN,
        }
    }
}

impl Default for AbilityEstimate {
    fn default() -> Self {
        AbilityEstimate::unestimated()
    }
}

fn solve_pattern(pattern: &UsablePattern<'_>, options: &EstimatorOptions) -> RootResult {
    let [lower, upper] = options.range;
    let result = find_root(
        |theta| score(pattern, theta, options.weighting),
        lower,
        upper,
        ROOT_TOLERANCE,
        MAX_ITERATIONS,
    );
    debug!(
        "theta root {:.6} after {} iterations (f = {:.3e}, precision {:.3e})",
        result.root, result.iterations, result.f_root, result.estim_prec
    );
    result
}

fn estimate_pattern(pattern: &UsablePattern<'_>, options: &EstimatorOptions) -> AbilityEstimate {
    if pattern.is_empty() {
        return AbilityEstimate::unestimated();
    }
    let [lower, upper] = options.range;
    let theta = solve_pattern(pattern, options).root.clamp(lower, upper);

    let info = match options.information {
        InformationType::Observed => -curvature(pattern, theta).sum(),
        InformationType::Expected => pattern
            .items
            .iter()
            .map(|item| item_information(item, theta))
            .sum(),
    };
    let shift = match options.weighting {
        Weighting::Mle => 0.0,
        Weighting::Wle => warm_correction(&pattern.items, theta),
    };
    let sem = if info.is_finite() && info > 0.0 {
        ((info + shift * shift) / (info * info)).sqrt()
    } else {
        f64::NAN
    };

    AbilityEstimate { theta, info, sem }
}

/// Root-finder diagnostics for a response pattern.
///
/// `None` when no response is usable.
pub fn solve_theta(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    options: &EstimatorOptions,
) -> CatResult<Option<RootResult>> {
    options.validate()?;
    let pattern = usable_pattern(model, items, responses)?;
    if pattern.is_empty() {
        return Ok(None);
    }
    Ok(Some(solve_pattern(&pattern, options)))
}

/// Estimate θ from one response pattern.
///
/// # Arguments
/// * `model` - Response model shared by every item
/// * `items` - Item parameters aligned with `responses`
/// * `responses` - Observed responses; non-finite values are treated as missing
/// * `options` - Search range, likelihood weighting and reported information
pub fn estimate_ability(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    options: &EstimatorOptions,
) -> CatResult<AbilityEstimate> {
    options.validate()?;
    let pattern = usable_pattern(model, items, responses)?;
    Ok(estimate_pattern(&pattern, options))
}

/// Estimate θ for every row of a response matrix in parallel.
///
/// Any invalid row rejects the whole batch.
pub fn estimate_batch(
    model: Model,
    items: &[ItemParams],
    patterns: ArrayView2<f64>,
    options: &EstimatorOptions,
) -> CatResult<Vec<AbilityEstimate>> {
    options.validate()?;
    if patterns.nrows() == 0 {
        return Err(CatError::Empty("patterns"));
    }

    (0..patterns.nrows())
        .into_par_iter()
        .map(|row| -> CatResult<AbilityEstimate> {
            let responses = patterns.row(row).to_vec();
            let pattern = usable_pattern(model, items, &responses)?;
            Ok(estimate_pattern(&pattern, options))
        })
        .collect()
}
