//! Log-likelihood of a response pattern and its θ derivatives.
//!
//! This module provides:
//! - Pattern log-likelihood at one θ or across a θ grid
//! - First derivative under maximum or Warm-weighted likelihood
//! - Per-item second derivatives (observed curvature)

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CatError, CatResult};
use crate::models::{item_curves, observed_curve};
use crate::params::{usable_pattern, ItemParams, Model, UsablePattern};

/// Likelihood equation solved by the ability estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Weighting {
    /// Plain maximum likelihood.
    Mle,
    /// Warm's weighted likelihood, adding `J(θ) / 2I(θ)` to the score.
    #[default]
    Wle,
}

impl FromStr for Weighting {
    type Err = CatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MLE" | "mle" => Ok(Weighting::Mle),
            "WLE" | "wle" => Ok(Weighting::Wle),
            other => Err(CatError::option(
                "type",
                format!("expected \"MLE\" or \"WLE\", found \"{other}\""),
            )),
        }
    }
}

/// Expected test information and the sum of `P'·P''/P` over all categories.
pub(crate) fn information_and_slope(items: &[&ItemParams], theta: f64) -> (f64, f64) {
    items
        .iter()
        .flat_map(|item| item_curves(item, theta))
        .fold((0.0, 0.0), |(info, slope), curve| {
            (
                info + curve.d1 * curve.d1 / curve.p,
                slope + curve.d1 * curve.d2 / curve.p,
            )
        })
}

/// First log-likelihood derivative over an already filtered pattern.
pub(crate) fn score(pattern: &UsablePattern<'_>, theta: f64, weighting: Weighting) -> f64 {
    let mle: f64 = pattern
        .items
        .iter()
        .zip(&pattern.responses)
        .map(|(item, &u)| {
            let curve = observed_curve(item, u, theta);
            curve.d1 / curve.p
        })
        .sum();

    match weighting {
        Weighting::Mle => mle,
        Weighting::Wle => mle + warm_correction(&pattern.items, theta),
    }
}

/// Warm's bias-correction term `J(θ) / 2I(θ)`.
pub(crate) fn warm_correction(items: &[&ItemParams], theta: f64) -> f64 {
    let (info, slope) = information_and_slope(items, theta);
    slope / (2.0 * info)
}

/// Per-item second log-likelihood derivatives over an already filtered pattern.
pub(crate) fn curvature(pattern: &UsablePattern<'_>, theta: f64) -> Array1<f64> {
    pattern
        .items
        .iter()
        .zip(&pattern.responses)
        .map(|(item, &u)| {
            let curve = observed_curve(item, u, theta);
            let ratio = curve.d1 / curve.p;
            curve.d2 / curve.p - ratio * ratio
        })
        .collect()
}

fn pattern_log_likelihood(pattern: &UsablePattern<'_>, theta: f64) -> f64 {
    pattern
        .items
        .iter()
        .zip(&pattern.responses)
        .map(|(item, &u)| observed_curve(item, u, theta).p.ln())
        .sum()
}

/// First derivative of the log-likelihood at `theta`.
///
/// Missing responses are dropped with their items; an empty usable pattern
/// contributes nothing and yields `0.0`.
pub fn lder1(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    theta: f64,
    weighting: Weighting,
) -> CatResult<f64> {
    let pattern = usable_pattern(model, items, responses)?;
    if pattern.is_empty() {
        return Ok(0.0);
    }
    Ok(score(&pattern, theta, weighting))
}

/// Second log-likelihood derivative of each answered item at `theta`.
pub fn lder2(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    theta: f64,
) -> CatResult<Array1<f64>> {
    let pattern = usable_pattern(model, items, responses)?;
    Ok(curvature(&pattern, theta))
}

/// Log-likelihood of the answered part of a response pattern.
pub fn log_likelihood(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    theta: f64,
) -> CatResult<f64> {
    let pattern = usable_pattern(model, items, responses)?;
    Ok(pattern_log_likelihood(&pattern, theta))
}

/// Log-likelihood of a response pattern at each θ of `thetas`.
pub fn log_likelihood_grid(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    thetas: ArrayView1<f64>,
) -> CatResult<Array1<f64>> {
    let pattern = usable_pattern(model, items, responses)?;
    Ok(grid_log_likelihood(&pattern, thetas))
}

pub(crate) fn grid_log_likelihood(
    pattern: &UsablePattern<'_>,
    thetas: ArrayView1<f64>,
) -> Array1<f64> {
    thetas.mapv(|theta| pattern_log_likelihood(pattern, theta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn brm_bank() -> Vec<ItemParams> {
        [
            [1.55, -1.88, 0.12],
            [3.02, -0.38, 0.12],
            [1.9, -0.1, 0.12],
            [2.06, 0.41, 0.12],
            [1.48, 0.72, 0.12],
        ]
        .iter()
        .map(|p| ItemParams::from_slice(Model::Brm, p).unwrap())
        .collect()
    }

    fn grm_bank() -> Vec<ItemParams> {
        [
            [1.55, -1.88, 0.12],
            [3.02, -0.38, 0.12],
            [1.9, -0.1, 0.12],
            [2.06, 0.12, 0.41],
            [1.48, 0.12, 0.72],
        ]
        .iter()
        .map(|p| ItemParams::from_slice(Model::Grm, p).unwrap())
        .collect()
    }

    #[test]
    fn test_lder1_brm_reference() {
        let resp = [1.0, 1.0, 1.0, 0.0, 0.0];
        let mle = lder1(Model::Brm, &brm_bank(), &resp, -1.3, Weighting::Mle).unwrap();
        let wle = lder1(Model::Brm, &brm_bank(), &resp, -1.3, Weighting::Wle).unwrap();
        assert_abs_diff_eq!(mle, 1.797812, epsilon = 1e-6);
        assert_abs_diff_eq!(wle, 2.067604, epsilon = 1e-6);
    }

    #[test]
    fn test_lder1_grm_reference() {
        let resp = [1.0, 2.0, 1.0, 3.0, 1.0];
        let mle = lder1(Model::Grm, &grm_bank(), &resp, -1.3, Weighting::Mle).unwrap();
        let wle = lder1(Model::Grm, &grm_bank(), &resp, -1.3, Weighting::Wle).unwrap();
        assert_abs_diff_eq!(mle, 3.36416271, epsilon = 1e-6);
        assert_abs_diff_eq!(wle, 4.00699728, epsilon = 1e-6);
    }

    #[test]
    fn test_lder2_brm_reference() {
        let resp = [1.0, 1.0, 1.0, 0.0, 0.0];
        let d2 = lder2(Model::Brm, &brm_bank(), &resp, -1.3).unwrap();
        let expected = [-0.38726367, 1.54763399, 0.5928689, -0.1181999, -0.09989038];
        for (got, want) in d2.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_lder1_is_slope_of_log_likelihood() {
        let bank = grm_bank();
        let resp = [2.0, 1.0, 3.0, 3.0, 2.0];
        let h = 1e-5;
        let up = log_likelihood(Model::Grm, &bank, &resp, 0.4 + h).unwrap();
        let down = log_likelihood(Model::Grm, &bank, &resp, 0.4 - h).unwrap();
        let slope = lder1(Model::Grm, &bank, &resp, 0.4, Weighting::Mle).unwrap();
        assert_abs_diff_eq!(slope, (up - down) / (2.0 * h), epsilon = 1e-6);
    }

    #[test]
    fn test_missing_responses_are_ignored() {
        let bank = brm_bank();
        let full = lder1(Model::Brm, &bank[..3], &[1.0, 0.0, 1.0], 0.2, Weighting::Wle).unwrap();
        let gappy = lder1(
            Model::Brm,
            &bank,
            &[1.0, 0.0, 1.0, f64::NAN, f64::NEG_INFINITY],
            0.2,
            Weighting::Wle,
        )
        .unwrap();
        assert_abs_diff_eq!(full, gappy, epsilon = 1e-12);
        assert_eq!(lder2(Model::Brm, &bank, &[f64::NAN; 5], 0.0).unwrap().len(), 0);
    }

    #[test]
    fn test_log_likelihood_grid_peaks_near_estimate() {
        let thetas = array![-2.0, 0.0, 2.0];
        let resp = [1.0, 1.0, 1.0, 0.0, 0.0];
        let grid = log_likelihood_grid(Model::Brm, &brm_bank(), &resp, thetas.view()).unwrap();
        assert!(grid[1] > grid[0]);
        assert!(grid[1] > grid[2]);
    }

    #[test]
    fn test_weighting_keywords() {
        assert_eq!("MLE".parse::<Weighting>().unwrap(), Weighting::Mle);
        assert_eq!("wle".parse::<Weighting>().unwrap(), Weighting::Wle);
        assert!("EAP".parse::<Weighting>().is_err());
    }
}
