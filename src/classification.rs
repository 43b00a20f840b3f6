//! Sequential classification by a generalized likelihood ratio test.
//!
//! The pattern log-likelihood is scanned on a fixed θ grid. At each cut
//! score the best fit above the indifference region is compared with the
//! best fit below it, and the ratios are checked against Wald's SPRT
//! thresholds to pick a category or defer.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CatError, CatResult};
use crate::likelihood::grid_log_likelihood;
use crate::params::{usable_pattern, ItemParams, Model};
use crate::utils::{theta_grid, validate_range, DEFAULT_RANGE, GRID_STEP};

/// Offset of the sentinel ratios that make the outermost categories reachable.
const SENTINEL_EPSILON: f64 = 1e-6;

/// Largest θ grid a classification may scan.
const MAX_GRID_POINTS: f64 = 100_000.0;

/// Settings of the likelihood ratio classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlrOptions {
    /// θ interval scanned for the likelihood maximum.
    pub range: [f64; 2],
    /// Cut scores separating consecutive categories, ascending.
    pub bounds: Vec<f64>,
    /// Category labels, one more than the cut scores.
    pub categories: Vec<i32>,
    /// Half-width of the indifference region around each cut score.
    pub delta: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for GlrOptions {
    fn default() -> Self {
        GlrOptions {
            range: DEFAULT_RANGE,
            bounds: vec![-1.0, 1.0],
            categories: vec![0, 1, 2],
            delta: 0.1,
            alpha: 0.05,
            beta: 0.05,
        }
    }
}

impl GlrOptions {
    pub fn validate(&self) -> CatResult<()> {
        validate_range(self.range)?;
        if (self.range[1] - self.range[0]) / GRID_STEP > MAX_GRID_POINTS {
            return Err(CatError::option(
                "range",
                format!(
                    "[{}, {}] exceeds {MAX_GRID_POINTS} grid points",
                    self.range[0], self.range[1]
                ),
            ));
        }
        if self.bounds.is_empty() {
            return Err(CatError::option("bounds", "at least one cut score is required"));
        }
        if let Some(bound) = self.bounds.iter().find(|b| !b.is_finite()) {
            return Err(CatError::option("bounds", format!("{bound} is not finite")));
        }
        if self.bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CatError::option("bounds", "cut scores must be strictly ascending"));
        }
        if self.categories.len() != self.bounds.len() + 1 {
            return Err(CatError::option(
                "categories",
                format!(
                    "{} cut scores need {} categories, found {}",
                    self.bounds.len(),
                    self.bounds.len() + 1,
                    self.categories.len()
                ),
            ));
        }
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(CatError::option("delta", "must be finite and positive"));
        }
        for (name, rate) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(rate > 0.0 && rate < 1.0) {
                return Err(CatError::option(name, "must lie strictly between 0 and 1"));
            }
        }
        Ok(())
    }

    /// Wald thresholds `(c_lower, c_upper)`.
    pub fn thresholds(&self) -> (f64, f64) {
        (
            (self.beta / (1.0 - self.alpha)).ln(),
            ((1.0 - self.beta) / self.alpha).ln(),
        )
    }
}

/// Log-likelihood ratio at each cut score of `options.bounds`.
///
/// A side of the indifference region with no grid point contributes `-inf`.
pub fn likelihood_ratios(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    options: &GlrOptions,
) -> CatResult<Vec<f64>> {
    options.validate()?;
    let pattern = usable_pattern(model, items, responses)?;

    let [lower, upper] = options.range;
    let grid = theta_grid(lower, upper, GRID_STEP);
    let loglik = grid_log_likelihood(&pattern, grid.view());

    let side_max = |keep: &dyn Fn(f64) -> bool| {
        grid.iter()
            .zip(loglik.iter())
            .filter(|(theta, _)| keep(**theta))
            .map(|(_, ll)| *ll)
            .fold(f64::NEG_INFINITY, f64::max)
    };

    Ok(options
        .bounds
        .iter()
        .map(|&bound| {
            let above = side_max(&|theta| theta > bound + options.delta);
            let below = side_max(&|theta| theta < bound - options.delta);
            above - below
        })
        .collect())
}

/// Classify a response pattern, or `None` while the evidence is undecided.
pub fn classify(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    options: &GlrOptions,
) -> CatResult<Option<i32>> {
    let ratios = likelihood_ratios(model, items, responses, options)?;
    let (c_lower, c_upper) = options.thresholds();
    debug!("likelihood ratios {ratios:?} against [{c_lower:.4}, {c_upper:.4}]");

    let mut scan = Vec::with_capacity(ratios.len() + 2);
    scan.push(c_upper + SENTINEL_EPSILON);
    scan.extend(ratios);
    scan.push(c_lower - SENTINEL_EPSILON);

    Ok(scan
        .windows(2)
        .position(|pair| pair[0] >= c_upper && pair[1] <= c_lower)
        .map(|k| options.categories[k]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

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

    fn binary_options() -> GlrOptions {
        GlrOptions {
            bounds: vec![0.0],
            categories: vec![0, 1],
            delta: 0.5,
            alpha: 0.1,
            beta: 0.1,
            ..GlrOptions::default()
        }
    }

    #[test]
    fn test_thresholds() {
        let (lower, upper) = binary_options().thresholds();
        assert_abs_diff_eq!(upper, 2.1972246, epsilon = 1e-7);
        assert_abs_diff_eq!(lower, -2.1972246, epsilon = 1e-7);
    }

    #[test]
    fn test_undecided_pattern() {
        let resp = [1.0, 1.0, 1.0, 0.0, 0.0];
        let ratios = likelihood_ratios(Model::Brm, &brm_bank(), &resp, &binary_options()).unwrap();
        assert_abs_diff_eq!(ratios[0], 0.37287, epsilon = 1e-5);
        assert_eq!(
            classify(Model::Brm, &brm_bank(), &resp, &binary_options()).unwrap(),
            None
        );
    }

    #[test]
    fn test_low_and_high_patterns() {
        let low = [0.0, 0.0, 1.0, 0.0, 1.0];
        let ratios = likelihood_ratios(Model::Brm, &brm_bank(), &low, &binary_options()).unwrap();
        assert_abs_diff_eq!(ratios[0], -3.97605, epsilon = 1e-5);
        assert_eq!(
            classify(Model::Brm, &brm_bank(), &low, &binary_options()).unwrap(),
            Some(0)
        );

        let high = [1.0; 5];
        let ratios = likelihood_ratios(Model::Brm, &brm_bank(), &high, &binary_options()).unwrap();
        assert_abs_diff_eq!(ratios[0], 4.58967, epsilon = 1e-5);
        assert_eq!(
            classify(Model::Brm, &brm_bank(), &high, &binary_options()).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_two_cut_scores_can_stay_undecided() {
        let options = GlrOptions::default();
        let bank = brm_bank();
        for resp in [[0.0; 5], [1.0, 1.0, 1.0, 0.0, 0.0], [1.0; 5]] {
            let ratios = likelihood_ratios(Model::Brm, &bank, &resp, &options).unwrap();
            assert_eq!(ratios.len(), 2);
            assert_eq!(classify(Model::Brm, &bank, &resp, &options).unwrap(), None);
        }
        let ratios = likelihood_ratios(Model::Brm, &bank, &[1.0; 5], &options).unwrap();
        assert_abs_diff_eq!(ratios[0], 6.82087, epsilon = 1e-4);
        assert_abs_diff_eq!(ratios[1], 0.89670, epsilon = 1e-4);
    }

    #[test]
    fn test_graded_bank_reaches_every_category() {
        let bank: Vec<ItemParams> = [
            [1.8, -1.6, 0.4],
            [2.1, -1.0, 1.1],
            [1.5, -0.6, 0.9],
            [2.4, -1.4, 0.2],
            [1.7, -0.2, 1.5],
            [2.0, -0.9, 0.7],
            [1.6, -1.2, 1.3],
            [2.2, -0.4, 0.5],
        ]
        .iter()
        .map(|p| ItemParams::from_slice(Model::Grm, p).unwrap())
        .collect();
        let options = GlrOptions::default();

        let low = likelihood_ratios(Model::Grm, &bank, &[1.0; 8], &options).unwrap();
        assert_abs_diff_eq!(low[0], -6.54110, epsilon = 1e-4);
        assert_abs_diff_eq!(low[1], -31.42300, epsilon = 1e-4);

        let expected = [(1.0, 0), (2.0, 1), (3.0, 2)];
        for (value, category) in expected {
            assert_eq!(
                classify(Model::Grm, &bank, &[value; 8], &options).unwrap(),
                Some(category)
            );
        }
    }

    #[test]
    fn test_missing_responses_are_filtered() {
        let mut bank = brm_bank();
        bank.push(ItemParams::brm(1.0, -0.5, 0.24).unwrap());
        let resp = [0.0, 0.0, 1.0, 0.0, 1.0, f64::NAN];
        assert_eq!(
            classify(Model::Brm, &bank, &resp, &binary_options()).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn test_option_validation() {
        let resp = [1.0; 5];
        let mismatched = GlrOptions {
            categories: vec![0, 1, 2],
            ..binary_options()
        };
        assert!(matches!(
            classify(Model::Brm, &brm_bank(), &resp, &mismatched),
            Err(CatError::InvalidOption { name: "categories", .. })
        ));
        let no_delta = GlrOptions {
            delta: 0.0,
            ..binary_options()
        };
        assert!(classify(Model::Brm, &brm_bank(), &resp, &no_delta).is_err());
        let bad_alpha = GlrOptions {
            alpha: 1.0,
            ..binary_options()
        };
        assert!(classify(Model::Brm, &brm_bank(), &resp, &bad_alpha).is_err());
        let bad_range = GlrOptions {
            range: [2.0, -2.0],
            ..binary_options()
        };
        assert!(matches!(
            classify(Model::Brm, &brm_bank(), &resp, &bad_range),
            Err(CatError::InvalidRange { .. })
        ));
        let huge_range = GlrOptions {
            range: [-1e12, 1e12],
            ..binary_options()
        };
        assert!(matches!(
            classify(Model::Brm, &brm_bank(), &resp, &huge_range),
            Err(CatError::InvalidOption { name: "range", .. })
        ));
        let unsorted = GlrOptions {
            bounds: vec![1.0, -1.0],
            categories: vec![0, 1, 2],
            ..binary_options()
        };
        assert!(matches!(
            classify(Model::Brm, &brm_bank(), &resp, &unsorted),
            Err(CatError::InvalidOption { name: "bounds", .. })
        ));
    }
}
