//! Shared numeric helpers and missing-data utilities.

use ndarray::Array1;

use crate::error::{CatError, CatResult};

/// Probability floor used before any division by or logarithm of a probability.
pub const EPSILON: f64 = 1e-10;

/// Step of the θ grid scanned by the likelihood-ratio classifier.
pub const GRID_STEP: f64 = 0.01;

/// Default ability search interval.
pub const DEFAULT_RANGE: [f64; 2] = [-4.5, 4.5];

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

#[inline]
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// A response is missing when it is NaN or infinite.
#[inline]
pub fn is_missing(value: f64) -> bool {
    !value.is_finite()
}

/// Standard error of measurement for a test information value.
///
/// NaN unless the information is finite and strictly positive.
#[inline]
pub fn sem_from_information(info: f64) -> f64 {
    if info.is_finite() && info > 0.0 {
        1.0 / info.sqrt()
    } else {
        f64::NAN
    }
}

/// θ values `lower, lower + step, ...` not exceeding `upper`.
///
/// Points are accumulated step by step, so they carry the running sum's
/// rounding: the grid over `[-4.5, 4.5]` holds `-0.500000000000052` rather
/// than `-0.5`. Empty when `step` is not positive or `lower > upper`.
pub fn theta_grid(lower: f64, upper: f64, step: f64) -> Array1<f64> {
    if !(step > 0.0 && lower <= upper) {
        return Array1::zeros(0);
    }
    let max_points = ((upper - lower) / step) as usize + 2;
    let points: Vec<f64> = std::iter::successors(Some(lower), |t| Some(t + step))
        .take_while(|&t| t <= upper)
        .take(max_points)
        .collect();
    Array1::from(points)
}

/// The finite (answered) values of a response vector.
pub fn answers(responses: &[f64]) -> Vec<f64> {
    responses.iter().copied().filter(|r| !is_missing(*r)).collect()
}

/// Items paired with a finite response. Mismatched lengths yield no items.
pub fn answered_items<T: Clone>(items: &[T], responses: &[f64]) -> Vec<T> {
    partition_items(items, responses, true)
}

/// Items paired with a missing response. Mismatched lengths yield no items.
pub fn unanswered_items<T: Clone>(items: &[T], responses: &[f64]) -> Vec<T> {
    partition_items(items, responses, false)
}

fn partition_items<T: Clone>(items: &[T], responses: &[f64], answered: bool) -> Vec<T> {
    if items.len() != responses.len() {
        return Vec::new();
    }
    items
        .iter()
        .zip(responses)
        .filter(|(_, r)| is_missing(**r) != answered)
        .map(|(item, _)| item.clone())
        .collect()
}

pub(crate) fn validate_range(range: [f64; 2]) -> CatResult<()> {
    let [lower, upper] = range;
    if lower.is_finite() && upper.is_finite() && lower < upper {
        Ok(())
    } else {
        Err(CatError::InvalidRange { lower, upper })
    }
}

pub(crate) fn validate_finite(name: &'static str, value: f64) -> CatResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CatError::NonFinite { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sigmoid_saturates_without_overflow() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
        assert_abs_diff_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_sem_from_information() {
        assert_abs_diff_eq!(sem_from_information(4.0), 0.5);
        assert!(sem_from_information(0.0).is_nan());
        assert!(sem_from_information(-1.5).is_nan());
        assert!(sem_from_information(f64::NAN).is_nan());
    }

    #[test]
    fn test_theta_grid_spans_range() {
        let grid = theta_grid(-4.5, 4.5, GRID_STEP);
        assert_eq!(grid.len(), 901);
        assert_abs_diff_eq!(grid[0], -4.5);
        assert_abs_diff_eq!(grid[900], 4.5, epsilon = 1e-9);
        assert!(grid[900] <= 4.5);
    }

    #[test]
    fn test_theta_grid_accumulates_steps() {
        let grid = theta_grid(-4.5, 4.5, GRID_STEP);
        assert_eq!(grid[400], -0.500000000000052);
        assert_eq!(grid[500], 0.49999999999994865);
        assert!(theta_grid(1.0, 0.0, GRID_STEP).is_empty());
        assert!(theta_grid(0.0, 1.0, 0.0).is_empty());
    }

    #[test]
    fn test_answered_and_unanswered_items() {
        let items = vec!["a", "b", "c", "d"];
        let resp = [1.0, f64::NAN, 0.0, f64::INFINITY];
        assert_eq!(answers(&resp), vec![1.0, 0.0]);
        assert_eq!(answered_items(&items, &resp), vec!["a", "c"]);
        assert_eq!(unanswered_items(&items, &resp), vec!["b", "d"]);
        assert!(answered_items(&items, &resp[..2]).is_empty());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range([-4.5, 4.5]).is_ok());
        assert!(validate_range([1.0, 1.0]).is_err());
        assert!(validate_range([f64::NEG_INFINITY, 1.0]).is_err());
    }
}
