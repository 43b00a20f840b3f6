//! Response model curves for the binary (3PL) and graded response models.
//!
//! This module provides:
//! - Analytic response probabilities with first and second θ derivatives
//! - Per-category curves for every item, in response-alphabet order
//! - Category probabilities and θ × item probability matrices
//!
//! Every probability is floored at [`EPSILON`](crate::utils::EPSILON) away from
//! 0 and 1 so that callers may divide by it or take its logarithm.

use ndarray::{Array2, ArrayView1};

use crate::error::CatResult;
use crate::params::{check_items, ItemParams, Model};
use crate::utils::{clamp_probability, sigmoid};

/// Probability of one response category and its θ derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCurve {
    pub p: f64,
    pub d1: f64,
    pub d2: f64,
}

/// Curves of an incorrect and a correct response to a 3PL item, in that order.
#[inline]
pub fn brm_curves(a: f64, b: f64, c: f64, theta: f64) -> [ResponseCurve; 2] {
    let z = a * (theta - b);
    let p1 = sigmoid(z);
    let q1 = sigmoid(-z);

    let d1 = (1.0 - c) * a * p1 * q1;
    let d2 = a * (1.0 - 2.0 * p1) * d1;
    let correct = clamp_probability(c + (1.0 - c) * p1);
    let incorrect = clamp_probability((1.0 - c) * q1);

    [
        ResponseCurve {
            p: incorrect,
            d1: -d1,
            d2: -d2,
        },
        ResponseCurve { p: correct, d1, d2 },
    ]
}

/// Cumulative curve `P*(θ) = P(X ≥ k)` for one boundary, with its complement.
#[derive(Debug, Clone, Copy)]
struct Cumulative {
    p: f64,
    q: f64,
    d1: f64,
    d2: f64,
}

impl Cumulative {
    const TOP: Cumulative = Cumulative {
        p: 1.0,
        q: 0.0,
        d1: 0.0,
        d2: 0.0,
    };
    const BOTTOM: Cumulative = Cumulative {
        p: 0.0,
        q: 1.0,
        d1: 0.0,
        d2: 0.0,
    };

    #[inline]
    fn at(a: f64, boundary: f64, theta: f64) -> Self {
        let z = a * (theta - boundary);
        let p = sigmoid(z);
        let q = sigmoid(-z);
        let d1 = a * p * q;
        Cumulative {
            p,
            q,
            d1,
            d2: a * (1.0 - 2.0 * p) * d1,
        }
    }
}

#[inline]
fn grm_cumulative(a: f64, boundaries: &[f64], k: usize, theta: f64) -> Cumulative {
    if k == 0 {
        Cumulative::TOP
    } else if k > boundaries.len() {
        Cumulative::BOTTOM
    } else {
        Cumulative::at(a, boundaries[k - 1], theta)
    }
}

#[inline]
fn grm_difference(upper: Cumulative, lower: Cumulative) -> ResponseCurve {
    // Near the top category the complement difference keeps its precision.
    let p = if upper.p > 0.5 {
        lower.q - upper.q
    } else {
        upper.p - lower.p
    };
    ResponseCurve {
        p: clamp_probability(p),
        d1: upper.d1 - lower.d1,
        d2: upper.d2 - lower.d2,
    }
}

/// Curve of the category at zero-based position `index` of a graded item.
#[inline]
pub fn grm_category_curve(a: f64, boundaries: &[f64], index: usize, theta: f64) -> ResponseCurve {
    grm_difference(
        grm_cumulative(a, boundaries, index, theta),
        grm_cumulative(a, boundaries, index + 1, theta),
    )
}

/// Curves of every category of a graded item, lowest category first.
pub fn grm_curves(a: f64, boundaries: &[f64], theta: f64) -> Vec<ResponseCurve> {
    let cumulative: Vec<Cumulative> = (0..=boundaries.len() + 1)
        .map(|k| grm_cumulative(a, boundaries, k, theta))
        .collect();
    cumulative
        .windows(2)
        .map(|pair| grm_difference(pair[0], pair[1]))
        .collect()
}

/// Curves of every response category of an item, in response-alphabet order.
pub fn item_curves(item: &ItemParams, theta: f64) -> Vec<ResponseCurve> {
    match item {
        ItemParams::Brm { a, b, c } => brm_curves(*a, *b, *c, theta).to_vec(),
        ItemParams::Grm { a, boundaries } => grm_curves(*a, boundaries, theta),
    }
}

/// Zero-based category position of a valid response value.
#[inline]
pub(crate) fn category_index(item: &ItemParams, response: f64) -> usize {
    match item {
        ItemParams::Brm { .. } => response as usize,
        ItemParams::Grm { .. } => response as usize - 1,
    }
}

/// Curve of the observed response to an item.
///
/// `response` must already be a valid value for the item.
#[inline]
pub(crate) fn observed_curve(item: &ItemParams, response: f64, theta: f64) -> ResponseCurve {
    let index = category_index(item, response);
    match item {
        ItemParams::Brm { a, b, c } => brm_curves(*a, *b, *c, theta)[index],
        ItemParams::Grm { a, boundaries } => grm_category_curve(*a, boundaries, index, theta),
    }
}

/// Probability of each response category at θ.
///
/// BRM items yield `[P(0), P(1)]`; graded items yield `[P(1), .., P(M)]`.
pub fn category_probabilities(item: &ItemParams, theta: f64) -> Vec<f64> {
    item_curves(item, theta).iter().map(|curve| curve.p).collect()
}

/// Probability of a correct response for each (θ, item) pair of a BRM bank.
///
/// # Arguments
/// * `items` - Non-empty BRM item parameters
/// * `thetas` - Ability values, one per output row
pub fn probability_matrix(
    items: &[ItemParams],
    thetas: ArrayView1<f64>,
) -> CatResult<Array2<f64>> {
    check_items(Model::Brm, items)?;
    Ok(Array2::from_shape_fn((thetas.len(), items.len()), |(t, i)| {
        match &items[i] {
            ItemParams::Brm { a, b, c } => brm_curves(*a, *b, *c, thetas[t])[1].p,
            ItemParams::Grm { .. } => f64::NAN,
        }
    }))
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

    #[test]
    fn test_brm_derivatives_match_reference() {
        let d1 = [0.28042065, 0.14638078, 0.14075301, 0.05049314, 0.05939428];
        let d2 = [-0.18320057, 0.39034545, 0.21779934, 0.09805036, 0.07948274];
        for (i, item) in brm_bank().iter().enumerate() {
            let correct = item_curves(item, -1.3)[1];
            assert_abs_diff_eq!(correct.d1, d1[i], epsilon = 1e-7);
            assert_abs_diff_eq!(correct.d2, d2[i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_brm_curves_are_complementary() {
        let [wrong, right] = brm_curves(1.7, 0.3, 0.2, -0.4);
        assert_abs_diff_eq!(wrong.p + right.p, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrong.d1 + right.d1, 0.0);
        assert!(right.p > 0.2);
    }

    #[test]
    fn test_grm_category_probabilities() {
        let item = ItemParams::grm(1.2, vec![-1.0, 0.0, 1.5]).unwrap();
        let probs = category_probabilities(&item, 0.3);
        let expected = [0.17364665, 0.23731292, 0.39749509, 0.19154535];
        for (p, e) in probs.iter().zip(expected) {
            assert_abs_diff_eq!(*p, e, epsilon = 1e-7);
        }
        assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_grm_derivatives_match_finite_differences() {
        let boundaries = [-0.7, 0.2, 1.1];
        let h = 1e-5;
        for index in 0..4 {
            let at = |t: f64| grm_category_curve(1.4, &boundaries, index, t);
            let mid = at(0.15);
            let numeric_d1 = (at(0.15 + h).p - at(0.15 - h).p) / (2.0 * h);
            let numeric_d2 = (at(0.15 + h).d1 - at(0.15 - h).d1) / (2.0 * h);
            assert_abs_diff_eq!(mid.d1, numeric_d1, epsilon = 1e-7);
            assert_abs_diff_eq!(mid.d2, numeric_d2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_probabilities_stay_open_under_saturation() {
        let grm = ItemParams::grm(2.5, vec![-1.0, 1.0]).unwrap();
        let brm = ItemParams::brm(2.5, 0.0, 0.0).unwrap();
        for theta in [-1e6, -60.0, 60.0, 1e6] {
            for p in category_probabilities(&grm, theta)
                .into_iter()
                .chain(category_probabilities(&brm, theta))
            {
                assert!(p > 0.0 && p < 1.0, "p = {p} at θ = {theta}");
            }
        }
    }

    #[test]
    fn test_probability_matrix_shape() {
        let bank = brm_bank();
        let matrix = probability_matrix(&bank, array![-1.0, 0.0, 1.0].view()).unwrap();
        assert_eq!(matrix.dim(), (3, 5));
        assert!(matrix[[2, 0]] > matrix[[0, 0]]);
        let grm = vec![ItemParams::grm(1.0, vec![0.0]).unwrap()];
        assert!(probability_matrix(&grm, array![0.0].view()).is_err());
    }
}
