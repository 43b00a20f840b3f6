//! Fisher information and standard error of measurement.
//!
//! This module provides:
//! - Expected (model-implied) item and test information
//! - Observed information from the response-conditioned curvature
//! - The phase-1 weighted "modified" information used by two-phase testing
//! - θ × item information grids computed in parallel

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CatError, CatResult};
use crate::likelihood::curvature;
use crate::models::{brm_curves, item_curves};
use crate::params::{check_items, usable_pattern, ItemParams, Model};
use crate::utils::{sem_from_information, validate_finite};

/// Which information a [`FisherInformation`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationType {
    #[default]
    Expected,
    Observed,
}

impl FromStr for InformationType {
    type Err = CatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXPECTED" | "expected" => Ok(InformationType::Expected),
            "OBSERVED" | "observed" => Ok(InformationType::Observed),
            other => Err(CatError::option(
                "type",
                format!("expected \"EXPECTED\" or \"OBSERVED\", found \"{other}\""),
            )),
        }
    }
}

/// Per-item and test information at one θ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FisherInformation {
    pub item: Array1<f64>,
    pub test: f64,
    /// `1 / sqrt(test)`, NaN when the test information is not positive.
    pub sem: f64,
    pub kind: InformationType,
}

impl FisherInformation {
    fn from_items(item: Array1<f64>, kind: InformationType) -> Self {
        let test = item.sum();
        FisherInformation {
            item,
            test,
            sem: sem_from_information(test),
            kind,
        }
    }
}

/// Expected information of a single item: `Σ_k P'_k² / P_k`.
#[inline]
pub fn item_information(item: &ItemParams, theta: f64) -> f64 {
    item_curves(item, theta)
        .iter()
        .map(|curve| curve.d1 * curve.d1 / curve.p)
        .sum()
}

/// Expected information of every item at `theta`.
pub fn expected_information(
    model: Model,
    items: &[ItemParams],
    theta: f64,
) -> CatResult<FisherInformation> {
    check_items(model, items)?;
    validate_finite("theta", theta)?;
    let item = items.iter().map(|it| item_information(it, theta)).collect();
    Ok(FisherInformation::from_items(item, InformationType::Expected))
}

/// Observed information `-l''(θ)` of every answered item.
///
/// Items paired with a missing response are left out of `item`. A
/// non-positive test value is reported as-is with a NaN `sem`.
pub fn observed_information(
    model: Model,
    items: &[ItemParams],
    responses: &[f64],
    theta: f64,
) -> CatResult<FisherInformation> {
    validate_finite("theta", theta)?;
    let pattern = usable_pattern(model, items, responses)?;
    let item = -curvature(&pattern, theta);
    Ok(FisherInformation::from_items(item, InformationType::Observed))
}

/// Information of the requested `kind`, optionally restricted to answered items.
///
/// With responses, items paired with a missing response are dropped for both
/// kinds. Without responses, observed information falls back to expected.
pub fn fisher_information(
    model: Model,
    items: &[ItemParams],
    theta: f64,
    responses: Option<&[f64]>,
    kind: InformationType,
) -> CatResult<FisherInformation> {
    match (responses, kind) {
        (None, _) => expected_information(model, items, theta),
        (Some(responses), InformationType::Observed) => {
            observed_information(model, items, responses, theta)
        }
        (Some(responses), InformationType::Expected) => {
            validate_finite("theta", theta)?;
            let pattern = usable_pattern(model, items, responses)?;
            let item = pattern
                .items
                .iter()
                .map(|it| item_information(it, theta))
                .collect();
            Ok(FisherInformation::from_items(item, InformationType::Expected))
        }
    }
}

/// Phase-2 expected information discounted by the phase-1 success probability.
///
/// `I_i = (1 - P1_i(θ1)) · I2_i(θ2)`, so items a phase-1 examinee is likely to
/// answer correctly carry little phase-2 weight. Binary items only; the two
/// parameter lists are aligned by position.
pub fn modified_expected_information(
    phase1_items: &[ItemParams],
    phase1_theta: f64,
    phase2_items: &[ItemParams],
    phase2_theta: f64,
) -> CatResult<FisherInformation> {
    if phase1_items
        .iter()
        .chain(phase2_items)
        .any(|item| item.model() != Model::Brm)
    {
        return Err(CatError::CriterionModel {
            criterion: "UW-FI-Modified",
        });
    }
    check_items(Model::Brm, phase2_items)?;
    check_items(Model::Brm, phase1_items)?;
    if phase1_items.len() != phase2_items.len() {
        return Err(CatError::LengthMismatch {
            left: "phase 1 params",
            left_len: phase1_items.len(),
            right: "phase 2 params",
            right_len: phase2_items.len(),
        });
    }
    validate_finite("phase 1 theta", phase1_theta)?;
    validate_finite("phase 2 theta", phase2_theta)?;

    let item = phase1_items
        .iter()
        .zip(phase2_items)
        .map(|(first, second)| {
            modified_item_information(first, phase1_theta, second, phase2_theta)
        })
        .collect();
    Ok(FisherInformation::from_items(item, InformationType::Expected))
}

#[inline]
pub(crate) fn modified_item_information(
    phase1_item: &ItemParams,
    phase1_theta: f64,
    phase2_item: &ItemParams,
    phase2_theta: f64,
) -> f64 {
    let miss = match phase1_item {
        ItemParams::Brm { a, b, c } => brm_curves(*a, *b, *c, phase1_theta)[0].p,
        ItemParams::Grm { .. } => return f64::NAN,
    };
    miss * item_information(phase2_item, phase2_theta)
}

/// Expected item information on a θ grid, one row per θ.
///
/// Rows are computed in parallel.
pub fn information_grid(
    model: Model,
    items: &[ItemParams],
    thetas: ArrayView1<f64>,
) -> CatResult<Array2<f64>> {
    check_items(model, items)?;
    let thetas: Vec<f64> = thetas.to_vec();
    for &theta in &thetas {
        validate_finite("theta", theta)?;
    }

    let rows: Vec<Vec<f64>> = thetas
        .par_iter()
        .map(|&theta| items.iter().map(|it| item_information(it, theta)).collect())
        .collect();

    Ok(Array2::from_shape_fn((rows.len(), items.len()), |(t, i)| {
        rows[t][i]
    }))
}
