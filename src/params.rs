//! Item parameters and response-pattern validation.
//!
//! This module provides:
//! - The two supported response models (binary 3PL and graded)
//! - Validated item parameter construction
//! - Missing-data filtering that drops non-finite responses together with
//!   their paired item parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CatError, CatResult};
use crate::utils::is_missing;

/// Response model of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Binary response model (3-parameter logistic), responses `0`/`1`.
    Brm,
    /// Graded response model, responses `1..=M` for an item with `M` categories.
    Grm,
}

impl Model {
    pub fn name(&self) -> &'static str {
        match self {
            Model::Brm => "brm",
            Model::Grm => "grm",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = CatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brm" => Ok(Model::Brm),
            "grm" => Ok(Model::Grm),
            other => Err(CatError::UnsupportedModel(other.to_string())),
        }
    }
}

/// Calibrated parameters of a single item.
///
/// Construct through [`ItemParams::brm`], [`ItemParams::grm`] or
/// [`ItemParams::from_slice`] so the invariants below are checked:
/// - `a > 0` for both models
/// - BRM guessing `c` in `[0, 1)`
/// - GRM boundaries non-empty and strictly increasing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ItemParams {
    Brm { a: f64, b: f64, c: f64 },
    Grm { a: f64, boundaries: Vec<f64> },
}

impl ItemParams {
    pub fn brm(a: f64, b: f64, c: f64) -> CatResult<Self> {
        let item = ItemParams::Brm { a, b, c };
        item.validate()?;
        Ok(item)
    }

    pub fn grm(a: f64, boundaries: Vec<f64>) -> CatResult<Self> {
        let item = ItemParams::Grm { a, boundaries };
        item.validate()?;
        Ok(item)
    }

    /// Build from the flat `[a, b, c]` (BRM) or `[a, b1, .., b_{M-1}]` (GRM) layout.
    pub fn from_slice(model: Model, values: &[f64]) -> CatResult<Self> {
        match model {
            Model::Brm => match *values {
                [a, b, c] => ItemParams::brm(a, b, c),
                _ => Err(CatError::ParamArity {
                    model: "brm",
                    expected: "exactly 3",
                    found: values.len(),
                }),
            },
            Model::Grm => match values.split_first() {
                Some((&a, boundaries)) if !boundaries.is_empty() => {
                    ItemParams::grm(a, boundaries.to_vec())
                }
                _ => Err(CatError::ParamArity {
                    model: "grm",
                    expected: "at least 2",
                    found: values.len(),
                }),
            },
        }
    }

    pub fn model(&self) -> Model {
        match self {
            ItemParams::Brm { .. } => Model::Brm,
            ItemParams::Grm { .. } => Model::Grm,
        }
    }

    pub fn discrimination(&self) -> f64 {
        match self {
            ItemParams::Brm { a, .. } | ItemParams::Grm { a, .. } => *a,
        }
    }

    /// Number of response categories (2 for BRM).
    pub fn n_categories(&self) -> usize {
        match self {
            ItemParams::Brm { .. } => 2,
            ItemParams::Grm { boundaries, .. } => boundaries.len() + 1,
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            ItemParams::Brm { a, b, c } => vec![*a, *b, *c],
            ItemParams::Grm { a, boundaries } => {
                let mut values = Vec::with_capacity(boundaries.len() + 1);
                values.push(*a);
                values.extend_from_slice(boundaries);
                values
            }
        }
    }

    /// Whether a finite response value belongs to this item's response alphabet.
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            ItemParams::Brm { .. } => value == 0.0 || value == 1.0,
            ItemParams::Grm { boundaries, .. } => {
                value.fract() == 0.0 && value >= 1.0 && value <= (boundaries.len() + 1) as f64
            }
        }
    }

    pub fn validate(&self) -> CatResult<()> {
        let a = self.discrimination();
        if !(a.is_finite() && a > 0.0) {
            return Err(CatError::InvalidParam {
                index: 0,
                value: a,
                reason: "discrimination must be finite and positive",
            });
        }
        match self {
            ItemParams::Brm { b, c, .. } => {
                if !b.is_finite() {
                    return Err(CatError::InvalidParam {
                        index: 1,
                        value: *b,
                        reason: "difficulty must be finite",
                    });
                }
                if !(c.is_finite() && (0.0..1.0).contains(c)) {
                    return Err(CatError::InvalidParam {
                        index: 2,
                        value: *c,
                        reason: "guessing must lie in [0, 1)",
                    });
                }
            }
            ItemParams::Grm { boundaries, .. } => {
                if boundaries.is_empty() {
                    return Err(CatError::ParamArity {
                        model: "grm",
                        expected: "at least 2",
                        found: 1,
                    });
                }
                for (k, &bound) in boundaries.iter().enumerate() {
                    if !bound.is_finite() {
                        return Err(CatError::InvalidParam {
                            index: k + 1,
                            value: bound,
                            reason: "category boundary must be finite",
                        });
                    }
                    if k > 0 && bound <= boundaries[k - 1] {
                        return Err(CatError::InvalidParam {
                            index: k + 1,
                            value: bound,
                            reason: "category boundaries must be strictly increasing",
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Items and responses left after missing responses are dropped, aligned by position.
#[derive(Debug)]
pub(crate) struct UsablePattern<'a> {
    pub items: Vec<&'a ItemParams>,
    pub responses: Vec<f64>,
}

impl UsablePattern<'_> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Check that `items` is non-empty, internally valid and entirely of `model`.
pub(crate) fn check_items(model: Model, items: &[ItemParams]) -> CatResult<()> {
    if items.is_empty() {
        return Err(CatError::Empty("params"));
    }
    for (index, item) in items.iter().enumerate() {
        if item.model() != model {
            return Err(CatError::ModelMismatch {
                index,
                expected: model.name(),
                found: item.model().name(),
            });
        }
        item.validate()?;
    }
    Ok(())
}

/// Validate a response pattern against its items and drop the missing entries.
pub(crate) fn usable_pattern<'a>(
    model: Model,
    items: &'a [ItemParams],
    responses: &[f64],
) -> CatResult<UsablePattern<'a>> {
    if responses.is_empty() {
        return Err(CatError::Empty("response"));
    }
    check_items(model, items)?;
    if responses.len() != items.len() {
        return Err(CatError::LengthMismatch {
            left: "response",
            left_len: responses.len(),
            right: "params",
            right_len: items.len(),
        });
    }

    let mut usable = UsablePattern {
        items: Vec::with_capacity(items.len()),
        responses: Vec::with_capacity(items.len()),
    };
    for (index, (item, &value)) in items.iter().zip(responses).enumerate() {
        if is_missing(value) {
            continue;
        }
        if !item.accepts(value) {
            return Err(CatError::InvalidResponse {
                index,
                value,
                model: model.name(),
            });
        }
        usable.items.push(item);
        usable.responses.push(value);
    }
    Ok(usable)
}
