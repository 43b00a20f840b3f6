//! Item selection with randomized exposure control.
//!
//! Candidates are ranked by information at the target θ, the best
//! `n_select` are kept, and `numb` of them are drawn in random order so the
//! single most informative item is not handed to every examinee.

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CatError, CatResult};
use crate::information::{item_information, modified_item_information};
use crate::params::{ItemParams, Model};
use crate::utils::validate_finite;

/// An item that may be administered next.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub params: ItemParams,
}

impl Candidate {
    pub fn new(id: impl Into<String>, params: ItemParams) -> Self {
        Candidate {
            id: id.into(),
            params,
        }
    }
}

/// A chosen item with the information that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selected {
    pub id: String,
    pub params: ItemParams,
    pub info: f64,
}

/// Ranking criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Unweighted expected Fisher information (`"UW-FI"`).
    Information,
    /// Expected information discounted by the phase-1 success probability
    /// (`"UW-FI-Modified"`). `phase1_params` is aligned with the candidates.
    ModifiedInformation {
        phase1_theta: f64,
        phase1_params: Vec<ItemParams>,
    },
}

impl Criterion {
    pub const INFORMATION: &'static str = "UW-FI";
    pub const MODIFIED_INFORMATION: &'static str = "UW-FI-Modified";

    /// Build a criterion from its keyword and the phase-1 inputs it may take.
    ///
    /// Phase-1 inputs are required by `"UW-FI-Modified"` and rejected by `"UW-FI"`.
    pub fn from_keyword(
        keyword: &str,
        phase1: Option<(f64, Vec<ItemParams>)>,
    ) -> CatResult<Self> {
        match (keyword, phase1) {
            (Self::INFORMATION, None) => Ok(Criterion::Information),
            (Self::INFORMATION, Some(_)) => Err(CatError::option(
                "select",
                "UW-FI does not take phase 1 theta or params",
            )),
            (Self::MODIFIED_INFORMATION, Some((phase1_theta, phase1_params))) => {
                Ok(Criterion::ModifiedInformation {
                    phase1_theta,
                    phase1_params,
                })
            }
            (Self::MODIFIED_INFORMATION, None) => Err(CatError::option(
                "select",
                "UW-FI-Modified requires phase 1 theta and params",
            )),
            (other, _) => Err(CatError::UnsupportedCriterion(other.to_string())),
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Criterion::Information => Self::INFORMATION,
            Criterion::ModifiedInformation { .. } => Self::MODIFIED_INFORMATION,
        }
    }
}

/// Where information is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// At the current ability estimate.
    #[default]
    Theta,
}

impl FromStr for Target {
    type Err = CatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "theta" => Ok(Target::Theta),
            other => Err(CatError::UnsupportedTarget(other.to_string())),
        }
    }
}

/// Selection sizes and the θ information is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOptions {
    /// Number of items returned.
    pub numb: usize,
    /// Size of the top-ranked shortlist drawn from.
    pub n_select: usize,
    /// θ used for [`Target::Theta`]; `None` means 0.
    pub cat_theta: Option<f64>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        SelectOptions {
            numb: 1,
            n_select: 1,
            cat_theta: None,
        }
    }
}

impl SelectOptions {
    pub fn at(theta: f64, n_select: usize) -> Self {
        SelectOptions {
            numb: 1,
            n_select,
            cat_theta: Some(theta),
        }
    }

    pub fn validate(&self) -> CatResult<()> {
        if self.numb == 0 {
            return Err(CatError::option("numb", "must be at least 1"));
        }
        if self.n_select == 0 {
            return Err(CatError::option("n_select", "must be at least 1"));
        }
        if let Some(theta) = self.cat_theta {
            validate_finite("cat_theta", theta)?;
        }
        Ok(())
    }
}

fn candidate_information(
    model: Model,
    candidates: &[Candidate],
    criterion: &Criterion,
    theta: f64,
) -> CatResult<Vec<f64>> {
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.params.model() != model {
            return Err(CatError::ModelMismatch {
                index,
                expected: model.name(),
                found: candidate.params.model().name(),
            });
        }
        candidate.params.validate()?;
    }

    match criterion {
        Criterion::Information => Ok(candidates
            .iter()
            .map(|candidate| item_information(&candidate.params, theta))
            .collect()),
        Criterion::ModifiedInformation {
            phase1_theta,
            phase1_params,
        } => {
            if model != Model::Brm || phase1_params.iter().any(|p| p.model() != Model::Brm) {
                return Err(CatError::CriterionModel {
                    criterion: Criterion::MODIFIED_INFORMATION,
                });
            }
            if phase1_params.len() != candidates.len() {
                return Err(CatError::LengthMismatch {
                    left: "phase 1 params",
                    left_len: phase1_params.len(),
                    right: "items",
                    right_len: candidates.len(),
                });
            }
            validate_finite("phase 1 theta", *phase1_theta)?;
            for params in phase1_params {
                params.validate()?;
            }
            Ok(phase1_params
                .iter()
                .zip(candidates)
                .map(|(first, candidate)| {
                    modified_item_information(first, *phase1_theta, &candidate.params, theta)
                })
                .collect())
        }
    }
}

/// Choose up to `options.numb` items from `candidates`.
///
/// Candidates are ranked by the criterion at the target θ (ties keep input
/// order), the top `n_select` form a shortlist, and the shortlist is shuffled
/// before the first `numb` are taken. A shortlist no longer than `numb` is
/// returned in rank order without consuming randomness.
pub fn choose_items<R>(
    model: Model,
    candidates: &[Candidate],
    criterion: &Criterion,
    target: Target,
    options: &SelectOptions,
    rng: &mut R,
) -> CatResult<Vec<Selected>>
where
    R: Rng + ?Sized,
{
    if candidates.is_empty() {
        return Err(CatError::Empty("items"));
    }
    options.validate()?;
    let theta = match target {
        Target::Theta => options.cat_theta.unwrap_or(0.0),
    };

    let info = candidate_information(model, candidates, criterion, theta)?;

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&i, &j| info[j].total_cmp(&info[i]));
    order.truncate(options.n_select);

    debug!(
        "{} shortlist at theta {:.4}: {:?}",
        criterion.keyword(),
        theta,
        order
            .iter()
            .map(|&i| (candidates[i].id.as_str(), info[i]))
            .collect::<Vec<_>>()
    );

    if order.len() > options.numb {
        order.shuffle(rng);
        order.truncate(options.numb);
    }

    Ok(order
        .into_iter()
        .map(|i| Selected {
            id: candidates[i].id.clone(),
            params: candidates[i].params.clone(),
            info: info[i],
        })
        .collect())
}
