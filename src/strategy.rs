//! Concrete test designs.
//!
//! This module provides:
//! - [`TwoPhase`]: fixed-length phase 1 scored as correct/incorrect, then a
//!   fixed-length phase 2 scored on the answer style, ending in a
//!   likelihood-ratio classification
//! - [`SinglePhase`]: one variable-length phase stopping on length or precision
//!
//! Two-phase raw codes are `0` (elaborator), `1` (correct) and `2`
//! (paraphraser).

use rand::RngCore;

use crate::bank::ItemBank;
use crate::classification::classify;
use crate::config::{SinglePhaseConfig, TwoPhaseConfig};
use crate::error::{CatError, CatResult};
use crate::estimation::{estimate_ability, AbilityEstimate, EstimatorOptions};
use crate::params::{ItemParams, Model};
use crate::selection::{choose_items, Candidate, Criterion, SelectOptions, Target};
use crate::session::{PhaseStrategy, Response, SessionState};
use crate::utils::is_missing;

pub const ELABORATOR: f64 = 0.0;
pub const CORRECT: f64 = 1.0;
pub const PARAPHRASER: f64 = 2.0;

/// Phase-1 scoring: correct answers score 1, any other answer 0.
#[inline]
pub fn phase1_score(raw: f64) -> f64 {
    if is_missing(raw) {
        f64::NAN
    } else if raw == CORRECT {
        1.0
    } else {
        0.0
    }
}

/// Phase-2 scoring: paraphrasers score 1, elaborators 0, anything else is missing.
#[inline]
pub fn phase2_score(raw: f64) -> f64 {
    if raw == ELABORATOR {
        0.0
    } else if raw == PARAPHRASER {
        1.0
    } else {
        f64::NAN
    }
}

fn estimate<'a, I>(
    model: Model,
    responses: I,
    params: impl Fn(&str) -> CatResult<&'a ItemParams>,
    score: impl Fn(f64) -> f64,
    options: &EstimatorOptions,
) -> CatResult<AbilityEstimate>
where
    I: IntoIterator<Item = &'a Response>,
{
    let mut items = Vec::new();
    let mut values = Vec::new();
    for response in responses {
        items.push(params(&response.id)?.clone());
        values.push(score(response.value));
    }
    if items.is_empty() {
        return Ok(AbilityEstimate::unestimated());
    }
    estimate_ability(model, &items, &values, options)
}

fn first_choice(
    model: Model,
    candidates: &[Candidate],
    criterion: &Criterion,
    theta: f64,
    n_select: usize,
    rng: &mut dyn RngCore,
) -> CatResult<String> {
    let options = SelectOptions::at(theta, n_select);
    choose_items(model, candidates, criterion, Target::Theta, &options, rng)?
        .into_iter()
        .next()
        .map(|selected| selected.id)
        .ok_or(CatError::Empty("items"))
}

/// Two fixed-length phases on binary items.
///
/// Phase 1 is scored on correctness with phase-1 calibrations. Phase 2 scores
/// every response given so far on the paraphraser/elaborator distinction with
/// phase-2 calibrations, and selects by information discounted by phase-1
/// success.
#[derive(Debug, Clone)]
pub struct TwoPhase {
    config: TwoPhaseConfig,
    options: EstimatorOptions,
}

impl TwoPhase {
    pub fn new(config: TwoPhaseConfig) -> CatResult<Self> {
        config.validate()?;
        let options = EstimatorOptions::default().with_range(config.theta_range);
        Ok(TwoPhase { config, options })
    }

    pub fn config(&self) -> &TwoPhaseConfig {
        &self.config
    }
}

impl PhaseStrategy for TwoPhase {
    fn name(&self) -> &'static str {
        "two_phase"
    }

    fn n_phases(&self) -> usize {
        2
    }

    fn validate_bank(&self, bank: &ItemBank) -> CatResult<()> {
        if bank.phase1_model() != Model::Brm
            || bank.phase2_model().unwrap_or(Model::Brm) != Model::Brm
        {
            return Err(CatError::CriterionModel {
                criterion: Criterion::MODIFIED_INFORMATION,
            });
        }
        match bank.iter().find(|item| item.phase2.is_none()) {
            Some(item) => Err(CatError::IncompleteItem {
                id: item.id.clone(),
                what: "phase 2 params",
            }),
            None => Ok(()),
        }
    }

    fn compute_ability(&self, state: &mut SessionState) -> CatResult<()> {
        let bank = state.bank();
        let first = estimate(
            Model::Brm,
            state.responses(1),
            |id| bank.phase1_params(id),
            phase1_score,
            &self.options,
        )?;
        let second = estimate(
            Model::Brm,
            state.all_responses(),
            |id| bank.phase2_params(id),
            phase2_score,
            &self.options,
        )?;
        state.set_estimate(1, first);
        state.set_estimate(2, second);
        Ok(())
    }

    fn evaluate_transition(&self, state: &mut SessionState) -> CatResult<()> {
        if state.active_phase() == Some(1) && state.responses(1).len() >= self.config.phase1_length
        {
            state.advance();
        }
        if state.active_phase() == Some(2) && state.responses(2).len() >= self.config.phase2_length
        {
            let bank = state.bank();
            let mut items = Vec::with_capacity(state.n_responses());
            let mut values = Vec::with_capacity(state.n_responses());
            for response in state.all_responses() {
                items.push(bank.phase2_params(&response.id)?.clone());
                values.push(phase2_score(response.value));
            }
            let category = classify(Model::Brm, &items, &values, &self.config.glr)?;
            state.set_category(category);
            state.finish();
        }
        Ok(())
    }

    fn select_next_item(&self, state: &SessionState, rng: &mut dyn RngCore) -> CatResult<String> {
        let phase = state.active_phase().ok_or(CatError::ResponsesClosed)?;
        let unseen: Vec<_> = state.unseen_items().collect();
        let theta = state.estimate(phase).theta;

        if phase == 1 {
            let candidates: Vec<Candidate> = unseen
                .iter()
                .map(|item| Candidate::new(item.id.clone(), item.phase1.clone()))
                .collect();
            return first_choice(
                Model::Brm,
                &candidates,
                &Criterion::Information,
                theta,
                self.config.n_select,
                rng,
            );
        }

        let mut candidates = Vec::with_capacity(unseen.len());
        let mut phase1_params = Vec::with_capacity(unseen.len());
        for item in unseen {
            let phase2 = item.phase2.clone().ok_or_else(|| CatError::IncompleteItem {
                id: item.id.clone(),
                what: "phase 2 params",
            })?;
            candidates.push(Candidate::new(item.id.clone(), phase2));
            phase1_params.push(item.phase1.clone());
        }
        let criterion = Criterion::ModifiedInformation {
            phase1_theta: state.estimate(1).theta,
            phase1_params,
        };
        first_choice(
            Model::Brm,
            &candidates,
            &criterion,
            theta,
            self.config.n_select,
            rng,
        )
    }
}

/// One variable-length phase scored with phase-1 calibrations as given.
#[derive(Debug, Clone)]
pub struct SinglePhase {
    config: SinglePhaseConfig,
}

impl SinglePhase {
    pub fn new(config: SinglePhaseConfig) -> CatResult<Self> {
        config.validate()?;
        Ok(SinglePhase { config })
    }

    pub fn config(&self) -> &SinglePhaseConfig {
        &self.config
    }
}

impl PhaseStrategy for SinglePhase {
    fn name(&self) -> &'static str {
        "single_phase"
    }

    fn n_phases(&self) -> usize {
        1
    }

    fn validate_bank(&self, _bank: &ItemBank) -> CatResult<()> {
        Ok(())
    }

    fn compute_ability(&self, state: &mut SessionState) -> CatResult<()> {
        let bank = state.bank();
        let responses = state.responses(1);
        let range = if responses.len() == 1 {
            self.config.first_item_range
        } else {
            self.config.theta_range
        };
        let options = EstimatorOptions::default().with_range(range);
        let estimate = estimate(
            bank.phase1_model(),
            responses,
            |id| bank.phase1_params(id),
            |raw| raw,
            &options,
        )?;
        state.set_estimate(1, estimate);
        Ok(())
    }

    fn evaluate_transition(&self, state: &mut SessionState) -> CatResult<()> {
        let answered = state.responses(1).len();
        let precise = state.estimate(1).sem <= self.config.sem_target;
        if answered >= self.config.max_items || (answered >= self.config.min_items && precise) {
            state.finish();
        }
        Ok(())
    }

    fn select_next_item(&self, state: &SessionState, rng: &mut dyn RngCore) -> CatResult<String> {
        let candidates: Vec<Candidate> = state
            .unseen_items()
            .map(|item| Candidate::new(item.id.clone(), item.phase1.clone()))
            .collect();
        first_choice(
            state.bank().phase1_model(),
            &candidates,
            &Criterion::Information,
            state.estimate(1).theta,
            self.config.n_select,
            rng,
        )
    }
}
