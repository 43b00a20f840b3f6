//! Test design settings, loadable from TOML.
//!
//! ```toml
//! strategy = "two_phase"
//! phase1_length = 25
//! phase2_length = 15
//!
//! [glr]
//! bounds = [0.0]
//! categories = [0, 2]
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::classification::GlrOptions;
use crate::error::{CatError, CatResult};
use crate::session::PhaseStrategy;
use crate::strategy::{SinglePhase, TwoPhase};
use crate::utils::{validate_range, DEFAULT_RANGE};

/// Fixed-length two-phase design ending in a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPhaseConfig {
    pub phase1_length: usize,
    pub phase2_length: usize,
    pub theta_range: [f64; 2],
    pub n_select: usize,
    pub glr: GlrOptions,
}

impl Default for TwoPhaseConfig {
    fn default() -> Self {
        TwoPhaseConfig {
            phase1_length: 25,
            phase2_length: 15,
            theta_range: DEFAULT_RANGE,
            n_select: 1,
            glr: GlrOptions {
                range: DEFAULT_RANGE,
                bounds: vec![0.0],
                categories: vec![0, 2],
                delta: 0.5,
                alpha: 0.1,
                beta: 0.1,
            },
        }
    }
}

impl TwoPhaseConfig {
    pub fn validate(&self) -> CatResult<()> {
        if self.phase1_length == 0 {
            return Err(CatError::option("phase1_length", "must be at least 1"));
        }
        if self.phase2_length == 0 {
            return Err(CatError::option("phase2_length", "must be at least 1"));
        }
        if self.n_select == 0 {
            return Err(CatError::option("n_select", "must be at least 1"));
        }
        validate_range(self.theta_range)?;
        self.glr.validate()
    }
}

/// Variable-length single-phase design stopping on length or precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinglePhaseConfig {
    pub max_items: usize,
    pub min_items: usize,
    /// Stop once `min_items` are answered and the sem is at or below this.
    pub sem_target: f64,
    pub theta_range: [f64; 2],
    /// Narrower range used while only one response has been scored.
    pub first_item_range: [f64; 2],
    pub n_select: usize,
}

impl Default for SinglePhaseConfig {
    fn default() -> Self {
        SinglePhaseConfig {
            max_items: 30,
            min_items: 10,
            sem_target: 0.30,
            theta_range: DEFAULT_RANGE,
            first_item_range: [-3.0, 3.0],
            n_select: 1,
        }
    }
}

impl SinglePhaseConfig {
    pub fn validate(&self) -> CatResult<()> {
        if self.max_items == 0 {
            return Err(CatError::option("max_items", "must be at least 1"));
        }
        if self.min_items > self.max_items {
            return Err(CatError::option(
                "min_items",
                format!("{} exceeds max_items {}", self.min_items, self.max_items),
            ));
        }
        if !(self.sem_target.is_finite() && self.sem_target > 0.0) {
            return Err(CatError::option("sem_target", "must be finite and positive"));
        }
        if self.n_select == 0 {
            return Err(CatError::option("n_select", "must be at least 1"));
        }
        validate_range(self.theta_range)?;
        validate_range(self.first_item_range)
    }
}

/// Any supported test design, tagged by `strategy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    TwoPhase(TwoPhaseConfig),
    SinglePhase(SinglePhaseConfig),
}

impl StrategyConfig {
    pub fn from_toml_str(text: &str) -> CatResult<Self> {
        let config: StrategyConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CatResult<()> {
        match self {
            StrategyConfig::TwoPhase(config) => config.validate(),
            StrategyConfig::SinglePhase(config) => config.validate(),
        }
    }

    pub fn build(&self) -> CatResult<Arc<dyn PhaseStrategy>> {
        Ok(match self {
            StrategyConfig::TwoPhase(config) => Arc::new(TwoPhase::new(config.clone())?),
            StrategyConfig::SinglePhase(config) => Arc::new(SinglePhase::new(config.clone())?),
        })
    }
}
