//! Item response theory scoring and adaptive item selection for
//! computerized adaptive testing (CAT).
//!
//! This crate provides:
//! - Binary 3PL (BRM) and graded response model (GRM) curves with analytic derivatives
//! - Log-likelihood derivatives under maximum or Warm-weighted likelihood
//! - Bounded ability estimation (MLE / WLE) with diagnostics and batch scoring
//! - Expected, observed and phase-1 modified Fisher information
//! - Information-ranked item selection with randomized exposure control
//! - Generalized likelihood ratio classification against cut scores
//! - Phase-structured adaptive sessions over a shared item bank
//! - Monte Carlo simulation of adaptive tests
//!
//! Non-finite response values mark missing responses; they are dropped
//! together with their item parameters before any computation.

pub mod utils;

pub mod bank;
pub mod classification;
pub mod config;
pub mod error;
pub mod estimation;
pub mod information;
pub mod likelihood;
pub mod models;
pub mod params;
pub mod selection;
pub mod session;
pub mod simulation;
pub mod strategy;

pub use bank::{BankItem, ItemBank};
pub use classification::{classify, likelihood_ratios, GlrOptions};
pub use config::{SinglePhaseConfig, StrategyConfig, TwoPhaseConfig};
pub use error::{CatError, CatResult};
pub use estimation::{
    estimate_ability, estimate_batch, find_root, solve_theta, AbilityEstimate, EstimatorOptions,
    RootResult,
};
pub use information::{
    expected_information, fisher_information, information_grid, modified_expected_information,
    observed_information, FisherInformation, InformationType,
};
pub use likelihood::{lder1, lder2, log_likelihood, log_likelihood_grid, Weighting};
pub use models::{category_probabilities, probability_matrix};
pub use params::{ItemParams, Model};
pub use selection::{choose_items, Candidate, Criterion, SelectOptions, Selected, Target};
pub use session::{PhaseStrategy, Registry, Response, Session, SessionState, Status};
pub use simulation::{
    conditional_summary, simulate_batch, simulate_session, ConditionalSummary, SimulationOutcome,
};
pub use strategy::{SinglePhase, TwoPhase};
pub use utils::{answered_items, answers, unanswered_items};
