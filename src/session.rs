//! Adaptive testing sessions.
//!
//! This module provides:
//! - [`PhaseStrategy`], the hooks a test design implements
//! - [`SessionState`], the bookkeeping shared by every design
//! - [`Session`], the item-by-item state machine driving a strategy
//! - [`Registry`], named strategy and item bank pairs sessions are created from
//!
//! A session moves through `phase1, .., phaseN, done`. Any failure of a
//! strategy hook moves it to an absorbing error status carrying the message.

use log::{error, info, warn};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::bank::{BankItem, ItemBank};
use crate::config::StrategyConfig;
use crate::error::{CatError, CatResult};
use crate::estimation::AbilityEstimate;

/// Label reported while no category has been decided.
pub const UNDECIDED_LABEL: &str = "ID";

/// A raw response to a bank item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub value: f64,
}

impl Response {
    pub fn new(id: impl Into<String>, value: f64) -> Self {
        Response {
            id: id.into(),
            value,
        }
    }
}

/// Where a session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Administering items of the given 1-based phase.
    Active(usize),
    Done,
    Error(String),
}

impl Status {
    pub fn is_done(&self) -> bool {
        !matches!(self, Status::Active(_))
    }

    pub fn phase(&self) -> Option<usize> {
        match self {
            Status::Active(phase) => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active(phase) => write!(f, "phase{phase}"),
            Status::Done => f.write_str("done"),
            Status::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Hooks that define a test design.
///
/// After every response the session calls, in order, [`compute_ability`],
/// [`evaluate_transition`] and, while still active, [`select_next_item`].
///
/// [`compute_ability`]: PhaseStrategy::compute_ability
/// [`evaluate_transition`]: PhaseStrategy::evaluate_transition
/// [`select_next_item`]: PhaseStrategy::select_next_item
pub trait PhaseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn n_phases(&self) -> usize;

    /// Reject banks the design cannot administer.
    fn validate_bank(&self, bank: &ItemBank) -> CatResult<()>;

    /// Refresh the per-phase ability estimates from the recorded responses.
    fn compute_ability(&self, state: &mut SessionState) -> CatResult<()>;

    /// Advance or finish the session once estimates are current.
    fn evaluate_transition(&self, state: &mut SessionState) -> CatResult<()>;

    /// Id of the next item for the active phase.
    fn select_next_item(&self, state: &SessionState, rng: &mut dyn RngCore) -> CatResult<String>;
}

/// Bookkeeping shared by every test design.
#[derive(Debug, Clone)]
pub struct SessionState {
    bank: Arc<ItemBank>,
    responses: Vec<Vec<Response>>,
    seen: HashSet<String>,
    estimates: Vec<AbilityEstimate>,
    status: Status,
    category: Option<i32>,
    next_item: Option<String>,
}

impl SessionState {
    fn new(bank: Arc<ItemBank>, n_phases: usize) -> Self {
        SessionState {
            bank,
            responses: vec![Vec::new(); n_phases],
            seen: HashSet::new(),
            estimates: vec![AbilityEstimate::unestimated(); n_phases],
            status: Status::Active(1),
            category: None,
            next_item: None,
        }
    }

    pub fn bank(&self) -> &ItemBank {
        &self.bank
    }

    pub fn n_phases(&self) -> usize {
        self.responses.len()
    }

    /// Responses recorded during a 1-based phase.
    pub fn responses(&self, phase: usize) -> &[Response] {
        phase
            .checked_sub(1)
            .and_then(|k| self.responses.get(k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every response in administration order, phase by phase.
    pub fn all_responses(&self) -> impl Iterator<Item = &Response> {
        self.responses.iter().flatten()
    }

    pub fn n_responses(&self) -> usize {
        self.responses.iter().map(Vec::len).sum()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Bank items not yet administered, in bank order.
    pub fn unseen_items(&self) -> impl Iterator<Item = &BankItem> {
        self.bank.iter().filter(|item| !self.seen.contains(&item.id))
    }

    pub fn estimate(&self, phase: usize) -> AbilityEstimate {
        phase
            .checked_sub(1)
            .and_then(|k| self.estimates.get(k))
            .copied()
            .unwrap_or_default()
    }

    pub fn estimates(&self) -> &[AbilityEstimate] {
        &self.estimates
    }

    pub fn set_estimate(&mut self, phase: usize, estimate: AbilityEstimate) {
        if let Some(slot) = phase.checked_sub(1).and_then(|k| self.estimates.get_mut(k)) {
            *slot = estimate;
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn active_phase(&self) -> Option<usize> {
        self.status.phase()
    }

    /// Move to the next phase, or to `done` after the last one.
    pub fn advance(&mut self) {
        if let Status::Active(phase) = self.status {
            self.status = if phase >= self.n_phases() {
                Status::Done
            } else {
                Status::Active(phase + 1)
            };
            info!("session moved to {}", self.status);
        }
    }

    pub fn finish(&mut self) {
        if !self.status.is_done() {
            self.status = Status::Done;
            info!("session done after {} responses", self.n_responses());
        }
    }

    pub fn category(&self) -> Option<i32> {
        self.category
    }

    pub fn set_category(&mut self, category: Option<i32>) {
        self.category = category;
    }

    pub fn next_item(&self) -> Option<&str> {
        self.next_item.as_deref()
    }

    fn fail(&mut self, message: String) {
        error!("session entered error state: {message}");
        self.status = Status::Error(message);
        self.next_item = None;
    }
}

/// One examinee's adaptive test.
pub struct Session {
    strategy: Arc<dyn PhaseStrategy>,
    state: SessionState,
    rng: Box<dyn RngCore + Send>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("strategy", &self.strategy.name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn entropy_rng() -> Box<dyn RngCore + Send> {
    Box::new(Pcg64::from_rng(&mut rand::rng()))
}

impl Session {
    /// Start a session with an entropy-seeded random source.
    pub fn new(strategy: Arc<dyn PhaseStrategy>, bank: Arc<ItemBank>) -> CatResult<Self> {
        Session::with_rng(strategy, bank, entropy_rng())
    }

    /// Start a session drawing exposure-control randomness from `rng`.
    pub fn with_rng(
        strategy: Arc<dyn PhaseStrategy>,
        bank: Arc<ItemBank>,
        rng: Box<dyn RngCore + Send>,
    ) -> CatResult<Self> {
        Session::resume(strategy, bank, Vec::new(), rng)
    }

    /// Rebuild a session from responses collected earlier, one list per phase.
    ///
    /// A phase may only hold responses if the phase before it does.
    pub fn resume(
        strategy: Arc<dyn PhaseStrategy>,
        bank: Arc<ItemBank>,
        phase_responses: Vec<Vec<Response>>,
        rng: Box<dyn RngCore + Send>,
    ) -> CatResult<Self> {
        strategy.validate_bank(&bank)?;
        let n_phases = strategy.n_phases();
        if phase_responses.len() > n_phases {
            return Err(CatError::PhaseCount {
                strategy: strategy.name(),
                phases: n_phases,
                found: phase_responses.len(),
            });
        }
        for k in 1..phase_responses.len() {
            if !phase_responses[k].is_empty() && phase_responses[k - 1].is_empty() {
                return Err(CatError::PhaseOrder {
                    phase: k + 1,
                    previous: k,
                });
            }
        }

        let mut state = SessionState::new(bank, n_phases);
        for (k, responses) in phase_responses.into_iter().enumerate() {
            for response in &responses {
                if !state.bank.contains(&response.id) {
                    return Err(CatError::UnknownItem(response.id.clone()));
                }
                if !state.seen.insert(response.id.clone()) {
                    return Err(CatError::DuplicateResponse(response.id.clone()));
                }
            }
            state.responses[k] = responses;
        }

        let mut session = Session {
            strategy,
            state,
            rng,
        };
        session.update();
        Ok(session)
    }

    /// Record a response to the pending item and refresh the session.
    ///
    /// A response to an item other than the pending one is accepted with a
    /// warning.
    pub fn add_response(&mut self, response: Response) -> CatResult<()> {
        let (phase, pending) = match (self.state.active_phase(), &self.state.next_item) {
            (Some(phase), Some(pending)) => (phase, pending),
            _ => return Err(CatError::ResponsesClosed),
        };
        if self.state.seen.contains(&response.id) {
            return Err(CatError::DuplicateResponse(response.id));
        }
        if !self.state.bank.contains(&response.id) {
            return Err(CatError::UnknownItem(response.id));
        }
        if *pending != response.id {
            warn!(
                "response to item {} does not match pending item {}",
                response.id, pending
            );
        }

        self.state.seen.insert(response.id.clone());
        self.state.responses[phase - 1].push(response);
        self.update();
        Ok(())
    }

    fn update(&mut self) {
        if let Err(err) = self.run_hooks() {
            self.state.fail(err.to_string());
        }
    }

    fn run_hooks(&mut self) -> CatResult<()> {
        self.strategy.compute_ability(&mut self.state)?;
        self.strategy.evaluate_transition(&mut self.state)?;
        self.state.next_item = if self.state.status.is_done() {
            None
        } else {
            Some(
                self.strategy
                    .select_next_item(&self.state, self.rng.as_mut())?,
            )
        };
        Ok(())
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> &Status {
        &self.state.status
    }

    pub fn is_done(&self) -> bool {
        self.state.status.is_done()
    }

    pub fn next_item(&self) -> Option<&str> {
        self.state.next_item()
    }

    /// Ability estimate of a 1-based phase.
    pub fn estimate(&self, phase: usize) -> AbilityEstimate {
        self.state.estimate(phase)
    }

    pub fn theta(&self, phase: usize) -> f64 {
        self.state.estimate(phase).theta
    }

    pub fn sem(&self, phase: usize) -> f64 {
        self.state.estimate(phase).sem
    }

    pub fn responses(&self, phase: usize) -> &[Response] {
        self.state.responses(phase)
    }

    pub fn n_responses(&self) -> usize {
        self.state.n_responses()
    }

    /// Classification, `None` while undecided.
    pub fn category(&self) -> Option<i32> {
        self.state.category
    }

    /// Classification as reported to callers, [`UNDECIDED_LABEL`] while undecided.
    pub fn category_label(&self) -> String {
        self.state
            .category
            .map_or_else(|| UNDECIDED_LABEL.to_string(), |c| c.to_string())
    }
}

#[derive(Clone)]
struct RegistryEntry {
    strategy: Arc<dyn PhaseStrategy>,
    bank: Arc<ItemBank>,
}

/// Named test designs, each paired with the bank it administers.
#[derive(Default, Clone)]
pub struct Registry {
    entries: HashMap<String, RegistryEntry>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, entry)| (name, entry.strategy.name())),
            )
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        strategy: Arc<dyn PhaseStrategy>,
        bank: Arc<ItemBank>,
    ) -> CatResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(CatError::AlreadyRegistered(name));
        }
        strategy.validate_bank(&bank)?;
        info!(
            "registered {} design {name} with {} items",
            strategy.name(),
            bank.len()
        );
        self.entries.insert(name, RegistryEntry { strategy, bank });
        Ok(())
    }

    /// Build the strategy described by `config` and register it.
    pub fn register_config(
        &mut self,
        name: impl Into<String>,
        config: &StrategyConfig,
        bank: Arc<ItemBank>,
    ) -> CatResult<()> {
        self.register(name, config.build()?, bank)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn entry(&self, name: &str) -> CatResult<&RegistryEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| CatError::NotRegistered(name.to_string()))
    }

    pub fn new_session(&self, name: &str) -> CatResult<Session> {
        let entry = self.entry(name)?;
        Session::new(Arc::clone(&entry.strategy), Arc::clone(&entry.bank))
    }

    /// Start a session whose exposure control replays from `seed`.
    pub fn new_seeded_session(&self, name: &str, seed: u64) -> CatResult<Session> {
        let entry = self.entry(name)?;
        Session::with_rng(
            Arc::clone(&entry.strategy),
            Arc::clone(&entry.bank),
            Box::new(Pcg64::seed_from_u64(seed)),
        )
    }

    pub fn resume_session(
        &self,
        name: &str,
        phase_responses: Vec<Vec<Response>>,
    ) -> CatResult<Session> {
        let entry = self.entry(name)?;
        Session::resume(
            Arc::clone(&entry.strategy),
            Arc::clone(&entry.bank),
            phase_responses,
            entropy_rng(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{estimate_ability, EstimatorOptions};
    use crate::params::{ItemParams, Model};

    /// Administers bank items in order and stops after `length` responses.
    struct Linear {
        length: usize,
    }

    impl PhaseStrategy for Linear {
        fn name(&self) -> &'static str {
            "linear"
        }

        fn n_phases(&self) -> usize {
            1
        }

        fn validate_bank(&self, _bank: &ItemBank) -> CatResult<()> {
            Ok(())
        }

        fn compute_ability(&self, state: &mut SessionState) -> CatResult<()> {
            let responses = state.responses(1);
            if responses.is_empty() {
                return Ok(());
            }
            let values: Vec<f64> = responses.iter().map(|r| r.value).collect();
            let params = responses
                .iter()
                .map(|r| state.bank().phase1_params(&r.id).cloned())
                .collect::<CatResult<Vec<_>>>()?;
            let estimate =
                estimate_ability(Model::Brm, &params, &values, &EstimatorOptions::default())?;
            state.set_estimate(1, estimate);
            Ok(())
        }

        fn evaluate_transition(&self, state: &mut SessionState) -> CatResult<()> {
            if state.n_responses() >= self.length {
                state.advance();
            }
            Ok(())
        }

        fn select_next_item(
            &self,
            state: &SessionState,
            _rng: &mut dyn RngCore,
        ) -> CatResult<String> {
            state
                .unseen_items()
                .next()
                .map(|item| item.id.clone())
                .ok_or(CatError::Empty("items"))
        }
    }

    fn bank() -> Arc<ItemBank> {
        let items = (0..4)
            .map(|i| {
                BankItem::new(
                    format!("i{i}"),
                    ItemParams::brm(1.0 + 0.2 * i as f64, -1.0 + 0.5 * i as f64, 0.1).unwrap(),
                )
            })
            .collect();
        Arc::new(ItemBank::new(items).unwrap())
    }

    fn session(length: usize) -> Session {
        Session::with_rng(
            Arc::new(Linear { length }),
            bank(),
            Box::new(Pcg64::seed_from_u64(1)),
        )
        .unwrap()
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::Active(2).to_string(), "phase2");
        assert_eq!(Status::Done.to_string(), "done");
        assert_eq!(Status::Error("boom".into()).to_string(), "error: boom");
    }

    #[test]
    fn test_session_walks_to_done() {
        let mut s = session(2);
        assert_eq!(s.status(), &Status::Active(1));
        assert_eq!(s.next_item(), Some("i0"));
        assert_eq!(s.theta(1), 0.0);
        assert!(s.sem(1).is_nan());

        s.add_response(Response::new("i0", 1.0)).unwrap();
        assert_eq!(s.next_item(), Some("i1"));
        assert!(s.theta(1) > 0.0);

        s.add_response(Response::new("i1", 0.0)).unwrap();
        assert!(s.is_done());
        assert_eq!(s.next_item(), None);
        assert_eq!(s.category_label(), UNDECIDED_LABEL);
        assert!(matches!(
            s.add_response(Response::new("i2", 1.0)),
            Err(CatError::ResponsesClosed)
        ));
    }

    #[test]
    fn test_add_response_guards() {
        let mut s = session(3);
        s.add_response(Response::new("i0", 1.0)).unwrap();
        assert!(matches!(
            s.add_response(Response::new("i0", 0.0)),
            Err(CatError::DuplicateResponse(_))
        ));
        assert!(matches!(
            s.add_response(Response::new("nope", 0.0)),
            Err(CatError::UnknownItem(_))
        ));
        // Off-sequence responses are accepted.
        s.add_response(Response::new("i3", 0.0)).unwrap();
        assert_eq!(s.n_responses(), 2);
        assert_eq!(s.next_item(), Some("i1"));
    }

    #[test]
    fn test_hook_failure_is_absorbing() {
        let mut s = session(4);
        s.add_response(Response::new("i0", 7.0)).unwrap();
        assert!(matches!(s.status(), Status::Error(msg) if msg.contains("invalid value")));
        assert!(s.is_done());
        assert_eq!(s.next_item(), None);
        assert!(s.add_response(Response::new("i1", 1.0)).is_err());
    }

    #[test]
    fn test_resume_checks_history() {
        let strategy: Arc<dyn PhaseStrategy> = Arc::new(Linear { length: 3 });
        let rng = || -> Box<dyn RngCore + Send> { Box::new(Pcg64::seed_from_u64(3)) };

        let resumed = Session::resume(
            Arc::clone(&strategy),
            bank(),
            vec![vec![Response::new("i2", 1.0), Response::new("i0", 1.0)]],
            rng(),
        )
        .unwrap();
        assert_eq!(resumed.n_responses(), 2);
        assert_eq!(resumed.next_item(), Some("i1"));

        assert!(matches!(
            Session::resume(
                Arc::clone(&strategy),
                bank(),
                vec![vec![], vec![Response::new("i0", 1.0)]],
                rng(),
            ),
            Err(CatError::PhaseCount { .. })
        ));
        assert!(matches!(
            Session::resume(
                Arc::clone(&strategy),
                bank(),
                vec![vec![Response::new("i0", 1.0), Response::new("i0", 0.0)]],
                rng(),
            ),
            Err(CatError::DuplicateResponse(_))
        ));
        assert!(matches!(
            Session::resume(strategy, bank(), vec![vec![Response::new("x", 1.0)]], rng()),
            Err(CatError::UnknownItem(_))
        ));
    }

    #[test]
    fn test_registry() {
        let mut registry = Registry::new();
        registry
            .register("linear", Arc::new(Linear { length: 2 }), bank())
            .unwrap();
        assert!(matches!(
            registry.register("linear", Arc::new(Linear { length: 2 }), bank()),
            Err(CatError::AlreadyRegistered(_))
        ));
        assert!(registry.contains("linear"));
        assert!(matches!(
            registry.new_session("other"),
            Err(CatError::NotRegistered(_))
        ));

        let first = registry.new_seeded_session("linear", 5).unwrap();
        let second = registry.new_session("linear").unwrap();
        assert_eq!(first.next_item(), second.next_item());

        let resumed = registry
            .resume_session("linear", vec![vec![Response::new("i0", 1.0)]])
            .unwrap();
        assert_eq!(resumed.next_item(), Some("i1"));
    }
}
