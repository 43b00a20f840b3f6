//! Monte Carlo simulation of single-phase adaptive tests.
//!
//! Simulated examinees answer from the phase-1 model at a known θ. Batches
//! run one task per (θ, replication) pair in parallel, each with its own
//! seeded `Pcg64` stream, so results are reproducible for a given seed.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use crate::bank::ItemBank;
use crate::config::SinglePhaseConfig;
use crate::error::{CatError, CatResult};
use crate::models::category_probabilities;
use crate::params::ItemParams;
use crate::session::{PhaseStrategy, Response, Session};
use crate::strategy::SinglePhase;
use crate::utils::validate_finite;

/// Result of one simulated session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub true_theta: f64,
    pub theta: f64,
    pub sem: f64,
    pub n_items: usize,
    pub administered: Vec<String>,
    pub responses: Vec<f64>,
    /// Final session status label.
    pub status: String,
}

/// Recovery statistics at one true θ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionalSummary {
    pub true_theta: f64,
    pub bias: f64,
    pub mse: f64,
    pub mean_items: f64,
    pub n_replications: usize,
}

/// Draw a response value from an item's category probabilities at θ.
fn draw_response<R: Rng + ?Sized>(item: &ItemParams, theta: f64, rng: &mut R) -> f64 {
    let probabilities = category_probabilities(item, theta);
    let u: f64 = rng.random();
    let mut cumulative = 0.0;
    let mut index = probabilities.len() - 1;
    for (k, p) in probabilities.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            index = k;
            break;
        }
    }
    match item {
        ItemParams::Brm { .. } => index as f64,
        ItemParams::Grm { .. } => (index + 1) as f64,
    }
}

fn run_session(
    strategy: Arc<dyn PhaseStrategy>,
    bank: Arc<ItemBank>,
    true_theta: f64,
    seed: u64,
) -> CatResult<SimulationOutcome> {
    let mut examinee = Pcg64::seed_from_u64(seed);
    let selection_rng = Pcg64::from_rng(&mut examinee);
    let mut session = Session::with_rng(strategy, Arc::clone(&bank), Box::new(selection_rng))?;

    let mut administered = Vec::new();
    let mut responses = Vec::new();
    while let Some(id) = session.next_item().map(str::to_string) {
        let params = bank.phase1_params(&id)?;
        let value = draw_response(params, true_theta, &mut examinee);
        session.add_response(Response::new(id.clone(), value))?;
        administered.push(id);
        responses.push(value);
    }

    let estimate = session.estimate(1);
    Ok(SimulationOutcome {
        true_theta,
        theta: estimate.theta,
        sem: estimate.sem,
        n_items: administered.len(),
        administered,
        responses,
        status: session.status().to_string(),
    })
}

/// Run one single-phase session against a simulated examinee.
pub fn simulate_session(
    config: &SinglePhaseConfig,
    bank: Arc<ItemBank>,
    true_theta: f64,
    seed: u64,
) -> CatResult<SimulationOutcome> {
    validate_finite("true_theta", true_theta)?;
    let strategy: Arc<dyn PhaseStrategy> = Arc::new(SinglePhase::new(config.clone())?);
    run_session(strategy, bank, true_theta, seed)
}

/// Run `n_replications` sessions at each true θ in parallel.
///
/// Outcomes are ordered by θ, then replication. Task `(t, r)` is seeded
/// with `seed + 1000·t + r`.
pub fn simulate_batch(
    config: &SinglePhaseConfig,
    bank: Arc<ItemBank>,
    true_thetas: &[f64],
    n_replications: usize,
    seed: u64,
) -> CatResult<Vec<SimulationOutcome>> {
    if true_thetas.is_empty() {
        return Err(CatError::Empty("true_thetas"));
    }
    if n_replications == 0 {
        return Err(CatError::option("n_replications", "must be at least 1"));
    }
    for &theta in true_thetas {
        validate_finite("true_theta", theta)?;
    }
    let strategy: Arc<dyn PhaseStrategy> = Arc::new(SinglePhase::new(config.clone())?);
    strategy.validate_bank(&bank)?;

    let tasks: Vec<(usize, usize)> = (0..true_thetas.len())
        .flat_map(|t| (0..n_replications).map(move |r| (t, r)))
        .collect();

    tasks
        .par_iter()
        .map(|&(theta_idx, rep)| {
            let task_seed = seed
                .wrapping_add(theta_idx as u64 * 1000)
                .wrapping_add(rep as u64);
            run_session(
                Arc::clone(&strategy),
                Arc::clone(&bank),
                true_thetas[theta_idx],
                task_seed,
            )
        })
        .collect()
}

/// Bias, mean squared error and mean test length per true θ.
///
/// Groups appear in order of first occurrence.
pub fn conditional_summary(outcomes: &[SimulationOutcome]) -> Vec<ConditionalSummary> {
    let mut groups: Vec<(f64, Vec<&SimulationOutcome>)> = Vec::new();
    for outcome in outcomes {
        match groups
            .iter_mut()
            .find(|(theta, _)| theta.to_bits() == outcome.true_theta.to_bits())
        {
            Some((_, members)) => members.push(outcome),
            None => groups.push((outcome.true_theta, vec![outcome])),
        }
    }

    groups
        .into_iter()
        .map(|(true_theta, members)| {
            let n = members.len() as f64;
            let mean_est = members.iter().map(|o| o.theta).sum::<f64>() / n;
            let mse = members
                .iter()
                .map(|o| (o.theta - true_theta).powi(2))
                .sum::<f64>()
                / n;
            let mean_items = members.iter().map(|o| o.n_items as f64).sum::<f64>() / n;
            ConditionalSummary {
                true_theta,
                bias: mean_est - true_theta,
                mse,
                mean_items,
                n_replications: members.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankItem;
    use approx::assert_abs_diff_eq;

    fn bank() -> Arc<ItemBank> {
        let items = (0..40)
            .map(|i| {
                let b = -3.0 + 6.0 * i as f64 / 39.0;
                BankItem::new(format!("s{i}"), ItemParams::brm(1.8, b, 0.1).unwrap())
            })
            .collect();
        Arc::new(ItemBank::new(items).unwrap())
    }

    fn config() -> SinglePhaseConfig {
        SinglePhaseConfig {
            max_items: 12,
            min_items: 5,
            ..SinglePhaseConfig::default()
        }
    }

    #[test]
    fn test_simulate_session_is_reproducible() {
        let first = simulate_session(&config(), bank(), 0.5, 42).unwrap();
        let second = simulate_session(&config(), bank(), 0.5, 42).unwrap();
        assert_eq!(first.administered, second.administered);
        assert_eq!(first.responses, second.responses);
        assert_eq!(first.status, "done");
        assert!(first.n_items >= 5 && first.n_items <= 12);
        assert!(first.responses.iter().all(|&r| r == 0.0 || r == 1.0));
    }

    #[test]
    fn test_batch_layout_and_summary() {
        let thetas = [-1.0, 1.0];
        let outcomes = simulate_batch(&config(), bank(), &thetas, 3, 7).unwrap();
        assert_eq!(outcomes.len(), 6);
        assert_eq!(outcomes[0].true_theta, -1.0);
        assert_eq!(outcomes[5].true_theta, 1.0);

        let single = simulate_session(&config(), bank(), 1.0, 7 + 1000 + 2).unwrap();
        assert_eq!(single, outcomes[5]);

        let summary = conditional_summary(&outcomes);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].n_replications, 3);
        assert!(summary[1].mse >= summary[1].bias * summary[1].bias - 1e-12);
        assert!(summary[0].mean_items >= 5.0);
    }

    #[test]
    fn test_summary_statistics() {
        let outcome = |true_theta: f64, theta: f64, n_items: usize| SimulationOutcome {
            true_theta,
            theta,
            sem: 0.3,
            n_items,
            administered: Vec::new(),
            responses: Vec::new(),
            status: "done".to_string(),
        };
        let summary = conditional_summary(&[outcome(0.0, 0.5, 10), outcome(0.0, -0.1, 20)]);
        assert_abs_diff_eq!(summary[0].bias, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(summary[0].mse, 0.13, epsilon = 1e-12);
        assert_abs_diff_eq!(summary[0].mean_items, 15.0);
    }

    #[test]
    fn test_batch_rejects_empty_input() {
        assert!(simulate_batch(&config(), bank(), &[], 2, 0).is_err());
        assert!(simulate_batch(&config(), bank(), &[0.0], 0, 0).is_err());
    }
}
