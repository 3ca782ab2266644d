//! Monte-Carlo research harness
//!
//! Two sweeps: detection probability over SNR for every keying scheme, and
//! the mean peak-expressiveness criterion over Doppler for phase keying.
//! Trials of one point run in parallel, each on its own seeded stream, so a
//! sweep is reproducible for a given seed whatever the thread count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::params::{Modulation, Params};
use crate::sim::simulate;

pub const DEFAULT_AVERAGE_COUNT: usize = 200;
pub const DEFAULT_SEED: u64 = 0x0DE1_A7D0_0001;

/// What a sweep does with a trial that fails as a degenerate computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Count it as failed and keep going.
    #[default]
    Skip,
    /// Stop the sweep with the trial's error.
    Abort,
}

/// Shared flag checked before every sweep point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnrSweepConfig {
    pub params: Params,
    pub snr_from_db: f64,
    pub snr_to_db: f64,
    pub snr_step_db: f64,
    pub average_count: usize,
    pub seed: u64,
    pub modulations: Vec<Modulation>,
    pub policy: DegeneratePolicy,
}

impl Default for SnrSweepConfig {
    fn default() -> Self {
        Self {
            params: Params::default(),
            snr_from_db: 10.0,
            snr_to_db: -10.0,
            snr_step_db: 1.0,
            average_count: DEFAULT_AVERAGE_COUNT,
            seed: DEFAULT_SEED,
            modulations: Modulation::ALL.to_vec(),
            policy: DegeneratePolicy::Skip,
        }
    }
}

impl SnrSweepConfig {
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        check_range("snr", self.snr_to_db, self.snr_from_db, self.snr_step_db)?;
        if self.average_count == 0 {
            return Err(EngineError::invalid("average_count must be > 0"));
        }
        if self.modulations.is_empty() {
            return Err(EngineError::invalid("at least one modulation is required"));
        }
        Ok(())
    }

    /// SNR values from `snr_from_db` down to `snr_to_db`, both inclusive.
    pub fn snr_grid(&self) -> Vec<f64> {
        (0..grid_len(self.snr_to_db, self.snr_from_db, self.snr_step_db))
            .map(|idx| self.snr_from_db - self.snr_step_db * idx as f64)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DopplerSweepConfig {
    pub params: Params,
    pub doppler_from_hz: f64,
    pub doppler_to_hz: f64,
    pub doppler_step_hz: f64,
    pub average_count: usize,
    pub seed: u64,
    pub policy: DegeneratePolicy,
}

impl Default for DopplerSweepConfig {
    fn default() -> Self {
        Self {
            params: Params::default(),
            doppler_from_hz: -50.0,
            doppler_to_hz: 50.0,
            doppler_step_hz: 5.0,
            average_count: DEFAULT_AVERAGE_COUNT,
            seed: DEFAULT_SEED,
            policy: DegeneratePolicy::Skip,
        }
    }
}

impl DopplerSweepConfig {
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        check_range(
            "doppler",
            self.doppler_from_hz,
            self.doppler_to_hz,
            self.doppler_step_hz,
        )?;
        if self.average_count == 0 {
            return Err(EngineError::invalid("average_count must be > 0"));
        }
        Ok(())
    }

    pub fn doppler_grid(&self) -> Vec<f64> {
        (0..grid_len(self.doppler_from_hz, self.doppler_to_hz, self.doppler_step_hz))
            .map(|idx| self.doppler_from_hz + self.doppler_step_hz * idx as f64)
            .collect()
    }
}

fn check_range(name: &str, low: f64, high: f64, step: f64) -> Result<()> {
    if !(low.is_finite() && high.is_finite()) {
        return Err(EngineError::invalid(format!("{name} bounds must be finite")));
    }
    if !(step.is_finite() && step > 0.0) {
        return Err(EngineError::invalid(format!("{name} step must be finite and > 0")));
    }
    if high < low {
        return Err(EngineError::invalid(format!(
            "{name} range is empty: upper bound {high} is below lower bound {low}"
        )));
    }
    Ok(())
}

fn grid_len(low: f64, high: f64, step: f64) -> usize {
    ((high - low) / step + 1e-9).floor() as usize + 1
}

/// Detection outcome of one (modulation, SNR) point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    pub modulation: Modulation,
    pub snr_db: f64,
    pub hits: usize,
    pub trials: usize,
    pub failed_trials: usize,
    pub hit_rate: f64,
    /// Half-width of the hit window [ms]
    pub error_bar_ms: f64,
}

/// Mean criterion of one Doppler point; `None` when every trial failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionRow {
    pub doppler_hz: f64,
    pub mean_criterion: Option<f64>,
    pub trials: usize,
    pub failed_trials: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrSweep {
    pub rows: Vec<DetectionRow>,
    pub cancelled: bool,
}

impl SnrSweep {
    pub fn rows_for(&self, modulation: Modulation) -> impl Iterator<Item = &DetectionRow> + '_ {
        self.rows.iter().filter(move |row| row.modulation == modulation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DopplerSweep {
    pub rows: Vec<CriterionRow>,
    pub cancelled: bool,
}

/// Scalar result of one successful trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub hit: bool,
    pub criterion: f64,
}

/// Per-point accumulator; criteria stay in trial order so their mean does
/// not depend on how the trials were split across workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub hits: usize,
    pub failed: usize,
    pub criteria: Vec<f64>,
}

impl Tally {
    fn absorb(
        mut self,
        trial: usize,
        outcome: Result<TrialOutcome>,
        policy: DegeneratePolicy,
    ) -> Result<Self> {
        match outcome {
            Ok(outcome) => {
                self.hits += usize::from(outcome.hit);
                self.criteria.push(outcome.criterion);
            }
            Err(err) if err.is_degenerate() && policy == DegeneratePolicy::Skip => {
                warn!(trial, error = %err, "skipping degenerate trial");
                self.failed += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(self)
    }

    fn merge(mut self, other: Self) -> Self {
        self.hits += other.hits;
        self.failed += other.failed;
        self.criteria.extend(other.criteria);
        self
    }

    pub fn mean_criterion(&self) -> Option<f64> {
        if self.criteria.is_empty() {
            return None;
        }
        Some(self.criteria.iter().sum::<f64>() / self.criteria.len() as f64)
    }
}

/// Stream for one trial: the sweep seed keyed by point and trial index.
pub fn trial_rng(seed: u64, point: usize, trial: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(((point as u64) << 32) | trial as u64);
    rng
}

/// Run `trials` independent trials in parallel and fold them into a tally.
pub fn run_trials<F>(trials: usize, policy: DegeneratePolicy, trial: F) -> Result<Tally>
where
    F: Fn(usize) -> Result<TrialOutcome> + Sync + Send,
{
    (0..trials)
        .into_par_iter()
        .map(|idx| (idx, trial(idx)))
        .try_fold(Tally::default, |tally, (idx, outcome)| {
            tally.absorb(idx, outcome, policy)
        })
        .try_reduce(Tally::default, |a, b| Ok(a.merge(b)))
}

/// Visit sweep points in order, stopping early once `cancel` is set.
fn sweep_points<P, Row, F>(points: &[P], cancel: &CancelToken, mut run: F) -> Result<(Vec<Row>, bool)>
where
    F: FnMut(usize, &P) -> Result<Row>,
{
    let mut rows = Vec::with_capacity(points.len());
    for (idx, point) in points.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(completed = rows.len(), total = points.len(), "sweep cancelled");
            return Ok((rows, true));
        }
        rows.push(run(idx, point)?);
    }
    Ok((rows, false))
}

pub fn run_snr_sweep(config: &SnrSweepConfig, cancel: &CancelToken) -> Result<SnrSweep> {
    config.validate()?;

    let points: Vec<(Modulation, f64)> = config
        .modulations
        .iter()
        .flat_map(|&modulation| {
            config
                .snr_grid()
                .into_iter()
                .map(move |snr_db| (modulation, snr_db))
        })
        .collect();

    let (rows, cancelled) = sweep_points(&points, cancel, |point_idx, &(modulation, snr_db)| {
        let params = config.params.with_snr_db(snr_db);
        let tally = run_trials(config.average_count, config.policy, |trial| {
            let mut rng = trial_rng(config.seed, point_idx, trial);
            let run = simulate(&params, modulation, &mut rng)?;
            Ok(TrialOutcome {
                hit: run.is_hit(),
                criterion: run.criterion,
            })
        })?;

        let hit_rate = tally.hits as f64 / config.average_count as f64;
        info!(
            %modulation,
            snr_db,
            hits = tally.hits,
            failed = tally.failed,
            hit_rate,
            "snr point done"
        );
        Ok(DetectionRow {
            modulation,
            snr_db,
            hits: tally.hits,
            trials: config.average_count,
            failed_trials: tally.failed,
            hit_rate,
            error_bar_ms: params.hit_tolerance_ms(),
        })
    })?;

    Ok(SnrSweep { rows, cancelled })
}

pub fn run_doppler_sweep(config: &DopplerSweepConfig, cancel: &CancelToken) -> Result<DopplerSweep> {
    config.validate()?;

    let grid = config.doppler_grid();
    let (rows, cancelled) = sweep_points(&grid, cancel, |point_idx, &doppler_hz| {
        let params = config.params.with_doppler_hz(doppler_hz);
        let tally = run_trials(config.average_count, config.policy, |trial| {
            let mut rng = trial_rng(config.seed, point_idx, trial);
            let run = simulate(&params, Modulation::Phase, &mut rng)?;
            Ok(TrialOutcome {
                hit: run.is_hit(),
                criterion: run.criterion,
            })
        })?;

        let mean_criterion = tally.mean_criterion();
        info!(
            doppler_hz,
            mean_criterion = mean_criterion.unwrap_or(0.0),
            failed = tally.failed,
            "doppler point done"
        );
        Ok(CriterionRow {
            doppler_hz,
            mean_criterion,
            trials: config.average_count,
            failed_trials: tally.failed,
        })
    })?;

    Ok(DopplerSweep { rows, cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::RngCore;

    fn small_params() -> Params {
        Params {
            sampling_rate: 4_000.0,
            carrier_freq: 400.0,
            bits_count: 8,
            ..Params::default()
        }
    }

    #[test]
    fn grids_include_both_ends() {
        let snr = SnrSweepConfig::default();
        let grid = snr.snr_grid();
        assert_eq!(grid.len(), 21);
        assert_eq!(grid.first(), Some(&10.0));
        assert_eq!(grid.last(), Some(&-10.0));

        let doppler = DopplerSweepConfig::default();
        let grid = doppler.doppler_grid();
        assert_eq!(grid.len(), 21);
        assert_eq!(grid[0], -50.0);
        assert_eq!(grid[10], 0.0);
        assert_eq!(grid[20], 50.0);
    }

    #[test]
    fn configs_reject_bad_ranges() {
        let config = SnrSweepConfig {
            snr_step_db: 0.0,
            ..SnrSweepConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SnrSweepConfig {
            snr_from_db: -10.0,
            snr_to_db: 10.0,
            ..SnrSweepConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DopplerSweepConfig {
            average_count: 0,
            ..DopplerSweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn config_reads_partial_json() {
        let config: SnrSweepConfig =
            serde_json::from_str(r#"{"average_count": 12, "modulations": ["phase"], "policy": "abort"}"#)
                .unwrap();
        assert_eq!(config.average_count, 12);
        assert_eq!(config.modulations, vec![Modulation::Phase]);
        assert_eq!(config.policy, DegeneratePolicy::Abort);
        assert_eq!(config.snr_step_db, 1.0);
    }

    #[test]
    fn trial_streams_are_distinct_and_stable() {
        let a = trial_rng(7, 0, 1).next_u64();
        assert_eq!(a, trial_rng(7, 0, 1).next_u64());
        assert_ne!(a, trial_rng(7, 1, 0).next_u64());
        assert_ne!(a, trial_rng(7, 0, 2).next_u64());
        assert_ne!(a, trial_rng(8, 0, 1).next_u64());
    }

    fn flaky(idx: usize) -> Result<TrialOutcome> {
        if idx % 3 == 0 {
            Err(EngineError::degenerate("flat"))
        } else {
            Ok(TrialOutcome {
                hit: idx % 2 == 0,
                criterion: idx as f64,
            })
        }
    }

    #[test]
    fn skip_policy_counts_failed_trials() {
        let tally = run_trials(12, DegeneratePolicy::Skip, flaky).unwrap();
        // Failed: 0, 3, 6, 9. Hits: 2, 4, 8, 10.
        assert_eq!(tally.failed, 4);
        assert_eq!(tally.hits, 4);
        assert_eq!(tally.criteria, vec![1.0, 2.0, 4.0, 5.0, 7.0, 8.0, 10.0, 11.0]);
        assert_relative_eq!(tally.mean_criterion().unwrap(), 48.0 / 8.0);
    }

    #[test]
    fn abort_policy_stops_on_degenerate_trial() {
        let err = run_trials(12, DegeneratePolicy::Abort, flaky).unwrap_err();
        assert!(err.is_degenerate());
    }

    #[test]
    fn other_errors_abort_under_skip() {
        let err = run_trials(4, DegeneratePolicy::Skip, |_| {
            Err(EngineError::invalid("bad"))
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn all_failed_point_has_no_mean() {
        let tally = run_trials(3, DegeneratePolicy::Skip, |_| {
            Err(EngineError::degenerate("zero"))
        })
        .unwrap();
        assert_eq!(tally.failed, 3);
        assert_eq!(tally.mean_criterion(), None);
    }

    #[test]
    fn cancellation_keeps_completed_points() {
        let cancel = CancelToken::new();
        let points = [1, 2, 3, 4];
        let (rows, cancelled) = sweep_points(&points, &cancel, |idx, &p| {
            if idx == 1 {
                cancel.cancel();
            }
            Ok(p * 10)
        })
        .unwrap();
        assert!(cancelled);
        assert_eq!(rows, vec![10, 20]);
    }

    #[test]
    fn pre_cancelled_sweep_returns_empty() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let sweep = run_doppler_sweep(&DopplerSweepConfig::default(), &cancel).unwrap();
        assert!(sweep.cancelled);
        assert!(sweep.rows.is_empty());
    }

    #[test]
    fn snr_sweep_is_reproducible_and_degrades() {
        let config = SnrSweepConfig {
            params: small_params(),
            snr_from_db: 10.0,
            snr_to_db: -30.0,
            snr_step_db: 20.0,
            average_count: 24,
            seed: 99,
            modulations: vec![Modulation::Phase],
            policy: DegeneratePolicy::Skip,
        };
        let first = run_snr_sweep(&config, &CancelToken::new()).unwrap();
        let second = run_snr_sweep(&config, &CancelToken::new()).unwrap();
        assert_eq!(first, second);
        assert!(!first.cancelled);

        let rates: Vec<f64> = first.rows_for(Modulation::Phase).map(|r| r.hit_rate).collect();
        assert_eq!(rates.len(), 3);
        assert!(rates[0] >= 0.9, "rates {rates:?}");
        assert!(rates[2] < rates[0], "rates {rates:?}");
        assert!(first.rows.iter().all(|r| (r.error_bar_ms - 5.0).abs() < 1e-9));
    }

    #[test]
    #[ignore = "runs 1800 trials; cargo test -- --ignored"]
    fn hit_rate_does_not_rise_as_snr_falls() {
        let config = SnrSweepConfig {
            params: small_params(),
            snr_from_db: 10.0,
            snr_to_db: -30.0,
            snr_step_db: 5.0,
            average_count: DEFAULT_AVERAGE_COUNT,
            seed: 314,
            modulations: vec![Modulation::Phase],
            policy: DegeneratePolicy::Skip,
        };
        let sweep = run_snr_sweep(&config, &CancelToken::new()).unwrap();
        let rates: Vec<f64> = sweep.rows_for(Modulation::Phase).map(|r| r.hit_rate).collect();
        assert_eq!(rates.len(), 9);
        assert!(rates[0] >= 0.9, "rates {rates:?}");

        // Three binomial standard deviations of a difference at n = 200.
        let tolerance = 3.0 * (2.0 * 0.25 / DEFAULT_AVERAGE_COUNT as f64).sqrt();
        for pair in rates.windows(2) {
            assert!(pair[1] <= pair[0] + tolerance, "rates {rates:?}");
        }
        assert!(rates[8] < rates[0], "rates {rates:?}");
    }

    #[test]
    fn doppler_sweep_reports_every_point() {
        let config = DopplerSweepConfig {
            params: small_params(),
            doppler_from_hz: -10.0,
            doppler_to_hz: 10.0,
            doppler_step_hz: 10.0,
            average_count: 6,
            seed: 4,
            policy: DegeneratePolicy::Abort,
        };
        let sweep = run_doppler_sweep(&config, &CancelToken::new()).unwrap();
        let hz: Vec<f64> = sweep.rows.iter().map(|r| r.doppler_hz).collect();
        assert_eq!(hz, vec![-10.0, 0.0, 10.0]);
        for row in &sweep.rows {
            assert_eq!(row.failed_trials, 0);
            assert!(row.mean_criterion.is_some_and(|c| c > 1.0));
        }
    }
}
