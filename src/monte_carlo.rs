//! Monte Carlo robustness analysis by return-stream permutation.
//!
//! Each simulated path draws a permutation of the observed returns
//! (sampling without replacement, preserving the empirical distribution
//! under a serial-independence null) and compounds it from the initial
//! capital. The resulting distribution of final returns and drawdowns
//! yields confidence bands and tail-risk metrics.
//!
//! Determinism: for a given seed the output is bit-identical across runs,
//! serial or parallel, because every path derives its own RNG stream from
//! the master seed.

use crate::cancel::CancelToken;
use crate::engine::BacktestResult;
use crate::error::{BacktestError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for the Monte Carlo simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    /// Master seed; identical seed and inputs reproduce the output exactly.
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 1000,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    fn validate(&self) -> Result<()> {
        if self.n_simulations == 0 {
            return Err(BacktestError::InvalidConfig {
                field: "n_simulations",
                value: 0.0,
                detail: "must be >= 1",
            });
        }
        Ok(())
    }
}

/// Distributional outputs of the simulation.
///
/// Returns are decimals (0.10 = +10%); VaR figures are percentiles of the
/// final-return distribution, so a loss shows up negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub n_paths: usize,
    /// Length of the input return stream.
    pub n_periods: usize,

    pub mean_final_return: f64,
    pub median_final_return: f64,
    pub std_final_return: f64,

    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,

    /// 5th percentile of final returns.
    pub var_95: f64,
    /// 1st percentile of final returns.
    pub var_99: f64,
    /// Mean of final returns at or below `var_95`.
    pub cvar_95: f64,

    pub mean_max_drawdown: f64,
    /// 1st percentile of per-path max drawdowns.
    pub worst_max_drawdown: f64,

    pub prob_positive: f64,
    /// Probability of at least doubling.
    pub prob_double: f64,
    /// Probability of losing more than half.
    pub prob_loss_50: f64,

    /// Equity paths, one row per simulation, each `n_periods + 1` long.
    pub equity_paths: Vec<Vec<f64>>,
    pub final_returns: Vec<f64>,
    /// Per-path maximum drawdowns (negative decimals).
    pub drawdown_distribution: Vec<f64>,
}

impl MonteCarloResult {
    /// Short key-figure summary for logs and reports.
    pub fn summary(&self) -> String {
        format!(
            "Monte Carlo ({} paths):\n\
             Mean Return: {:.1}%\n\
             VaR 95%: {:.1}%\n\
             CVaR 95%: {:.1}%\n\
             Mean Max DD: {:.1}%\n\
             P(Gain): {:.0}%",
            self.n_paths,
            self.mean_final_return * 100.0,
            self.var_95 * 100.0,
            self.cvar_95 * 100.0,
            self.mean_max_drawdown * 100.0,
            self.prob_positive * 100.0,
        )
    }
}

/// Monte Carlo simulator over a strategy's return stream.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: MonteCarloConfig::default(),
        }
    }

    /// Simulate directly from a backtest result's per-bar equity returns.
    pub fn simulate_result(
        &self,
        result: &BacktestResult,
        cancel: Option<&CancelToken>,
    ) -> Result<MonteCarloResult> {
        self.simulate(&result.equity_returns(), result.initial_capital, cancel)
    }

    /// Run the simulation over a raw return stream.
    ///
    /// Fewer than 10 observations carry too little distributional
    /// information and are rejected.
    pub fn simulate(
        &self,
        returns: &[f64],
        initial_capital: f64,
        cancel: Option<&CancelToken>,
    ) -> Result<MonteCarloResult> {
        const MIN_OBSERVATIONS: usize = 10;

        let returns: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
        if returns.len() < MIN_OBSERVATIONS {
            return Err(BacktestError::InsufficientData {
                component: "MonteCarloSimulator",
                needed: MIN_OBSERVATIONS,
                got: returns.len(),
            });
        }
        if initial_capital <= 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "initial_capital",
                value: initial_capital,
                detail: "must be > 0",
            });
        }

        let n_periods = returns.len();
        let n_paths = self.config.n_simulations;

        info!(n_paths, n_periods, seed = self.config.seed, "running Monte Carlo simulation");

        // Independent paths with per-path derived seeds; cancellation is
        // honored between paths, in-flight paths run to completion.
        let paths: Vec<Option<Vec<f64>>> = (0..n_paths)
            .into_par_iter()
            .map(|path_index| {
                if cancel.is_some_and(|token| token.is_cancelled()) {
                    return None;
                }
                let seed = derive_path_seed(self.config.seed, path_index as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut shuffled = returns.clone();
                shuffled.shuffle(&mut rng);

                let mut path = Vec::with_capacity(n_periods + 1);
                let mut equity = initial_capital;
                path.push(equity);
                for r in shuffled {
                    equity *= 1.0 + r;
                    path.push(equity);
                }
                Some(path)
            })
            .collect();

        if paths.iter().any(|p| p.is_none()) {
            return Err(BacktestError::Cancelled {
                component: "MonteCarloSimulator",
            });
        }
        let equity_paths: Vec<Vec<f64>> = paths.into_iter().flatten().collect();

        let final_returns: Vec<f64> = equity_paths
            .iter()
            .map(|p| p[p.len() - 1] / initial_capital - 1.0)
            .collect();
        let drawdowns: Vec<f64> = equity_paths.iter().map(|p| path_max_drawdown(p)).collect();

        let mut sorted_returns = final_returns.clone();
        sorted_returns.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut sorted_drawdowns = drawdowns.clone();
        sorted_drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mean_final_return = mean(&final_returns);
        let median_final_return = percentile(&sorted_returns, 50.0);
        let std_final_return = std_dev(&final_returns);

        let var_95 = percentile(&sorted_returns, 5.0);
        let var_99 = percentile(&sorted_returns, 1.0);
        let tail: Vec<f64> = sorted_returns
            .iter()
            .copied()
            .filter(|&r| r <= var_95)
            .collect();
        let cvar_95 = if tail.is_empty() { var_95 } else { mean(&tail) };

        let prob_positive = proportion(&final_returns, |r| r > 0.0);
        let prob_double = proportion(&final_returns, |r| r > 1.0);
        let prob_loss_50 = proportion(&final_returns, |r| r < -0.5);

        Ok(MonteCarloResult {
            n_paths,
            n_periods,
            mean_final_return,
            median_final_return,
            std_final_return,
            percentile_5: percentile(&sorted_returns, 5.0),
            percentile_25: percentile(&sorted_returns, 25.0),
            percentile_75: percentile(&sorted_returns, 75.0),
            percentile_95: percentile(&sorted_returns, 95.0),
            var_95,
            var_99,
            cvar_95,
            mean_max_drawdown: mean(&drawdowns),
            worst_max_drawdown: percentile(&sorted_drawdowns, 1.0),
            prob_positive,
            prob_double,
            prob_loss_50,
            equity_paths,
            final_returns,
            drawdown_distribution: drawdowns,
        })
    }
}

/// Maximum drawdown of one equity path, as a negative decimal.
fn path_max_drawdown(path: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &equity in path {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.min((equity - peak) / peak);
        }
    }
    worst
}

/// Linear-interpolation percentile over pre-sorted data, `p` in [0, 100].
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn proportion(values: &[f64], predicate: impl Fn(f64) -> bool) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| predicate(v)).count() as f64 / values.len() as f64
}

/// Order-independent per-path seed derivation (splitmix64 finalizer).
fn derive_path_seed(master: u64, path: u64) -> u64 {
    let mut z = master.wrapping_add(path.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
