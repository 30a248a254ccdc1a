//! Performance metrics over an equity curve and its trades.
//!
//! Every formula degrades gracefully on undefined input with one
//! convention throughout: empty or zero-variance inputs yield 0, and
//! ratios with a zero denominator but positive numerator yield +inf.

use crate::types::{EquityPoint, Trade};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scalar metrics bundle returned with every backtest result.
///
/// Percentages are expressed as percent (e.g. `12.5` = 12.5%); ratios are
/// unitless and annualized with the engine's periods-per-year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerfStats {
    pub total_return_pct: f64,
    /// CAGR derived from the first and last equity points.
    pub annual_return_pct: f64,
    pub annual_volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Worst peak-to-trough decline, as a negative percentage.
    pub max_drawdown_pct: f64,
    pub calmar_ratio: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub avg_trade_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub num_trades: usize,
}

/// Compute the full metric bundle.
///
/// Never fails: degenerate inputs produce the documented sentinels, and a
/// curve too short to differentiate produces zero-filled stats with a
/// warning.
pub fn compute(equity: &[EquityPoint], trades: &[Trade], periods_per_year: f64) -> PerfStats {
    if equity.len() < 2 {
        warn!(
            points = equity.len(),
            "equity curve too short for metrics, returning zero-filled stats"
        );
        return PerfStats {
            num_trades: trades.len(),
            ..Default::default()
        };
    }

    let first = equity[0].equity;
    let last = equity[equity.len() - 1].equity;
    let total_return_pct = (last / first - 1.0) * 100.0;

    let returns: Vec<f64> = equity
        .windows(2)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect();

    let n_periods = equity.len() as f64;
    let n_years = n_periods / periods_per_year;
    let annual_return_pct = if n_years > 0.0 && first > 0.0 && last > 0.0 {
        ((last / first).powf(1.0 / n_years) - 1.0) * 100.0
    } else {
        0.0
    };

    let annual_volatility_pct = std_dev(&returns) * periods_per_year.sqrt() * 100.0;
    let sharpe_ratio = sharpe(&returns, periods_per_year);
    let sortino_ratio = sortino(&returns, periods_per_year);
    let max_drawdown_pct = max_drawdown(equity);

    let calmar_ratio = if max_drawdown_pct < 0.0 {
        annual_return_pct / max_drawdown_pct.abs()
    } else if annual_return_pct > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let (win_rate_pct, profit_factor, avg_trade_pct, best_trade_pct, worst_trade_pct) =
        trade_stats(trades);

    PerfStats {
        total_return_pct,
        annual_return_pct,
        annual_volatility_pct,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown_pct,
        calmar_ratio,
        win_rate_pct,
        profit_factor,
        avg_trade_pct,
        best_trade_pct,
        worst_trade_pct,
        num_trades: trades.len(),
    }
}

/// Annualized Sharpe ratio. Zero variance or empty input yields 0.
pub fn sharpe(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = mean(returns);
    let std = std_dev(returns);
    if std == 0.0 {
        return 0.0;
    }
    (mean / std) * periods_per_year.sqrt()
}

/// Annualized Sortino ratio: denominator uses only negative returns.
///
/// No downside observations yields +inf for a positive mean, else 0.
pub fn sortino(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean_ret = mean(returns);
    let downside: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
    if downside.is_empty() {
        return if mean_ret > 0.0 { f64::INFINITY } else { 0.0 };
    }
    let downside_dev =
        (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    (mean_ret / downside_dev) * periods_per_year.sqrt()
}

/// Maximum drawdown as a negative percentage:
/// `min((equity - cummax) / cummax) * 100`.
pub fn max_drawdown(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for point in equity {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.min((point.equity - peak) / peak);
        }
    }
    worst * 100.0
}

fn trade_stats(trades: &[Trade]) -> (f64, f64, f64, f64, f64) {
    if trades.is_empty() {
        return (0.0, 0.0, 0.0, 0.0, 0.0);
    }

    let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
    let win_rate_pct = wins as f64 / trades.len() as f64 * 100.0;

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_trade_pct =
        trades.iter().map(|t| t.return_pct).sum::<f64>() / trades.len() as f64;
    let best_trade_pct = trades
        .iter()
        .map(|t| t.return_pct)
        .fold(f64::NEG_INFINITY, f64::max);
    let worst_trade_pct = trades
        .iter()
        .map(|t| t.return_pct)
        .fold(f64::INFINITY, f64::min);

    (
        win_rate_pct,
        profit_factor,
        avg_trade_pct,
        best_trade_pct,
        worst_trade_pct,
    )
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitReason;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
    }

    fn equity_from(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: ts(i as i64),
                equity,
                cash: equity,
                position_value: 0.0,
            })
            .collect()
    }

    fn trade(pnl: f64, return_pct: f64) -> Trade {
        Trade {
            entry_time: ts(0),
            exit_time: ts(1),
            entry_price: 100.0,
            exit_price: 100.0 + return_pct,
            size: 1.0,
            pnl,
            return_pct,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn test_total_return_matches_endpoints() {
        let equity = equity_from(&[10_000.0, 10_500.0, 11_000.0]);
        let stats = compute(&equity, &[], 252.0);
        assert!((stats.total_return_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_zero_variance_is_zero() {
        let returns = vec![0.01; 50];
        assert_eq!(sharpe(&returns, 252.0), 0.0);
        assert_eq!(sharpe(&[], 252.0), 0.0);
    }

    #[test]
    fn test_sharpe_annualization() {
        let returns = vec![0.01, -0.005, 0.02, 0.003, -0.01, 0.007];
        let daily = sharpe(&returns, 252.0);
        let hourly = sharpe(&returns, 252.0 * 6.5);
        // Same return stream annualized at a higher frequency scales by
        // sqrt of the frequency ratio
        assert!((hourly / daily - 6.5_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_sortino_no_downside_is_infinite() {
        let returns = vec![0.01, 0.02, 0.005];
        assert!(sortino(&returns, 252.0).is_infinite());

        let flat = vec![0.0, 0.0];
        assert_eq!(sortino(&flat, 252.0), 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        let equity = equity_from(&[100.0, 120.0, 90.0, 110.0, 80.0]);
        // Worst decline: 120 -> 80 = -33.33%
        let dd = max_drawdown(&equity);
        assert!((dd - (-100.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_max_drawdown_monotone_curve_is_zero() {
        let equity = equity_from(&[100.0, 110.0, 120.0]);
        assert_eq!(max_drawdown(&equity), 0.0);
    }

    #[test]
    fn test_profit_factor_sentinels() {
        // All winners: +inf
        let trades = vec![trade(100.0, 1.0), trade(50.0, 0.5)];
        let stats = compute(&equity_from(&[100.0, 101.0]), &trades, 252.0);
        assert!(stats.profit_factor.is_infinite());
        assert!((stats.win_rate_pct - 100.0).abs() < 1e-9);

        // No trades: all trade stats zero
        let stats = compute(&equity_from(&[100.0, 101.0]), &[], 252.0);
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.num_trades, 0);
    }

    #[test]
    fn test_win_rate_and_averages() {
        let trades = vec![trade(100.0, 2.0), trade(-50.0, -1.0), trade(30.0, 0.5)];
        let stats = compute(&equity_from(&[100.0, 101.0]), &trades, 252.0);

        assert!((stats.win_rate_pct - 200.0 / 3.0).abs() < 1e-9);
        assert!((stats.profit_factor - 130.0 / 50.0).abs() < 1e-9);
        assert!((stats.avg_trade_pct - 0.5).abs() < 1e-9);
        assert!((stats.best_trade_pct - 2.0).abs() < 1e-9);
        assert!((stats.worst_trade_pct - (-1.0)).abs() < 1e-9);
        assert_eq!(stats.num_trades, 3);
    }

    #[test]
    fn test_calmar_sentinels() {
        // Rising curve with no drawdown and positive return: +inf
        let stats = compute(&equity_from(&[100.0, 110.0, 121.0]), &[], 252.0);
        assert!(stats.calmar_ratio.is_infinite());

        // Flat curve: 0
        let stats = compute(&equity_from(&[100.0, 100.0]), &[], 252.0);
        assert_eq!(stats.calmar_ratio, 0.0);
    }

    #[test]
    fn test_short_curve_degrades_to_zero_stats() {
        let stats = compute(&equity_from(&[100.0]), &[trade(10.0, 0.1)], 252.0);
        assert_eq!(stats.total_return_pct, 0.0);
        assert_eq!(stats.sharpe_ratio, 0.0);
        assert_eq!(stats.num_trades, 1);
    }
}
