//! Event-driven backtest engine.
//!
//! Converts a price series plus an entry/exit frame into trades, an equity
//! curve, and a metrics bundle. The central contract is execution timing:
//! with the default one-bar delay, a signal observed at bar `t` fills at
//! the *open* of bar `t+1` — never at the close of either bar — and
//! stop-loss/take-profit touches are tested intrabar against the bar's
//! high and low, filling at the stop level unless the bar gapped past it.

use crate::error::{BacktestError, Result};
use crate::stats::{self, PerfStats};
use crate::types::{Bar, BarInterval, BarSeries, EquityPoint, ExitReason, SignalFrame, Trade};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Commission and slippage as fractions of the fill price, each applied on
/// both sides of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingCosts {
    /// Commission per side (e.g. 0.001 = 0.1%).
    pub commission_rate: f64,
    /// Slippage per side (e.g. 0.0005 = 0.05%).
    pub slippage_rate: f64,
}

impl Default for TradingCosts {
    fn default() -> Self {
        Self {
            commission_rate: 0.001,
            slippage_rate: 0.0005,
        }
    }
}

impl TradingCosts {
    /// Frictionless costs, for controlled experiments.
    pub fn zero() -> Self {
        Self {
            commission_rate: 0.0,
            slippage_rate: 0.0,
        }
    }

    pub fn total_rate(&self) -> f64 {
        self.commission_rate + self.slippage_rate
    }

    /// Effective cash price paid per unit when buying at `fill`.
    pub fn buy_price(&self, fill: f64) -> f64 {
        fill * (1.0 + self.total_rate())
    }

    /// Effective cash price received per unit when selling at `fill`.
    pub fn sell_price(&self, fill: f64) -> f64 {
        fill * (1.0 - self.total_rate())
    }

    fn validate(&self) -> Result<()> {
        // A common user error is passing percentages as whole numbers
        // (e.g. 0.1 meaning 0.1% but read as 10%); anything above 20%
        // per side is treated as that mistake.
        const MAX_TOTAL_RATE: f64 = 0.2;

        if self.commission_rate < 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "commission_rate",
                value: self.commission_rate,
                detail: "must be >= 0",
            });
        }
        if self.slippage_rate < 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "slippage_rate",
                value: self.slippage_rate,
                detail: "must be >= 0",
            });
        }
        if self.total_rate() > MAX_TOTAL_RATE {
            return Err(BacktestError::InvalidConfig {
                field: "commission_rate + slippage_rate",
                value: self.total_rate(),
                detail: "implausibly large; rates are fractions, not percentages",
            });
        }
        Ok(())
    }
}

/// Configuration for the backtest engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub costs: TradingCosts,
    /// Bars between signal observation and fill: 0 or 1.
    ///
    /// 0 fills at the signal bar's own open and is only causally sound
    /// when the signal inputs carry one extra bar of lag themselves.
    pub execution_delay: usize,
    /// Fraction of current equity committed per entry, in (0, 1].
    pub size_fraction: f64,
    /// Stop-loss distance below the entry fill, as a fraction.
    pub sl_pct: Option<f64>,
    /// Take-profit distance above the entry fill, as a fraction.
    pub tp_pct: Option<f64>,
    /// Explicit annualization override; inferred from the index when None.
    pub periods_per_year: Option<f64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            costs: TradingCosts::default(),
            execution_delay: 1,
            size_fraction: 1.0,
            sl_pct: None,
            tp_pct: None,
            periods_per_year: None,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "initial_capital",
                value: self.initial_capital,
                detail: "must be > 0",
            });
        }
        if self.size_fraction <= 0.0 || self.size_fraction > 1.0 {
            return Err(BacktestError::InvalidConfig {
                field: "size_fraction",
                value: self.size_fraction,
                detail: "must be in (0, 1]",
            });
        }
        if self.execution_delay > 1 {
            return Err(BacktestError::InvalidConfig {
                field: "execution_delay",
                value: self.execution_delay as f64,
                detail: "must be 0 or 1",
            });
        }
        if self.execution_delay == 0 && (self.sl_pct.is_some() || self.tp_pct.is_some()) {
            // Same-bar fills combined with intrabar stops have no defined
            // ordering; rejected rather than guessed.
            return Err(BacktestError::InvalidConfig {
                field: "execution_delay",
                value: 0.0,
                detail: "stops require execution_delay = 1",
            });
        }
        if let Some(sl) = self.sl_pct {
            if !(0.0..1.0).contains(&sl) {
                return Err(BacktestError::InvalidConfig {
                    field: "sl_pct",
                    value: sl,
                    detail: "must be in [0, 1)",
                });
            }
        }
        if let Some(tp) = self.tp_pct {
            if tp < 0.0 {
                return Err(BacktestError::InvalidConfig {
                    field: "tp_pct",
                    value: tp,
                    detail: "must be >= 0",
                });
            }
        }
        if let Some(ppy) = self.periods_per_year {
            if ppy <= 0.0 {
                return Err(BacktestError::InvalidConfig {
                    field: "periods_per_year",
                    value: ppy,
                    detail: "must be > 0",
                });
            }
        }
        self.costs.validate()
    }
}

/// Immutable bundle produced by one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    /// Annualization actually used for the metrics.
    pub periods_per_year: f64,
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
    pub stats: PerfStats,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }

    /// Per-bar equity returns, the input for Monte Carlo resampling.
    pub fn equity_returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
            .collect()
    }
}

/// Open-position bookkeeping inside the simulation loop.
#[derive(Debug, Clone)]
struct OpenPosition {
    entry_index: usize,
    entry_time: chrono::DateTime<chrono::Utc>,
    entry_price: f64,
    units: f64,
    /// Cash paid at entry, including costs; the trade's capital base.
    entry_cost: f64,
}

/// The backtest engine: long-flat state machine over aligned prices and
/// signals.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    /// Create an engine, failing fast on any configuration contract
    /// violation.
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: BacktestConfig::default(),
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the simulation.
    ///
    /// Price and signal indices are intersected first; the signal flags are
    /// then shifted by the execution delay, so `entries[t]` acts at bar
    /// `t + delay` and fills at that bar's open.
    pub fn run(&self, prices: &BarSeries, signals: &SignalFrame) -> Result<BacktestResult> {
        if signals.is_empty() {
            return Err(BacktestError::EmptyInput {
                component: "SignalFrame",
            });
        }

        let (bars, entries, exits) = intersect(prices.bars(), signals);
        let n = bars.len();
        if n < 2 {
            return Err(BacktestError::InsufficientData {
                component: "BacktestEngine",
                needed: 2,
                got: n,
            });
        }

        let delay = self.config.execution_delay;
        let entry_at = |i: usize| i >= delay && entries[i - delay];
        let exit_at = |i: usize| i >= delay && exits[i - delay];

        info!(
            bars = n,
            delay,
            size_fraction = self.config.size_fraction,
            "running backtest"
        );

        let mut cash = self.config.initial_capital;
        let mut position: Option<OpenPosition> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity: Vec<EquityPoint> = Vec::with_capacity(n);

        for i in 0..n {
            let bar = &bars[i];

            // Close a position opened on an earlier bar. Stops are tested
            // from the first bar after entry; a signal exit fills at this
            // bar's open only when no stop fired.
            if let Some(pos) = &position {
                if pos.entry_index < i {
                    if let Some((fill, reason)) = self.check_exit(pos, bar, exit_at(i)) {
                        let trade = self.close_position(pos, fill, bar, reason, &mut cash);
                        debug!(
                            entry = %trade.entry_time,
                            exit = %trade.exit_time,
                            reason = %trade.exit_reason,
                            return_pct = trade.return_pct,
                            "closed position"
                        );
                        trades.push(trade);
                        position = None;
                    }
                }
            }

            // Entries fill only from a flat book; a new entry while long is
            // a no-op, and an entry landing on the final bar is skipped
            // because there is no later bar to hold through.
            if position.is_none() && entry_at(i) && i + 1 < n {
                let fill = bar.open;
                let buy_price = self.config.costs.buy_price(fill);
                let notional = self.config.size_fraction * cash;
                let units = notional / buy_price;
                if units > 0.0 {
                    let entry_cost = units * buy_price;
                    cash -= entry_cost;
                    position = Some(OpenPosition {
                        entry_index: i,
                        entry_time: bar.timestamp,
                        entry_price: fill,
                        units,
                        entry_cost,
                    });
                    debug!(time = %bar.timestamp, fill, units, "opened position");
                }
            }

            // Terminal bar: force-close any open position at the close
            // before the final equity point is recorded.
            if i + 1 == n {
                if let Some(pos) = position.take() {
                    let trade =
                        self.close_position(&pos, bar.close, bar, ExitReason::EndOfData, &mut cash);
                    trades.push(trade);
                }
            }

            let position_value = position.as_ref().map_or(0.0, |p| p.units * bar.close);
            equity.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: cash + position_value,
                cash,
                position_value,
            });
        }

        let periods_per_year = self
            .config
            .periods_per_year
            .unwrap_or_else(|| BarInterval::detect(&bars).periods_per_year());

        let stats = stats::compute(&equity, &trades, periods_per_year);

        info!(
            total_return_pct = stats.total_return_pct,
            sharpe = stats.sharpe_ratio,
            max_drawdown_pct = stats.max_drawdown_pct,
            trades = trades.len(),
            "backtest complete"
        );

        Ok(BacktestResult {
            initial_capital: self.config.initial_capital,
            periods_per_year,
            trades,
            equity,
            stats,
        })
    }

    /// Decide whether the open position exits on this bar and at what fill.
    ///
    /// Priority: stop-loss, then take-profit (pessimistic tie-break when
    /// both levels are touched intrabar), then the signal exit at the open.
    /// A bar that gaps past a stop level fills at its open, which is worse
    /// than the stop; otherwise the fill is the stop level itself.
    fn check_exit(
        &self,
        pos: &OpenPosition,
        bar: &Bar,
        exit_signal: bool,
    ) -> Option<(f64, ExitReason)> {
        if let Some(sl) = self.config.sl_pct {
            let level = pos.entry_price * (1.0 - sl);
            if bar.low <= level {
                let fill = if bar.open <= level { bar.open } else { level };
                return Some((fill, ExitReason::StopLoss));
            }
        }
        if let Some(tp) = self.config.tp_pct {
            let level = pos.entry_price * (1.0 + tp);
            if bar.high >= level {
                let fill = if bar.open >= level { bar.open } else { level };
                return Some((fill, ExitReason::TakeProfit));
            }
        }
        if exit_signal {
            return Some((bar.open, ExitReason::Signal));
        }
        None
    }

    fn close_position(
        &self,
        pos: &OpenPosition,
        fill: f64,
        bar: &Bar,
        reason: ExitReason,
        cash: &mut f64,
    ) -> Trade {
        let proceeds = pos.units * self.config.costs.sell_price(fill);
        *cash += proceeds;

        let pnl = proceeds - pos.entry_cost;
        Trade {
            entry_time: pos.entry_time,
            exit_time: bar.timestamp,
            entry_price: pos.entry_price,
            exit_price: fill,
            size: pos.units,
            pnl,
            return_pct: pnl / pos.entry_cost * 100.0,
            exit_reason: reason,
        }
    }
}

/// Restrict both inputs to their common timestamps, preserving order.
fn intersect(bars: &[Bar], signals: &SignalFrame) -> (Vec<Bar>, Vec<bool>, Vec<bool>) {
    let signal_timestamps = signals.timestamps();
    let mut out_bars = Vec::new();
    let mut out_entries = Vec::new();
    let mut out_exits = Vec::new();

    let mut j = 0;
    for bar in bars {
        while j < signal_timestamps.len() && signal_timestamps[j] < bar.timestamp {
            j += 1;
        }
        if j < signal_timestamps.len() && signal_timestamps[j] == bar.timestamp {
            out_bars.push(bar.clone());
            out_entries.push(signals.entries()[j]);
            out_exits.push(signals.exits()[j]);
            j += 1;
        }
    }

    (out_bars, out_entries, out_exits)
}
