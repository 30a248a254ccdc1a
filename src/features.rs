//! Feature and target construction for supervised strategies.
//!
//! The builder computes every feature on the *unshifted* price series and
//! then lags the whole table by exactly one bar as the final operation, so
//! `feature[t]` depends only on bars strictly before `t`. Shifting the
//! inputs first would double-lag the stateful smoothers (Wilder RSI, EMA
//! seeds) and is deliberately not done here.
//!
//! The target is a binary label: 1 when the forward return over the horizon
//! exceeds the threshold. The trailing `horizon` rows have no defined target
//! and are dropped during dataset assembly.

use crate::error::{BacktestError, Result};
use crate::indicators::{atr, bollinger_bands, macd, pct_change, rolling_std, rsi, sma};
use crate::types::BarSeries;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Configuration for the feature builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Periods for simple moving averages and their price ratios.
    pub sma_periods: Vec<usize>,
    /// RSI period (Wilder smoothing).
    pub rsi_period: usize,
    /// ATR period.
    pub atr_period: usize,
    /// Lookback periods for past-window returns.
    pub lookback_periods: Vec<usize>,
    /// MACD parameters (fast, slow, signal).
    pub macd_params: (usize, usize, usize),
    /// Bollinger Band period and standard-deviation multiplier.
    pub bb_params: (usize, f64),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sma_periods: vec![5, 10, 20, 50],
            rsi_period: 14,
            atr_period: 14,
            lookback_periods: vec![1, 5, 10, 20],
            macd_params: (12, 26, 9),
            bb_params: (20, 2.0),
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        if self.sma_periods.is_empty() {
            return Err(BacktestError::InvalidConfig {
                field: "sma_periods",
                value: 0.0,
                detail: "at least one SMA period is required",
            });
        }
        if self.lookback_periods.is_empty() {
            return Err(BacktestError::InvalidConfig {
                field: "lookback_periods",
                value: 0.0,
                detail: "at least one lookback period is required",
            });
        }
        for &p in self.sma_periods.iter().chain(self.lookback_periods.iter()) {
            if p == 0 {
                return Err(BacktestError::InvalidConfig {
                    field: "period",
                    value: 0.0,
                    detail: "periods must be >= 1",
                });
            }
        }
        if self.rsi_period == 0 || self.atr_period == 0 {
            return Err(BacktestError::InvalidConfig {
                field: "rsi_period/atr_period",
                value: 0.0,
                detail: "periods must be >= 1",
            });
        }
        let (fast, slow, signal) = self.macd_params;
        if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
            return Err(BacktestError::InvalidConfig {
                field: "macd_params",
                value: fast as f64,
                detail: "requires 1 <= fast < slow and signal >= 1",
            });
        }
        if self.bb_params.0 == 0 || self.bb_params.1 <= 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "bb_params",
                value: self.bb_params.1,
                detail: "requires period >= 1 and multiplier > 0",
            });
        }
        Ok(())
    }
}

/// A timestamp-indexed table of named real-valued feature columns.
///
/// Columns share one index; missing values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    timestamps: Vec<DateTime<Utc>>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl FeatureTable {
    fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.timestamps.len());
        self.names.push(name.into());
        self.columns.push(values);
    }

    /// Shift every column down by `k` bars, filling the first `k` with NaN.
    ///
    /// This is the single no-lookahead operation of the builder.
    fn lag(&mut self, k: usize) {
        for column in &mut self.columns {
            let n = column.len();
            if k >= n {
                column.fill(f64::NAN);
                continue;
            }
            for i in (k..n).rev() {
                column[i] = column[i - k];
            }
            for value in column.iter_mut().take(k) {
                *value = f64::NAN;
            }
        }
    }

    /// Replace infinities (from ratio features over degenerate bars) with NaN.
    fn sanitize_non_finite(&mut self) {
        for column in &mut self.columns {
            for value in column.iter_mut() {
                if !value.is_finite() {
                    *value = f64::NAN;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// One row of feature values in column order.
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[index]).collect()
    }

    pub fn row_has_nan(&self, index: usize) -> bool {
        self.columns.iter().any(|c| c[index].is_nan())
    }
}

/// Model-ready rows after dropping anything with a missing feature or target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub timestamps: Vec<DateTime<Utc>>,
    pub feature_names: Vec<String>,
    /// Row-major feature matrix aligned with `timestamps`.
    pub x: Vec<Vec<f64>>,
    /// Binary labels (0.0 or 1.0) aligned with `timestamps`.
    pub y: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Dense arrays for model fitting.
    pub fn to_arrays(&self) -> (Array2<f64>, Array1<f64>) {
        let rows = self.x.len();
        let cols = self.feature_names.len();
        let mut x = Array2::zeros((rows, cols));
        for (i, row) in self.x.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                x[[i, j]] = value;
            }
        }
        (x, Array1::from_vec(self.y.clone()))
    }
}

/// Builds the feature table and classification target from an OHLCV series.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: FeatureConfig::default(),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Bars consumed before the first fully-defined feature row, including
    /// the final one-bar lag.
    pub fn warmup_period(&self) -> usize {
        let max_sma = self.config.sma_periods.iter().max().copied().unwrap_or(1);
        let max_lookback = self
            .config
            .lookback_periods
            .iter()
            .max()
            .copied()
            .unwrap_or(1);
        let (_, slow, signal) = self.config.macd_params;

        [
            max_sma,
            max_lookback,
            slow + signal,
            self.config.rsi_period + 1,
            self.config.atr_period + 1,
            self.config.bb_params.0,
            21, // 20-bar return volatility needs one prior return
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
            + 1
    }

    /// Build the feature table: compute on natural-time prices, then lag the
    /// entire table by one bar.
    pub fn features(&self, prices: &BarSeries) -> Result<FeatureTable> {
        let close = prices.closes();
        let high = prices.highs();
        let low = prices.lows();
        let volume = prices.volumes();
        let n = close.len();

        let mut table = FeatureTable::new(prices.timestamps());

        // Past-window returns
        for &period in &self.config.lookback_periods {
            table.push(format!("return_{period}d"), pct_change(&close, period));
        }

        // Moving averages and relative distance from price
        for &period in &self.config.sma_periods {
            let ma = sma(&close, period);
            let close_to_ma: Vec<f64> = close
                .iter()
                .zip(ma.iter())
                .map(|(&c, &m)| c / m - 1.0)
                .collect();
            table.push(format!("sma_{period}"), ma);
            table.push(format!("close_to_sma_{period}"), close_to_ma);
        }

        // Fast/slow cross state and normalized spread
        if self.config.sma_periods.len() >= 2 {
            let fast = sma(&close, self.config.sma_periods[0]);
            let slow = sma(&close, *self.config.sma_periods.last().unwrap());
            let mut cross = vec![f64::NAN; n];
            let mut diff = vec![f64::NAN; n];
            for i in 0..n {
                if !fast[i].is_nan() && !slow[i].is_nan() {
                    cross[i] = if fast[i] > slow[i] { 1.0 } else { 0.0 };
                    diff[i] = (fast[i] - slow[i]) / slow[i];
                }
            }
            table.push("ma_cross", cross);
            table.push("ma_diff", diff);
        }

        // RSI and its binary regime flags
        let rsi_values = rsi(&close, self.config.rsi_period);
        let oversold: Vec<f64> = rsi_values
            .iter()
            .map(|&r| if r.is_nan() { f64::NAN } else { (r < 30.0) as i32 as f64 })
            .collect();
        let overbought: Vec<f64> = rsi_values
            .iter()
            .map(|&r| if r.is_nan() { f64::NAN } else { (r > 70.0) as i32 as f64 })
            .collect();
        table.push("rsi", rsi_values);
        table.push("rsi_oversold", oversold);
        table.push("rsi_overbought", overbought);

        // Volatility: ATR and return dispersion over two windows
        let atr_values = atr(&high, &low, &close, self.config.atr_period);
        let atr_pct: Vec<f64> = atr_values
            .iter()
            .zip(close.iter())
            .map(|(&a, &c)| a / c)
            .collect();
        table.push("atr", atr_values);
        table.push("atr_pct", atr_pct);

        let one_bar_returns = pct_change(&close, 1);
        for period in [5usize, 20] {
            table.push(
                format!("volatility_{period}d"),
                rolling_std(&one_bar_returns, period),
            );
        }

        // MACD
        let (fast, slow, signal) = self.config.macd_params;
        let (macd_line, signal_line, histogram) = macd(&close, fast, slow, signal);
        table.push("macd", macd_line);
        table.push("macd_signal", signal_line);
        table.push("macd_hist", histogram);

        // Bollinger position inside the band, and band width
        let (bb_period, bb_std) = self.config.bb_params;
        let (lower, _, upper) = bollinger_bands(&close, bb_period, bb_std);
        let mut bb_position = vec![f64::NAN; n];
        let mut bb_width = vec![f64::NAN; n];
        for i in 0..n {
            if !lower[i].is_nan() && !upper[i].is_nan() {
                let range = upper[i] - lower[i];
                bb_position[i] = (close[i] - lower[i]) / range;
                bb_width[i] = range / close[i];
            }
        }
        table.push("bb_position", bb_position);
        table.push("bb_width", bb_width);

        // Volume activity
        let volume_sma = sma(&volume, 20);
        let volume_ratio: Vec<f64> = volume
            .iter()
            .zip(volume_sma.iter())
            .map(|(&v, &m)| v / m)
            .collect();
        table.push("volume_sma_20", volume_sma);
        table.push("volume_ratio", volume_ratio);
        table.push("volume_change", pct_change(&volume, 1));

        // Intra-bar shape
        let high_low_range: Vec<f64> = (0..n).map(|i| (high[i] - low[i]) / close[i]).collect();
        let close_position: Vec<f64> = (0..n)
            .map(|i| (close[i] - low[i]) / (high[i] - low[i]))
            .collect();
        table.push("high_low_range", high_low_range);
        table.push("close_position", close_position);

        // Momentum over multiple horizons
        for period in [5usize, 10, 20] {
            table.push(format!("momentum_{period}d"), pct_change(&close, period));
        }

        // The no-lookahead step: lag everything by one bar, then clean up
        // the infinities ratio features produce on degenerate bars.
        table.lag(1);
        table.sanitize_non_finite();

        Ok(table)
    }

    /// Binary forward-return target. `target[t] = 1` when
    /// `close[t+horizon] / close[t] - 1 > threshold`; the trailing `horizon`
    /// rows are NaN.
    pub fn target(&self, prices: &BarSeries, horizon: usize, threshold: f64) -> Result<Vec<f64>> {
        if horizon == 0 {
            return Err(BacktestError::InvalidConfig {
                field: "horizon",
                value: 0.0,
                detail: "target horizon must be >= 1",
            });
        }

        let close = prices.closes();
        let n = close.len();
        let mut target = vec![f64::NAN; n];
        for t in 0..n.saturating_sub(horizon) {
            let future_return = close[t + horizon] / close[t] - 1.0;
            target[t] = (future_return > threshold) as i32 as f64;
        }
        Ok(target)
    }

    /// Assemble the aligned `(features, target)` dataset, dropping every row
    /// with a missing feature or label. A horizon at or beyond the series
    /// length yields an empty dataset, not an error.
    pub fn dataset(&self, prices: &BarSeries, horizon: usize, threshold: f64) -> Result<Dataset> {
        let table = self.features(prices)?;
        let target = self.target(prices, horizon, threshold)?;

        let mut timestamps = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..table.len() {
            if table.row_has_nan(i) || target[i].is_nan() {
                continue;
            }
            timestamps.push(table.timestamps()[i]);
            x.push(table.row(i));
            y.push(target[i]);
        }

        Ok(Dataset {
            timestamps,
            feature_names: table.names().to_vec(),
            x,
            y,
        })
    }
}
