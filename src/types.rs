//! Core data types for the signal-to-equity pipeline.

use crate::error::{BacktestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// OHLCV bar representing a single time period of market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate that bar data is internally consistent.
    pub fn validate(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    /// Bar range (high minus low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Check if the bar closed above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// A validated, immutable OHLCV series with a strictly increasing index.
///
/// Construction rejects empty input, duplicate or out-of-order timestamps,
/// and bars violating the OHLC invariants. Every downstream component
/// (features, signals, engine) consumes this type, so the index contract is
/// checked exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series from raw bars, enforcing the index and OHLC contracts.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(BacktestError::EmptyInput {
                component: "BarSeries",
            });
        }

        for (i, bar) in bars.iter().enumerate() {
            if !bar.validate() {
                return Err(BacktestError::InvalidBar {
                    position: i,
                    detail: format!(
                        "OHLC invariant violated: open={} high={} low={} close={} volume={}",
                        bar.open, bar.high, bar.low, bar.close, bar.volume
                    ),
                });
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(BacktestError::NonMonotonicIndex {
                    position: i,
                    timestamp: bar.timestamp,
                });
            }
        }

        Ok(Self { bars })
    }

    /// Internal constructor for slices of an already-validated series.
    pub(crate) fn from_validated(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// A sub-series over `[start, end)`. The slice of a valid series is valid.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self::from_validated(self.bars[start..end].to_vec())
    }

    /// Infer the bar interval from the timestamp index.
    pub fn interval(&self) -> BarInterval {
        BarInterval::detect(&self.bars)
    }
}

/// Bar sampling interval, used to annualize metrics.
///
/// Misinference silently corrupts the Sharpe ratio, so the engine accepts an
/// explicit periods-per-year override alongside this detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BarInterval {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    #[default]
    Day,
    Week,
    Month,
    /// Sampling interval could not be matched to a known bucket.
    Unknown,
}

impl BarInterval {
    /// Detect the interval from the median gap between consecutive bars.
    ///
    /// The median is robust to occasional gaps (weekends, holidays) in an
    /// otherwise uniform index. Fewer than two bars detect as `Unknown`.
    pub fn detect(bars: &[Bar]) -> Self {
        if bars.len() < 2 {
            return BarInterval::Unknown;
        }

        let mut gaps: Vec<i64> = bars
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
            .filter(|&g| g > 0)
            .collect();

        if gaps.is_empty() {
            return BarInterval::Unknown;
        }

        gaps.sort_unstable();
        Self::from_seconds(gaps[gaps.len() / 2])
    }

    /// Match a gap in seconds to the closest standard interval.
    fn from_seconds(seconds: i64) -> Self {
        if seconds <= 150 {
            BarInterval::Minute1
        } else if seconds <= 450 {
            BarInterval::Minute5
        } else if seconds <= 1350 {
            BarInterval::Minute15
        } else if seconds <= 2700 {
            BarInterval::Minute30
        } else if seconds <= 43_200 {
            BarInterval::Hour1
        } else if seconds <= 432_000 {
            BarInterval::Day
        } else if seconds <= 1_209_600 {
            BarInterval::Week
        } else if seconds <= 5_184_000 {
            BarInterval::Month
        } else {
            BarInterval::Unknown
        }
    }

    /// Trading periods per year for this interval.
    ///
    /// Intraday intervals assume 252 trading days of 6.5 hours. `Unknown`
    /// falls back to 1.0 so un-annualized metrics stay recognizable rather
    /// than silently wrong.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            BarInterval::Minute1 => 252.0 * 6.5 * 60.0,
            BarInterval::Minute5 => 252.0 * 6.5 * 12.0,
            BarInterval::Minute15 => 252.0 * 6.5 * 4.0,
            BarInterval::Minute30 => 252.0 * 6.5 * 2.0,
            BarInterval::Hour1 => 252.0 * 6.5,
            BarInterval::Day => 252.0,
            BarInterval::Week => 52.0,
            BarInterval::Month => 12.0,
            BarInterval::Unknown => 1.0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BarInterval::Minute1 => "1-minute",
            BarInterval::Minute5 => "5-minute",
            BarInterval::Minute15 => "15-minute",
            BarInterval::Minute30 => "30-minute",
            BarInterval::Hour1 => "hourly",
            BarInterval::Day => "daily",
            BarInterval::Week => "weekly",
            BarInterval::Month => "monthly",
            BarInterval::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Aligned boolean entry/exit columns produced by a signal generator.
///
/// Invariant: `entries[i] && exits[i]` is never true. Conflicts are resolved
/// at construction by giving entries precedence (the exit flag is cleared).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    timestamps: Vec<DateTime<Utc>>,
    entries: Vec<bool>,
    exits: Vec<bool>,
}

impl SignalFrame {
    /// Build a frame, resolving same-bar entry/exit conflicts in favor of
    /// the entry.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        entries: Vec<bool>,
        mut exits: Vec<bool>,
    ) -> Result<Self> {
        if entries.len() != timestamps.len() || exits.len() != timestamps.len() {
            return Err(BacktestError::LengthMismatch {
                prices: timestamps.len(),
                signals: entries.len().max(exits.len()),
            });
        }

        let mut conflicts = 0usize;
        for i in 0..timestamps.len() {
            if entries[i] && exits[i] {
                exits[i] = false;
                conflicts += 1;
            }
        }
        if conflicts > 0 {
            debug!(conflicts, "resolved entry/exit conflicts in favor of entries");
        }

        Ok(Self {
            timestamps,
            entries,
            exits,
        })
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

    pub fn entries(&self) -> &[bool] {
        &self.entries
    }

    pub fn exits(&self) -> &[bool] {
        &self.exits
    }

    pub fn num_entries(&self) -> usize {
        self.entries.iter().filter(|&&e| e).count()
    }

    pub fn num_exits(&self) -> usize {
        self.exits.iter().filter(|&&e| e).count()
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The strategy's exit signal fired.
    Signal,
    /// The stop-loss level was touched intrabar.
    StopLoss,
    /// The take-profit level was touched intrabar.
    TakeProfit,
    /// The series ended while the position was open.
    EndOfData,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A completed round-trip trade.
///
/// Prices are the raw fill levels; commission and slippage are reflected in
/// `pnl` and `return_pct` through the cash legs, so the execution-timing
/// contract (`entry_price == open[t+1]`) stays directly observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Position size in units of the instrument.
    pub size: f64,
    /// Net profit and loss in account currency, after costs.
    pub pnl: f64,
    /// Net return on the capital committed to the trade, in percent.
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

/// Portfolio snapshot at one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Cash plus marked-to-market position value.
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
    }

    fn bar(i: i64, close: f64) -> Bar {
        Bar::new(ts(i), close, close + 1.0, close - 1.0, close, 1000.0)
    }

    #[test]
    fn test_bar_validation() {
        let valid = Bar::new(ts(0), 100.0, 105.0, 98.0, 102.0, 1000.0);
        assert!(valid.validate());

        // High below low
        let invalid = Bar::new(ts(0), 100.0, 95.0, 98.0, 102.0, 1000.0);
        assert!(!invalid.validate());

        // Negative volume
        let invalid2 = Bar::new(ts(0), 100.0, 105.0, 98.0, 102.0, -1.0);
        assert!(!invalid2.validate());
    }

    #[test]
    fn test_series_rejects_empty() {
        let result = BarSeries::new(vec![]);
        assert!(matches!(result, Err(BacktestError::EmptyInput { .. })));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamps() {
        let bars = vec![bar(0, 100.0), bar(0, 101.0)];
        let result = BarSeries::new(bars);
        assert!(matches!(
            result,
            Err(BacktestError::NonMonotonicIndex { position: 1, .. })
        ));
    }

    #[test]
    fn test_series_rejects_out_of_order() {
        let bars = vec![bar(5, 100.0), bar(3, 101.0)];
        assert!(BarSeries::new(bars).is_err());
    }

    #[test]
    fn test_series_rejects_bad_ohlc() {
        let mut b = bar(0, 100.0);
        b.low = 200.0;
        let result = BarSeries::new(vec![b]);
        assert!(matches!(
            result,
            Err(BacktestError::InvalidBar { position: 0, .. })
        ));
    }

    #[test]
    fn test_series_slice() {
        let series = BarSeries::new((0..10).map(|i| bar(i, 100.0 + i as f64)).collect()).unwrap();
        let sub = series.slice(2, 6);
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.first().timestamp, ts(2));
        assert_eq!(sub.last().timestamp, ts(5));
    }

    #[test]
    fn test_interval_detection_daily() {
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, 100.0)).collect();
        assert_eq!(BarInterval::detect(&bars), BarInterval::Day);
    }

    #[test]
    fn test_interval_detection_hourly() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..120)
            .map(|i| {
                Bar::new(
                    base + Duration::hours(i),
                    100.0,
                    101.0,
                    99.0,
                    100.0,
                    1000.0,
                )
            })
            .collect();
        assert_eq!(BarInterval::detect(&bars), BarInterval::Hour1);
        assert!((BarInterval::Hour1.periods_per_year() - 252.0 * 6.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_interval_detection_survives_weekend_gaps() {
        // Business days only: a few 3-day gaps must not tip the median
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut bars = Vec::new();
        let mut day = 0;
        for _ in 0..30 {
            bars.push(Bar::new(
                base + Duration::days(day),
                100.0,
                101.0,
                99.0,
                100.0,
                1000.0,
            ));
            day += if day % 7 == 4 { 3 } else { 1 };
        }
        assert_eq!(BarInterval::detect(&bars), BarInterval::Day);
    }

    #[test]
    fn test_periods_per_year_mapping() {
        assert!((BarInterval::Day.periods_per_year() - 252.0).abs() < f64::EPSILON);
        assert!((BarInterval::Minute15.periods_per_year() - 6552.0).abs() < f64::EPSILON);
        assert!((BarInterval::Week.periods_per_year() - 52.0).abs() < f64::EPSILON);
        assert!((BarInterval::Month.periods_per_year() - 12.0).abs() < f64::EPSILON);
        assert!((BarInterval::Unknown.periods_per_year() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_signal_frame_conflict_resolution() {
        let timestamps: Vec<_> = (0..3).map(ts).collect();
        let entries = vec![false, true, false];
        let exits = vec![false, true, true];

        let frame = SignalFrame::new(timestamps, entries, exits).unwrap();
        // Conflict at index 1 resolved in favor of the entry
        assert!(frame.entries()[1]);
        assert!(!frame.exits()[1]);
        assert!(frame.exits()[2]);
    }

    #[test]
    fn test_signal_frame_length_mismatch() {
        let timestamps: Vec<_> = (0..3).map(ts).collect();
        let result = SignalFrame::new(timestamps, vec![false; 2], vec![false; 3]);
        assert!(matches!(result, Err(BacktestError::LengthMismatch { .. })));
    }

    #[test]
    fn test_exit_reason_labels() {
        assert_eq!(ExitReason::Signal.label(), "signal");
        assert_eq!(ExitReason::StopLoss.label(), "stop_loss");
        assert_eq!(ExitReason::TakeProfit.label(), "take_profit");
        assert_eq!(ExitReason::EndOfData.label(), "end_of_data");
        assert_eq!(format!("{}", ExitReason::StopLoss), "stop_loss");
    }
}
