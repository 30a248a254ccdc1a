//! Signal generators: price series in, aligned entry/exit frame out.
//!
//! Two variants behind one small trait: a rule-based moving-average cross
//! and a model-based generator that thresholds classifier probabilities
//! with hysteresis. Generators are pure — the same prices always produce
//! the same frame — and live signals reuse the exact same code path.

use crate::error::{BacktestError, Result};
use crate::features::FeatureBuilder;
use crate::indicators::{ema, sma};
use crate::model::Classifier;
use crate::types::{BarSeries, SignalFrame};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Capability shared by every signal generator.
pub trait SignalGenerator: Send + Sync {
    /// Identifier used in logs and reports.
    fn name(&self) -> String;

    /// Parameters as key/value pairs, for reproducibility records.
    fn params(&self) -> Vec<(String, String)>;

    /// Produce an entry/exit frame aligned to the input index.
    fn generate_signals(&self, prices: &BarSeries) -> Result<SignalFrame>;
}

/// Moving-average flavor for the crossover generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    #[default]
    Simple,
    Exponential,
}

impl fmt::Display for MaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaType::Simple => write!(f, "sma"),
            MaType::Exponential => write!(f, "ema"),
        }
    }
}

/// Rule-based moving-average crossover.
///
/// Entry at the bar where the fast MA crosses strictly above the slow MA
/// (previous bar had `fast <= slow`); symmetric exit on the downward cross.
/// Bars where either MA is still undefined produce no signals; a cross out
/// of the undefined region counts as a cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCrossover {
    fast_period: usize,
    slow_period: usize,
    ma_type: MaType,
}

impl MaCrossover {
    pub fn new(fast_period: usize, slow_period: usize, ma_type: MaType) -> Result<Self> {
        if fast_period < 1 {
            return Err(BacktestError::InvalidConfig {
                field: "fast_period",
                value: fast_period as f64,
                detail: "must be >= 1",
            });
        }
        if fast_period >= slow_period {
            return Err(BacktestError::InvalidConfig {
                field: "fast_period",
                value: fast_period as f64,
                detail: "must be strictly less than slow_period",
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            ma_type,
        })
    }

    fn moving_average(&self, values: &[f64], period: usize) -> Vec<f64> {
        match self.ma_type {
            MaType::Simple => sma(values, period),
            MaType::Exponential => ema(values, period),
        }
    }
}

impl SignalGenerator for MaCrossover {
    fn name(&self) -> String {
        format!(
            "ma_cross_{}_{}_{}",
            self.ma_type, self.fast_period, self.slow_period
        )
    }

    fn params(&self) -> Vec<(String, String)> {
        vec![
            ("fast_period".to_string(), self.fast_period.to_string()),
            ("slow_period".to_string(), self.slow_period.to_string()),
            ("ma_type".to_string(), self.ma_type.to_string()),
        ]
    }

    fn generate_signals(&self, prices: &BarSeries) -> Result<SignalFrame> {
        let closes = prices.closes();
        let fast = self.moving_average(&closes, self.fast_period);
        let slow = self.moving_average(&closes, self.slow_period);

        let n = closes.len();
        let mut above = vec![false; n];
        let mut below = vec![false; n];
        for i in 0..n {
            if !fast[i].is_nan() && !slow[i].is_nan() {
                above[i] = fast[i] > slow[i];
                below[i] = fast[i] < slow[i];
            }
        }

        let mut entries = vec![false; n];
        let mut exits = vec![false; n];
        for i in 1..n {
            entries[i] = above[i] && !above[i - 1];
            exits[i] = below[i] && !below[i - 1];
        }

        debug!(
            generator = %self.name(),
            entries = entries.iter().filter(|&&e| e).count(),
            exits = exits.iter().filter(|&&e| e).count(),
            "generated crossover signals"
        );

        SignalFrame::new(prices.timestamps(), entries, exits)
    }
}

/// Model-based signal generator: classifier probabilities thresholded with
/// hysteresis.
///
/// Owns a trained classifier and the feature builder that produced its
/// training rows. `exit_threshold < entry_threshold` is enforced at
/// construction so the probability band between the two damps chatter near
/// a single boundary. Bars with any missing feature emit no signal.
#[derive(Debug, Clone)]
pub struct MlSignal {
    classifier: Classifier,
    builder: FeatureBuilder,
    entry_threshold: f64,
    exit_threshold: f64,
}

impl MlSignal {
    pub fn new(
        classifier: Classifier,
        builder: FeatureBuilder,
        entry_threshold: f64,
        exit_threshold: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&entry_threshold) {
            return Err(BacktestError::InvalidConfig {
                field: "entry_threshold",
                value: entry_threshold,
                detail: "must be within [0, 1]",
            });
        }
        if exit_threshold >= entry_threshold {
            return Err(BacktestError::InvalidConfig {
                field: "exit_threshold",
                value: exit_threshold,
                detail: "must be strictly below entry_threshold (hysteresis)",
            });
        }
        if exit_threshold < 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "exit_threshold",
                value: exit_threshold,
                detail: "must be within [0, 1]",
            });
        }
        Ok(Self {
            classifier,
            builder,
            entry_threshold,
            exit_threshold,
        })
    }

    /// Threshold a probability series into an entry/exit frame.
    ///
    /// NaN probabilities (bars with missing features) emit no signal. Both
    /// flags can never fire on the same bar because the thresholds do not
    /// overlap.
    pub fn frame_from_probabilities(
        &self,
        timestamps: Vec<DateTime<Utc>>,
        probabilities: &[f64],
    ) -> Result<SignalFrame> {
        let entries: Vec<bool> = probabilities
            .iter()
            .map(|&p| !p.is_nan() && p > self.entry_threshold)
            .collect();
        let exits: Vec<bool> = probabilities
            .iter()
            .map(|&p| !p.is_nan() && p < self.exit_threshold)
            .collect();
        SignalFrame::new(timestamps, entries, exits)
    }
}

impl SignalGenerator for MlSignal {
    fn name(&self) -> String {
        format!(
            "ml_signal_{:.2}_{:.2}",
            self.entry_threshold, self.exit_threshold
        )
    }

    fn params(&self) -> Vec<(String, String)> {
        vec![
            (
                "entry_threshold".to_string(),
                format!("{:.4}", self.entry_threshold),
            ),
            (
                "exit_threshold".to_string(),
                format!("{:.4}", self.exit_threshold),
            ),
        ]
    }

    fn generate_signals(&self, prices: &BarSeries) -> Result<SignalFrame> {
        if !self.classifier.is_trained() {
            return Err(BacktestError::ModelNotFitted);
        }

        let table = self.builder.features(prices)?;
        if self.classifier.feature_names() != table.names() {
            return Err(BacktestError::StrategyError(format!(
                "feature layout mismatch: classifier trained on {} columns, builder produced {}",
                self.classifier.feature_names().len(),
                table.names().len()
            )));
        }

        // Predict only the fully-defined rows, then scatter back into an
        // aligned probability series with NaN gaps.
        let valid_rows: Vec<usize> = (0..table.len())
            .filter(|&i| !table.row_has_nan(i))
            .collect();
        let mut probabilities = vec![f64::NAN; table.len()];

        if !valid_rows.is_empty() {
            let n_features = table.names().len();
            let mut matrix = Array2::zeros((valid_rows.len(), n_features));
            for (row_idx, &i) in valid_rows.iter().enumerate() {
                for (col_idx, value) in table.row(i).into_iter().enumerate() {
                    matrix[[row_idx, col_idx]] = value;
                }
            }
            let proba = self.classifier.predict_proba(&matrix)?;
            for (&i, p) in valid_rows.iter().zip(proba.into_iter()) {
                probabilities[i] = p;
            }
        }

        self.frame_from_probabilities(prices.timestamps(), &probabilities)
    }
}
