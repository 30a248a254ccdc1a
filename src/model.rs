//! Classifier training for model-based signal generation.
//!
//! A trained model is an immutable artefact: the offline `train` step fits
//! the scaler and logistic regression once, and the signal generator owns
//! the result for its lifetime. Splits are always chronological — never
//! shuffled — and the scaler is fitted on the training slice only, so no
//! statistic of the evaluation window leaks into the fit.

use crate::error::{BacktestError, Result};
use crate::features::Dataset;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-feature standardization (zero mean, unit variance).
///
/// Constant columns keep a unit divisor so they map to zero instead of NaN.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let mut std = x.std_axis(Axis(0), 0.0);
        std.mapv_inplace(|s| if s > 0.0 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            row -= &self.mean;
            row /= &self.std;
        }
        out
    }
}

/// Binary logistic regression fitted by batch gradient descent with
/// optional L2 shrinkage.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    l2: f64,
    coefficients: Option<Array1<f64>>,
    intercept: Option<f64>,
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, max_iter: usize, tolerance: f64, l2: f64) -> Self {
        Self {
            learning_rate,
            max_iter,
            tolerance,
            l2,
            coefficients: None,
            intercept: None,
        }
    }

    /// Numerically stable sigmoid.
    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn log_loss(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let n = y_true.len() as f64;
        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(eps, 1.0 - eps);
                y * p.ln() + (1.0 - y) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / n
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(BacktestError::TrainingError(format!(
                "feature matrix has {} rows but target has {}",
                x.nrows(),
                y.len()
            )));
        }

        let n_samples = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut prev_cost = f64::INFINITY;

        for iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = linear.mapv(Self::sigmoid);

            let errors = &predictions - y;
            let mut dw = x.t().dot(&errors) / n_samples;
            if self.l2 > 0.0 {
                dw = &dw + &(&weights * self.l2);
            }
            let db = errors.sum() / n_samples;

            weights = &weights - &(&dw * self.learning_rate);
            bias -= self.learning_rate * db;

            let cost = Self::log_loss(y, &predictions);
            if (prev_cost - cost).abs() < self.tolerance {
                debug!(iteration = iter, cost, "gradient descent converged");
                break;
            }
            prev_cost = cost;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    /// Positive-class probability for each row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let weights = self
            .coefficients
            .as_ref()
            .ok_or(BacktestError::ModelNotFitted)?;
        let bias = self.intercept.ok_or(BacktestError::ModelNotFitted)?;
        let linear = x.dot(weights) + bias;
        Ok(linear.mapv(Self::sigmoid))
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Configuration for classifier training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// L2 shrinkage strength; 0 disables regularization.
    pub l2: f64,
    /// Standardize features before fitting.
    pub scale_features: bool,
    /// Fraction of rows held out chronologically for evaluation.
    pub test_fraction: f64,
    /// Rolling-origin cross-validation folds (0 or 1 disables CV).
    pub cv_folds: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 500,
            tolerance: 1e-7,
            l2: 0.01,
            scale_features: true,
            test_fraction: 0.2,
            cv_folds: 5,
        }
    }
}

impl ClassifierConfig {
    fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "learning_rate",
                value: self.learning_rate,
                detail: "must be > 0",
            });
        }
        if self.test_fraction <= 0.0 || self.test_fraction >= 1.0 {
            return Err(BacktestError::InvalidConfig {
                field: "test_fraction",
                value: self.test_fraction,
                detail: "must be in (0, 1)",
            });
        }
        if self.l2 < 0.0 {
            return Err(BacktestError::InvalidConfig {
                field: "l2",
                value: self.l2,
                detail: "must be >= 0",
            });
        }
        Ok(())
    }
}

/// Evaluation metrics from the chronological holdout split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Accuracy per rolling-origin CV fold, oldest fold first.
    pub cv_accuracy: Vec<f64>,
    pub n_train: usize,
    pub n_test: usize,
}

/// A trained classifier plus the preprocessing it was fitted with.
///
/// Owned by the model-based signal generator; training happens once,
/// offline, and the artefact is never refitted on the fly.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    scaler: Option<StandardScaler>,
    model: LogisticRegression,
    feature_names: Vec<String>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let model = LogisticRegression::new(
            config.learning_rate,
            config.max_iter,
            config.tolerance,
            config.l2,
        );
        Ok(Self {
            config,
            scaler: None,
            model,
            feature_names: Vec::new(),
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(ClassifierConfig::default()).expect("default config is valid")
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_fitted()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Fit on a dataset and report holdout metrics.
    ///
    /// The split is chronological (training rows strictly precede test
    /// rows) and the scaler is fitted on the training slice only.
    pub fn train(&mut self, dataset: &Dataset) -> Result<TrainReport> {
        const MIN_ROWS: usize = 20;
        if dataset.len() < MIN_ROWS {
            return Err(BacktestError::InsufficientData {
                component: "Classifier::train",
                needed: MIN_ROWS,
                got: dataset.len(),
            });
        }

        self.feature_names = dataset.feature_names.clone();
        let (x, y) = dataset.to_arrays();

        let n = x.nrows();
        let n_test = ((n as f64) * self.config.test_fraction) as usize;
        let n_train = n - n_test.max(1);

        let x_train = x.slice(ndarray::s![..n_train, ..]).to_owned();
        let y_train = y.slice(ndarray::s![..n_train]).to_owned();
        let x_test = x.slice(ndarray::s![n_train.., ..]).to_owned();
        let y_test = y.slice(ndarray::s![n_train..]).to_owned();

        let (x_train_scaled, x_test_scaled) = if self.config.scale_features {
            let scaler = StandardScaler::fit(&x_train);
            let scaled = (scaler.transform(&x_train), scaler.transform(&x_test));
            self.scaler = Some(scaler);
            scaled
        } else {
            (x_train.clone(), x_test.clone())
        };

        self.model.fit(&x_train_scaled, &y_train)?;

        let proba = self.model.predict_proba(&x_test_scaled)?;
        let (accuracy, precision, recall, f1) = classification_metrics(&y_test, &proba, 0.5);

        // Rolling-origin CV on the training slice, scaler refit per fold
        let mut cv_accuracy = Vec::new();
        if self.config.cv_folds > 1 && n_train >= self.config.cv_folds * 10 {
            for (train_end, test_end) in rolling_origin_splits(n_train, self.config.cv_folds) {
                let fold_x_train = x_train.slice(ndarray::s![..train_end, ..]).to_owned();
                let fold_y_train = y_train.slice(ndarray::s![..train_end]).to_owned();
                let fold_x_test = x_train.slice(ndarray::s![train_end..test_end, ..]).to_owned();
                let fold_y_test = y_train.slice(ndarray::s![train_end..test_end]).to_owned();

                let (fold_train, fold_test) = if self.config.scale_features {
                    let scaler = StandardScaler::fit(&fold_x_train);
                    (scaler.transform(&fold_x_train), scaler.transform(&fold_x_test))
                } else {
                    (fold_x_train, fold_x_test)
                };

                let mut fold_model = LogisticRegression::new(
                    self.config.learning_rate,
                    self.config.max_iter,
                    self.config.tolerance,
                    self.config.l2,
                );
                fold_model.fit(&fold_train, &fold_y_train)?;
                let fold_proba = fold_model.predict_proba(&fold_test)?;
                let (fold_accuracy, _, _, _) =
                    classification_metrics(&fold_y_test, &fold_proba, 0.5);
                cv_accuracy.push(fold_accuracy);
            }
        }

        Ok(TrainReport {
            accuracy,
            precision,
            recall,
            f1,
            cv_accuracy,
            n_train,
            n_test: n - n_train,
        })
    }

    /// Positive-class probability per row, applying the fitted scaler.
    ///
    /// Errors with `ModelNotFitted` before the first `train` call.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if !self.is_trained() {
            return Err(BacktestError::ModelNotFitted);
        }
        let scaled = match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => x.clone(),
        };
        Ok(self.model.predict_proba(&scaled)?.to_vec())
    }
}

/// Expanding-window splits `(train_end, test_end)` over `n` rows.
///
/// Each fold trains on everything before `train_end` and evaluates on the
/// following chunk; no fold ever sees data after its test window.
pub fn rolling_origin_splits(n: usize, folds: usize) -> Vec<(usize, usize)> {
    let min_train = n / (folds + 1);
    let fold_size = (n - min_train) / folds;
    (0..folds)
        .map(|i| {
            let train_end = min_train + i * fold_size;
            let test_end = (train_end + fold_size).min(n);
            (train_end, test_end)
        })
        .filter(|&(train_end, test_end)| train_end > 0 && test_end > train_end)
        .collect()
}

fn classification_metrics(
    y_true: &Array1<f64>,
    proba: &Array1<f64>,
    threshold: f64,
) -> (f64, f64, f64, f64) {
    let n = y_true.len();
    if n == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;
    for (&truth, &p) in y_true.iter().zip(proba.iter()) {
        let predicted = p >= threshold;
        let actual = truth >= 0.5;
        match (predicted, actual) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let accuracy = (tp + tn) as f64 / n as f64;
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    (accuracy, precision, recall, f1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn separable_dataset(n: usize) -> Dataset {
        // Feature 0 cleanly separates the classes
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut timestamps = Vec::new();
        for i in 0..n {
            let positive = i % 2 == 0;
            let value = if positive { 2.0 } else { -2.0 };
            let jitter = (i as f64 * 0.37).sin() * 0.2;
            x.push(vec![value + jitter, jitter]);
            y.push(if positive { 1.0 } else { 0.0 });
            timestamps.push(base + Duration::days(i as i64));
        }
        Dataset {
            timestamps,
            feature_names: vec!["f0".to_string(), "f1".to_string()],
            x,
            y,
        }
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!((LogisticRegression::sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(LogisticRegression::sigmoid(50.0) > 0.999);
        assert!(LogisticRegression::sigmoid(-50.0) < 0.001);
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);

        let mean: f64 = scaled.column(0).sum() / 4.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_scaler_constant_column_maps_to_zero() {
        let x = Array2::from_shape_vec((3, 1), vec![7.0, 7.0, 7.0]).unwrap();
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);
        for &v in scaled.iter() {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn test_predict_before_fit_errors() {
        let model = LogisticRegression::new(0.1, 100, 1e-6, 0.0);
        let x = Array2::zeros((2, 2));
        assert!(matches!(
            model.predict_proba(&x),
            Err(BacktestError::ModelNotFitted)
        ));

        let classifier = Classifier::with_defaults();
        assert!(matches!(
            classifier.predict_proba(&x),
            Err(BacktestError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_classifier_learns_separable_data() {
        let dataset = separable_dataset(200);
        let mut classifier = Classifier::with_defaults();
        let report = classifier.train(&dataset).unwrap();

        assert!(report.accuracy > 0.9, "accuracy was {}", report.accuracy);
        assert!(classifier.is_trained());
        assert_eq!(classifier.feature_names(), ["f0", "f1"]);

        // High-feature rows score high probability, low rows score low
        let probe = Array2::from_shape_vec((2, 2), vec![2.0, 0.0, -2.0, 0.0]).unwrap();
        let proba = classifier.predict_proba(&probe).unwrap();
        assert!(proba[0] > 0.7);
        assert!(proba[1] < 0.3);
    }

    #[test]
    fn test_classifier_rejects_tiny_dataset() {
        let dataset = separable_dataset(10);
        let mut classifier = Classifier::with_defaults();
        assert!(matches!(
            classifier.train(&dataset),
            Err(BacktestError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_rolling_origin_splits_are_ordered() {
        let splits = rolling_origin_splits(100, 5);
        assert!(!splits.is_empty());
        for (train_end, test_end) in &splits {
            assert!(train_end < test_end);
        }
        // Training windows expand
        for pair in splits.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_cv_accuracy_populated_for_large_dataset() {
        let dataset = separable_dataset(300);
        let mut classifier = Classifier::with_defaults();
        let report = classifier.train(&dataset).unwrap();
        assert!(!report.cv_accuracy.is_empty());
        for &a in &report.cv_accuracy {
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClassifierConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(Classifier::new(config).is_err());

        let config = ClassifierConfig {
            test_fraction: 1.5,
            ..Default::default()
        };
        assert!(Classifier::new(config).is_err());
    }
}
