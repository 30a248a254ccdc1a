//! Technical indicators as pure series functions.
//!
//! Every function maps an input series to an output of identical length,
//! with `f64::NAN` at the leading positions before enough history exists.
//! The value at position `i` depends only on inputs `[0..=i]` — no
//! centering, no fill from the future. Consumers must tolerate the NaN
//! warmup prefix.

/// Simple moving average over a rolling window.
///
/// First defined value at index `period - 1`. A NaN anywhere in the window
/// makes the output NaN for that position.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "SMA period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }

    result
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// values and smoothed with the standard `2 / (period + 1)` multiplier.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "EMA period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period {
        return result;
    }

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_val = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = ema_val;

    for i in period..n {
        if values[i].is_nan() {
            // Once the stream breaks, later values have no defined smoothing
            return result;
        }
        ema_val = (values[i] - ema_val) * multiplier + ema_val;
        result[i] = ema_val;
    }

    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// Seeded on the mean gain/loss over the first `period` changes; first
/// defined value at index `period`. Both averages zero → 50 (no movement);
/// zero losses → 100; zero gains → 0.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "RSI period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change.is_nan() {
            return result;
        }
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let change = values[i] - values[i - 1];
        if change.is_nan() {
            return result;
        }
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = rsi_value(avg_gain, avg_loss);
    }

    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Average True Range: rolling mean of the true range.
///
/// True range at `i` uses the previous close, so the first defined output
/// lands at index `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "ATR period must be >= 1");
    assert_eq!(high.len(), low.len());
    assert_eq!(high.len(), close.len());

    let n = close.len();
    let mut result = vec![f64::NAN; n];
    if n < period + 1 {
        return result;
    }

    let mut true_ranges = vec![f64::NAN; n];
    for i in 1..n {
        let hl = high[i] - low[i];
        let hc = (high[i] - close[i - 1]).abs();
        let lc = (low[i] - close[i - 1]).abs();
        true_ranges[i] = hl.max(hc).max(lc);
    }

    for i in period..n {
        let window = &true_ranges[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }

    result
}

/// MACD line, signal line, and histogram.
///
/// The MACD line is `ema(fast) - ema(slow)`; the signal line is an EMA of
/// the MACD line seeded where it first becomes defined.
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = values.len();
    let fast = ema(values, fast_period);
    let slow = ema(values, slow_period);

    let mut macd_line = vec![f64::NAN; n];
    for i in 0..n {
        if !fast[i].is_nan() && !slow[i].is_nan() {
            macd_line[i] = fast[i] - slow[i];
        }
    }

    // Signal line: EMA over the defined tail of the MACD line
    let mut signal_line = vec![f64::NAN; n];
    if let Some(start) = macd_line.iter().position(|v| !v.is_nan()) {
        let tail_signal = ema(&macd_line[start..], signal_period);
        for (offset, value) in tail_signal.into_iter().enumerate() {
            signal_line[start + offset] = value;
        }
    }

    let mut histogram = vec![f64::NAN; n];
    for i in 0..n {
        if !macd_line[i].is_nan() && !signal_line[i].is_nan() {
            histogram[i] = macd_line[i] - signal_line[i];
        }
    }

    (macd_line, signal_line, histogram)
}

/// Bollinger Bands. Returns `(lower, middle, upper)` where the middle band
/// is the SMA and the outer bands sit `num_std` population standard
/// deviations away.
pub fn bollinger_bands(
    values: &[f64],
    period: usize,
    num_std: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(values, period);
    let std = rolling_std(values, period);

    let n = values.len();
    let mut lower = vec![f64::NAN; n];
    let mut upper = vec![f64::NAN; n];
    for i in 0..n {
        if !middle[i].is_nan() && !std[i].is_nan() {
            lower[i] = middle[i] - num_std * std[i];
            upper[i] = middle[i] + num_std * std[i];
        }
    }

    (lower, middle, upper)
}

/// Rolling population standard deviation.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "rolling_std period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        result[i] = variance.sqrt();
    }

    result
}

/// Percentage change over `period` positions: `x[i] / x[i-period] - 1`.
pub fn pct_change(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "pct_change period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    for i in period..n {
        let prev = values[i - period];
        let curr = values[i];
        if prev.is_nan() || curr.is_nan() || prev == 0.0 {
            continue;
        }
        result[i] = curr / prev - 1.0;
    }

    result
}
