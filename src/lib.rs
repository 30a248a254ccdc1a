//! Kestrel - a research core for systematic trading strategies.
//!
//! # Overview
//!
//! Kestrel is the signal-to-equity pipeline of a strategy research
//! platform: it turns historical OHLCV bars into features and signals,
//! simulates execution against those signals with realistic frictions, and
//! evaluates the resulting equity path.
//!
//! - **No lookahead**: features are computed on natural-time prices and
//!   lagged one bar as the final step; the engine fills signals at the
//!   *next* bar's open
//! - **Realistic simulation**: commission and slippage on both sides,
//!   intrabar stop-loss/take-profit with a pessimistic same-bar tie-break
//! - **Comprehensive metrics**: Sharpe, Sortino, Calmar, drawdown, trade
//!   statistics, with frequency-aware annualization
//! - **Generalization machinery**: rolling walk-forward optimization with
//!   parameter-stability and overfitting diagnostics
//! - **Robustness analysis**: seeded Monte Carlo permutation of the return
//!   stream with VaR/CVaR and drawdown distributions
//!
//! # Quick Start
//!
//! ```
//! use kestrel::engine::{BacktestConfig, BacktestEngine, TradingCosts};
//! use kestrel::signal::{MaCrossover, MaType, SignalGenerator};
//! use kestrel::types::{Bar, BarSeries};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! // Build a validated price series (normally handed in by a data loader)
//! let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let bars: Vec<Bar> = (0..120i64)
//!     .map(|i| {
//!         let price = 100.0 + (i as f64 * 0.2).sin() * 10.0;
//!         Bar::new(base + Duration::days(i), price, price + 1.0, price - 1.0, price, 1000.0)
//!     })
//!     .collect();
//! let prices = BarSeries::new(bars).unwrap();
//!
//! // Generate signals and run the backtest
//! let strategy = MaCrossover::new(10, 30, MaType::Simple).unwrap();
//! let signals = strategy.generate_signals(&prices).unwrap();
//!
//! let engine = BacktestEngine::new(BacktestConfig {
//!     initial_capital: 10_000.0,
//!     costs: TradingCosts::default(),
//!     ..Default::default()
//! })
//! .unwrap();
//! let result = engine.run(&prices, &signals).unwrap();
//!
//! println!("Return: {:.2}%", result.stats.total_return_pct);
//! println!("Sharpe: {:.2}", result.stats.sharpe_ratio);
//! ```
//!
//! # Modules
//!
//! - [`types`]: bars, validated series, signal frames, trades, equity
//! - [`indicators`]: pure series functions (SMA, EMA, RSI, ATR, MACD, ...)
//! - [`features`]: feature table and target construction for ML strategies
//! - [`model`]: scaler, logistic regression, classifier training
//! - [`signal`]: signal generators (MA crossover, classifier + hysteresis)
//! - [`engine`]: the event-driven backtest engine
//! - [`stats`]: performance metric formulas
//! - [`walkforward`]: rolling train/test hyperparameter validation
//! - [`monte_carlo`]: permutation-based robustness analysis
//! - [`cancel`]: cooperative cancellation for the long-running analyses

pub mod cancel;
pub mod engine;
pub mod error;
pub mod features;
pub mod indicators;
pub mod model;
pub mod monte_carlo;
pub mod signal;
pub mod stats;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use engine::{BacktestConfig, BacktestEngine, BacktestResult, TradingCosts};
pub use error::{BacktestError, Result};
pub use features::{Dataset, FeatureBuilder, FeatureConfig, FeatureTable};
pub use model::{Classifier, ClassifierConfig, TrainReport};
pub use monte_carlo::{MonteCarloConfig, MonteCarloResult, MonteCarloSimulator};
pub use signal::{MaCrossover, MaType, MlSignal, SignalGenerator};
pub use stats::PerfStats;
pub use types::{Bar, BarInterval, BarSeries, EquityPoint, ExitReason, SignalFrame, Trade};
pub use walkforward::{
    OptimizeMetric, ParamRange, ParamSet, ParamValue, SearchSpace, WalkForwardConfig,
    WalkForwardFold, WalkForwardOptimizer, WalkForwardResult,
};
