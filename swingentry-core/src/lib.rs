//! SwingEntry Core: entry-timing decisions for swing trades.
//!
//! For one instrument, given daily bars and an indicator snapshot, decide
//! whether now is a valid entry and, if so, with which stop, target and exit
//! milestones. The pipeline:
//! - Validation boundary (`domain::MarketInput::validate`)
//! - Market structure (trend regime, moving-average stack)
//! - Setup detectors (dip-bounce, retest, reclaim, inside day, breakout)
//! - Risk/reward engine (regime stops, SCOOT, horizon cap, probation)
//! - Guard/veto pipeline (first veto wins)
//! - Decision combiner with structured telemetry
//!
//! Everything is synchronous and pure: no I/O, no global state.

pub mod config;
pub mod decision;
pub mod domain;
pub mod exits;
pub mod guards;
pub mod indicators;
pub mod levels;
pub mod patterns;
pub mod report;
pub mod risk;
pub mod setups;
pub mod structure;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig, Mode, Sentiment};
pub use decision::{Decision, EvaluateOptions, Evaluator};
pub use domain::{InputError, MarketInput, PriceBar, RawSnapshot, Snapshot};
pub use guards::MarketContext;
pub use risk::ExternalScore;
pub use setups::SetupKind;
pub use telemetry::{DebugLevel, GuardSamples, Telemetry};
