//! VCT Edge Core - series win probability and betting edge engine.
//!
//! This crate provides:
//! - Per-team, head-to-head and map-wide statistics over a scoped history
//! - Agent composition classification and matchup scoring
//! - Weighted map-win and overtime probability models
//! - Exact best-of-N series outcome distributions
//! - Model-vs-market edge detection with fractional Kelly stake sizing
//! - Multi-bet search: spreads, parlays, dutching, hedging, score coverage
//! - Cross-bookmaker surebet and odds anomaly detection
//! - A full-series analysis pipeline with rayon-parallel map estimates
//!
//! All computation is pure and deterministic over a [`store::HistoryStore`]
//! snapshot; nothing here touches the network or a database.

pub mod arbitrage;
pub mod compositions;
pub mod config;
pub mod edge;
pub mod engine;
pub mod models;
pub mod multibets;
pub mod probability;
pub mod series;
pub mod stats;
pub mod store;

pub use config::{EngineConfig, ScopeFilter};
pub use engine::{analyze_series, PlannedMap, SeriesAnalysis, SeriesRequest};
pub use models::{
    Confidence, MapAnalysis, MarketKey, MatchId, Recommendation, SeriesFormat, TeamId,
};
pub use store::{HistoryStore, MemoryStore};
