//! Engine configuration: scope filtering and tunable model parameters.
//!
//! Unlike the usual "global config singleton" approach, every public engine
//! operation takes an explicit `&EngineConfig`. This keeps computations pure
//! and lets tests run with different scopes in parallel.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Restricts which historical data the models are allowed to use.
///
/// Filters are conjunctive: a row must satisfy every populated axis.
/// An empty axis means "no restriction", never "exclude all".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Restrict to these event ids (empty = all events).
    pub event_ids: Vec<i64>,
    /// Restrict to these stage names (empty = all stages).
    pub stage_names: Vec<String>,
    /// Inclusive lower date bound.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub date_to: Option<NaiveDate>,
}

impl ScopeFilter {
    /// True if any restriction is active.
    pub fn is_active(&self) -> bool {
        !self.event_ids.is_empty()
            || !self.stage_names.is_empty()
            || self.date_from.is_some()
            || self.date_to.is_some()
    }

    /// Whether a match-level row passes this filter.
    ///
    /// A row missing a field that the filter restricts on is excluded:
    /// it cannot prove it satisfies the restriction.
    pub fn matches(
        &self,
        event_id: Option<i64>,
        stage_name: Option<&str>,
        date: Option<NaiveDate>,
    ) -> bool {
        if !self.event_ids.is_empty() {
            match event_id {
                Some(id) if self.event_ids.contains(&id) => {}
                _ => return false,
            }
        }
        if !self.stage_names.is_empty() {
            match stage_name {
                Some(s) if self.stage_names.iter().any(|n| n == s) => {}
                _ => return false,
            }
        }
        if let Some(from) = self.date_from {
            match date {
                Some(d) if d >= from => {}
                _ => return false,
            }
        }
        if let Some(to) = self.date_to {
            match date {
                Some(d) if d <= to => {}
                _ => return false,
            }
        }
        true
    }

    /// Human-readable description of the active restrictions.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if !self.event_ids.is_empty() {
            parts.push(format!("events={:?}", self.event_ids));
        }
        if !self.stage_names.is_empty() {
            parts.push(format!("stages={:?}", self.stage_names));
        }
        if let Some(from) = self.date_from {
            parts.push(format!("from={from}"));
        }
        if let Some(to) = self.date_to {
            parts.push(format!("to={to}"));
        }
        if parts.is_empty() {
            "all data (no filters)".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

/// Weights for the map-level win probability model.
///
/// The seven factors are documented in [`crate::probability`]. Defaults sum
/// to 1.0; callers tuning individual weights are expected to keep that sum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub base_map_winrate: f64,
    pub opponent_adjusted: f64,
    pub h2h: f64,
    pub side_advantage: f64,
    pub comp_factor: f64,
    pub pistol_factor: f64,
    pub recency: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            base_map_winrate: 0.30,
            opponent_adjusted: 0.25,
            h2h: 0.15,
            side_advantage: 0.10,
            comp_factor: 0.10,
            pistol_factor: 0.05,
            recency: 0.05,
        }
    }
}

/// Weights for the overtime probability model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtWeights {
    pub global_ot_rate: f64,
    pub closeness_index: f64,
    pub comp_ot_rate: f64,
    pub pistol_swing: f64,
}

impl Default for OtWeights {
    fn default() -> Self {
        Self {
            global_ot_rate: 0.30,
            closeness_index: 0.30,
            comp_ot_rate: 0.25,
            pistol_swing: 0.15,
        }
    }
}

/// Thresholds for edge classification and confidence tiers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Minimum edge for an "observe" recommendation.
    pub min_edge: f64,
    /// Minimum edge for a "strong edge" recommendation.
    pub strong_edge: f64,
    /// Sample size for medium confidence on a single map.
    pub min_sample_map: u32,
    /// General sample threshold; high confidence needs twice this.
    pub min_sample_general: u32,
    /// Optional sample floor required for a strong recommendation.
    pub min_sample_for_strong: Option<u32>,
    /// Optional sample floor required for an observe recommendation.
    pub min_sample_for_observe: Option<u32>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.03,
            strong_edge: 0.08,
            min_sample_map: 3,
            min_sample_general: 5,
            min_sample_for_strong: None,
            min_sample_for_observe: None,
        }
    }
}

/// Bankroll and stake sizing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BankrollConfig {
    /// Total bankroll.
    pub total: f64,
    /// Hard cap on a single stake, as a fraction of the bankroll.
    pub max_stake_pct: f64,
    /// Fractional Kelly multiplier applied to the raw Kelly fraction.
    pub kelly_fraction: f64,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            total: 1300.0,
            max_stake_pct: 0.03,
            kelly_fraction: 0.25,
        }
    }
}

/// Parameters for the multi-bet opportunity engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiBetConfig {
    /// Assumed correlation between legs within the same series.
    pub correlation_factor: f64,
    /// Minimum edge for a parlay to be reported.
    pub min_parlay_edge: f64,
    /// Minimum edge for a spread to be reported. Zero reports any +EV
    /// spread; raise it to skip marginal ones.
    pub min_spread_edge: f64,
    /// Default stake placed on each map of a spread.
    pub default_spread_stake: f64,
    /// Total budget allocated across correct-score coverage bets.
    pub coverage_budget: f64,
}

impl Default for MultiBetConfig {
    fn default() -> Self {
        Self {
            correlation_factor: 0.10,
            min_parlay_edge: 0.05,
            min_spread_edge: 0.0,
            default_spread_stake: 10.0,
            coverage_budget: 50.0,
        }
    }
}

/// Aggregate configuration threaded through every engine operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scope: ScopeFilter,
    pub weights: ModelWeights,
    pub ot_weights: OtWeights,
    pub edge: EdgeConfig,
    pub bankroll: BankrollConfig,
    pub multibet: MultiBetConfig,
}
