//! Value objects shared across the engine.
//!
//! Everything here is a plain serde-friendly record, recomputed per request.
//! Derived rates are methods rather than stored fields so they can never go
//! stale relative to the underlying counters.

pub mod market;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use market::{MarketKey, MarketKeyError, MarketKind};

/// Team identifier from the historical data store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub i64);

/// Match (series) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub i64);

/// Single-map identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub i64);

/// Starting side on a map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Attack,
    Defense,
}

impl Side {
    /// Permissive parsing of side labels seen in scraped data.
    pub fn parse_loose(raw: &str) -> Option<Side> {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            return None;
        }
        if s.starts_with("atk") || s.starts_with("attack") {
            Some(Side::Attack)
        } else if s.starts_with("def") {
            Some(Side::Defense)
        } else {
            None
        }
    }
}

/// Best-of-N series family.
///
/// Matching against raw format strings is family based: anything carrying a
/// '5' marker is best-of-5, everything else (including missing or empty
/// values) is treated as best-of-3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesFormat {
    Bo3,
    Bo5,
}

impl SeriesFormat {
    /// Maps needed to win the series.
    pub fn maps_to_win(self) -> u8 {
        match self {
            SeriesFormat::Bo3 => 2,
            SeriesFormat::Bo5 => 3,
        }
    }

    /// Maximum maps the series can reach.
    pub fn max_maps(self) -> u8 {
        2 * self.maps_to_win() - 1
    }

    /// Classify a raw format string ("bo3", "BO5", "5", None, ...).
    pub fn from_raw(raw: Option<&str>) -> SeriesFormat {
        match raw {
            Some(s) if s.to_lowercase().contains('5') => SeriesFormat::Bo5,
            _ => SeriesFormat::Bo3,
        }
    }

    /// Whether a raw format string belongs to this family.
    pub fn matches_raw(self, raw: Option<&str>) -> bool {
        SeriesFormat::from_raw(raw) == self
    }
}

/// Confidence tier backing a probability estimate.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

/// Three-tier recommendation attached to an edge result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    #[default]
    NoEdge,
    Observe,
    StrongEdge,
}

/// Aggregate counters for one team on one map under one scope.
///
/// Computed fresh per query; never persisted. All derived rates live in
/// methods. Zero-denominator behavior: win-rate-like rates return the
/// neutral 0.5, count-like rates return 0.0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMapStats {
    pub team: Option<TeamId>,
    pub team_name: String,
    pub map_name: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ot_count: u32,
    pub close_maps: u32,
    pub stomps_won: u32,
    pub stomps_lost: u32,
    pub avg_rounds_won: f64,
    pub avg_rounds_lost: f64,
    pub avg_round_diff: f64,
    pub atk_rounds_won: u32,
    /// Estimated, not exact: `max(12, ceil(total_rounds / 2))` per map when
    /// explicit per-side totals are unavailable.
    pub atk_rounds_played: u32,
    pub def_rounds_won: u32,
    /// Same estimate as `atk_rounds_played`.
    pub def_rounds_played: u32,
    pub pistols_won: u32,
    pub pistols_played: u32,
    pub pistol_conversions: u32,
    pub pistol_atk_won: u32,
    pub pistol_atk_played: u32,
    pub pistol_def_won: u32,
    pub pistol_def_played: u32,
}

impl TeamMapStats {
    pub fn winrate(&self) -> f64 {
        rate_or_neutral(self.wins, self.games_played)
    }

    pub fn ot_rate(&self) -> f64 {
        rate_or_zero(self.ot_count, self.games_played)
    }

    pub fn atk_round_rate(&self) -> f64 {
        rate_or_neutral(self.atk_rounds_won, self.atk_rounds_played)
    }

    pub fn def_round_rate(&self) -> f64 {
        rate_or_neutral(self.def_rounds_won, self.def_rounds_played)
    }

    pub fn pistol_rate(&self) -> f64 {
        rate_or_neutral(self.pistols_won, self.pistols_played)
    }

    pub fn pistol_conversion_rate(&self) -> f64 {
        rate_or_zero(self.pistol_conversions, self.pistols_won)
    }

    pub fn close_rate(&self) -> f64 {
        rate_or_zero(self.close_maps, self.games_played)
    }
}

fn rate_or_neutral(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.5
    } else {
        num as f64 / den as f64
    }
}

fn rate_or_zero(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Head-to-head record between two teams, optionally on one map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadToHeadRecord {
    pub total_maps: u32,
    pub a_wins: u32,
    pub b_wins: u32,
    pub ot_count: u32,
}

impl HeadToHeadRecord {
    pub fn ot_rate(&self) -> f64 {
        rate_or_zero(self.ot_count, self.total_maps)
    }
}

/// Map-wide statistics across all teams under a scope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMapStats {
    pub total_maps: u32,
    pub ot_count: u32,
    pub close_count: u32,
    pub avg_total_rounds: f64,
}

impl GlobalMapStats {
    pub fn ot_rate(&self) -> f64 {
        rate_or_zero(self.ot_count, self.total_maps)
    }

    pub fn close_rate(&self) -> f64 {
        rate_or_zero(self.close_count, self.total_maps)
    }
}

/// Every intermediate value that fed the weighted map-win sum, kept for
/// transparency in UI and debugging.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapFactors {
    pub base_winrate: f64,
    pub opponent_adjusted: f64,
    pub h2h: f64,
    pub h2h_maps: u32,
    pub side_advantage: f64,
    pub comp_factor: f64,
    pub pistol: f64,
    pub recency: f64,
    pub sample_a: u32,
    pub sample_b: u32,
}

/// Full model output for one map of a series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapAnalysis {
    pub map_name: String,
    /// Position in the series, 1-based.
    pub map_order: u8,
    pub team_a_stats: TeamMapStats,
    pub team_b_stats: TeamMapStats,
    pub p_team_a_win: f64,
    pub p_ot: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub factors: MapFactors,
}

/// Intermediate factors of the overtime model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OtFactors {
    pub global_ot_rate: f64,
    pub closeness: f64,
    pub comp_ot_rate: f64,
    pub pistol_swing: f64,
}

/// Output of the overtime probability model for one map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtEstimate {
    pub p_ot: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub factors: OtFactors,
}

/// Final series scoreline, e.g. 2-1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Scoreline {
    pub a: u8,
    pub b: u8,
}

impl Scoreline {
    pub fn total_maps(self) -> u8 {
        self.a + self.b
    }
}

impl fmt::Display for Scoreline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

impl From<Scoreline> for String {
    fn from(s: Scoreline) -> String {
        s.to_string()
    }
}

impl FromStr for Scoreline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("invalid scoreline: {s:?}"))?;
        let a = a.trim().parse().map_err(|_| format!("invalid scoreline: {s:?}"))?;
        let b = b.trim().parse().map_err(|_| format!("invalid scoreline: {s:?}"))?;
        Ok(Scoreline { a, b })
    }
}

impl TryFrom<String> for Scoreline {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Exact distribution over series outcomes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDistribution {
    pub p_a_series: f64,
    pub p_b_series: f64,
    /// Probability per terminal scoreline (side A score first).
    pub score_probs: BTreeMap<Scoreline, f64>,
    /// Probability per total maps played.
    pub total_maps_dist: BTreeMap<u8, f64>,
    /// P(series exceeds 3 maps); populated for best-of-5.
    pub p_over_3_5_maps: Option<f64>,
    /// P(series reaches exactly 3 maps); populated for best-of-3.
    pub p_exactly_3_maps: Option<f64>,
}

/// A single odds observation from one bookmaker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketOddsEntry {
    pub bookmaker: String,
    /// Wire market type, e.g. "map1_winner" or "correct_score".
    pub market_type: String,
    pub selection: String,
    pub map_number: Option<u8>,
    pub odds_value: f64,
    pub observed_at: DateTime<Utc>,
}

impl MarketOddsEntry {
    /// Market-implied probability before margin removal.
    pub fn implied_prob(&self) -> f64 {
        if self.odds_value > 0.0 {
            1.0 / self.odds_value
        } else {
            0.0
        }
    }
}

/// Model probability registered for one market key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelProb {
    pub p_model: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub map_number: Option<u8>,
}

/// One market/selection/bookmaker comparison of model vs implied probability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub market: String,
    pub selection: String,
    pub bookmaker: String,
    pub map_number: Option<u8>,
    pub odds: f64,
    pub p_impl: f64,
    pub p_model: f64,
    pub edge: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
    pub recommendation: Recommendation,
    pub suggested_stake: f64,
}

/// Multi-bet strategy family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiBetStrategy {
    Spread,
    Parlay,
    CorrectScore,
}

/// One leg of a parlay.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub market: String,
    pub selection: String,
    pub p_model: f64,
    pub odds: f64,
    pub bookmaker: String,
    pub confidence: Confidence,
    pub edge: Option<f64>,
    pub match_id: Option<MatchId>,
    pub match_label: Option<String>,
}

/// Strategy-specific payload of a [`MultiBetOpportunity`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MultiBetDetails {
    Spread(SpreadDetails),
    Parlay(ParlayDetails),
    CorrectScore(CorrectScoreDetails),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpreadDetails {
    pub maps: usize,
    pub stake_per_map: f64,
    pub p_at_least_1: f64,
    pub p_at_least_2: f64,
    pub mean_hits: f64,
    /// Smallest hit count with positive expected value, 0 if none.
    pub breakeven_hits: usize,
    /// P(exactly k hits) for k = 0..=maps.
    pub hit_distribution: Vec<f64>,
    pub map_probs: Vec<f64>,
    pub map_odds: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParlayDetails {
    pub legs: Vec<ParlayLeg>,
    /// Correlation factor applied; None for cross-match parlays.
    pub correlation_factor: Option<f64>,
    pub cross_match: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectScoreDetails {
    pub scores: Vec<ScoreStake>,
    pub expected_return: f64,
}

/// Stake allocated to one correct-score line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreStake {
    pub score: Scoreline,
    pub p_model: f64,
    pub odds: f64,
    pub p_impl: f64,
    pub edge: f64,
    pub ev_per_unit: f64,
    pub stake: f64,
    pub potential_return: f64,
}

/// A composite betting recommendation, derived on demand and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiBetOpportunity {
    pub strategy: MultiBetStrategy,
    pub description: String,
    pub total_stake: f64,
    /// Guaranteed minimum payout where applicable (spread).
    pub min_payout: f64,
    pub combined_odds: f64,
    pub p_model: f64,
    pub p_impl: f64,
    pub edge: f64,
    /// Total expected value in stake units.
    pub ev: f64,
    pub details: MultiBetDetails,
}
