//! Historical data store interface.
//!
//! The engine never talks to a database or the network: it computes over
//! already-fetched, immutable snapshots served through [`HistoryStore`].
//! Production wires this to the relational store; tests and offline analysis
//! use [`MemoryStore`].

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::ScopeFilter;
use crate::models::{MapId, MarketOddsEntry, MatchId, SeriesFormat, Side, TeamId};

/// One completed (or pending) map row as stored by the sync layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: MapId,
    pub match_id: MatchId,
    pub map_name: String,
    /// 1-based position in the series.
    pub map_order: u8,
    pub event_id: Option<i64>,
    pub stage_name: Option<String>,
    pub date: Option<NaiveDate>,
    /// Raw series format string from the provider ("bo3", "Bo5", "5", ...).
    pub series_format_raw: Option<String>,
    pub team1: TeamId,
    pub team2: TeamId,
    pub team1_name: String,
    pub team2_name: String,
    pub team1_score: Option<u32>,
    pub team2_score: Option<u32>,
    pub team1_atk_rounds: Option<u32>,
    pub team1_def_rounds: Option<u32>,
    pub team2_atk_rounds: Option<u32>,
    pub team2_def_rounds: Option<u32>,
    pub team1_pistols_won: u32,
    pub team2_pistols_won: u32,
    pub team1_pistol_conversions: u32,
    pub team2_pistol_conversions: u32,
    pub team1_start_side: Option<Side>,
    pub is_ot: bool,
    pub winner: Option<TeamId>,
}

impl MapRecord {
    /// Both final scores present.
    pub fn is_complete(&self) -> bool {
        self.team1_score.is_some() && self.team2_score.is_some()
    }

    pub fn total_rounds(&self) -> u32 {
        self.team1_score.unwrap_or(0) + self.team2_score.unwrap_or(0)
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.team1 == team || self.team2 == team
    }

    /// (own score, opponent score) from `team`'s perspective.
    pub fn scores_for(&self, team: TeamId) -> (u32, u32) {
        let s1 = self.team1_score.unwrap_or(0);
        let s2 = self.team2_score.unwrap_or(0);
        if self.team1 == team {
            (s1, s2)
        } else {
            (s2, s1)
        }
    }
}

/// Round-level winner record, used for pistol-round attribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub map_id: MapId,
    pub round_number: u32,
    pub winner: Option<TeamId>,
    pub winner_side: Option<Side>,
}

/// Agents fielded by one team on one map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub map_id: MapId,
    pub team: TeamId,
    /// Up to 5 agent identifiers.
    pub agents: Vec<String>,
    /// Precomputed digest, see [`crate::compositions::composition_hash`].
    pub comp_hash: String,
}

/// Query against the completed-map history.
///
/// All axes are conjunctive; `None` means no restriction. Every query is
/// implicitly restricted to maps with both final scores present.
#[derive(Clone, Debug, Default)]
pub struct MapQuery<'a> {
    pub map_name: Option<&'a str>,
    /// Maps involving this team (either side).
    pub team: Option<TeamId>,
    /// Maps between exactly these two teams (either orientation).
    pub pair: Option<(TeamId, TeamId)>,
    pub scope: ScopeFilter,
    pub format: Option<SeriesFormat>,
}

impl<'a> MapQuery<'a> {
    pub fn accepts(&self, rec: &MapRecord) -> bool {
        if !rec.is_complete() {
            return false;
        }
        if let Some(name) = self.map_name {
            if rec.map_name != name {
                return false;
            }
        }
        if let Some(team) = self.team {
            if !rec.involves(team) {
                return false;
            }
        }
        if let Some((a, b)) = self.pair {
            let ok = (rec.team1 == a && rec.team2 == b) || (rec.team1 == b && rec.team2 == a);
            if !ok {
                return false;
            }
        }
        if let Some(fmt) = self.format {
            if !fmt.matches_raw(rec.series_format_raw.as_deref()) {
                return false;
            }
        }
        self.scope
            .matches(rec.event_id, rec.stage_name.as_deref(), rec.date)
    }
}

/// Read interface over the historical snapshot.
///
/// Implementations answer from already-fetched data and must not block on
/// network or user I/O. `Sync` so per-map analyses can fan out in parallel.
pub trait HistoryStore: Sync {
    /// Completed maps matching the query, most recent first.
    fn completed_maps(&self, query: &MapQuery) -> Vec<MapRecord>;

    /// Round records for the given maps (any round, any winner).
    fn rounds(&self, map_ids: &[MapId]) -> Vec<RoundRecord>;

    /// Composition records for the given maps.
    fn compositions_for_maps(&self, map_ids: &[MapId]) -> Vec<CompositionRecord>;

    /// Every odds observation recorded for a match, newest first.
    fn odds_for_match(&self, match_id: MatchId) -> Vec<MarketOddsEntry>;
}

/// In-memory snapshot store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    maps: Vec<MapRecord>,
    rounds: Vec<RoundRecord>,
    compositions: Vec<CompositionRecord>,
    odds: FxHashMap<MatchId, Vec<MarketOddsEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_map(&mut self, rec: MapRecord) {
        self.maps.push(rec);
    }

    pub fn push_round(&mut self, rec: RoundRecord) {
        self.rounds.push(rec);
    }

    /// Records a composition, computing its digest from the agent list.
    pub fn push_composition(&mut self, map_id: MapId, team: TeamId, agents: &[&str]) {
        let agents: Vec<String> = agents.iter().map(|a| a.to_string()).collect();
        let comp_hash = crate::compositions::composition_hash(&agents);
        self.compositions.push(CompositionRecord {
            map_id,
            team,
            agents,
            comp_hash,
        });
    }

    pub fn push_odds(&mut self, match_id: MatchId, entry: MarketOddsEntry) {
        self.odds.entry(match_id).or_default().push(entry);
    }
}

impl HistoryStore for MemoryStore {
    fn completed_maps(&self, query: &MapQuery) -> Vec<MapRecord> {
        let mut out: Vec<MapRecord> = self
            .maps
            .iter()
            .filter(|m| query.accepts(m))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        out
    }

    fn rounds(&self, map_ids: &[MapId]) -> Vec<RoundRecord> {
        self.rounds
            .iter()
            .filter(|r| map_ids.contains(&r.map_id))
            .cloned()
            .collect()
    }

    fn compositions_for_maps(&self, map_ids: &[MapId]) -> Vec<CompositionRecord> {
        self.compositions
            .iter()
            .filter(|c| map_ids.contains(&c.map_id))
            .cloned()
            .collect()
    }

    fn odds_for_match(&self, match_id: MatchId) -> Vec<MarketOddsEntry> {
        let mut out = self.odds.get(&match_id).cloned().unwrap_or_default();
        out.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        out
    }
}
