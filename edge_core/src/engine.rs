//! Full-series analysis pipeline.
//!
//! [`analyze_series`] wires the whole engine together for one upcoming
//! match: per-map win and overtime estimates, the exact series
//! distribution, the model-vs-market edge join, the arbitrage scan and the
//! multi-bet search. Missing data shrinks the output; the only hard error
//! is a request without maps.

use anyhow::{bail, Result};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::arbitrage::{self, ArbFinding};
use crate::config::EngineConfig;
use crate::edge::{build_market_probs, market_edges};
use crate::models::{
    EdgeResult, HeadToHeadRecord, MapAnalysis, MarketKey, MarketKind, MarketOddsEntry, MatchId,
    MultiBetOpportunity, OtEstimate, ParlayLeg, Scoreline, SeriesDistribution, SeriesFormat,
    Side, TeamId,
};
use crate::multibets::{
    analyze_spread, correct_score_coverage, find_profitable_parlays, MatchEdges,
};
use crate::probability::{estimate_map_win, estimate_ot, MapMatchup};
use crate::series::series_distribution;
use crate::stats::head_to_head;
use crate::store::HistoryStore;

const PARLAY_MAX_LEGS: usize = 3;

/// One map of the planned series, in veto order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedMap {
    pub map_name: String,
    /// 1-based position in the series.
    pub map_order: u8,
    pub starting_side_a: Option<Side>,
    pub comp_a: Option<Vec<String>>,
    pub comp_b: Option<Vec<String>>,
}

/// Everything the pipeline needs to analyze one series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub match_id: MatchId,
    pub team_a: TeamId,
    pub team_b: TeamId,
    /// Extra selections (tags, short names) odds feeds may quote team A
    /// under.
    pub team_a_aliases: Vec<String>,
    pub team_b_aliases: Vec<String>,
    pub format: SeriesFormat,
    pub maps: Vec<PlannedMap>,
}

/// Complete analysis output for one series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnalysis {
    pub match_id: MatchId,
    pub format: SeriesFormat,
    pub maps: Vec<MapAnalysis>,
    pub ot: Vec<OtEstimate>,
    pub series: SeriesDistribution,
    /// Model-vs-market edges, best first.
    pub single_edges: Vec<EdgeResult>,
    pub multi_bets: Vec<MultiBetOpportunity>,
    pub arbitrage: Vec<ArbFinding>,
    /// Overall head-to-head record, all maps.
    pub h2h: HeadToHeadRecord,
    pub scope_description: String,
}

impl SeriesAnalysis {
    /// Summary consumed by the cross-match parlay search.
    pub fn edge_summary(&self, match_label: &str) -> MatchEdges {
        MatchEdges {
            match_id: self.match_id,
            match_label: match_label.to_string(),
            edges: self.single_edges.clone(),
        }
    }
}

/// Positive single-bet edges as parlay legs.
pub fn positive_legs(edges: &[EdgeResult]) -> Vec<ParlayLeg> {
    edges
        .iter()
        .filter(|e| e.edge > 0.0)
        .map(|e| ParlayLeg {
            market: e.market.clone(),
            selection: e.selection.clone(),
            p_model: e.p_model,
            odds: e.odds,
            bookmaker: e.bookmaker.clone(),
            confidence: e.confidence,
            edge: Some(e.edge),
            match_id: None,
            match_label: None,
        })
        .collect()
}

/// Run the full analysis pipeline for one series.
#[instrument(skip(store, cfg, req), fields(match_id = req.match_id.0))]
pub fn analyze_series(
    store: &dyn HistoryStore,
    cfg: &EngineConfig,
    req: &SeriesRequest,
) -> Result<SeriesAnalysis> {
    if req.maps.is_empty() {
        bail!("series request for match {} has no maps", req.match_id.0);
    }

    // Historical inputs are restricted to the series family being played.
    let format = Some(req.format);
    let outputs: Vec<(MapAnalysis, OtEstimate)> = req
        .maps
        .par_iter()
        .map(|planned| {
            let matchup = MapMatchup {
                team_a: req.team_a,
                team_b: req.team_b,
                map_name: &planned.map_name,
                map_order: planned.map_order,
                starting_side_a: planned.starting_side_a,
                comp_a: planned.comp_a.as_deref(),
                comp_b: planned.comp_b.as_deref(),
                format,
            };
            let mut analysis = estimate_map_win(store, cfg, &matchup);
            let ot = estimate_ot(store, cfg, &matchup);
            analysis.p_ot = ot.p_ot;
            (analysis, ot)
        })
        .collect();
    let (maps, ot): (Vec<MapAnalysis>, Vec<OtEstimate>) = outputs.into_iter().unzip();

    let map_probs: Vec<f64> = maps.iter().map(|m| m.p_team_a_win).collect();
    let series = series_distribution(&map_probs, req.format);

    let probs = build_market_probs(
        &maps,
        Some(&series),
        &ot,
        &req.team_a_aliases,
        &req.team_b_aliases,
    );
    let single_edges = market_edges(store, cfg, req.match_id, &probs);
    let arbitrage = arbitrage::detect(store, req.match_id);

    let mut multi_bets = Vec::new();
    let odds = store.odds_for_match(req.match_id);
    let quotes = latest_quotes(&odds);

    // OT spread only when every planned map has a live OT-yes quote.
    if let Some(ot_odds) = ot_yes_odds(&quotes, req.maps.len()) {
        let ot_probs: Vec<f64> = ot.iter().map(|o| o.p_ot).collect();
        if let Some(spread) = analyze_spread(
            &ot_probs,
            &ot_odds,
            "OT",
            cfg.multibet.default_spread_stake,
            cfg,
        ) {
            multi_bets.push(spread);
        }
    }

    multi_bets.extend(find_profitable_parlays(
        &positive_legs(&single_edges),
        PARLAY_MAX_LEGS,
        cfg,
    ));

    let score_odds = best_score_odds(&quotes);
    if !score_odds.is_empty() {
        let score_probs: Vec<(Scoreline, f64)> = series
            .score_probs
            .iter()
            .map(|(s, p)| (*s, *p))
            .collect();
        if let Some(coverage) =
            correct_score_coverage(&score_probs, &score_odds, cfg.multibet.coverage_budget)
        {
            multi_bets.push(coverage);
        }
    }

    let h2h = head_to_head(store, req.team_a, req.team_b, None, &cfg.scope, format);

    info!(
        maps = maps.len(),
        edges = single_edges.len(),
        multi_bets = multi_bets.len(),
        arbs = arbitrage.len(),
        "series analysis complete"
    );

    Ok(SeriesAnalysis {
        match_id: req.match_id,
        format: req.format,
        maps,
        ot,
        series,
        single_edges,
        multi_bets,
        arbitrage,
        h2h,
        scope_description: cfg.scope.description(),
    })
}

/// Latest quote per (market, map, selection, bookmaker); input is newest
/// first.
fn latest_quotes(odds: &[MarketOddsEntry]) -> Vec<&MarketOddsEntry> {
    let mut seen: FxHashMap<(String, Option<u8>, String, String), &MarketOddsEntry> =
        FxHashMap::default();
    for entry in odds {
        seen.entry((
            entry.market_type.clone(),
            entry.map_number,
            entry.selection.clone(),
            entry.bookmaker.clone(),
        ))
        .or_insert(entry);
    }
    seen.into_values().collect()
}

/// Best live OT-yes odds per map, in map order. None unless all maps are
/// quoted.
fn ot_yes_odds(quotes: &[&MarketOddsEntry], n_maps: usize) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(n_maps);
    for map_num in 1..=n_maps as u8 {
        let best = quotes
            .iter()
            .filter(|q| {
                let key = MarketKey::from_parts(&q.market_type, q.map_number, &q.selection);
                key.kind == MarketKind::MapOvertime
                    && key.map_number == Some(map_num)
                    && key.selection == "yes"
            })
            .map(|q| q.odds_value)
            .fold(f64::NEG_INFINITY, f64::max);
        if best.is_finite() && best > 1.0 {
            out.push(best);
        } else {
            return None;
        }
    }
    Some(out)
}

/// Best live odds per correct-score line.
fn best_score_odds(quotes: &[&MarketOddsEntry]) -> Vec<(Scoreline, f64)> {
    let mut best: FxHashMap<Scoreline, f64> = FxHashMap::default();
    for q in quotes {
        let key = MarketKey::from_parts(&q.market_type, q.map_number, &q.selection);
        if key.kind != MarketKind::CorrectScore {
            continue;
        }
        let Ok(score) = key.selection.parse::<Scoreline>() else {
            continue;
        };
        let entry = best.entry(score).or_insert(q.odds_value);
        if q.odds_value > *entry {
            *entry = q.odds_value;
        }
    }
    let mut out: Vec<(Scoreline, f64)> = best.into_iter().collect();
    out.sort_by_key(|(s, _)| *s);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::Confidence;
    use crate::store::fixtures::map_record;
    use crate::store::MemoryStore;

    fn planned(map_name: &str, order: u8) -> PlannedMap {
        PlannedMap {
            map_name: map_name.to_string(),
            map_order: order,
            starting_side_a: None,
            comp_a: None,
            comp_b: None,
        }
    }

    fn request(maps: Vec<PlannedMap>) -> SeriesRequest {
        SeriesRequest {
            match_id: MatchId(500),
            team_a: TeamId(10),
            team_b: TeamId(20),
            team_a_aliases: vec!["nrg".to_string()],
            team_b_aliases: vec!["sen".to_string()],
            format: SeriesFormat::Bo3,
            maps,
        }
    }

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        // Team 10 is strong on Haven, mixed on Bind.
        for i in 0..8 {
            let mut rec = map_record(i, "Haven", 10, 20);
            rec.team1_score = Some(13);
            rec.team2_score = Some(6);
            store.push_map(rec);
        }
        for i in 8..12 {
            let mut rec = map_record(i, "Bind", 10, 20);
            if i % 2 == 0 {
                rec.winner = Some(TeamId(20));
                rec.team1_score = Some(9);
                rec.team2_score = Some(13);
            }
            store.push_map(rec);
        }
        store
    }

    fn push_quote(store: &mut MemoryStore, market_type: &str, selection: &str, odds: f64) {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap();
        let map_number = market_type
            .strip_prefix("map")
            .and_then(|r| r.split('_').next())
            .and_then(|d| d.parse().ok());
        store.push_odds(
            MatchId(500),
            MarketOddsEntry {
                bookmaker: "bookie1".to_string(),
                market_type: market_type.to_string(),
                selection: selection.to_string(),
                map_number,
                odds_value: odds,
                observed_at: t0 - Duration::minutes(odds as i64),
            },
        );
    }

    #[test]
    fn empty_map_list_is_an_error() {
        let store = MemoryStore::new();
        let cfg = EngineConfig::default();
        let err = analyze_series(&store, &cfg, &request(vec![])).unwrap_err();
        assert!(err.to_string().contains("no maps"));
    }

    #[test]
    fn pipeline_without_odds_still_produces_model_outputs() {
        let store = seeded_store();
        let cfg = EngineConfig::default();
        let req = request(vec![planned("Haven", 1), planned("Bind", 2), planned("Split", 3)]);
        let out = analyze_series(&store, &cfg, &req).unwrap();

        assert_eq!(out.maps.len(), 3);
        assert_eq!(out.ot.len(), 3);
        assert!(out.maps[0].p_team_a_win > 0.55, "Haven favors team 10");
        let total: f64 = out.series.score_probs.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out.single_edges.is_empty());
        assert!(out.multi_bets.is_empty());
        assert!(out.arbitrage.is_empty());
        assert!(out.h2h.total_maps > 0);
    }

    #[test]
    fn pipeline_scores_quoted_markets_and_finds_multibets() {
        let mut store = seeded_store();
        // Generous map-winner quotes against a strong favorite.
        push_quote(&mut store, "map1_winner", "nrg", 2.20);
        push_quote(&mut store, "map1_winner", "sen", 2.20);
        push_quote(&mut store, "map2_winner", "nrg", 2.10);
        // Correct score lines priced above the model.
        push_quote(&mut store, "correct_score", "2-0", 4.0);
        push_quote(&mut store, "correct_score", "2-1", 4.5);

        let cfg = EngineConfig::default();
        let req = request(vec![planned("Haven", 1), planned("Bind", 2), planned("Split", 3)]);
        let out = analyze_series(&store, &cfg, &req).unwrap();

        // Three winner quotes plus the two correct-score lines all join
        // against a registered model probability.
        assert_eq!(out.single_edges.len(), 5);
        for pair in out.single_edges.windows(2) {
            assert!(pair[0].edge >= pair[1].edge);
        }
        let nrg_map1 = out
            .single_edges
            .iter()
            .find(|e| e.selection == "nrg" && e.map_number == Some(1))
            .unwrap();
        assert!(nrg_map1.edge > 0.0);

        // The two both-sides map1 quotes at 2.20 form a surebet.
        assert!(!out.arbitrage.is_empty());
        // Parlay search found something from the positive legs, and the
        // correct-score coverage had quotes to chew on.
        assert!(!out.multi_bets.is_empty());
    }

    #[test]
    fn ot_spread_requires_full_quote_coverage() {
        let mut store = seeded_store();
        push_quote(&mut store, "map1_ot", "yes", 5.0);
        // Maps 2 and 3 have no OT quote: no spread candidate either way.
        let cfg = EngineConfig::default();
        let req = request(vec![planned("Haven", 1), planned("Bind", 2), planned("Split", 3)]);
        let out = analyze_series(&store, &cfg, &req).unwrap();
        assert!(out
            .multi_bets
            .iter()
            .all(|m| m.strategy != crate::models::MultiBetStrategy::Spread));
    }

    #[test]
    fn analysis_is_deterministic() {
        let mut store = seeded_store();
        push_quote(&mut store, "map1_winner", "nrg", 2.20);
        let cfg = EngineConfig::default();
        let req = request(vec![planned("Haven", 1), planned("Bind", 2)]);
        let a = analyze_series(&store, &cfg, &req).unwrap();
        let b = analyze_series(&store, &cfg, &req).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn analysis_serializes_for_the_presentation_layer() {
        let mut store = seeded_store();
        push_quote(&mut store, "map1_winner", "nrg", 2.20);
        push_quote(&mut store, "map1_winner", "sen", 2.20);
        let cfg = EngineConfig::default();
        let req = request(vec![planned("Haven", 1), planned("Bind", 2)]);
        let out = analyze_series(&store, &cfg, &req).unwrap();

        let json = serde_json::to_string(&out).unwrap();
        let back: SeriesAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
        // Scorelines serialize as plain "a-b" strings.
        assert!(json.contains("\"2-0\""));
    }

    #[test]
    fn positive_legs_filters_and_converts() {
        let edges = vec![
            EdgeResult {
                selection: "nrg".to_string(),
                edge: 0.05,
                p_model: 0.55,
                odds: 2.0,
                confidence: Confidence::Medium,
                ..Default::default()
            },
            EdgeResult {
                selection: "sen".to_string(),
                edge: -0.02,
                ..Default::default()
            },
        ];
        let legs = positive_legs(&edges);
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].selection, "nrg");
        assert_eq!(legs[0].edge, Some(0.05));
    }
}
