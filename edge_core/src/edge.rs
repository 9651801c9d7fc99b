//! Edge calculator: model probability vs bookmaker-implied probability.
//!
//! The flow is build_market_probs (model outputs keyed by [`MarketKey`])
//! then market_edges (join against the latest stored odds). Stake sizing
//! uses fractional Kelly under a hard bankroll cap.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::models::{
    Confidence, EdgeResult, MapAnalysis, MarketKey, MatchId, ModelProb, OtEstimate,
    Recommendation, SeriesDistribution,
};
use crate::store::HistoryStore;

/// Model probabilities keyed by normalized market.
pub type MarketProbs = FxHashMap<MarketKey, ModelProb>;

/// Strip the bookmaker margin from a mutually exclusive odds set by scaling
/// implied probabilities to sum to 1.
///
/// Returns the input unchanged when it is empty, contains odds at or below
/// 1.0, or already carries no overround.
pub fn remove_margin(odds: &[f64]) -> Vec<f64> {
    if odds.is_empty() || odds.iter().any(|o| *o <= 1.0) {
        return odds.to_vec();
    }
    let implied: Vec<f64> = odds.iter().map(|o| 1.0 / o).collect();
    let total: f64 = implied.iter().sum();
    if total <= 1.0 {
        return odds.to_vec();
    }
    implied.iter().map(|p| total / p).collect()
}

/// Score one bet: edge, recommendation tier and suggested stake.
///
/// Market, selection and bookmaker fields are left empty for the caller to
/// fill in.
pub fn calculate_edge(
    p_model: f64,
    odds: f64,
    confidence: Confidence,
    sample_size: u32,
    cfg: &EngineConfig,
) -> EdgeResult {
    let p_impl = if odds > 0.0 { 1.0 / odds } else { 0.0 };
    let edge = p_model - p_impl;

    let ec = &cfg.edge;
    let strong_ok = ec
        .min_sample_for_strong
        .map_or(true, |floor| sample_size >= floor);
    let observe_ok = ec
        .min_sample_for_observe
        .map_or(true, |floor| sample_size >= floor);
    let recommendation = if edge >= ec.strong_edge && confidence != Confidence::Low && strong_ok {
        Recommendation::StrongEdge
    } else if edge >= ec.min_edge && confidence != Confidence::Low && observe_ok {
        Recommendation::Observe
    } else {
        Recommendation::NoEdge
    };

    let mut suggested_stake = 0.0;
    if edge > 0.0 && odds > 1.0 {
        let kelly = ((p_model * odds - 1.0) / (odds - 1.0)).max(0.0);
        let br = &cfg.bankroll;
        suggested_stake = (br.total * kelly * br.kelly_fraction).min(br.total * br.max_stake_pct);
    }

    EdgeResult {
        odds,
        p_impl,
        p_model,
        edge,
        confidence,
        sample_size,
        recommendation,
        suggested_stake,
        ..Default::default()
    }
}

/// Turn model outputs into the market probability table the edge join
/// consumes.
///
/// Each team's map-winner prob is registered under every known alias so
/// odds quoted by tag ("nrg") and by name ("NRG Esports") both match.
pub fn build_market_probs(
    map_analyses: &[MapAnalysis],
    series: Option<&SeriesDistribution>,
    ot_estimates: &[OtEstimate],
    team_a_aliases: &[String],
    team_b_aliases: &[String],
) -> MarketProbs {
    let mut probs = MarketProbs::default();

    for (i, ma) in map_analyses.iter().enumerate() {
        let map_num = if ma.map_order > 0 {
            ma.map_order
        } else {
            (i + 1) as u8
        };

        let a_sels = normalized_aliases(&ma.team_a_stats.team_name, team_a_aliases);
        let b_sels = normalized_aliases(&ma.team_b_stats.team_name, team_b_aliases);

        for sel in &a_sels {
            probs.insert(
                MarketKey::map_winner(map_num, sel),
                ModelProb {
                    p_model: ma.p_team_a_win,
                    confidence: ma.confidence,
                    sample_size: ma.sample_size,
                    map_number: Some(map_num),
                },
            );
        }
        for sel in &b_sels {
            probs.insert(
                MarketKey::map_winner(map_num, sel),
                ModelProb {
                    p_model: 1.0 - ma.p_team_a_win,
                    confidence: ma.confidence,
                    sample_size: ma.sample_size,
                    map_number: Some(map_num),
                },
            );
        }
    }

    for (i, ot) in ot_estimates.iter().enumerate() {
        let map_num = (i + 1) as u8;
        for (yes, p) in [(true, ot.p_ot), (false, 1.0 - ot.p_ot)] {
            probs.insert(
                MarketKey::map_overtime(map_num, yes),
                ModelProb {
                    p_model: p,
                    confidence: ot.confidence,
                    sample_size: ot.sample_size,
                    map_number: Some(map_num),
                },
            );
        }
    }

    if let Some(series) = series {
        for (score, p) in &series.score_probs {
            probs.insert(
                MarketKey::correct_score(&score.to_string()),
                ModelProb {
                    p_model: *p,
                    confidence: Confidence::Medium,
                    sample_size: 0,
                    map_number: None,
                },
            );
        }
        if let Some(p_over) = series.p_over_3_5_maps {
            for (yes, p) in [(true, p_over), (false, 1.0 - p_over)] {
                probs.insert(
                    MarketKey::over_maps(yes),
                    ModelProb {
                        p_model: p,
                        confidence: Confidence::Medium,
                        sample_size: 0,
                        map_number: None,
                    },
                );
            }
        }
    }

    probs
}

fn normalized_aliases(team_name: &str, aliases: &[String]) -> Vec<String> {
    let mut out = vec![team_name.trim().to_lowercase()];
    for alias in aliases {
        let n = alias.trim().to_lowercase();
        if !n.is_empty() && !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Join model probabilities against the latest stored odds for a match.
///
/// Only the most recent quote per (market, selection, bookmaker) is scored.
/// Markets without a registered model probability are skipped. Results are
/// sorted by edge, best first.
pub fn market_edges(
    store: &dyn HistoryStore,
    cfg: &EngineConfig,
    match_id: MatchId,
    probs: &MarketProbs,
) -> Vec<EdgeResult> {
    let odds = store.odds_for_match(match_id);

    // Entries arrive newest first; keep the first hit per market line.
    let mut latest: FxHashMap<(String, String, String), &crate::models::MarketOddsEntry> =
        FxHashMap::default();
    for entry in &odds {
        latest
            .entry((
                entry.market_type.clone(),
                entry.selection.clone(),
                entry.bookmaker.clone(),
            ))
            .or_insert(entry);
    }

    let mut results = Vec::new();
    for entry in latest.values() {
        let key = MarketKey::from_parts(&entry.market_type, entry.map_number, &entry.selection);
        let Some(prob) = probs.get(&key) else {
            continue;
        };
        let mut result = calculate_edge(
            prob.p_model,
            entry.odds_value,
            prob.confidence,
            prob.sample_size,
            cfg,
        );
        result.market = entry.market_type.clone();
        result.selection = entry.selection.clone();
        result.bookmaker = entry.bookmaker.clone();
        result.map_number = key.map_number;
        results.push(result);
    }

    results.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    debug!(
        match_id = match_id.0,
        quotes = odds.len(),
        scored = results.len(),
        "market edge join"
    );
    results
}
