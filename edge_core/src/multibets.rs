//! Multi-bet engine: spreads, parlays, dutching, hedging and correct-score
//! coverage.
//!
//! Everything here is pure arithmetic over model probabilities and quoted
//! odds; opportunities below the configured edge floors come back as `None`
//! rather than as negative recommendations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::models::{
    CorrectScoreDetails, EdgeResult, MatchId, MultiBetDetails, MultiBetOpportunity,
    MultiBetStrategy, ParlayDetails, ParlayLeg, Scoreline, ScoreStake, SpreadDetails,
};

/// Hard cap on any combined parlay probability.
const PARLAY_P_CAP: f64 = 0.99;
/// Floor on the same-series correlation penalty multiplier.
const PARLAY_PENALTY_FLOOR: f64 = 0.5;
/// Most parlays reported per search.
const MAX_PARLAY_RESULTS: usize = 10;

/// P(exactly k successes) for independent-ish events, k = 0..=n.
///
/// Standard Poisson binomial DP, then a heuristic correlation adjustment
/// that fattens the tails: mass at hit counts far from the mean is scaled
/// up by `1 + correlation * |k - mean| * 0.1` and the result renormalized.
pub fn poisson_binomial(probs: &[f64], correlation: f64) -> Vec<f64> {
    let n = probs.len();
    let mut dp = vec![0.0; n + 1];
    dp[0] = 1.0;

    for &p in probs {
        let mut next = vec![0.0; n + 1];
        for k in 0..=n {
            next[k] += dp[k] * (1.0 - p);
            if k > 0 {
                next[k] += dp[k - 1] * p;
            }
        }
        dp = next;
    }

    if correlation > 0.0 && n >= 2 {
        let mean: f64 = probs.iter().sum();
        for (k, v) in dp.iter_mut().enumerate() {
            *v *= 1.0 + correlation * (k as f64 - mean).abs() * 0.1;
        }
        let total: f64 = dp.iter().sum();
        if total > 0.0 {
            for v in &mut dp {
                *v /= total;
            }
        }
    }

    dp
}

/// Evaluate placing the same bet on every map of a series (e.g. OT yes on
/// all maps).
///
/// Returns `None` unless the strategy is +EV overall. A nonzero
/// `min_spread_edge` additionally drops spreads whose EV per staked unit
/// falls below it; the default of zero reports every +EV spread.
pub fn analyze_spread(
    map_probs: &[f64],
    map_odds: &[f64],
    market_label: &str,
    stake_per_map: f64,
    cfg: &EngineConfig,
) -> Option<MultiBetOpportunity> {
    let n = map_probs.len();
    if n == 0 || map_odds.len() != n {
        return None;
    }

    let corr = cfg.multibet.correlation_factor;
    let total_stake = stake_per_map * n as f64;
    let min_payout = map_odds
        .iter()
        .map(|o| stake_per_map * o)
        .fold(f64::INFINITY, f64::min);

    // Correlated maps miss together more often than independence implies.
    let p_zero_raw: f64 = map_probs.iter().map(|p| 1.0 - p).product();
    let p_zero = (p_zero_raw * (1.0 + corr * (n - 1) as f64)).min(1.0);
    let p_at_least_1 = 1.0 - p_zero;

    let mean_hits: f64 = map_probs.iter().sum();
    let hit_distribution = poisson_binomial(map_probs, corr);

    // Expected payout given exactly k hits, averaged over every subset of
    // k maps. n is at most 5 so exhaustive enumeration is fine.
    let mut payout_sum = vec![0.0; n + 1];
    let mut subset_count = vec![0u32; n + 1];
    for mask in 0u32..(1 << n) {
        let k = mask.count_ones() as usize;
        let payout: f64 = (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .map(|i| stake_per_map * map_odds[i])
            .sum();
        payout_sum[k] += payout;
        subset_count[k] += 1;
    }
    let ev_by_hits: Vec<f64> = (0..=n)
        .map(|k| payout_sum[k] / subset_count[k] as f64 - total_stake)
        .collect();

    let total_ev: f64 = hit_distribution
        .iter()
        .zip(&ev_by_hits)
        .map(|(p, ev)| p * ev)
        .sum();

    let breakeven_hits = (1..=n).find(|&k| ev_by_hits[k] > 0.0).unwrap_or(0);

    if total_ev <= 0.0 || total_ev / total_stake < cfg.multibet.min_spread_edge {
        debug!(label = market_label, total_ev, "spread below edge floor");
        return None;
    }

    let p_at_least_2: f64 = hit_distribution.iter().skip(2).sum();

    Some(MultiBetOpportunity {
        strategy: MultiBetStrategy::Spread,
        description: format!("{market_label} across all {n} maps"),
        total_stake,
        min_payout,
        combined_odds: 0.0,
        p_model: p_at_least_1,
        p_impl: 0.0,
        edge: total_ev / total_stake,
        ev: total_ev,
        details: MultiBetDetails::Spread(SpreadDetails {
            maps: n,
            stake_per_map,
            p_at_least_1,
            p_at_least_2,
            mean_hits,
            breakeven_hits,
            hit_distribution,
            map_probs: map_probs.to_vec(),
            map_odds: map_odds.to_vec(),
        }),
    })
}

/// Evaluate a same-series parlay, penalizing leg correlation.
pub fn analyze_parlay(legs: &[ParlayLeg], cfg: &EngineConfig) -> Option<MultiBetOpportunity> {
    parlay_inner(legs, Some(cfg.multibet.correlation_factor), cfg)
}

/// Evaluate a parlay with one leg per match. Legs from different series
/// are treated as independent, so no correlation penalty applies.
pub fn analyze_cross_match_parlay(
    legs: &[ParlayLeg],
    cfg: &EngineConfig,
) -> Option<MultiBetOpportunity> {
    parlay_inner(legs, None, cfg)
}

fn parlay_inner(
    legs: &[ParlayLeg],
    correlation: Option<f64>,
    cfg: &EngineConfig,
) -> Option<MultiBetOpportunity> {
    if legs.len() < 2 {
        return None;
    }

    let combined_odds: f64 = legs.iter().map(|l| l.odds).product();
    let mut combined_p: f64 = legs.iter().map(|l| l.p_model).product();
    if let Some(corr) = correlation {
        let penalty = 1.0 - corr * (legs.len() - 1) as f64 * 0.5;
        combined_p *= penalty.max(PARLAY_PENALTY_FLOOR);
    }
    combined_p = combined_p.min(PARLAY_P_CAP);

    let p_impl = if combined_odds > 0.0 {
        1.0 / combined_odds
    } else {
        0.0
    };
    let edge = combined_p - p_impl;
    if edge < cfg.multibet.min_parlay_edge {
        return None;
    }

    let cross_match = correlation.is_none();
    let description = if cross_match {
        legs.iter()
            .map(|l| {
                format!(
                    "{}: {}@{}",
                    l.match_label.as_deref().unwrap_or("?"),
                    l.selection,
                    l.odds
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    } else {
        legs.iter()
            .map(|l| format!("{}@{}", l.selection, l.odds))
            .collect::<Vec<_>>()
            .join(" + ")
    };

    Some(MultiBetOpportunity {
        strategy: MultiBetStrategy::Parlay,
        description,
        total_stake: 0.0,
        min_payout: 0.0,
        combined_odds,
        p_model: combined_p,
        p_impl,
        edge,
        ev: 0.0,
        details: MultiBetDetails::Parlay(ParlayDetails {
            legs: legs.to_vec(),
            correlation_factor: correlation,
            cross_match,
        }),
    })
}

/// Search every 2..=max_legs combination of the available bets for +EV
/// same-series parlays. Best ten by edge.
pub fn find_profitable_parlays(
    available: &[ParlayLeg],
    max_legs: usize,
    cfg: &EngineConfig,
) -> Vec<MultiBetOpportunity> {
    let mut results = Vec::new();
    for size in 2..=max_legs {
        for combo in combinations(available, size) {
            if let Some(opp) = analyze_parlay(&combo, cfg) {
                results.push(opp);
            }
        }
    }
    results.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    results.truncate(MAX_PARLAY_RESULTS);
    results
}

/// Scored edges for one match, input to the cross-match parlay search.
#[derive(Clone, Debug)]
pub struct MatchEdges {
    pub match_id: MatchId,
    pub match_label: String,
    pub edges: Vec<EdgeResult>,
}

/// Build +EV parlays taking the single best leg from each of 2..=max_legs
/// different matches. Best ten by edge.
pub fn find_cross_match_parlays(
    matches: &[MatchEdges],
    max_legs: usize,
    cfg: &EngineConfig,
) -> Vec<MultiBetOpportunity> {
    let mut results = Vec::new();
    if matches.len() < 2 {
        return results;
    }

    for size in 2..=max_legs.min(matches.len()) {
        for combo in combinations(matches, size) {
            let mut legs = Vec::with_capacity(size);
            for m in &combo {
                let Some(best) = m
                    .edges
                    .iter()
                    .filter(|e| e.p_model > 0.0 && e.odds > 1.0)
                    .max_by(|a, b| a.edge.total_cmp(&b.edge))
                else {
                    legs.clear();
                    break;
                };
                legs.push(ParlayLeg {
                    market: best.market.clone(),
                    selection: best.selection.clone(),
                    p_model: best.p_model,
                    odds: best.odds,
                    bookmaker: best.bookmaker.clone(),
                    confidence: best.confidence,
                    edge: Some(best.edge),
                    match_id: Some(m.match_id),
                    match_label: Some(m.match_label.clone()),
                });
            }
            if legs.len() == size {
                if let Some(opp) = analyze_cross_match_parlay(&legs, cfg) {
                    results.push(opp);
                }
            }
        }
    }

    results.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    results.truncate(MAX_PARLAY_RESULTS);
    results
}

fn combinations<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    if size == 0 || size > items.len() {
        return out;
    }
    let mut indices: Vec<usize> = (0..size).collect();
    loop {
        out.push(indices.iter().map(|&i| items[i].clone()).collect());
        // Advance to the next lexicographic index combination.
        let mut i = size;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if indices[i] != i + items.len() - size {
                break;
            }
        }
        indices[i] += 1;
        for j in i + 1..size {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

/// One outcome quoted for a dutching calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DutchOutcome {
    pub selection: String,
    pub odds: f64,
    pub bookmaker: String,
}

/// Stake assigned to one dutched outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DutchStake {
    pub selection: String,
    pub bookmaker: String,
    pub odds: f64,
    pub stake: f64,
    pub payout: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DutchResult {
    pub stakes: Vec<DutchStake>,
    pub total_stake: f64,
    pub guaranteed_return: f64,
    pub profit: f64,
    pub is_profitable: bool,
    pub roi_pct: f64,
}

/// Distribute a total stake across mutually exclusive outcomes so every
/// outcome returns the same payout.
///
/// `None` with fewer than two outcomes (a single outcome cannot guarantee
/// anything) or when any quoted odds are non-positive.
pub fn dutch_calculator(outcomes: &[DutchOutcome], total_stake: f64) -> Option<DutchResult> {
    if outcomes.len() < 2 || outcomes.iter().any(|o| o.odds <= 0.0) {
        return None;
    }

    let implied: Vec<f64> = outcomes.iter().map(|o| 1.0 / o.odds).collect();
    let total_implied: f64 = implied.iter().sum();

    let stakes: Vec<DutchStake> = outcomes
        .iter()
        .zip(&implied)
        .map(|(o, p)| {
            let stake = total_stake * (p / total_implied);
            DutchStake {
                selection: o.selection.clone(),
                bookmaker: o.bookmaker.clone(),
                odds: o.odds,
                stake,
                payout: stake * o.odds,
            }
        })
        .collect();

    let guaranteed_return = stakes
        .iter()
        .map(|s| s.payout)
        .fold(f64::INFINITY, f64::min);
    let profit = guaranteed_return - total_stake;

    Some(DutchResult {
        stakes,
        total_stake,
        guaranteed_return,
        profit,
        is_profitable: profit > 0.0,
        roi_pct: if total_stake > 0.0 {
            profit / total_stake * 100.0
        } else {
            0.0
        },
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HedgeResult {
    pub original_stake: f64,
    pub original_odds: f64,
    pub original_payout: f64,
    pub hedge_stake: f64,
    pub hedge_odds: f64,
    pub hedge_payout: f64,
    pub profit_if_original_wins: f64,
    pub profit_if_hedge_wins: f64,
    pub total_invested: f64,
    pub guaranteed_profit: f64,
}

/// Size a hedge on the opposite outcome of an open bet.
///
/// With `lock_profit` the hedge stake equalizes profit across both
/// outcomes; otherwise it only recovers the original stake if the hedge
/// lands. `None` when the hedge odds cannot support the calculation.
pub fn hedge_calculator(
    original_stake: f64,
    original_odds: f64,
    hedge_odds: f64,
    lock_profit: bool,
) -> Option<HedgeResult> {
    if hedge_odds <= 1.0 {
        return None;
    }

    let original_payout = original_stake * original_odds;
    let hedge_stake = if lock_profit {
        original_payout / hedge_odds
    } else {
        original_stake / (hedge_odds - 1.0)
    };
    let profit_if_original = original_payout - original_stake - hedge_stake;
    let profit_if_hedge = hedge_stake * hedge_odds - original_stake - hedge_stake;

    Some(HedgeResult {
        original_stake,
        original_odds,
        original_payout,
        hedge_stake,
        hedge_odds,
        hedge_payout: hedge_stake * hedge_odds,
        profit_if_original_wins: profit_if_original,
        profit_if_hedge_wins: profit_if_hedge,
        total_invested: original_stake + hedge_stake,
        guaranteed_profit: profit_if_original.min(profit_if_hedge),
    })
}

/// Spread a budget across the correct-score lines the model prices above
/// the market, weighting stakes by per-unit expected value.
///
/// `None` when no line is +EV.
pub fn correct_score_coverage(
    score_probs: &[(Scoreline, f64)],
    score_odds: &[(Scoreline, f64)],
    total_budget: f64,
) -> Option<MultiBetOpportunity> {
    let mut lines: Vec<ScoreStake> = Vec::new();
    for (score, p_model) in score_probs {
        let Some((_, odds)) = score_odds.iter().find(|(s, _)| s == score) else {
            continue;
        };
        let p_impl = if *odds > 0.0 { 1.0 / odds } else { 0.0 };
        let edge = p_model - p_impl;
        if edge > 0.0 {
            lines.push(ScoreStake {
                score: *score,
                p_model: *p_model,
                odds: *odds,
                p_impl,
                edge,
                ev_per_unit: p_model * odds - 1.0,
                stake: 0.0,
                potential_return: 0.0,
            });
        }
    }

    if lines.is_empty() {
        return None;
    }
    lines.sort_by(|a, b| b.ev_per_unit.total_cmp(&a.ev_per_unit));

    let total_ev_units: f64 = lines.iter().map(|l| l.ev_per_unit.max(0.0)).sum();
    let n = lines.len();
    for line in &mut lines {
        line.stake = if total_ev_units > 0.0 {
            total_budget * line.ev_per_unit / total_ev_units
        } else {
            total_budget / n as f64
        };
        line.potential_return = line.stake * line.odds;
    }

    let total_stake: f64 = lines.iter().map(|l| l.stake).sum();
    let combined_p: f64 = lines.iter().map(|l| l.p_model).sum();
    let expected_return: f64 = lines.iter().map(|l| l.p_model * l.potential_return).sum();
    let ev = expected_return - total_stake;

    let covered: Vec<String> = lines.iter().map(|l| l.score.to_string()).collect();
    Some(MultiBetOpportunity {
        strategy: MultiBetStrategy::CorrectScore,
        description: format!("Correct score coverage: {}", covered.join(", ")),
        total_stake,
        min_payout: 0.0,
        combined_odds: 0.0,
        p_model: combined_p,
        p_impl: 0.0,
        edge: if total_stake > 0.0 {
            ev / total_stake
        } else {
            0.0
        },
        ev,
        details: MultiBetDetails::CorrectScore(CorrectScoreDetails {
            scores: lines,
            expected_return,
        }),
    })
}
