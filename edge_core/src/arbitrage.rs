//! Cross-bookmaker arbitrage and odds anomaly detection.
//!
//! A surebet exists when the best available odds across bookmakers imply
//! probabilities summing below 1 for a mutually exclusive market. Short of
//! that, a large spread between bookmakers on the same selection is flagged
//! as an anomaly worth a manual look.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::MatchId;
use crate::store::HistoryStore;

/// Relative odds spread between bookmakers above which a selection is
/// flagged even without a full surebet.
const ANOMALY_SPREAD: f64 = 0.08;

/// Best live quote for one selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestQuote {
    pub selection: String,
    pub bookmaker: String,
    pub odds: f64,
}

/// Guaranteed-profit opportunity across bookmakers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Surebet {
    pub market_type: String,
    pub map_number: Option<u8>,
    /// Sum of implied probabilities at the best odds, below 1.
    pub implied_sum: f64,
    /// Guaranteed margin as a percentage of total stake.
    pub margin_pct: f64,
    pub selections: Vec<BestQuote>,
    pub description: String,
}

/// Suspicious cross-bookmaker disagreement on a single selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub market_type: String,
    pub map_number: Option<u8>,
    pub implied_sum: f64,
    pub overround_pct: f64,
    pub selection: String,
    /// (bookmaker, odds) per live quote on this selection.
    pub quotes: Vec<(String, f64)>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArbFinding {
    Surebet(Surebet),
    Anomaly(Anomaly),
}

/// Scan every market of a match for surebets and anomalies.
///
/// Only the latest quote per bookmaker counts. Markets are walked in key
/// order so the output is stable.
pub fn detect(store: &dyn HistoryStore, match_id: MatchId) -> Vec<ArbFinding> {
    let odds = store.odds_for_match(match_id);

    // market -> selection -> (bookmaker, latest odds); input is newest
    // first, so first write per bookmaker wins.
    type SelectionQuotes = BTreeMap<String, BTreeMap<String, f64>>;
    let mut markets: BTreeMap<(String, Option<u8>), SelectionQuotes> = BTreeMap::new();
    for entry in &odds {
        markets
            .entry((entry.market_type.clone(), entry.map_number))
            .or_default()
            .entry(entry.selection.clone())
            .or_default()
            .entry(entry.bookmaker.clone())
            .or_insert(entry.odds_value);
    }

    let mut findings = Vec::new();
    for ((market_type, map_number), selections) in &markets {
        if selections.len() < 2 {
            continue;
        }

        let best: Vec<BestQuote> = selections
            .iter()
            .filter_map(|(sel, quotes)| {
                quotes
                    .iter()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(bookmaker, odds)| BestQuote {
                        selection: sel.clone(),
                        bookmaker: bookmaker.clone(),
                        odds: *odds,
                    })
            })
            .collect();
        if best.iter().any(|q| q.odds <= 0.0) {
            continue;
        }
        let implied_sum: f64 = best.iter().map(|q| 1.0 / q.odds).sum();

        if implied_sum < 1.0 {
            let margin_pct = (1.0 - implied_sum) * 100.0;
            let map_label = map_number.map(|n| format!(" map{n}")).unwrap_or_default();
            info!(market = %market_type, margin_pct, "surebet detected");
            findings.push(ArbFinding::Surebet(Surebet {
                market_type: market_type.clone(),
                map_number: *map_number,
                implied_sum,
                margin_pct,
                selections: best,
                description: format!(
                    "SUREBET {market_type}{map_label}: margin={margin_pct:.2}%"
                ),
            }));
            continue;
        }

        let overround_pct = (implied_sum - 1.0) * 100.0;
        for (sel, quotes) in selections {
            if quotes.len() < 2 {
                continue;
            }
            let max_o = quotes.values().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let min_o = quotes.values().fold(f64::INFINITY, |a, &b| a.min(b));
            if min_o > 0.0 && (max_o - min_o) / min_o > ANOMALY_SPREAD {
                findings.push(ArbFinding::Anomaly(Anomaly {
                    market_type: market_type.clone(),
                    map_number: *map_number,
                    implied_sum,
                    overround_pct,
                    selection: sel.clone(),
                    quotes: quotes.iter().map(|(b, o)| (b.clone(), *o)).collect(),
                    description: format!(
                        "ANOMALY {market_type} {sel}: spread={:.2} ({min_o} vs {max_o})",
                        max_o - min_o
                    ),
                }));
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::MarketOddsEntry;
    use crate::store::MemoryStore;

    fn push(
        store: &mut MemoryStore,
        bookmaker: &str,
        selection: &str,
        odds: f64,
        hours_ago: i64,
    ) {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        store.push_odds(
            MatchId(1),
            MarketOddsEntry {
                bookmaker: bookmaker.to_string(),
                market_type: "map1_winner".to_string(),
                selection: selection.to_string(),
                map_number: Some(1),
                odds_value: odds,
                observed_at: t0 - Duration::hours(hours_ago),
            },
        );
    }

    #[test]
    fn detects_surebet_with_expected_margin() {
        let mut store = MemoryStore::new();
        push(&mut store, "bookie1", "nrg", 2.10, 0);
        push(&mut store, "bookie2", "sen", 2.10, 0);

        let findings = detect(&store, MatchId(1));
        assert_eq!(findings.len(), 1);
        let ArbFinding::Surebet(arb) = &findings[0] else {
            panic!("expected a surebet");
        };
        // 1/2.1 + 1/2.1 = 0.9524, margin about 4.76%.
        assert!((arb.implied_sum - 2.0 / 2.1).abs() < 1e-9);
        assert!((arb.margin_pct - 4.7619).abs() < 0.001);
        assert_eq!(arb.selections.len(), 2);
    }

    #[test]
    fn surebet_uses_best_odds_per_selection() {
        let mut store = MemoryStore::new();
        push(&mut store, "bookie1", "nrg", 1.90, 0);
        push(&mut store, "bookie2", "nrg", 2.10, 0);
        push(&mut store, "bookie1", "sen", 2.10, 0);
        push(&mut store, "bookie2", "sen", 1.85, 0);

        let findings = detect(&store, MatchId(1));
        let ArbFinding::Surebet(arb) = &findings[0] else {
            panic!("expected a surebet");
        };
        let nrg = arb.selections.iter().find(|q| q.selection == "nrg").unwrap();
        assert_eq!(nrg.bookmaker, "bookie2");
        assert_eq!(nrg.odds, 2.10);
    }

    #[test]
    fn stale_quotes_do_not_trigger_findings() {
        let mut store = MemoryStore::new();
        // bookie1 once had nrg at 2.4 but the live quote is 1.85.
        push(&mut store, "bookie1", "nrg", 2.40, 5);
        push(&mut store, "bookie1", "nrg", 1.85, 0);
        push(&mut store, "bookie2", "nrg", 1.90, 0);
        push(&mut store, "bookie1", "sen", 1.90, 0);

        let findings = detect(&store, MatchId(1));
        assert!(
            findings.is_empty(),
            "live odds carry no surebet or anomaly: {findings:?}"
        );
    }

    #[test]
    fn wide_spread_on_one_selection_is_an_anomaly() {
        let mut store = MemoryStore::new();
        push(&mut store, "bookie1", "nrg", 1.70, 0);
        push(&mut store, "bookie2", "nrg", 2.05, 0);
        push(&mut store, "bookie1", "sen", 1.90, 0);

        let findings = detect(&store, MatchId(1));
        assert_eq!(findings.len(), 1);
        let ArbFinding::Anomaly(anomaly) = &findings[0] else {
            panic!("expected an anomaly");
        };
        assert_eq!(anomaly.selection, "nrg");
        assert_eq!(anomaly.quotes.len(), 2);
        assert!(anomaly.overround_pct > 0.0);
    }

    #[test]
    fn single_selection_markets_are_ignored() {
        let mut store = MemoryStore::new();
        push(&mut store, "bookie1", "nrg", 1.50, 0);
        push(&mut store, "bookie2", "nrg", 2.50, 0);
        assert!(detect(&store, MatchId(1)).is_empty());
    }

    #[test]
    fn no_odds_no_findings() {
        let store = MemoryStore::new();
        assert!(detect(&store, MatchId(1)).is_empty());
    }
}
