//! Exact best-of-N series outcome distribution.
//!
//! Given per-map win probabilities for team A, walks every reachable
//! (a_wins, b_wins) state of the series and accumulates the probability of
//! each terminal scoreline. Exact and deterministic, so the same inputs
//! always produce the same market probabilities downstream.

use std::collections::BTreeMap;

use tracing::trace;

use crate::models::{Scoreline, SeriesDistribution, SeriesFormat};

/// Compute the full series outcome distribution.
///
/// `map_probs[i]` is P(team A wins map i+1). Shorter inputs are padded with
/// their last value (0.5 when empty); extra entries are ignored. Each
/// probability is clamped to [0, 1].
pub fn series_distribution(map_probs: &[f64], format: SeriesFormat) -> SeriesDistribution {
    let maps_to_win = format.maps_to_win();
    let max_maps = format.max_maps() as usize;

    let mut probs: Vec<f64> = map_probs
        .iter()
        .take(max_maps)
        .map(|p| p.clamp(0.0, 1.0))
        .collect();
    let pad = probs.last().copied().unwrap_or(0.5);
    probs.resize(max_maps, pad);

    let mut score_probs: BTreeMap<Scoreline, f64> = BTreeMap::new();
    // live[(a, b)] = P(series reaches a-b with neither side finished).
    let mut live: BTreeMap<(u8, u8), f64> = BTreeMap::new();
    live.insert((0, 0), 1.0);

    while let Some(((a, b), mass)) = live.pop_first() {
        let p_a = probs[(a + b) as usize];

        for (won_a, p) in [(true, p_a), (false, 1.0 - p_a)] {
            if p == 0.0 {
                continue;
            }
            let (na, nb) = if won_a { (a + 1, b) } else { (a, b + 1) };
            if na == maps_to_win || nb == maps_to_win {
                *score_probs.entry(Scoreline { a: na, b: nb }).or_insert(0.0) += mass * p;
            } else {
                *live.entry((na, nb)).or_insert(0.0) += mass * p;
            }
        }
    }

    let mut dist = SeriesDistribution {
        score_probs,
        ..Default::default()
    };
    for (score, p) in &dist.score_probs {
        if score.a == maps_to_win {
            dist.p_a_series += p;
        } else {
            dist.p_b_series += p;
        }
        *dist.total_maps_dist.entry(score.total_maps()).or_insert(0.0) += p;
    }

    match format {
        SeriesFormat::Bo5 => {
            dist.p_over_3_5_maps = Some(
                dist.total_maps_dist
                    .iter()
                    .filter(|(maps, _)| **maps >= 4)
                    .map(|(_, p)| p)
                    .sum(),
            );
        }
        SeriesFormat::Bo3 => {
            dist.p_exactly_3_maps = Some(dist.total_maps_dist.get(&3).copied().unwrap_or(0.0));
        }
    }

    trace!(
        p_a = dist.p_a_series,
        outcomes = dist.score_probs.len(),
        "series distribution"
    );
    dist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(a: u8, b: u8) -> Scoreline {
        Scoreline { a, b }
    }

    #[test]
    fn distribution_sums_to_one() {
        for probs in [
            vec![0.5],
            vec![0.62, 0.55, 0.41],
            vec![0.9, 0.1, 0.5, 0.3, 0.7],
        ] {
            for format in [SeriesFormat::Bo3, SeriesFormat::Bo5] {
                let dist = series_distribution(&probs, format);
                let total: f64 = dist.score_probs.values().sum();
                assert!((total - 1.0).abs() < 1e-12, "scores sum to {total}");
                assert!((dist.p_a_series + dist.p_b_series - 1.0).abs() < 1e-12);
                let maps_total: f64 = dist.total_maps_dist.values().sum();
                assert!((maps_total - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn certain_winner_sweeps() {
        let dist = series_distribution(&[1.0, 1.0], SeriesFormat::Bo3);
        assert_eq!(dist.score_probs.get(&score(2, 0)), Some(&1.0));
        assert_eq!(dist.p_a_series, 1.0);
        assert_eq!(dist.p_exactly_3_maps, Some(0.0));

        let dist = series_distribution(&[0.0], SeriesFormat::Bo5);
        assert_eq!(dist.score_probs.get(&score(0, 3)), Some(&1.0));
        assert_eq!(dist.p_b_series, 1.0);
        assert_eq!(dist.p_over_3_5_maps, Some(0.0));
    }

    #[test]
    fn coin_flip_bo3_is_symmetric() {
        let dist = series_distribution(&[0.5, 0.5, 0.5], SeriesFormat::Bo3);
        assert!((dist.p_a_series - 0.5).abs() < 1e-12);
        // P(2-0) = 0.25, P(2-1) = 0.25 on each side.
        assert!((dist.score_probs[&score(2, 0)] - 0.25).abs() < 1e-12);
        assert!((dist.score_probs[&score(2, 1)] - 0.25).abs() < 1e-12);
        assert!((dist.score_probs[&score(0, 2)] - 0.25).abs() < 1e-12);
        assert!((dist.p_exactly_3_maps.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn per_map_probabilities_are_respected() {
        // A wins map 1 for sure, then 50/50.
        let dist = series_distribution(&[1.0, 0.5, 0.5], SeriesFormat::Bo3);
        assert_eq!(dist.score_probs.get(&score(0, 2)), None);
        assert!((dist.score_probs[&score(2, 0)] - 0.5).abs() < 1e-12);
        assert!((dist.score_probs[&score(2, 1)] - 0.25).abs() < 1e-12);
        assert!((dist.score_probs[&score(1, 2)] - 0.25).abs() < 1e-12);
        assert!((dist.p_a_series - 0.75).abs() < 1e-12);
    }

    #[test]
    fn short_inputs_pad_with_last_value() {
        // [0.7] behaves as [0.7, 0.7, 0.7].
        let padded = series_distribution(&[0.7], SeriesFormat::Bo3);
        let explicit = series_distribution(&[0.7, 0.7, 0.7], SeriesFormat::Bo3);
        assert_eq!(padded, explicit);

        // Empty input behaves as a pure coin flip.
        let empty = series_distribution(&[], SeriesFormat::Bo3);
        assert!((empty.p_a_series - 0.5).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let dist = series_distribution(&[1.7, -0.2], SeriesFormat::Bo3);
        let clamped = series_distribution(&[1.0, 0.0], SeriesFormat::Bo3);
        assert_eq!(dist, clamped);
    }

    #[test]
    fn bo5_over_threshold_probability() {
        let dist = series_distribution(&[0.5; 5], SeriesFormat::Bo5);
        let long: f64 = dist
            .total_maps_dist
            .iter()
            .filter(|(maps, _)| **maps >= 4)
            .map(|(_, p)| p)
            .sum();
        assert!((dist.p_over_3_5_maps.unwrap() - long).abs() < 1e-12);
        // P(3-0 or 0-3) = 2 * 0.125, so P(>3.5 maps) = 0.75.
        assert!((dist.p_over_3_5_maps.unwrap() - 0.75).abs() < 1e-12);
        assert!(dist.p_exactly_3_maps.is_none());
    }
}
