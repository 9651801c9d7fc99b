//! Statistics aggregator: per-team-per-map aggregates, head-to-head records
//! and map-wide baselines, all under an explicit scope filter.
//!
//! Absent rows are never an error; they produce zero counters, and derived
//! rates fall back to the defaults documented on [`TeamMapStats`].

use tracing::debug;

use crate::config::ScopeFilter;
use crate::models::{GlobalMapStats, HeadToHeadRecord, SeriesFormat, Side, TeamId, TeamMapStats};
use crate::store::{HistoryStore, MapQuery, MapRecord};

/// Threshold on total rounds above which a map counts as "close".
const CLOSE_MAP_ROUNDS: u32 = 23;
/// Round differential at or above which a map counts as a stomp.
const STOMP_ROUND_DIFF: u32 = 7;
/// Pistol rounds per map (one per half).
const PISTOLS_PER_MAP: u32 = 2;

/// Aggregate one team's record on one map under a scope.
///
/// Attack/defense round denominators are estimated as
/// `max(12, ceil(total_rounds / 2))` per map because explicit per-side
/// round totals are not guaranteed in the history. Treat the side rates as
/// an approximation, not exact accounting.
pub fn team_map_stats(
    store: &dyn HistoryStore,
    team: TeamId,
    map_name: &str,
    scope: &ScopeFilter,
    format: Option<SeriesFormat>,
) -> TeamMapStats {
    let maps = store.completed_maps(&MapQuery {
        map_name: Some(map_name),
        team: Some(team),
        scope: scope.clone(),
        format,
        ..Default::default()
    });

    let mut stats = TeamMapStats {
        team: Some(team),
        map_name: map_name.to_string(),
        ..Default::default()
    };

    let map_ids: Vec<_> = maps.iter().map(|m| m.id).collect();
    for rec in &maps {
        accumulate_map(&mut stats, rec, team);
    }

    if stats.games_played > 0 {
        let n = stats.games_played as f64;
        stats.avg_rounds_won /= n;
        stats.avg_rounds_lost /= n;
        stats.avg_round_diff /= n;
    }

    // Pistol side attribution needs round-level data: the winners of rounds
    // 1 and 13 are the pistol winners of each half.
    if !map_ids.is_empty() {
        for round in store.rounds(&map_ids) {
            if round.winner != Some(team) {
                continue;
            }
            if round.round_number != 1 && round.round_number != 13 {
                continue;
            }
            match round.winner_side {
                Some(Side::Attack) => stats.pistol_atk_won += 1,
                Some(Side::Defense) => stats.pistol_def_won += 1,
                None => {}
            }
        }
        stats.pistol_atk_played = stats.games_played;
        stats.pistol_def_played = stats.games_played;
    }

    debug!(
        team = team.0,
        map = map_name,
        games = stats.games_played,
        wins = stats.wins,
        "aggregated team map stats"
    );
    stats
}

fn accumulate_map(stats: &mut TeamMapStats, rec: &MapRecord, team: TeamId) {
    let is_team1 = rec.team1 == team;
    stats.games_played += 1;
    if stats.team_name.is_empty() {
        stats.team_name = if is_team1 {
            rec.team1_name.clone()
        } else {
            rec.team2_name.clone()
        };
    }

    let (my_score, opp_score) = rec.scores_for(team);
    if rec.winner == Some(team) {
        stats.wins += 1;
    } else {
        stats.losses += 1;
    }

    stats.avg_rounds_won += my_score as f64;
    stats.avg_rounds_lost += opp_score as f64;
    stats.avg_round_diff += my_score as f64 - opp_score as f64;

    if rec.is_ot {
        stats.ot_count += 1;
    }

    let total = my_score + opp_score;
    if total >= CLOSE_MAP_ROUNDS {
        stats.close_maps += 1;
    }
    let diff = my_score.abs_diff(opp_score);
    if diff >= STOMP_ROUND_DIFF {
        if rec.winner == Some(team) {
            stats.stomps_won += 1;
        } else {
            stats.stomps_lost += 1;
        }
    }

    let (my_atk, my_def, my_pistols, my_conversions) = if is_team1 {
        (
            rec.team1_atk_rounds.unwrap_or(0),
            rec.team1_def_rounds.unwrap_or(0),
            rec.team1_pistols_won,
            rec.team1_pistol_conversions,
        )
    } else {
        (
            rec.team2_atk_rounds.unwrap_or(0),
            rec.team2_def_rounds.unwrap_or(0),
            rec.team2_pistols_won,
            rec.team2_pistol_conversions,
        )
    };

    stats.atk_rounds_won += my_atk;
    stats.def_rounds_won += my_def;
    // Estimated rounds per side; see function docs.
    let half_rounds = (total.div_ceil(2)).max(12);
    stats.atk_rounds_played += half_rounds;
    stats.def_rounds_played += half_rounds;

    stats.pistols_won += my_pistols;
    stats.pistols_played += PISTOLS_PER_MAP;
    stats.pistol_conversions += my_conversions;
}

/// Head-to-head record between two teams, optionally restricted to one map.
pub fn head_to_head(
    store: &dyn HistoryStore,
    team_a: TeamId,
    team_b: TeamId,
    map_name: Option<&str>,
    scope: &ScopeFilter,
    format: Option<SeriesFormat>,
) -> HeadToHeadRecord {
    let maps = store.completed_maps(&MapQuery {
        map_name,
        pair: Some((team_a, team_b)),
        scope: scope.clone(),
        format,
        ..Default::default()
    });

    let mut rec = HeadToHeadRecord::default();
    for m in &maps {
        rec.total_maps += 1;
        if m.winner == Some(team_a) {
            rec.a_wins += 1;
        } else if m.winner == Some(team_b) {
            rec.b_wins += 1;
        }
        if m.is_ot {
            rec.ot_count += 1;
        }
    }
    rec
}

/// Map-wide baseline statistics across all teams under a scope.
pub fn global_map_stats(
    store: &dyn HistoryStore,
    map_name: &str,
    scope: &ScopeFilter,
    format: Option<SeriesFormat>,
) -> GlobalMapStats {
    let maps = store.completed_maps(&MapQuery {
        map_name: Some(map_name),
        scope: scope.clone(),
        format,
        ..Default::default()
    });

    let mut stats = GlobalMapStats::default();
    let mut round_sum = 0u32;
    for m in &maps {
        stats.total_maps += 1;
        if m.is_ot {
            stats.ot_count += 1;
        }
        let total = m.total_rounds();
        if total >= CLOSE_MAP_ROUNDS {
            stats.close_count += 1;
        }
        round_sum += total;
    }
    if stats.total_maps > 0 {
        stats.avg_total_rounds = round_sum as f64 / stats.total_maps as f64;
    }
    stats
}
