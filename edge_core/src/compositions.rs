//! Agent composition analysis: role classification, per-composition win
//! rates and matchup advantage scoring.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::config::ScopeFilter;
use crate::models::{SeriesFormat, TeamId};
use crate::store::{HistoryStore, MapQuery};

/// Known agents per role, lower-case. Unknown agents are reported rather
/// than silently dropped so roster patches show up in logs.
const ROLE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "controller",
        &["omen", "brimstone", "viper", "astra", "harbor", "clove"],
    ),
    (
        "duelist",
        &["jett", "raze", "reyna", "phoenix", "neon", "yoru", "iso", "waylay"],
    ),
    (
        "initiator",
        &["sova", "breach", "skye", "kayo", "fade", "gekko", "tejo"],
    ),
    (
        "sentinel",
        &["killjoy", "cypher", "sage", "chamber", "deadlock", "vyse"],
    ),
];

/// Weight of team-specific record vs the cross-team meta record when
/// scoring a composition matchup.
const TEAM_WEIGHT: f64 = 0.6;
const META_WEIGHT: f64 = 0.4;

/// Role counts of a five-agent composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub controller: u32,
    pub duelist: u32,
    pub initiator: u32,
    pub sentinel: u32,
}

/// Classify agents into role counts, returning any agents that did not
/// match a known role.
pub fn classify(agents: &[String]) -> (RoleCounts, Vec<String>) {
    let mut roles = RoleCounts::default();
    let mut unclassified = Vec::new();
    for agent in agents {
        let a = agent.trim().to_lowercase();
        if a.is_empty() {
            continue;
        }
        let mut matched = false;
        for (role, names) in ROLE_KEYWORDS {
            if names.contains(&a.as_str()) {
                match *role {
                    "controller" => roles.controller += 1,
                    "duelist" => roles.duelist += 1,
                    "initiator" => roles.initiator += 1,
                    _ => roles.sentinel += 1,
                }
                matched = true;
                break;
            }
        }
        if !matched {
            unclassified.push(a);
        }
    }
    (roles, unclassified)
}

/// Deterministic digest of an agent list, insensitive to order, case and
/// surrounding whitespace. Truncated SHA-256 over the sorted agents joined
/// with `|`.
pub fn composition_hash(agents: &[String]) -> String {
    let mut sorted: Vec<String> = agents
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    sorted.sort();
    let digest = Sha256::digest(sorted.join("|").as_bytes());
    let mut hex = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Historical record of one composition on one map, team-specific when
/// `team` is set, cross-team meta otherwise.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompWinrate {
    pub comp_hash: String,
    pub agents: Vec<String>,
    pub map_name: String,
    pub team: Option<TeamId>,
    pub total: u32,
    pub wins: u32,
    pub ot_count: u32,
    pub close_count: u32,
    pub roles: RoleCounts,
    pub unclassified: Vec<String>,
}

impl CompWinrate {
    pub fn winrate(&self) -> f64 {
        if self.total == 0 {
            0.5
        } else {
            self.wins as f64 / self.total as f64
        }
    }

    /// None when the composition has never been observed.
    pub fn ot_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.ot_count as f64 / self.total as f64)
        }
    }

    pub fn close_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.close_count as f64 / self.total as f64)
        }
    }
}

/// Win rate of one composition on a map, either for one team or across
/// all teams that have fielded it.
pub fn composition_winrate(
    store: &dyn HistoryStore,
    agents: &[String],
    map_name: &str,
    team: Option<TeamId>,
    scope: &ScopeFilter,
    format: Option<SeriesFormat>,
) -> CompWinrate {
    let chash = composition_hash(agents);
    let (roles, unclassified) = classify(agents);

    let maps = store.completed_maps(&MapQuery {
        map_name: Some(map_name),
        team,
        scope: scope.clone(),
        format,
        ..Default::default()
    });
    let map_ids: Vec<_> = maps.iter().map(|m| m.id).collect();

    let mut out = CompWinrate {
        comp_hash: chash.clone(),
        agents: agents.to_vec(),
        map_name: map_name.to_string(),
        team,
        roles,
        unclassified,
        ..Default::default()
    };

    for comp in store.compositions_for_maps(&map_ids) {
        if comp.comp_hash != chash {
            continue;
        }
        if let Some(t) = team {
            if comp.team != t {
                continue;
            }
        }
        let Some(map) = maps.iter().find(|m| m.id == comp.map_id) else {
            continue;
        };
        out.total += 1;
        if map.winner == Some(comp.team) {
            out.wins += 1;
        }
        if map.is_ot {
            out.ot_count += 1;
        }
        if map.total_rounds() >= 23 {
            out.close_count += 1;
        }
    }

    trace!(
        map = map_name,
        hash = %chash,
        total = out.total,
        "composition winrate"
    );
    out
}

/// Composition matchup comparison for one map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchupAdvantage {
    /// False when none of the four underlying records have any data.
    pub has_data: bool,
    /// P(team A favored) implied by the composition records, 0.5 when flat.
    pub p_a_advantage: f64,
    /// Average OT rate over the records that have data.
    pub ot_rate: Option<f64>,
    pub a_team: CompWinrate,
    pub b_team: CompWinrate,
    pub a_meta: CompWinrate,
    pub b_meta: CompWinrate,
}

/// Score two compositions against each other, blending each team's own
/// record on its composition with the cross-team meta record.
pub fn matchup_advantage(
    store: &dyn HistoryStore,
    team_a: TeamId,
    team_b: TeamId,
    map_name: &str,
    comp_a: &[String],
    comp_b: &[String],
    scope: &ScopeFilter,
    format: Option<SeriesFormat>,
) -> MatchupAdvantage {
    let a_team = composition_winrate(store, comp_a, map_name, Some(team_a), scope, format);
    let b_team = composition_winrate(store, comp_b, map_name, Some(team_b), scope, format);
    let a_meta = composition_winrate(store, comp_a, map_name, None, scope, format);
    let b_meta = composition_winrate(store, comp_b, map_name, None, scope, format);

    let has_data = a_team.total + b_team.total + a_meta.total + b_meta.total > 0;

    let a_score = TEAM_WEIGHT * a_team.winrate() + META_WEIGHT * a_meta.winrate();
    let b_score = TEAM_WEIGHT * b_team.winrate() + META_WEIGHT * b_meta.winrate();
    let total = a_score + b_score;
    let p_a = if total > 0.0 { a_score / total } else { 0.5 };

    let ot_values: Vec<f64> = [&a_team, &b_team, &a_meta, &b_meta]
        .iter()
        .filter_map(|c| c.ot_rate())
        .collect();
    let ot_rate = if ot_values.is_empty() {
        None
    } else {
        Some(ot_values.iter().sum::<f64>() / ot_values.len() as f64)
    };

    MatchupAdvantage {
        has_data,
        p_a_advantage: p_a,
        ot_rate,
        a_team,
        b_team,
        a_meta,
        b_meta,
    }
}

/// One of a team's recurring compositions on a map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompUsage {
    pub comp_hash: String,
    pub agents: Vec<String>,
    pub roles: RoleCounts,
    pub used: u32,
    pub wins: u32,
}

impl CompUsage {
    pub fn winrate(&self) -> f64 {
        if self.used == 0 {
            0.0
        } else {
            self.wins as f64 / self.used as f64
        }
    }
}

/// The `limit` most-used compositions a team has fielded on a map.
///
/// Ties on usage break by composition hash so the ordering is stable.
pub fn likely_compositions(
    store: &dyn HistoryStore,
    team: TeamId,
    map_name: &str,
    scope: &ScopeFilter,
    limit: usize,
) -> Vec<CompUsage> {
    let maps = store.completed_maps(&MapQuery {
        map_name: Some(map_name),
        team: Some(team),
        scope: scope.clone(),
        ..Default::default()
    });
    let map_ids: Vec<_> = maps.iter().map(|m| m.id).collect();

    let mut usage: Vec<CompUsage> = Vec::new();
    for comp in store.compositions_for_maps(&map_ids) {
        if comp.team != team {
            continue;
        }
        let won = maps
            .iter()
            .find(|m| m.id == comp.map_id)
            .is_some_and(|m| m.winner == Some(team));

        match usage.iter_mut().find(|u| u.comp_hash == comp.comp_hash) {
            Some(entry) => {
                entry.used += 1;
                if won {
                    entry.wins += 1;
                }
            }
            None => {
                let (roles, _) = classify(&comp.agents);
                usage.push(CompUsage {
                    comp_hash: comp.comp_hash.clone(),
                    agents: comp.agents.clone(),
                    roles,
                    used: 1,
                    wins: u32::from(won),
                });
            }
        }
    }

    usage.sort_by(|a, b| b.used.cmp(&a.used).then(a.comp_hash.cmp(&b.comp_hash)));
    usage.truncate(limit);
    usage
}
