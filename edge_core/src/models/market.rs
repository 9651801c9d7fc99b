//! Tagged market keys.
//!
//! Odds feeds and the presentation layer speak a string wire format:
//! `market_type|mapN?|selection`, all lower-cased, e.g.
//! `map1_winner|map1|nrg` or `correct_score||2-0`. Internally the engine
//! uses this tagged type so the map-winner prob for map 2 can never be
//! joined against a map 3 quote by a string concatenation slip. The wire
//! string is parsed and rendered only at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market family a key belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Winner of a single map ("mapN_winner").
    MapWinner,
    /// Map goes to overtime ("mapN_ot").
    MapOvertime,
    /// Exact series scoreline ("correct_score").
    CorrectScore,
    /// Series exceeds 3.5 maps ("over_3.5_maps").
    OverMaps,
    /// Any market type the engine has no model for yet. Kept verbatim so
    /// unmatched odds still group correctly in the arbitrage detector.
    Other(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarketKeyError {
    #[error("empty market key")]
    Empty,
    #[error("malformed market key: {0:?}")]
    Malformed(String),
}

/// Normalized market lookup key: kind, optional map number, selection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub kind: MarketKind,
    pub map_number: Option<u8>,
    /// Lower-cased, trimmed selection (team alias, "yes"/"no", scoreline).
    pub selection: String,
}

impl MarketKey {
    /// Build from the raw fields carried on an odds row.
    ///
    /// `map_number` on the row wins; otherwise the number embedded in a
    /// "mapN_*" market type string is used.
    pub fn from_parts(market_type: &str, map_number: Option<u8>, selection: &str) -> MarketKey {
        let mt = market_type.trim().to_lowercase();
        let (kind, embedded) = parse_market_type(&mt);
        MarketKey {
            kind,
            map_number: map_number.or(embedded),
            selection: selection.trim().to_lowercase(),
        }
    }

    pub fn map_winner(map_number: u8, selection: &str) -> MarketKey {
        MarketKey {
            kind: MarketKind::MapWinner,
            map_number: Some(map_number),
            selection: selection.trim().to_lowercase(),
        }
    }

    pub fn map_overtime(map_number: u8, yes: bool) -> MarketKey {
        MarketKey {
            kind: MarketKind::MapOvertime,
            map_number: Some(map_number),
            selection: if yes { "yes" } else { "no" }.to_string(),
        }
    }

    pub fn correct_score(score: &str) -> MarketKey {
        MarketKey {
            kind: MarketKind::CorrectScore,
            map_number: None,
            selection: score.trim().to_lowercase(),
        }
    }

    pub fn over_maps(yes: bool) -> MarketKey {
        MarketKey {
            kind: MarketKind::OverMaps,
            map_number: None,
            selection: if yes { "yes" } else { "no" }.to_string(),
        }
    }

    /// Wire market-type segment, e.g. "map1_winner".
    pub fn market_type(&self) -> String {
        match &self.kind {
            MarketKind::MapWinner => match self.map_number {
                Some(n) => format!("map{n}_winner"),
                None => "map_winner".to_string(),
            },
            MarketKind::MapOvertime => match self.map_number {
                Some(n) => format!("map{n}_ot"),
                None => "map_ot".to_string(),
            },
            MarketKind::CorrectScore => "correct_score".to_string(),
            MarketKind::OverMaps => "over_3.5_maps".to_string(),
            MarketKind::Other(s) => s.clone(),
        }
    }
}

impl fmt::Display for MarketKey {
    /// Renders the external wire format: `market_type|mapN?|selection`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map_seg = match self.map_number {
            Some(n) => format!("map{n}"),
            None => String::new(),
        };
        write!(f, "{}|{}|{}", self.market_type(), map_seg, self.selection)
    }
}

impl FromStr for MarketKey {
    type Err = MarketKeyError;

    /// Accepts both three-segment (`mt|mapN|sel`, empty map segment allowed)
    /// and two-segment (`mt|sel`) keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(MarketKeyError::Empty);
        }
        let parts: Vec<&str> = s.split('|').collect();
        let (mt, map_seg, sel) = match parts.as_slice() {
            [mt, map_seg, sel] => (*mt, *map_seg, *sel),
            [mt, sel] => (*mt, "", *sel),
            _ => return Err(MarketKeyError::Malformed(s.to_string())),
        };
        let map_number = if map_seg.is_empty() {
            None
        } else {
            Some(
                parse_map_segment(map_seg)
                    .ok_or_else(|| MarketKeyError::Malformed(s.to_string()))?,
            )
        };
        Ok(MarketKey::from_parts(mt, map_number, sel))
    }
}

fn parse_map_segment(seg: &str) -> Option<u8> {
    seg.trim()
        .to_lowercase()
        .strip_prefix("map")?
        .parse()
        .ok()
}

/// Split a wire market-type string into kind and embedded map number.
fn parse_market_type(mt: &str) -> (MarketKind, Option<u8>) {
    match mt {
        "correct_score" => return (MarketKind::CorrectScore, None),
        "over_3.5_maps" | "over_maps" => return (MarketKind::OverMaps, None),
        "map_winner" => return (MarketKind::MapWinner, None),
        "map_ot" => return (MarketKind::MapOvertime, None),
        _ => {}
    }
    if let Some(rest) = mt.strip_prefix("map") {
        if let Some((digits, suffix)) = rest.split_once('_') {
            if let Ok(n) = digits.parse::<u8>() {
                match suffix {
                    "winner" => return (MarketKind::MapWinner, Some(n)),
                    "ot" => return (MarketKind::MapOvertime, Some(n)),
                    _ => {}
                }
            }
        }
    }
    (MarketKind::Other(mt.to_string()), None)
}
