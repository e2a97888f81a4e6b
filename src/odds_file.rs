use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::warn;

use crate::records::{PropLine, STAT_ASSISTS, STAT_POINTS, STAT_TOTAL_REBOUNDS};
use crate::sources::OddsSource;

#[derive(Debug, Clone, Deserialize)]
struct OddsDocument {
    game_id: String,
    #[serde(default)]
    players: BTreeMap<String, PlayerOdds>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerOdds {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lines: BTreeMap<String, f64>,
}

/// Prop lines for a single game, read from a JSON file.
#[derive(Debug, Clone)]
pub struct OddsFile {
    path: PathBuf,
}

impl OddsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OddsSource for OddsFile {
    fn prop_lines(&self, game_id: &str) -> Result<Vec<PropLine>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        parse_prop_lines(&raw, game_id)
            .with_context(|| format!("parse {}", self.path.display()))
    }
}

/// Parse an odds document, refusing one written for a different game.
pub fn parse_prop_lines(raw: &str, game_id: &str) -> Result<Vec<PropLine>> {
    let doc: OddsDocument = serde_json::from_str(raw).context("invalid odds json")?;
    if doc.game_id != game_id {
        return Err(anyhow!(
            "odds are for game {}, expected {game_id}",
            doc.game_id
        ));
    }

    let mut out = Vec::new();
    for (player_id, odds) in doc.players {
        for (market, line) in odds.lines {
            if !line.is_finite() {
                warn!(player = %player_id, market = %market, "skipping non-finite line");
                continue;
            }
            out.push(PropLine {
                player_id: player_id.clone(),
                player_name: odds.name.clone(),
                stat_type: normalize_stat_name(&market),
                line,
            });
        }
    }
    Ok(out)
}

/// Map bookmaker market labels (`Player Rebounds`, `player_points`) onto
/// history stat keys. Unknown labels pass through in snake case.
pub fn normalize_stat_name(market: &str) -> String {
    let snake = market
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let bare = snake.strip_prefix("player_").unwrap_or(&snake);
    match bare {
        "points" | "pts" => STAT_POINTS.to_string(),
        "assists" | "ast" => STAT_ASSISTS.to_string(),
        "rebounds" | "reb" | "total_rebounds" => STAT_TOTAL_REBOUNDS.to_string(),
        other => other.to_string(),
    }
}
