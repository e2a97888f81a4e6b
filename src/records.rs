use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STAT_POINTS: &str = "points";
pub const STAT_ASSISTS: &str = "assists";
pub const STAT_TOTAL_REBOUNDS: &str = "total_rebounds";

pub const DEFAULT_STATS: [&str; 3] = [STAT_POINTS, STAT_ASSISTS, STAT_TOTAL_REBOUNDS];

/// Win fraction used whenever a team has no completed games to draw from.
pub const NEUTRAL_WIN_PCT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub start_date: DateTime<Utc>,
    pub home_team_id: String,
    pub away_team_id: String,
    #[serde(default)]
    pub home_score_total: Option<i32>,
    #[serde(default)]
    pub away_score_total: Option<i32>,
}

impl GameRecord {
    pub fn final_scores(&self) -> Option<(i32, i32)> {
        let (Some(home), Some(away)) = (self.home_score_total, self.away_score_total) else {
            return None;
        };
        Some((home, away))
    }

    pub fn is_completed(&self) -> bool {
        self.final_scores().is_some()
    }

    /// `Some(true)` for the home side, `Some(false)` for the away side.
    pub fn side_of(&self, team_id: &str) -> Option<bool> {
        if team_id == self.home_team_id {
            Some(true)
        } else if team_id == self.away_team_id {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameRecord {
    pub player_id: String,
    pub game_id: String,
    pub team_id: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub opponent_win_pct_before: Option<f64>,
}

impl PlayerGameRecord {
    pub fn stat(&self, stat: &str) -> Option<f64> {
        self.stats.get(stat).copied()
    }

    pub fn opponent_strength(&self) -> f64 {
        self.opponent_win_pct_before
            .filter(|p| p.is_finite())
            .unwrap_or(NEUTRAL_WIN_PCT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropLine {
    pub player_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
    pub stat_type: String,
    pub line: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Over,
    Under,
    NoPlay,
}

impl Recommendation {
    pub fn from_edge(edge: Option<f64>) -> Self {
        match edge {
            Some(e) if e > 0.0 => Recommendation::Over,
            Some(e) if e < 0.0 => Recommendation::Under,
            _ => Recommendation::NoPlay,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OVER" => Some(Recommendation::Over),
            "UNDER" => Some(Recommendation::Under),
            "NO_PLAY" => Some(Recommendation::NoPlay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Over => "OVER",
            Recommendation::Under => "UNDER",
            Recommendation::NoPlay => "NO_PLAY",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub player_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
    pub game_id: String,
    pub stat_type: String,
    pub predicted_value: f64,
    pub line: Option<f64>,
    pub edge: Option<f64>,
    pub confidence: u8,
    pub recommendation: Recommendation,
    pub games_used: usize,
    pub insufficient_sample: bool,
}

impl Prediction {
    pub fn display_name(&self) -> &str {
        self.player_name.as_deref().unwrap_or(&self.player_id)
    }
}
