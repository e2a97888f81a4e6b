//! Seeded fake league seasons, for demos, tests and benchmarks.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::records::{
    GameRecord, PlayerGameRecord, PropLine, STAT_ASSISTS, STAT_POINTS, STAT_TOTAL_REBOUNDS,
};

#[derive(Debug, Clone)]
pub struct SeasonConfig {
    pub teams: usize,
    pub players_per_team: usize,
    pub rounds: usize,
    /// Trailing rounds left unplayed (no scores, no box scores).
    pub scheduled_rounds: usize,
    pub start: DateTime<Utc>,
    pub seed: u64,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            teams: 10,
            players_per_team: 8,
            rounds: 40,
            scheduled_rounds: 1,
            start: Utc
                .with_ymd_and_hms(2024, 10, 22, 23, 30, 0)
                .single()
                .unwrap_or_else(Utc::now),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub player_id: String,
    pub team_id: String,
    pub base: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Season {
    pub games: Vec<GameRecord>,
    pub players: Vec<PlayerGameRecord>,
    pub roster: Vec<RosterEntry>,
}

impl Season {
    /// First unplayed game, if any.
    pub fn next_scheduled(&self) -> Option<&GameRecord> {
        self.games.iter().find(|g| !g.is_completed())
    }

    /// Lines at each rostered player's base rate, rounded to the nearest half.
    pub fn prop_lines_for(&self, game_id: &str) -> Vec<PropLine> {
        let Some(game) = self.games.iter().find(|g| g.game_id == game_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in &self.roster {
            if game.side_of(&entry.team_id).is_none() {
                continue;
            }
            for (stat, base) in &entry.base {
                out.push(PropLine {
                    player_id: entry.player_id.clone(),
                    player_name: None,
                    stat_type: stat.clone(),
                    line: (base * 2.0).round() / 2.0 + 0.5,
                });
            }
        }
        out
    }
}

pub fn generate(cfg: &SeasonConfig) -> Season {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let team_ids = (0..cfg.teams)
        .map(|t| format!("T{t:02}"))
        .collect::<Vec<_>>();
    let strength = team_ids
        .iter()
        .map(|_| rng.gen_range(0.85..1.15))
        .collect::<Vec<f64>>();

    let mut roster = Vec::new();
    for team_id in &team_ids {
        for p in 0..cfg.players_per_team {
            let base = [
                (STAT_POINTS, rng.gen_range(4.0..28.0)),
                (STAT_ASSISTS, rng.gen_range(0.5..9.0)),
                (STAT_TOTAL_REBOUNDS, rng.gen_range(1.5..12.0)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            roster.push(RosterEntry {
                player_id: format!("{team_id}P{p}"),
                team_id: team_id.clone(),
                base,
            });
        }
    }

    let mut season = Season {
        roster,
        ..Season::default()
    };
    let played_rounds = cfg.rounds.saturating_sub(cfg.scheduled_rounds);
    let mut order = (0..cfg.teams).collect::<Vec<_>>();
    for round in 0..cfg.rounds {
        order.shuffle(&mut rng);
        for (slot, pair) in order.chunks_exact(2).enumerate() {
            let (home, away) = (pair[0], pair[1]);
            let start_date =
                cfg.start + Duration::days(round as i64) + Duration::minutes(30 * slot as i64);
            let game_id = format!("G{round:03}-{slot}");
            let played = round < played_rounds;

            let (home_score, away_score) = if played {
                let h = (108.0 * strength[home] + rng.gen_range(-14.0..14.0) + 2.5).round();
                let a = (108.0 * strength[away] + rng.gen_range(-14.0..14.0)).round();
                (Some(h as i32), Some(a as i32))
            } else {
                (None, None)
            };
            season.games.push(GameRecord {
                game_id: game_id.clone(),
                start_date,
                home_team_id: team_ids[home].clone(),
                away_team_id: team_ids[away].clone(),
                home_score_total: home_score,
                away_score_total: away_score,
            });
            if !played {
                continue;
            }

            for entry in &season.roster {
                let is_home = if entry.team_id == team_ids[home] {
                    true
                } else if entry.team_id == team_ids[away] {
                    false
                } else {
                    continue;
                };
                // Roughly one game in twelve is a DNP.
                if rng.gen_range(0..12) == 0 {
                    continue;
                }
                let lift = if is_home { 1.04 } else { 0.97 };
                let stats = entry
                    .base
                    .iter()
                    .map(|(stat, base)| {
                        let v = (base * lift * rng.gen_range(0.6..1.4)).round().max(0.0);
                        (stat.clone(), v)
                    })
                    .collect();
                season.players.push(PlayerGameRecord {
                    player_id: entry.player_id.clone(),
                    game_id: game_id.clone(),
                    team_id: entry.team_id.clone(),
                    start_date,
                    stats,
                    is_home: false,
                    opponent_win_pct_before: None,
                });
            }
        }
    }
    season
}
