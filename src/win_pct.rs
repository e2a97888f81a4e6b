use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::records::{GameRecord, NEUTRAL_WIN_PCT, PlayerGameRecord};

/// One side of a completed game, carrying that team's form going into it.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameEntry {
    pub team_id: String,
    pub game_id: String,
    pub start_date: DateTime<Utc>,
    pub is_home: bool,
    pub won: bool,
    pub win_pct_before: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameContext {
    pub game: GameRecord,
    pub home_team_win_pct_before: f64,
    pub away_team_win_pct_before: f64,
}

impl GameContext {
    /// Pre-game win fraction of whoever `team_id` faced, or `None` if the team
    /// did not play in this game.
    pub fn opponent_win_pct(&self, team_id: &str) -> Option<f64> {
        self.game.side_of(team_id).map(|is_home| {
            if is_home {
                self.away_team_win_pct_before
            } else {
                self.home_team_win_pct_before
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Enriched {
    pub entries: Vec<TeamGameEntry>,
    pub games: Vec<GameContext>,
    pub players: Vec<PlayerGameRecord>,
}

/// Two entries per completed game, ordered by team then start date, each
/// holding the win fraction over the team's strictly earlier games.
pub fn team_game_entries(games: &[GameRecord]) -> Vec<TeamGameEntry> {
    let mut rows = Vec::with_capacity(games.len() * 2);
    for game in games {
        let Some((home_score, away_score)) = game.final_scores() else {
            continue;
        };
        // Ties are not modelled: the home side simply did not win.
        let home_won = home_score > away_score;
        rows.push(TeamGameEntry {
            team_id: game.home_team_id.clone(),
            game_id: game.game_id.clone(),
            start_date: game.start_date,
            is_home: true,
            won: home_won,
            win_pct_before: NEUTRAL_WIN_PCT,
        });
        rows.push(TeamGameEntry {
            team_id: game.away_team_id.clone(),
            game_id: game.game_id.clone(),
            start_date: game.start_date,
            is_home: false,
            won: !home_won,
            win_pct_before: NEUTRAL_WIN_PCT,
        });
    }

    // sort_by is stable, so same-day rows keep fixture order.
    rows.sort_by(|a, b| {
        a.team_id
            .cmp(&b.team_id)
            .then(a.start_date.cmp(&b.start_date))
    });

    let mut current_team: Option<String> = None;
    let mut prior_games = 0u32;
    let mut prior_wins = 0u32;
    for row in &mut rows {
        if current_team.as_deref() != Some(row.team_id.as_str()) {
            current_team = Some(row.team_id.clone());
            prior_games = 0;
            prior_wins = 0;
        }
        row.win_pct_before = if prior_games == 0 {
            NEUTRAL_WIN_PCT
        } else {
            prior_wins as f64 / prior_games as f64
        };
        prior_games += 1;
        if row.won {
            prior_wins += 1;
        }
    }
    rows
}

/// Each team's `win_pct_before` as of its latest completed game.
pub fn latest_win_pct(entries: &[TeamGameEntry]) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for entry in entries {
        out.insert(entry.team_id.clone(), entry.win_pct_before);
    }
    out
}

pub fn game_contexts(games: &[GameRecord], entries: &[TeamGameEntry]) -> Vec<GameContext> {
    let mut by_side: HashMap<(&str, bool), f64> = HashMap::new();
    for entry in entries {
        by_side
            .entry((entry.game_id.as_str(), entry.is_home))
            .or_insert(entry.win_pct_before);
    }
    let latest = latest_win_pct(entries);
    let fallback = |team_id: &str| latest.get(team_id).copied().unwrap_or(NEUTRAL_WIN_PCT);

    games
        .iter()
        .map(|game| {
            let home = by_side
                .get(&(game.game_id.as_str(), true))
                .copied()
                .unwrap_or_else(|| fallback(&game.home_team_id));
            let away = by_side
                .get(&(game.game_id.as_str(), false))
                .copied()
                .unwrap_or_else(|| fallback(&game.away_team_id));
            GameContext {
                game: game.clone(),
                home_team_win_pct_before: home,
                away_team_win_pct_before: away,
            }
        })
        .collect()
}

/// Annotate every player-game with venue and opponent pre-game strength.
/// Inputs are left untouched; the returned tables are new.
pub fn enrich(games: &[GameRecord], players: &[PlayerGameRecord]) -> Enriched {
    let entries = team_game_entries(games);
    let contexts = game_contexts(games, &entries);

    let by_game: HashMap<&str, &GameContext> = contexts
        .iter()
        .map(|ctx| (ctx.game.game_id.as_str(), ctx))
        .collect();

    let mut unresolved = 0usize;
    let enriched_players = players
        .iter()
        .map(|row| {
            let resolved = by_game.get(row.game_id.as_str()).and_then(|ctx| {
                let is_home = ctx.game.side_of(&row.team_id)?;
                Some((is_home, ctx.opponent_win_pct(&row.team_id)?))
            });
            let (is_home, opponent) = resolved.unwrap_or_else(|| {
                unresolved += 1;
                (false, NEUTRAL_WIN_PCT)
            });
            let mut out = row.clone();
            out.is_home = is_home;
            out.opponent_win_pct_before = Some(opponent);
            out
        })
        .collect::<Vec<_>>();

    debug!(
        games = games.len(),
        team_entries = entries.len(),
        player_rows = enriched_players.len(),
        unresolved,
        "win percentage enrichment complete"
    );

    Enriched {
        entries,
        games: contexts,
        players: enriched_players,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn game(id: &str, day: i64, home: &str, away: &str, score: Option<(i32, i32)>) -> GameRecord {
        GameRecord {
            game_id: id.to_string(),
            start_date: Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap() + Duration::days(day),
            home_team_id: home.to_string(),
            away_team_id: away.to_string(),
            home_score_total: score.map(|s| s.0),
            away_score_total: score.map(|s| s.1),
        }
    }

    fn pct_for(entries: &[TeamGameEntry], team: &str, game_id: &str) -> f64 {
        entries
            .iter()
            .find(|e| e.team_id == team && e.game_id == game_id)
            .map(|e| e.win_pct_before)
            .unwrap()
    }

    #[test]
    fn tie_counts_as_home_loss() {
        let entries = team_game_entries(&[game("g1", 0, "A", "B", Some((100, 100)))]);
        let home = entries.iter().find(|e| e.team_id == "A").unwrap();
        let away = entries.iter().find(|e| e.team_id == "B").unwrap();
        assert!(!home.won);
        assert!(away.won);
    }

    #[test]
    fn scheduled_games_produce_no_entries() {
        let entries = team_game_entries(&[game("g1", 0, "A", "B", None)]);
        assert!(entries.is_empty());
    }

    #[test]
    fn unordered_input_is_sorted_per_team() {
        let games = vec![
            game("late", 5, "A", "B", Some((90, 80))),
            game("early", 1, "A", "B", Some((90, 80))),
        ];
        let entries = team_game_entries(&games);
        assert_eq!(pct_for(&entries, "A", "early"), 0.5);
        assert_eq!(pct_for(&entries, "A", "late"), 1.0);
        assert_eq!(pct_for(&entries, "B", "late"), 0.0);
    }

    #[test]
    fn scheduled_game_falls_back_to_latest_known_form() {
        let games = vec![
            game("g1", 0, "A", "B", Some((110, 100))),
            game("g2", 2, "B", "A", Some((120, 100))),
            game("next", 4, "A", "C", None),
        ];
        let entries = team_game_entries(&games);
        let contexts = game_contexts(&games, &entries);
        let next = contexts.iter().find(|c| c.game.game_id == "next").unwrap();
        // A's last entry is g2 with one prior win from one game.
        assert_eq!(next.home_team_win_pct_before, 1.0);
        // C never played.
        assert_eq!(next.away_team_win_pct_before, 0.5);
    }
}
