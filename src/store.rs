use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde_json::json;

use crate::records::{GameRecord, PlayerGameRecord, Prediction, Recommendation};
use crate::sources::{FixtureSource, HistorySource, ProjectionSink};

pub const MODEL_VERSION: &str = "v1.2";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub games_upserted: usize,
    pub player_rows_upserted: usize,
}

/// Local SQLite home for fixtures, player history and published projections.
pub struct ProjectionDb {
    conn: Connection,
}

impl ProjectionDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn upsert_games(&mut self, games: &[GameRecord]) -> Result<usize> {
        let tx = self.conn.transaction().context("begin games transaction")?;
        for game in games {
            tx.execute(
                r#"
                INSERT INTO games (
                    game_id, start_date, home_team_id, away_team_id,
                    home_score_total, away_score_total, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(game_id) DO UPDATE SET
                    start_date = excluded.start_date,
                    home_team_id = excluded.home_team_id,
                    away_team_id = excluded.away_team_id,
                    home_score_total = excluded.home_score_total,
                    away_score_total = excluded.away_score_total,
                    updated_at = excluded.updated_at
                "#,
                params![
                    game.game_id,
                    game.start_date.to_rfc3339(),
                    game.home_team_id,
                    game.away_team_id,
                    game.home_score_total,
                    game.away_score_total,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("upsert game {}", game.game_id))?;
        }
        tx.commit().context("commit games transaction")?;
        Ok(games.len())
    }

    pub fn upsert_player_games(&mut self, rows: &[PlayerGameRecord]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("begin player games transaction")?;
        for row in rows {
            let stats = serde_json::to_string(&row.stats).context("serialize stats")?;
            tx.execute(
                r#"
                INSERT INTO player_games (
                    player_id, game_id, team_id, start_date, stats_json, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(player_id, game_id) DO UPDATE SET
                    team_id = excluded.team_id,
                    start_date = excluded.start_date,
                    stats_json = excluded.stats_json,
                    updated_at = excluded.updated_at
                "#,
                params![
                    row.player_id,
                    row.game_id,
                    row.team_id,
                    row.start_date.to_rfc3339(),
                    stats,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("upsert player game {}/{}", row.player_id, row.game_id))?;
        }
        tx.commit().context("commit player games transaction")?;
        Ok(rows.len())
    }

    pub fn record_ingest_run(&self, source: &str, summary: IngestSummary) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO ingest_runs(finished_at, source, games_upserted, player_rows_upserted)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Utc::now().to_rfc3339(),
                    source,
                    summary.games_upserted as i64,
                    summary.player_rows_upserted as i64
                ],
            )
            .context("insert ingest run")?;
        Ok(())
    }

    pub fn load_games(&self) -> Result<Vec<GameRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT game_id, start_date, home_team_id, away_team_id,
                       home_score_total, away_score_total
                FROM games
                ORDER BY start_date ASC, game_id ASC
                "#,
            )
            .context("prepare load games query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i32>>(4)?,
                    row.get::<_, Option<i32>>(5)?,
                ))
            })
            .context("query load games")?;

        let mut out = Vec::new();
        for row in rows {
            let (game_id, start, home_team_id, away_team_id, home_score, away_score) =
                row.context("decode game row")?;
            out.push(GameRecord {
                start_date: parse_timestamp(&start)
                    .with_context(|| format!("game {game_id} start_date"))?,
                game_id,
                home_team_id,
                away_team_id,
                home_score_total: home_score,
                away_score_total: away_score,
            });
        }
        Ok(out)
    }

    pub fn load_player_games(&self) -> Result<Vec<PlayerGameRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT player_id, game_id, team_id, start_date, stats_json
                FROM player_games
                ORDER BY start_date ASC, player_id ASC, game_id ASC
                "#,
            )
            .context("prepare load player games query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("query load player games")?;

        let mut out = Vec::new();
        for row in rows {
            let (player_id, game_id, team_id, start, stats_json) =
                row.context("decode player game row")?;
            let stats: BTreeMap<String, f64> = serde_json::from_str(&stats_json)
                .with_context(|| format!("stats for {player_id}/{game_id}"))?;
            out.push(PlayerGameRecord {
                start_date: parse_timestamp(&start)
                    .with_context(|| format!("player game {player_id}/{game_id} start_date"))?,
                player_id,
                game_id,
                team_id,
                stats,
                is_home: false,
                opponent_win_pct_before: None,
            });
        }
        Ok(out)
    }

    pub fn load_projections(&self, game_id: &str) -> Result<Vec<Prediction>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT player_id, player_name, game_id, stat_type, projected_value,
                       line, edge, confidence, recommendation, games_used, insufficient_sample
                FROM projections
                WHERE game_id = ?1
                ORDER BY player_id ASC, stat_type ASC
                "#,
            )
            .context("prepare load projections query")?;
        let rows = stmt
            .query_map(params![game_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            })
            .context("query load projections")?;

        let mut out = Vec::new();
        for row in rows {
            let (
                player_id,
                player_name,
                game_id,
                stat_type,
                predicted_value,
                line,
                edge,
                confidence,
                recommendation,
                games_used,
                insufficient,
            ) = row.context("decode projection row")?;
            out.push(Prediction {
                player_id,
                player_name,
                game_id,
                stat_type,
                predicted_value,
                line,
                edge,
                confidence: u8::try_from(confidence).unwrap_or(u8::MAX),
                recommendation: Recommendation::parse(&recommendation)
                    .ok_or_else(|| anyhow!("unknown recommendation {recommendation}"))?,
                games_used: usize::try_from(games_used).unwrap_or_default(),
                insufficient_sample: insufficient != 0,
            });
        }
        Ok(out)
    }
}

impl HistorySource for ProjectionDb {
    fn player_games(&self) -> Result<Vec<PlayerGameRecord>> {
        self.load_player_games()
    }
}

impl FixtureSource for ProjectionDb {
    fn games(&self) -> Result<Vec<GameRecord>> {
        self.load_games()
    }
}

impl ProjectionSink for ProjectionDb {
    fn upsert(&mut self, p: &Prediction) -> Result<()> {
        let metadata = json!({
            "model_version": MODEL_VERSION,
            "source": "trendy_props",
        });
        self.conn
            .execute(
                r#"
                INSERT INTO projections (
                    game_id, player_id, stat_type, player_name, line, projected_value,
                    confidence, recommendation, edge, games_used, insufficient_sample,
                    metadata_json, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(game_id, player_id, stat_type) DO UPDATE SET
                    player_name = excluded.player_name,
                    line = excluded.line,
                    projected_value = excluded.projected_value,
                    confidence = excluded.confidence,
                    recommendation = excluded.recommendation,
                    edge = excluded.edge,
                    games_used = excluded.games_used,
                    insufficient_sample = excluded.insufficient_sample,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                "#,
                params![
                    p.game_id,
                    p.player_id,
                    p.stat_type,
                    p.player_name,
                    p.line,
                    round1(p.predicted_value),
                    p.confidence as i64,
                    p.recommendation.as_str(),
                    p.edge,
                    p.games_used as i64,
                    bool_to_i64(p.insufficient_sample),
                    metadata.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| {
                format!(
                    "upsert projection {}/{}/{}",
                    p.game_id, p.player_id, p.stat_type
                )
            })?;
        Ok(())
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            start_date TEXT NOT NULL,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_score_total INTEGER NULL,
            away_score_total INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_start ON games(start_date);

        CREATE TABLE IF NOT EXISTS player_games (
            player_id TEXT NOT NULL,
            game_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            stats_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (player_id, game_id)
        );
        CREATE INDEX IF NOT EXISTS idx_player_games_start ON player_games(start_date);

        CREATE TABLE IF NOT EXISTS projections (
            game_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            stat_type TEXT NOT NULL,
            player_name TEXT NULL,
            line REAL NULL,
            projected_value REAL NOT NULL,
            confidence INTEGER NOT NULL,
            recommendation TEXT NOT NULL,
            edge REAL NULL,
            games_used INTEGER NOT NULL,
            insufficient_sample INTEGER NOT NULL,
            metadata_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game_id, player_id, stat_type)
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at TEXT NOT NULL,
            source TEXT NOT NULL,
            games_upserted INTEGER NOT NULL,
            player_rows_upserted INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp {raw:?}"))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}
