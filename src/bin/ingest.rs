use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;

use trendy_props::config::{self, Settings};
use trendy_props::records::{GameRecord, PlayerGameRecord};
use trendy_props::store::{IngestSummary, ProjectionDb};
use trendy_props::synthetic::{self, SeasonConfig};

fn main() -> Result<()> {
    config::init_tracing();
    let settings = Settings::from_env_and_args()?;
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let (source, games, players) = if settings.synthetic {
        let season = synthetic::generate(&SeasonConfig {
            seed: settings.seed,
            ..SeasonConfig::default()
        });
        (
            format!("synthetic:{}", settings.seed),
            season.games,
            season.players,
        )
    } else {
        let games_path = config::path_arg(&args, "--games");
        let players_path = config::path_arg(&args, "--players");
        if games_path.is_none() && players_path.is_none() {
            return Err(anyhow!("pass --games and/or --players (or --synthetic)"));
        }
        let games: Vec<GameRecord> = match games_path.as_deref() {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        let players: Vec<PlayerGameRecord> = match players_path.as_deref() {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        ("json".to_string(), games, players)
    };

    let db_path = settings
        .db_path
        .clone()
        .context("unable to resolve sqlite path")?;
    let mut db = ProjectionDb::open(&db_path)?;
    let summary = IngestSummary {
        games_upserted: db.upsert_games(&games)?,
        player_rows_upserted: db.upsert_player_games(&players)?,
    };
    db.record_ingest_run(&source, summary)?;

    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    println!("Games upserted: {}", summary.games_upserted);
    println!("Player rows upserted: {}", summary.player_rows_upserted);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
