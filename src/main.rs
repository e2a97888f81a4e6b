use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use trendy_props::config::{self, Settings};
use trendy_props::odds_file::OddsFile;
use trendy_props::params::{JsonParamStore, ParamSet};
use trendy_props::predictor::{Predictor, SlateReport};
use trendy_props::records::PropLine;
use trendy_props::sources::{MemorySink, OddsSource, ParamStore};
use trendy_props::store::ProjectionDb;
use trendy_props::synthetic::{self, SeasonConfig};
use trendy_props::trainer::{ParamGrid, Trainer};
use trendy_props::win_pct;

fn main() -> Result<()> {
    config::init_tracing();
    let settings = Settings::from_env_and_args()?;

    let (mut db, game_id, lines, params) = if settings.synthetic {
        synthetic_slate(&settings)?
    } else {
        stored_slate(&settings)?
    };

    let predictor = Predictor::from_sources(&db, &db, params)?
        .with_adjustment(settings.adjustment)
        .with_confidence(settings.confidence);
    info!(
        players = predictor.player_count(),
        stats = predictor.params().len(),
        "predictor ready"
    );
    match predictor.game(&game_id) {
        Some(ctx) => println!(
            "{} ({:.3}) @ {} ({:.3}), {}",
            ctx.game.away_team_id,
            ctx.away_team_win_pct_before,
            ctx.game.home_team_id,
            ctx.home_team_win_pct_before,
            ctx.game.start_date.format("%Y-%m-%d %H:%M UTC")
        ),
        None => warn!(game = %game_id, "game not in fixtures; every line will fail"),
    }
    let report = predictor.predict_slate(&game_id, &lines);
    print_report(&report);

    let summary = if settings.dry_run {
        let mut sink = MemorySink::default();
        report.publish(&mut sink)
    } else {
        report.publish(&mut db)
    };
    println!(
        "{} {} projection(s), {} write failure(s)",
        if settings.dry_run { "Dry run:" } else { "Stored" },
        summary.written,
        summary.failed
    );
    Ok(())
}

type Slate = (ProjectionDb, String, Vec<PropLine>, ParamSet);

fn stored_slate(settings: &Settings) -> Result<Slate> {
    let game_id = settings
        .game
        .clone()
        .ok_or_else(|| anyhow!("--game is required (or pass --synthetic)"))?;
    let odds_path = settings.odds.clone().context("--odds is required")?;
    let db_path = settings
        .db_path
        .clone()
        .context("unable to resolve sqlite path")?;
    let params_path = settings
        .params_path
        .clone()
        .context("unable to resolve params path")?;

    let db = ProjectionDb::open(&db_path)?;
    let params = JsonParamStore::new(params_path).load()?;
    let odds = OddsFile::new(odds_path);
    let lines = odds.prop_lines(&game_id)?;
    info!(
        odds = %odds.path().display(),
        lines = lines.len(),
        "loaded prop lines"
    );
    Ok((db, game_id, lines, params))
}

/// Demo mode: a generated season, parameters fitted on the spot, lines at each
/// player's base rate for the first unplayed game.
fn synthetic_slate(settings: &Settings) -> Result<Slate> {
    let season = synthetic::generate(&SeasonConfig {
        seed: settings.seed,
        ..SeasonConfig::default()
    });
    let mut db = ProjectionDb::open_in_memory()?;
    db.upsert_games(&season.games)?;
    db.upsert_player_games(&season.players)?;

    let game_id = match settings.game.clone() {
        Some(id) => id,
        None => season
            .next_scheduled()
            .map(|g| g.game_id.clone())
            .context("synthetic season has no scheduled game")?,
    };
    let lines = season.prop_lines_for(&game_id);

    let enriched = win_pct::enrich(&season.games, &season.players);
    let report = Trainer::new(ParamGrid::default())
        .with_adjustment(settings.adjustment)
        .with_split_quantile(settings.split_quantile)
        .train(&enriched.players, &settings.stats);
    Ok((db, game_id, lines, report.params()))
}

fn print_report(report: &SlateReport) {
    println!("Game {}", report.game_id);
    println!(
        "{:<16} {:<16} {:>8} {:>7} {:>7} {:>8}  note",
        "player", "stat", "proj", "line", "edge", "pick"
    );
    for p in &report.predictions {
        println!(
            "{:<16} {:<16} {:>8.1} {:>7.1} {:>+7.1} {:>8}  {}",
            p.display_name(),
            p.stat_type,
            p.predicted_value,
            p.line.unwrap_or(f64::NAN),
            p.edge.unwrap_or(f64::NAN),
            p.recommendation.as_str(),
            if p.insufficient_sample {
                format!("{} game(s)", p.games_used)
            } else {
                String::new()
            }
        );
    }

    let counts = report.error_counts();
    if !counts.is_empty() {
        println!("Failures:");
        for (category, count) in counts {
            println!("  {category}: {count}");
        }
    }
}
