use anyhow::{Context, Result};

use trendy_props::config::{self, Settings};
use trendy_props::params::JsonParamStore;
use trendy_props::sources::{FixtureSource, HistorySource, ParamStore};
use trendy_props::store::ProjectionDb;
use trendy_props::synthetic::{self, SeasonConfig};
use trendy_props::trainer::{ParamGrid, Trainer};
use trendy_props::win_pct;

fn main() -> Result<()> {
    config::init_tracing();
    let settings = Settings::from_env_and_args()?;

    let (games, players) = if settings.synthetic {
        let season = synthetic::generate(&SeasonConfig {
            seed: settings.seed,
            ..SeasonConfig::default()
        });
        (season.games, season.players)
    } else {
        let db_path = settings
            .db_path
            .clone()
            .context("unable to resolve sqlite path")?;
        let db = ProjectionDb::open(&db_path)?;
        (db.games()?, db.player_games()?)
    };
    let enriched = win_pct::enrich(&games, &players);

    let grid = match settings.grid.as_deref() {
        Some(path) => ParamGrid::load(path)?,
        None => ParamGrid::default(),
    };
    let trainer = Trainer::new(grid)
        .with_adjustment(settings.adjustment)
        .with_split_quantile(settings.split_quantile);
    let report = trainer.train(&enriched.players, &settings.stats);

    println!("Grid search complete");
    println!(
        "Rows: train={} eval={} boundary={}",
        report.train_rows,
        report.eval_rows,
        report
            .boundary
            .map(|b| b.to_rfc3339())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("Combinations: {}", trainer.grid().len());
    for (stat, fit) in &report.fits {
        println!(
            "{stat}: N={} decay={:.2} home_adv={:.2} opp_weight={:.2} mae={:.3} pairs={} skipped={}",
            fit.params.n,
            fit.params.decay_factor,
            fit.params.home_advantage,
            fit.params.opponent_weight,
            fit.mae,
            fit.valid_pairs,
            fit.combinations_skipped
        );
    }
    for stat in &report.skipped_stats {
        println!("{stat}: no valid parameters");
    }

    let params = report.params();
    if params.is_empty() {
        println!("Nothing to save");
        return Ok(());
    }
    if settings.dry_run {
        println!("Dry run: parameters not saved");
        return Ok(());
    }
    let store = JsonParamStore::new(
        settings
            .params_path
            .clone()
            .context("unable to resolve params path")?,
    );
    store.save(&params)?;
    println!("Saved {} stat(s) to {}", params.len(), store.path().display());
    Ok(())
}
