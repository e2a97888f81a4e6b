use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use trendy_props::params::{ParamSet, PredictorParams};
use trendy_props::predictor::Predictor;
use trendy_props::synthetic::{self, SeasonConfig};
use trendy_props::trainer::{ParamGrid, Trainer, partition};
use trendy_props::win_pct::enrich;

fn season_config() -> SeasonConfig {
    SeasonConfig {
        teams: 16,
        players_per_team: 10,
        rounds: 60,
        scheduled_rounds: 1,
        ..SeasonConfig::default()
    }
}

fn bench_enrich(c: &mut Criterion) {
    let season = synthetic::generate(&season_config());
    c.bench_function("enrich_season", |b| {
        b.iter(|| {
            let out = enrich(black_box(&season.games), black_box(&season.players));
            black_box(out.players.len());
        });
    });
}

fn bench_predict_slate(c: &mut Criterion) {
    let season = synthetic::generate(&season_config());
    let params = ["points", "assists", "total_rebounds"]
        .into_iter()
        .map(|stat| (stat.to_string(), PredictorParams::new(10, 0.9, 0.05, 1.0)))
        .collect::<ParamSet>();
    let predictor = Predictor::new(enrich(&season.games, &season.players), params);
    let Some(target) = season.next_scheduled() else {
        return;
    };
    let lines = season.prop_lines_for(&target.game_id);

    c.bench_function("predict_slate", |b| {
        b.iter(|| {
            let report = predictor.predict_slate(black_box(&target.game_id), black_box(&lines));
            black_box(report.predictions.len());
        });
    });
}

fn bench_fit_stat(c: &mut Criterion) {
    let season = synthetic::generate(&season_config());
    let rows = enrich(&season.games, &season.players).players;
    let split = partition(&rows, 0.8);
    let trainer = Trainer::new(ParamGrid::default());

    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);
    group.bench_function("fit_points_default_grid", |b| {
        b.iter(|| {
            let fit = trainer.fit_stat(black_box(&split.eval), "points");
            black_box(fit.map(|f| f.mae));
        });
    });
    group.finish();
}

criterion_group!(benches, bench_enrich, bench_predict_slate, bench_fit_stat);
criterion_main!(benches);
