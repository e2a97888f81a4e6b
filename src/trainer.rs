use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::params::{Adjustment, ParamSet, PredictorParams};
use crate::predictor::{PastGame, project};
use crate::records::PlayerGameRecord;

pub const DEFAULT_SPLIT_QUANTILE: f64 = 0.8;

/// Candidate values per parameter. Combinations are enumerated with `N`
/// outermost and `opponent_weight` innermost, each list in its given order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(rename = "N")]
    pub n: Vec<usize>,
    pub decay_factor: Vec<f64>,
    pub home_advantage: Vec<f64>,
    pub opponent_weight: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n: vec![3, 5, 10, 15, 20],
            decay_factor: vec![0.7, 0.8, 0.85, 0.9, 0.95],
            home_advantage: vec![0.0, 0.05, 0.1, 0.15, 0.2],
            opponent_weight: vec![0.5, 1.0, 1.5],
        }
    }
}

impl ParamGrid {
    pub fn single(params: PredictorParams) -> Self {
        Self {
            n: vec![params.n],
            decay_factor: vec![params.decay_factor],
            home_advantage: vec![params.home_advantage],
            opponent_weight: vec![params.opponent_weight],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let grid: ParamGrid = serde_json::from_str(&raw).context("invalid grid json")?;
        if grid.is_empty() {
            return Err(anyhow!("grid {} has no combinations", path.display()));
        }
        grid.validate()
            .with_context(|| format!("invalid grid {}", path.display()))?;
        Ok(grid)
    }

    /// Every combination must be usable by the predictor once saved.
    pub fn validate(&self) -> Result<()> {
        for params in self.combinations() {
            params.validate()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.n.len() * self.decay_factor.len() * self.home_advantage.len() * self.opponent_weight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn combinations(&self) -> Vec<PredictorParams> {
        let mut out = Vec::with_capacity(self.len());
        for &n in &self.n {
            for &decay in &self.decay_factor {
                for &home in &self.home_advantage {
                    for &opp in &self.opponent_weight {
                        out.push(PredictorParams::new(n, decay, home, opp));
                    }
                }
            }
        }
        out
    }
}

/// Linear-interpolated quantile of the start dates, as a timestamp.
pub fn split_boundary(rows: &[PlayerGameRecord], quantile: f64) -> Option<DateTime<Utc>> {
    if rows.is_empty() {
        return None;
    }
    let mut stamps = rows
        .iter()
        .map(|r| r.start_date.timestamp_millis())
        .collect::<Vec<_>>();
    stamps.sort_unstable();

    let q = quantile.clamp(0.0, 1.0);
    let pos = q * (stamps.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    let value = stamps[lo] as f64 + (stamps[hi] - stamps[lo]) as f64 * frac;
    DateTime::from_timestamp_millis(value.round() as i64)
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub boundary: Option<DateTime<Utc>>,
    pub train: Vec<PlayerGameRecord>,
    pub eval: Vec<PlayerGameRecord>,
}

pub fn partition(rows: &[PlayerGameRecord], quantile: f64) -> Partition {
    let Some(boundary) = split_boundary(rows, quantile) else {
        return Partition::default();
    };
    let (train, eval): (Vec<_>, Vec<_>) = rows
        .iter()
        .cloned()
        .partition(|r| r.start_date <= boundary);
    Partition {
        boundary: Some(boundary),
        train,
        eval,
    }
}

/// Per-player chronological series for one stat, players ordered by id.
pub fn stat_series(rows: &[PlayerGameRecord], stat: &str) -> Vec<Vec<PastGame>> {
    let mut by_player: BTreeMap<&str, Vec<&PlayerGameRecord>> = BTreeMap::new();
    for row in rows {
        by_player.entry(row.player_id.as_str()).or_default().push(row);
    }
    by_player
        .into_values()
        .map(|mut games| {
            games.sort_by(|a, b| a.start_date.cmp(&b.start_date));
            games
                .into_iter()
                .map(|g| PastGame::from_record(g, stat))
                .collect()
        })
        .collect()
}

/// (predicted, actual) for every game that has at least one predecessor in
/// its player's series. Undefined predictions and missing actuals are dropped.
pub fn backtest_pairs(
    series: &[Vec<PastGame>],
    params: &PredictorParams,
    adjustment: Adjustment,
) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    for games in series {
        for k in 1..games.len() {
            let window = &games[k.saturating_sub(params.n)..k];
            let current = games[k];
            let Some(actual) = current.value.filter(|v| v.is_finite()) else {
                continue;
            };
            let Some(predicted) = project(
                window,
                current.is_home,
                current.opponent_win_pct,
                params,
                adjustment,
            ) else {
                continue;
            };
            out.push((predicted, actual));
        }
    }
    out
}

pub fn mean_absolute_error(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let total: f64 = pairs.iter().map(|(p, a)| (p - a).abs()).sum();
    Some(total / pairs.len() as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatFit {
    pub stat: String,
    pub params: PredictorParams,
    pub mae: f64,
    pub valid_pairs: usize,
    pub combinations_evaluated: usize,
    pub combinations_skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    pub boundary: Option<DateTime<Utc>>,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub fits: BTreeMap<String, StatFit>,
    pub skipped_stats: Vec<String>,
}

impl TrainReport {
    pub fn params(&self) -> ParamSet {
        self.fits
            .iter()
            .map(|(stat, fit)| (stat.clone(), fit.params))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Trainer {
    grid: ParamGrid,
    adjustment: Adjustment,
    split_quantile: f64,
}

impl Trainer {
    pub fn new(grid: ParamGrid) -> Self {
        Self {
            grid,
            adjustment: Adjustment::default(),
            split_quantile: DEFAULT_SPLIT_QUANTILE,
        }
    }

    pub fn with_adjustment(mut self, adjustment: Adjustment) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn with_split_quantile(mut self, quantile: f64) -> Self {
        self.split_quantile = quantile.clamp(0.05, 0.95);
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Grid search one stat over already-partitioned evaluation rows.
    /// Combinations run in parallel; the best is picked in canonical grid
    /// order, so a tie always goes to the earlier combination. Combinations
    /// outside the parameter domain count as skipped.
    pub fn fit_stat(&self, eval_rows: &[PlayerGameRecord], stat: &str) -> Option<StatFit> {
        let series = stat_series(eval_rows, stat);
        let combos = self.grid.combinations();
        let adjustment = self.adjustment;

        let scored = combos
            .par_iter()
            .map(|params| {
                if let Err(err) = params.validate() {
                    debug!(stat, "skipping grid point: {err:#}");
                    return None;
                }
                let pairs = backtest_pairs(&series, params, adjustment);
                let mae = mean_absolute_error(&pairs)?;
                debug!(
                    stat,
                    n = params.n,
                    decay = params.decay_factor,
                    home_advantage = params.home_advantage,
                    opponent_weight = params.opponent_weight,
                    mae,
                    valid = pairs.len(),
                    "grid point"
                );
                Some((mae, pairs.len()))
            })
            .collect::<Vec<_>>();

        let mut best: Option<StatFit> = None;
        let mut evaluated = 0usize;
        let mut skipped = 0usize;
        for (params, score) in combos.iter().zip(scored) {
            let Some((mae, valid_pairs)) = score else {
                skipped += 1;
                continue;
            };
            evaluated += 1;
            if best.as_ref().is_none_or(|b| mae < b.mae) {
                best = Some(StatFit {
                    stat: stat.to_string(),
                    params: *params,
                    mae,
                    valid_pairs,
                    combinations_evaluated: 0,
                    combinations_skipped: 0,
                });
            }
        }

        best.map(|mut fit| {
            fit.combinations_evaluated = evaluated;
            fit.combinations_skipped = skipped;
            fit
        })
    }

    /// Split enriched rows chronologically and fit every requested stat on the
    /// evaluation side. A stat with no valid combination is reported, not fatal.
    pub fn train(&self, rows: &[PlayerGameRecord], stats: &[String]) -> TrainReport {
        let split = partition(rows, self.split_quantile);
        let mut report = TrainReport {
            boundary: split.boundary,
            train_rows: split.train.len(),
            eval_rows: split.eval.len(),
            ..TrainReport::default()
        };
        info!(
            boundary = ?split.boundary,
            train_rows = report.train_rows,
            eval_rows = report.eval_rows,
            combinations = self.grid.len(),
            "starting grid search"
        );

        for stat in stats {
            match self.fit_stat(&split.eval, stat) {
                Some(fit) => {
                    info!(
                        stat = %stat,
                        n = fit.params.n,
                        decay = fit.params.decay_factor,
                        home_advantage = fit.params.home_advantage,
                        opponent_weight = fit.params.opponent_weight,
                        mae = fit.mae,
                        valid = fit.valid_pairs,
                        "best parameters"
                    );
                    report.fits.insert(stat.clone(), fit);
                }
                None => {
                    warn!(stat = %stat, "no valid parameters found");
                    report.skipped_stats.push(stat.clone());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn row(player: &str, day: i64, points: f64) -> PlayerGameRecord {
        PlayerGameRecord {
            player_id: player.to_string(),
            game_id: format!("{player}-{day}"),
            team_id: "T".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            stats: [("points".to_string(), points)].into_iter().collect(),
            is_home: day % 2 == 0,
            opponent_win_pct_before: Some(0.5),
        }
    }

    #[test]
    fn grid_enumerates_in_canonical_order() {
        let grid = ParamGrid {
            n: vec![3, 5],
            decay_factor: vec![0.9],
            home_advantage: vec![0.0, 0.1],
            opponent_weight: vec![1.0],
        };
        let combos = grid.combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!((combos[0].n, combos[0].home_advantage), (3, 0.0));
        assert_eq!((combos[1].n, combos[1].home_advantage), (3, 0.1));
        assert_eq!((combos[2].n, combos[2].home_advantage), (5, 0.0));
    }

    #[test]
    fn boundary_interpolates_between_dates() {
        let rows = (0..6).map(|d| row("p", d, 1.0)).collect::<Vec<_>>();
        // 0.8 * 5 = 4.0 -> exactly day 4.
        let b = split_boundary(&rows, 0.8).unwrap();
        assert_eq!(b, rows[4].start_date);
        let split = partition(&rows, 0.8);
        assert_eq!(split.train.len(), 5);
        assert_eq!(split.eval.len(), 1);
    }

    #[test]
    fn single_game_players_produce_no_pairs() {
        let series = stat_series(&[row("solo", 0, 10.0)], "points");
        let params = PredictorParams::new(3, 0.9, 0.0, 1.0);
        assert!(backtest_pairs(&series, &params, Adjustment::HomeOnly).is_empty());
    }

    #[test]
    fn ties_keep_the_first_combination() {
        // Constant output and dyadic weights: every combination scores exactly 0.
        let rows = (0..5).map(|d| row("p", d, 12.0)).collect::<Vec<_>>();
        let grid = ParamGrid {
            n: vec![2, 4],
            decay_factor: vec![0.5, 0.25],
            home_advantage: vec![0.0],
            opponent_weight: vec![1.0],
        };
        let fit = Trainer::new(grid).fit_stat(&rows, "points").unwrap();
        assert_eq!(fit.params.n, 2);
        assert_eq!(fit.params.decay_factor, 0.5);
        assert_eq!(fit.mae, 0.0);
        assert_eq!(fit.combinations_evaluated, 4);
    }

    #[test]
    fn unknown_stat_is_skipped() {
        let rows = (0..10).map(|d| row("p", d, 12.0)).collect::<Vec<_>>();
        let report = Trainer::new(ParamGrid::default()).train(&rows, &["steals".to_string()]);
        assert!(report.fits.is_empty());
        assert_eq!(report.skipped_stats, vec!["steals".to_string()]);
    }
}
