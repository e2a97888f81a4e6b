use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::params::{Adjustment, ParamSet, PredictorParams};
use crate::records::{NEUTRAL_WIN_PCT, PlayerGameRecord, Prediction, PropLine, Recommendation};
use crate::sources::{FixtureSource, HistorySource, ProjectionSink};
use crate::win_pct::{self, Enriched, GameContext};

pub const DEFAULT_CONFIDENCE: u8 = 90;

/// A prior game as the weighting formula sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PastGame {
    pub value: Option<f64>,
    pub opponent_win_pct: f64,
    pub is_home: bool,
}

impl PastGame {
    pub fn from_record(record: &PlayerGameRecord, stat: &str) -> Self {
        Self {
            value: record.stat(stat),
            opponent_win_pct: record.opponent_strength(),
            is_home: record.is_home,
        }
    }
}

/// Recency weights for `k` games ordered oldest first: the newest game gets
/// weight 1 and each step back multiplies by `decay`.
///
/// With more than one game and a non-positive decay every older game collapses
/// to zero weight; that profile is treated as undefined.
pub fn recency_weights(k: usize, decay: f64) -> Option<Vec<f64>> {
    if k > 1 && !(decay > 0.0 && decay.is_finite()) {
        return None;
    }
    Some((0..k).map(|j| decay.powi((k - 1 - j) as i32)).collect())
}

/// Weighted mean of `window` (oldest first). `None` when any value or weight
/// is undefined or the weights sum to zero.
pub fn weighted_mean(window: &[PastGame], params: &PredictorParams) -> Option<f64> {
    let weights = recency_weights(window.len(), params.decay_factor)?;
    let mut numer = 0.0_f64;
    let mut denom = 0.0_f64;
    for (game, recency) in window.iter().zip(weights) {
        let value = game.value.filter(|v| v.is_finite())?;
        let weight = recency
            * game.opponent_win_pct
            * params.opponent_weight
            * params.home_factor(game.is_home);
        if !weight.is_finite() {
            return None;
        }
        numer += value * weight;
        denom += weight;
    }
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let mean = numer / denom;
    mean.is_finite().then_some(mean)
}

/// The projection formula shared by the live predictor and the trainer's
/// backtest.
pub fn project(
    window: &[PastGame],
    target_is_home: bool,
    target_opponent_win_pct: f64,
    params: &PredictorParams,
    adjustment: Adjustment,
) -> Option<f64> {
    let base = weighted_mean(window, params)?;
    let mut out = base * params.home_factor(target_is_home);
    if adjustment == Adjustment::OpponentScaled {
        out *= target_opponent_win_pct / NEUTRAL_WIN_PCT;
    }
    out.is_finite().then_some(out)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("no trained parameters for {stat}")]
    MissingParameters { stat: String },

    #[error("game {game_id} not found")]
    UnknownGame { game_id: String },

    #[error("no games for {player_id} before the target game")]
    NoHistory { player_id: String },

    #[error("statistic {stat} not available for {player_id}")]
    UnsupportedStat { player_id: String, stat: String },

    #[error("prediction for {player_id} is indeterminate: {reason}")]
    IndeterminateResult {
        player_id: String,
        reason: &'static str,
    },
}

impl PredictError {
    pub fn category(&self) -> &'static str {
        match self {
            PredictError::MissingParameters { .. } => "missing_parameters",
            PredictError::UnknownGame { .. } => "unknown_game",
            PredictError::NoHistory { .. } => "no_history",
            PredictError::UnsupportedStat { .. } => "unsupported_stat",
            PredictError::IndeterminateResult { .. } => "indeterminate_result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictWarning {
    InsufficientSample { available: usize, requested: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub value: f64,
    pub games_used: usize,
    pub target_is_home: bool,
    pub warning: Option<PredictWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlateFailure {
    pub player_id: String,
    pub stat_type: String,
    pub error: PredictError,
}

#[derive(Debug, Clone, Default)]
pub struct SlateReport {
    pub game_id: String,
    pub predictions: Vec<Prediction>,
    pub failures: Vec<SlateFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub written: usize,
    pub failed: usize,
}

impl SlateReport {
    pub fn error_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for failure in &self.failures {
            *out.entry(failure.error.category()).or_insert(0) += 1;
        }
        out
    }

    pub fn insufficient_samples(&self) -> usize {
        self.predictions
            .iter()
            .filter(|p| p.insufficient_sample)
            .count()
    }

    /// Push every prediction to `sink`. A failed write is logged and counted;
    /// it does not stop the rest of the slate.
    pub fn publish(&self, sink: &mut impl ProjectionSink) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for prediction in &self.predictions {
            match sink.upsert(prediction) {
                Ok(()) => summary.written += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        player = %prediction.player_id,
                        stat = %prediction.stat_type,
                        "projection write failed: {err:#}"
                    );
                }
            }
        }
        summary
    }
}

pub struct Predictor {
    games: HashMap<String, GameContext>,
    history: HashMap<String, Vec<PlayerGameRecord>>,
    ids_by_upper: HashMap<String, String>,
    params: ParamSet,
    adjustment: Adjustment,
    confidence: u8,
}

impl Predictor {
    /// Entries of `params` with an unusable shape (`N == 0`, decay above 1,
    /// home advantage outside `[0, 1)`) are dropped, so their stats report
    /// `MissingParameters`.
    pub fn new(enriched: Enriched, mut params: ParamSet) -> Self {
        params.retain(|stat, p| match p.check_shape() {
            Ok(()) => true,
            Err(err) => {
                warn!(stat = %stat, "ignoring parameters: {err:#}");
                false
            }
        });

        let games = enriched
            .games
            .into_iter()
            .map(|ctx| (ctx.game.game_id.clone(), ctx))
            .collect::<HashMap<_, _>>();

        let mut history: HashMap<String, Vec<PlayerGameRecord>> = HashMap::new();
        for row in enriched.players {
            history.entry(row.player_id.clone()).or_default().push(row);
        }
        for rows in history.values_mut() {
            rows.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        }

        let mut ids_by_upper = HashMap::new();
        for id in history.keys() {
            ids_by_upper
                .entry(id.to_uppercase())
                .or_insert_with(|| id.clone());
        }

        Self {
            games,
            history,
            ids_by_upper,
            params,
            adjustment: Adjustment::default(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn from_sources(
        history: &impl HistorySource,
        fixtures: &impl FixtureSource,
        params: ParamSet,
    ) -> Result<Self> {
        let games = fixtures.games()?;
        let players = history.player_games()?;
        let enriched = win_pct::enrich(&games, &players);
        Ok(Self::new(enriched, params))
    }

    pub fn with_adjustment(mut self, adjustment: Adjustment) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn game(&self, game_id: &str) -> Option<&GameContext> {
        self.games.get(game_id)
    }

    pub fn player_count(&self) -> usize {
        self.history.len()
    }

    /// Exact id first, then a case-insensitive match against known players.
    pub fn resolve_player_id<'a>(&'a self, raw: &str) -> Option<&'a str> {
        if let Some((id, _)) = self.history.get_key_value(raw) {
            return Some(id.as_str());
        }
        self.ids_by_upper
            .get(&raw.to_uppercase())
            .map(|id| id.as_str())
    }

    pub fn predict(
        &self,
        player_id: &str,
        game_id: &str,
        stat: &str,
    ) -> Result<Projection, PredictError> {
        let params = self
            .params
            .get(stat)
            .ok_or_else(|| PredictError::MissingParameters {
                stat: stat.to_string(),
            })?;
        let target = self
            .games
            .get(game_id)
            .ok_or_else(|| PredictError::UnknownGame {
                game_id: game_id.to_string(),
            })?;
        let no_history = || PredictError::NoHistory {
            player_id: player_id.to_string(),
        };
        let games = self.history.get(player_id).ok_or_else(no_history)?;

        let cut = games.partition_point(|g| g.start_date < target.game.start_date);
        let window = &games[cut.saturating_sub(params.n)..cut];
        if window.is_empty() {
            return Err(no_history());
        }
        let warning = (window.len() < params.n).then(|| {
            warn!(
                player = player_id,
                available = window.len(),
                requested = params.n,
                "fewer past games than the lookback window"
            );
            PredictWarning::InsufficientSample {
                available: window.len(),
                requested: params.n,
            }
        });
        if !games.iter().any(|g| g.stats.contains_key(stat)) {
            return Err(PredictError::UnsupportedStat {
                player_id: player_id.to_string(),
                stat: stat.to_string(),
            });
        }

        // Prefer the team listed for the target game itself; otherwise the
        // player's latest team before it.
        let team_id = games
            .iter()
            .find(|g| g.game_id == game_id)
            .or_else(|| window.last())
            .map(|g| g.team_id.as_str())
            .unwrap_or_default();
        let target_is_home = target.game.side_of(team_id).unwrap_or(false);
        let target_opponent = target
            .opponent_win_pct(team_id)
            .unwrap_or(NEUTRAL_WIN_PCT);

        let past = window
            .iter()
            .map(|g| PastGame::from_record(g, stat))
            .collect::<Vec<_>>();
        let value = project(
            &past,
            target_is_home,
            target_opponent,
            params,
            self.adjustment,
        )
        .ok_or_else(|| PredictError::IndeterminateResult {
            player_id: player_id.to_string(),
            reason: "weights or values are undefined or sum to zero",
        })?;

        Ok(Projection {
            value,
            games_used: window.len(),
            target_is_home,
            warning,
        })
    }

    /// Predict every line of one game. Per-line failures are collected, never
    /// propagated.
    pub fn predict_slate(&self, game_id: &str, lines: &[PropLine]) -> SlateReport {
        let mut report = SlateReport {
            game_id: game_id.to_string(),
            ..SlateReport::default()
        };

        for line in lines {
            let resolved = self.resolve_player_id(&line.player_id);
            let outcome = match resolved {
                Some(id) => self.predict(id, game_id, &line.stat_type),
                None => Err(PredictError::NoHistory {
                    player_id: line.player_id.clone(),
                }),
            };
            match outcome {
                Ok(projection) => {
                    let edge = projection.value - line.line;
                    report.predictions.push(Prediction {
                        player_id: resolved.unwrap_or(&line.player_id).to_string(),
                        player_name: line.player_name.clone(),
                        game_id: game_id.to_string(),
                        stat_type: line.stat_type.clone(),
                        predicted_value: projection.value,
                        line: Some(line.line),
                        edge: Some(edge),
                        confidence: self.confidence,
                        recommendation: Recommendation::from_edge(Some(edge)),
                        games_used: projection.games_used,
                        insufficient_sample: projection.warning.is_some(),
                    });
                }
                Err(error) => {
                    debug!(player = %line.player_id, stat = %line.stat_type, "{error}");
                    report.failures.push(SlateFailure {
                        player_id: line.player_id.clone(),
                        stat_type: line.stat_type.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            game = game_id,
            lines = lines.len(),
            predicted = report.predictions.len(),
            failed = report.failures.len(),
            insufficient = report.insufficient_samples(),
            "slate complete"
        );
        report
    }
}
