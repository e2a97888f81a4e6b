//! Seams to the outside world. The core only ever sees these traits; concrete
//! adapters live in `store`, `odds_file` and `params`.

use anyhow::Result;

use crate::params::ParamSet;
use crate::records::{GameRecord, PlayerGameRecord, Prediction, PropLine};

pub trait HistorySource {
    fn player_games(&self) -> Result<Vec<PlayerGameRecord>>;
}

pub trait FixtureSource {
    fn games(&self) -> Result<Vec<GameRecord>>;
}

pub trait OddsSource {
    fn prop_lines(&self, game_id: &str) -> Result<Vec<PropLine>>;
}

/// Writes keyed by (game, player, stat); a repeated key replaces the old row.
pub trait ProjectionSink {
    fn upsert(&mut self, prediction: &Prediction) -> Result<()>;
}

pub trait ParamStore {
    fn load(&self) -> Result<ParamSet>;
    fn save(&self, params: &ParamSet) -> Result<()>;
}

impl<T: ProjectionSink + ?Sized> ProjectionSink for &mut T {
    fn upsert(&mut self, prediction: &Prediction) -> Result<()> {
        (**self).upsert(prediction)
    }
}

/// Collects projections in memory; used for dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<Prediction>,
}

impl ProjectionSink for MemorySink {
    fn upsert(&mut self, prediction: &Prediction) -> Result<()> {
        if let Some(existing) = self.rows.iter_mut().find(|p| {
            p.game_id == prediction.game_id
                && p.player_id == prediction.player_id
                && p.stat_type == prediction.stat_type
        }) {
            *existing = prediction.clone();
        } else {
            self.rows.push(prediction.clone());
        }
        Ok(())
    }
}
