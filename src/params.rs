use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::sources::ParamStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictorParams {
    /// Lookback window, in games.
    #[serde(rename = "N")]
    pub n: usize,
    pub decay_factor: f64,
    pub home_advantage: f64,
    #[serde(default = "default_opponent_weight")]
    pub opponent_weight: f64,
}

fn default_opponent_weight() -> f64 {
    1.0
}

impl PredictorParams {
    pub fn new(n: usize, decay_factor: f64, home_advantage: f64, opponent_weight: f64) -> Self {
        Self {
            n,
            decay_factor,
            home_advantage,
            opponent_weight,
        }
    }

    pub fn home_factor(&self, is_home: bool) -> f64 {
        if is_home {
            1.0 + self.home_advantage
        } else {
            1.0 - self.home_advantage
        }
    }

    /// Full domain check, applied to stored documents and grid files.
    pub fn validate(&self) -> Result<()> {
        self.check_shape()?;
        if self.decay_factor <= 0.0 {
            return Err(anyhow!(
                "decay_factor must be in (0, 1], got {}",
                self.decay_factor
            ));
        }
        if self.opponent_weight <= 0.0 {
            return Err(anyhow!(
                "opponent_weight must be positive, got {}",
                self.opponent_weight
            ));
        }
        Ok(())
    }

    /// The checks a live predictor needs. Zero decay or zero opponent weight
    /// pass here; the weighting formula reports them as indeterminate.
    pub fn check_shape(&self) -> Result<()> {
        if self.n == 0 {
            return Err(anyhow!("N must be at least 1"));
        }
        if self.decay_factor.is_nan() || self.decay_factor > 1.0 {
            return Err(anyhow!(
                "decay_factor must be in (0, 1], got {}",
                self.decay_factor
            ));
        }
        if !(0.0..1.0).contains(&self.home_advantage) {
            return Err(anyhow!(
                "home_advantage must be in [0, 1), got {}",
                self.home_advantage
            ));
        }
        if !(self.opponent_weight >= 0.0 && self.opponent_weight.is_finite()) {
            return Err(anyhow!(
                "opponent_weight must be finite and non-negative, got {}",
                self.opponent_weight
            ));
        }
        Ok(())
    }
}

/// Final multiplicative step applied to the weighted mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    /// `weighted * (1 ± home_advantage)`.
    #[default]
    HomeOnly,
    /// Legacy trainer variant: additionally `* opponent_win_pct / 0.5`.
    OpponentScaled,
}

impl Adjustment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "home_only" | "home" => Some(Adjustment::HomeOnly),
            "opponent_scaled" | "legacy" => Some(Adjustment::OpponentScaled),
            _ => None,
        }
    }
}

pub type ParamSet = BTreeMap<String, PredictorParams>;

pub fn parse_param_set(raw: &str) -> Result<ParamSet> {
    let params: ParamSet = serde_json::from_str(raw).context("invalid params json")?;
    for (stat, p) in &params {
        p.validate()
            .with_context(|| format!("invalid parameters for {stat}"))?;
    }
    Ok(params)
}

/// Parameter document on disk, one entry per statistic.
#[derive(Debug, Clone)]
pub struct JsonParamStore {
    path: PathBuf,
}

impl JsonParamStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParamStore for JsonParamStore {
    fn load(&self) -> Result<ParamSet> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        parse_param_set(&raw).with_context(|| format!("parse {}", self.path.display()))
    }

    fn save(&self, params: &ParamSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(params).context("serialize params")?;
        fs::write(&tmp, json).context("write params")?;
        fs::rename(&tmp, &self.path).context("swap params")?;
        Ok(())
    }
}
