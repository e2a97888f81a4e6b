use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use crate::params::Adjustment;
use crate::predictor::DEFAULT_CONFIDENCE;
use crate::records::DEFAULT_STATS;
use crate::trainer::DEFAULT_SPLIT_QUANTILE;

const CACHE_DIR: &str = "trendy_props";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub params_path: Option<PathBuf>,
    pub stats: Vec<String>,
    pub adjustment: Adjustment,
    pub split_quantile: f64,
    pub confidence: u8,
    pub dry_run: bool,
    pub game: Option<String>,
    pub odds: Option<PathBuf>,
    pub grid: Option<PathBuf>,
    pub synthetic: bool,
    pub seed: u64,
}

impl Settings {
    /// Process environment (after `.env.local` / `.env`) overridden by argv.
    pub fn from_env_and_args() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        Self::resolve(&args, |key| std::env::var(key).ok())
    }

    pub fn resolve(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let adjustment = match arg_value(args, "--adjustment").or_else(|| env("PROPS_ADJUSTMENT"))
        {
            Some(raw) => Adjustment::parse(&raw)
                .ok_or_else(|| anyhow!("unknown adjustment {raw:?}"))?,
            None => Adjustment::default(),
        };

        let stats = arg_value(args, "--stats")
            .or_else(|| env("PROPS_STATS"))
            .map(|raw| split_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_STATS.iter().map(|s| s.to_string()).collect());

        let split_quantile = parse_f64(args, "--split-quantile")
            .or_else(|| env("PROPS_SPLIT_QUANTILE").and_then(|v| v.trim().parse().ok()))
            .unwrap_or(DEFAULT_SPLIT_QUANTILE)
            .clamp(0.05, 0.95);

        let confidence = arg_value(args, "--confidence")
            .or_else(|| env("PROPS_CONFIDENCE"))
            .and_then(|v| v.trim().parse::<u8>().ok())
            .unwrap_or(DEFAULT_CONFIDENCE)
            .min(100);

        Ok(Self {
            db_path: path_arg(args, "--db")
                .or_else(|| env("PROPS_DB_PATH").map(PathBuf::from))
                .or_else(|| app_cache_dir().map(|dir| dir.join("props.sqlite"))),
            params_path: path_arg(args, "--params")
                .or_else(|| env("PROPS_PARAMS_PATH").map(PathBuf::from))
                .or_else(|| app_cache_dir().map(|dir| dir.join("best_params.json"))),
            stats,
            adjustment,
            split_quantile,
            confidence,
            dry_run: has_flag(args, "--dry-run"),
            game: arg_value(args, "--game"),
            odds: path_arg(args, "--odds"),
            grid: path_arg(args, "--grid"),
            synthetic: has_flag(args, "--synthetic"),
            seed: arg_value(args, "--seed")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(7),
        })
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// `fmt` subscriber honouring `RUST_LOG`, `info` otherwise. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Value for `--name=value` or `--name value`.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    arg_value(args, name).map(PathBuf::from)
}

pub fn parse_f64(args: &[String], name: &str) -> Option<f64> {
    arg_value(args, name).and_then(|v| v.parse::<f64>().ok())
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}
