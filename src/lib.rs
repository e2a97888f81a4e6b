pub mod config;
pub mod odds_file;
pub mod params;
pub mod predictor;
pub mod records;
pub mod sources;
pub mod store;
pub mod synthetic;
pub mod trainer;
pub mod win_pct;
