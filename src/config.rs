use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const DATA_DIR: &str = "data";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Raw source file names, resolved against `Config::data_dir`.
pub const AWARDS_FILE: &str = "usa_contracts_sample.csv";
pub const SOLICITATIONS_FILE: &str = "sam_opps_sample.csv";
pub const DECISIONS_FILE: &str = "gao_decisions_sample.csv";

/// Artifact file names, resolved against `Config::artifacts_dir`.
pub const BASE_TABLE_FILE: &str = "base.csv";
pub const FEATURE_TABLE_FILE: &str = "features.csv";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const MODEL_FILE: &str = "model.json";
pub const SUSTAIN_MODEL_FILE: &str = "sustain_model.json";
pub const METRICS_FILE: &str = "metrics.json";

/// Number of drivers kept per model after ranking by absolute contribution.
pub const TOP_DRIVERS: usize = 5;

/// `days_since_last_decision` is clipped to [-DAYS_SINCE_CLIP, DAYS_SINCE_CLIP]
/// and takes the upper bound when there is no prior decision.
pub const DAYS_SINCE_CLIP: i64 = 365;

/// Award-value cut points (USD) between consecutive value bands.
/// Applied by the joiner and by every consumer of `value_band`.
pub mod value_band_cuts {
    pub const SMALL_MAX: f64 = 1_000_000.0;
    pub const MEDIUM_MAX: f64 = 10_000_000.0;
    pub const LARGE_MAX: f64 = 50_000_000.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Directory holding the three raw record sets (DATA_DIR)
    pub data_dir: PathBuf,
    /// Directory for base/feature tables and model artifacts (ARTIFACTS_DIR)
    pub artifacts_dir: PathBuf,
    pub db_path: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| DATA_DIR.to_string())
                .into(),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .unwrap_or_else(|_| ARTIFACTS_DIR.to_string())
                .into(),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "protest_risk.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
        })
    }

    pub fn artifact(&self, file: &str) -> PathBuf {
        self.artifacts_dir.join(file)
    }

    pub fn source(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}
