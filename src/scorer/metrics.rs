use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Hold-out evaluation of one fitted model. Fields absent from the artifact
/// read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetrics {
    pub auc: f64,
    pub calibration_error: f64,
    pub brier: f64,
    pub n_train: u64,
    pub n_test: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsReport {
    pub protest: ModelMetrics,
    pub sustain: ModelMetrics,
}

/// Read `metrics.json`. A missing file, or a `null` section, gives zeroed
/// metrics rather than an error.
pub fn load_metrics(path: &Path) -> Result<MetricsReport> {
    if !path.exists() {
        return Ok(MetricsReport::default());
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Raw {
        protest: Option<ModelMetrics>,
        sustain: Option<ModelMetrics>,
    }

    let raw: Option<Raw> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let raw = raw.unwrap_or_default();
    Ok(MetricsReport {
        protest: raw.protest.unwrap_or_default(),
        sustain: raw.sustain.unwrap_or_default(),
    })
}
