use std::sync::{Arc, RwLock};

use tracing::info;

use crate::config::{
    Config, BASE_TABLE_FILE, FEATURE_COLUMNS_FILE, FEATURE_TABLE_FILE, METRICS_FILE, MODEL_FILE,
    SUSTAIN_MODEL_FILE,
};
use crate::error::{AppError, Result};
use crate::etl::base_table::read_base_table;
use crate::features::table::read_feature_columns;
use crate::features::FeatureTable;
use crate::scorer::{load_metrics, load_model, load_optional_model, MetricsReport, ScoringModel};
use crate::types::BaseRow;

/// Everything the query and scoring paths read, loaded together and never
/// mutated afterwards.
pub struct Snapshot {
    pub base: Vec<BaseRow>,
    pub features: FeatureTable,
    pub protest_model: Arc<dyn ScoringModel>,
    pub sustain_model: Option<Arc<dyn ScoringModel>>,
    pub metrics: MetricsReport,
}

impl Snapshot {
    /// Assemble a snapshot, rejecting models whose width or feature names
    /// disagree with the feature table's columns.
    pub fn new(
        base: Vec<BaseRow>,
        features: FeatureTable,
        protest_model: Arc<dyn ScoringModel>,
        sustain_model: Option<Arc<dyn ScoringModel>>,
        metrics: MetricsReport,
    ) -> Result<Self> {
        check_model("protest", protest_model.as_ref(), features.columns())?;
        if let Some(model) = &sustain_model {
            check_model("sustain", model.as_ref(), features.columns())?;
        }
        Ok(Self {
            base,
            features,
            protest_model,
            sustain_model,
            metrics,
        })
    }

    pub fn load(cfg: &Config) -> Result<Self> {
        let base = read_base_table(&cfg.artifact(BASE_TABLE_FILE))?;
        let columns = read_feature_columns(&cfg.artifact(FEATURE_COLUMNS_FILE))?;
        let features = FeatureTable::read(&cfg.artifact(FEATURE_TABLE_FILE), &columns)?;
        let protest_model = load_model(&cfg.artifact(MODEL_FILE))?;
        let sustain_model = load_optional_model(&cfg.artifact(SUSTAIN_MODEL_FILE))?;
        let metrics = load_metrics(&cfg.artifact(METRICS_FILE))?;

        let snapshot = Self::new(base, features, protest_model, sustain_model, metrics)?;
        info!(
            opportunities = snapshot.base.len(),
            feature_rows = snapshot.features.len(),
            sustain_model = snapshot.sustain_model.is_some(),
            "Snapshot loaded from {}",
            cfg.artifacts_dir.display()
        );
        Ok(snapshot)
    }
}

fn check_model(which: &str, model: &dyn ScoringModel, columns: &[String]) -> Result<()> {
    if let Some(names) = model.feature_names() {
        if names != columns {
            return Err(AppError::InvalidSnapshot(format!(
                "{which} model features {names:?} do not match feature columns {columns:?}"
            )));
        }
    }
    if let Some(coefficients) = model.linear_coefficients() {
        if coefficients.len() != columns.len() {
            return Err(AppError::InvalidSnapshot(format!(
                "{which} model has {} coefficients for {} feature columns",
                coefficients.len(),
                columns.len()
            )));
        }
    }
    Ok(())
}

/// Shared pointer to the current snapshot. Readers clone the `Arc` and keep
/// using it even if a reload swaps in a newer one.
pub struct SnapshotHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, snapshot: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Load a fresh snapshot from disk and swap it in. On error the
    /// previous snapshot stays current.
    pub fn reload(&self, cfg: &Config) -> Result<Arc<Snapshot>> {
        let fresh = Snapshot::load(cfg)?;
        self.replace(fresh);
        Ok(self.current())
    }
}
