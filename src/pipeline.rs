use serde::Serialize;
use tracing::info;

use crate::config::{Config, BASE_TABLE_FILE, FEATURE_COLUMNS_FILE, FEATURE_TABLE_FILE};
use crate::db::SegmentStore;
use crate::error::Result;
use crate::etl::base_table::{read_base_table, write_base_table};
use crate::etl::{join_opportunities, load_sources};
use crate::features::table::{write_feature_columns, write_feature_table};
use crate::features::{build_features, FeatureRow};
use crate::query::aggregate_table;
use crate::types::BaseRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub opportunities: usize,
    pub feature_rows: usize,
    pub segments: usize,
    pub computed_at: i64,
}

/// Load the raw record sets, join them, and persist the base table.
pub fn build_base_table(cfg: &Config) -> Result<Vec<BaseRow>> {
    let sources = load_sources(&cfg.data_dir)?;
    let base = join_opportunities(&sources)?;
    let path = cfg.artifact(BASE_TABLE_FILE);
    write_base_table(&path, &base)?;
    info!(opportunities = base.len(), "Base table written to {}", path.display());
    Ok(base)
}

/// Derive features from the persisted base table and write the feature
/// table together with its column list.
pub fn build_feature_table(cfg: &Config) -> Result<Vec<FeatureRow>> {
    let base = read_base_table(&cfg.artifact(BASE_TABLE_FILE))?;
    let rows = build_features(&base);
    let path = cfg.artifact(FEATURE_TABLE_FILE);
    write_feature_table(&path, &rows)?;
    write_feature_columns(&cfg.artifact(FEATURE_COLUMNS_FILE))?;
    info!(feature_rows = rows.len(), "Feature table written to {}", path.display());
    Ok(rows)
}

/// Full batch run: base table, feature table, then the SQLite segment mirror.
pub async fn run(cfg: &Config, store: &SegmentStore) -> Result<PipelineReport> {
    let base = build_base_table(cfg)?;
    let features = build_feature_table(cfg)?;

    let segments = aggregate_table(&base);
    let computed_at = chrono::Utc::now().timestamp();
    store.replace_all(&segments, computed_at).await?;

    let report = PipelineReport {
        opportunities: base.len(),
        feature_rows: features.len(),
        segments: segments.len(),
        computed_at,
    };
    info!(
        opportunities = report.opportunities,
        feature_rows = report.feature_rows,
        segments = report.segments,
        "Pipeline complete"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::{AWARDS_FILE, DECISIONS_FILE, SOLICITATIONS_FILE};
    use crate::error::AppError;
    use crate::features::table::read_feature_columns;
    use crate::features::{FeatureTable, FEATURE_COLUMNS};

    pub(crate) fn test_config(root: &Path) -> Config {
        Config {
            log_level: "info".to_string(),
            data_dir: root.join("data"),
            artifacts_dir: root.join("artifacts"),
            db_path: ":memory:".to_string(),
            api_port: 0,
        }
    }

    /// Three awards across two agencies, one protest per awarded DOD
    /// opportunity, and a solicitation for each.
    pub(crate) fn write_sources(cfg: &Config) {
        std::fs::create_dir_all(&cfg.data_dir).unwrap();
        std::fs::write(
            cfg.source(AWARDS_FILE),
            "opp_id,agency_id,naics,value,incumbent_changed,sow_ambiguity_score\n\
             1,DOD,541511,25000000,1,0.8\n\
             2,DOD,541511,30000000,0,0.2\n\
             3,GSA,541611,500000,0,\n",
        )
        .unwrap();
        std::fs::write(
            cfg.source(SOLICITATIONS_FILE),
            "opp_id,posted_date,due_date\n\
             1,2023-01-10,2023-02-10\n\
             2,2023-03-01,2023-04-01\n\
             3,2023-02-15,2023-03-15\n",
        )
        .unwrap();
        std::fs::write(
            cfg.source(DECISIONS_FILE),
            "opp_id,protester_id,sustained,resolution_days,decision_date\n\
             1,P-100,1,45,2023-05-01\n\
             2,P-100,0,30,2023-06-15\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn run_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        write_sources(&cfg);
        let store = SegmentStore::in_memory().await.unwrap();

        let report = run(&cfg, &store).await.unwrap();
        assert_eq!(report.opportunities, 3);
        assert_eq!(report.feature_rows, 3);
        assert_eq!(report.segments, 2);

        let base = read_base_table(&cfg.artifact(BASE_TABLE_FILE)).unwrap();
        assert_eq!(base.len(), 3);
        let gsa = base.iter().find(|r| r.opp_id == 3).unwrap();
        assert_eq!(gsa.sow_ambiguity_score, 0.0);
        assert_eq!(gsa.value_band.as_deref(), Some("LT1M"));

        let columns = read_feature_columns(&cfg.artifact(FEATURE_COLUMNS_FILE)).unwrap();
        assert_eq!(columns, FEATURE_COLUMNS);
        let table = FeatureTable::read(&cfg.artifact(FEATURE_TABLE_FILE), &columns).unwrap();
        assert_eq!(table.len(), 3);

        assert_eq!(store.all().await.unwrap(), aggregate_table(&base));
    }

    #[test]
    fn rebuilding_features_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        write_sources(&cfg);
        build_base_table(&cfg).unwrap();

        build_feature_table(&cfg).unwrap();
        let first = std::fs::read(cfg.artifact(FEATURE_TABLE_FILE)).unwrap();
        build_feature_table(&cfg).unwrap();
        let second = std::fs::read(cfg.artifact(FEATURE_TABLE_FILE)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_sources_stop_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        assert!(matches!(build_base_table(&cfg), Err(AppError::SourceNotFound(_))));
    }
}
