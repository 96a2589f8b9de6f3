use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::health::{HealthReport, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::Config;
use crate::db::SegmentStore;
use crate::error::{AppError, Result};
use crate::query::{aggregate_table, query_aggregates, AggregateFilter, AggregateResponse};
use crate::scorer::{score, MetricsReport};
use crate::segment::SegmentRecord;
use crate::snapshot::SnapshotHandle;

#[derive(Clone)]
pub struct ApiState {
    pub cfg: Arc<Config>,
    pub snapshots: Arc<SnapshotHandle>,
    pub segments: SegmentStore,
    pub health: Arc<HealthState>,
    pub query_latency: Arc<LatencyStats>,
    pub score_latency: Arc<LatencyStats>,
}

impl ApiState {
    pub fn new(cfg: Config, snapshots: SnapshotHandle, segments: SegmentStore) -> Self {
        Self {
            cfg: Arc::new(cfg),
            snapshots: Arc::new(snapshots),
            segments,
            health: Arc::new(HealthState::new()),
            query_latency: Arc::new(LatencyStats::new()),
            score_latency: Arc::new(LatencyStats::new()),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/protestAgg", get(get_protest_agg))
        .route("/protestRisk", get(get_protest_risk))
        .route("/protestAggTable", get(get_protest_agg_table))
        .route("/exportAggregates", get(export_aggregates))
        .route("/modelMetrics", get(get_model_metrics))
        .route("/stats/latency", get(get_stats_latency))
        .route("/snapshot/reload", post(reload_snapshot))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RiskQuery {
    #[serde(rename = "oppId")]
    pub opp_id: i64,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub query: LatencySummary,
    pub score: LatencySummary,
}

fn not_found(detail: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "detail": detail })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthReport>> {
    let computed_at = state.segments.computed_at().await?;
    Ok(Json(state.health.report(&state.snapshots.current(), computed_at)))
}

async fn get_protest_agg(
    State(state): State<ApiState>,
    Query(filter): Query<AggregateFilter>,
) -> Json<AggregateResponse> {
    let snapshot = state.snapshots.current();
    Json(state.query_latency.time(|| query_aggregates(&snapshot.base, &filter)))
}

async fn get_protest_risk(
    State(state): State<ApiState>,
    Query(params): Query<RiskQuery>,
) -> Response {
    let snapshot = state.snapshots.current();
    match state.score_latency.time(|| score(&snapshot, params.opp_id)) {
        Some(result) => Json(result).into_response(),
        None => not_found("Opportunity not found"),
    }
}

/// Every segment of the serving snapshot, the same table `/exportAggregates`
/// writes as CSV.
async fn get_protest_agg_table(State(state): State<ApiState>) -> Json<Vec<SegmentRecord>> {
    Json(aggregate_table(&state.snapshots.current().base))
}

async fn export_aggregates(State(state): State<ApiState>) -> Result<Response> {
    let records = aggregate_table(&state.snapshots.current().base);
    if records.is_empty() {
        return Ok(not_found("No aggregate data available."));
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    for record in &records {
        wtr.serialize(record)?;
    }
    let body = wtr
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=aggregates.csv"),
        ],
        body,
    )
        .into_response())
}

async fn get_model_metrics(State(state): State<ApiState>) -> Json<MetricsReport> {
    Json(state.snapshots.current().metrics)
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        query: state.query_latency.summary(),
        score: state.score_latency.summary(),
    })
}

/// Rebuild the snapshot from the artifacts directory off the async runtime,
/// swap it in, then rewrite the SQLite segment mirror from it. A failed load
/// leaves the serving snapshot and the mirror untouched.
async fn reload_snapshot(State(state): State<ApiState>) -> Result<Json<HealthReport>> {
    let snapshots = Arc::clone(&state.snapshots);
    let cfg = Arc::clone(&state.cfg);
    let outcome = tokio::task::spawn_blocking(move || snapshots.reload(&cfg))
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;

    match outcome {
        Ok(snapshot) => {
            let now = chrono::Utc::now().timestamp();
            state.health.record_reload(u64::try_from(now).unwrap_or(0));
            info!(opportunities = snapshot.base.len(), "Snapshot reloaded");
            state
                .segments
                .replace_all(&aggregate_table(&snapshot.base), now)
                .await?;
            Ok(Json(state.health.report(&snapshot, Some(now))))
        }
        Err(e) => {
            state.health.record_failed_reload();
            warn!("Snapshot reload failed, keeping current snapshot: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_config;
    use crate::snapshot::tests::sample_snapshot;

    async fn state(root: &std::path::Path) -> ApiState {
        ApiState::new(
            test_config(root),
            SnapshotHandle::new(sample_snapshot()),
            SegmentStore::in_memory().await.unwrap(),
        )
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn protest_agg_filters_and_records_latency() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let filter = AggregateFilter::new(Some("dod"), Some("541511"), Some("large"));

        let Json(response) = get_protest_agg(State(state.clone()), Query(filter)).await;
        assert_eq!(response.total, 2);
        assert!((response.records[0].protest_rate - 0.5).abs() < 1e-9);

        let Json(latency) = get_stats_latency(State(state)).await;
        assert_eq!(latency.query.samples, 1);
        assert_eq!(latency.score.samples, 0);
    }

    #[tokio::test]
    async fn protest_risk_is_404_for_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        let found = get_protest_risk(State(state.clone()), Query(RiskQuery { opp_id: 1 })).await;
        assert_eq!(found.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(found).await).unwrap();
        assert_eq!(body["oppId"], 1);
        assert_eq!(body["sustain_probability"], 0.0);

        let missing = get_protest_risk(State(state), Query(RiskQuery { opp_id: 404 })).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    fn csv_agencies(text: &str) -> Vec<String> {
        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        rdr.deserialize::<SegmentRecord>()
            .map(|r| r.unwrap().agency_id.unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn agg_table_and_export_serve_the_same_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        // A batch run rewrites the mirror while the old snapshot is still serving.
        let newer = aggregate_table(&[crate::segment::tests::row(9, "NASA", "336414", "50M+", true, true, 90.0)]);
        state.segments.replace_all(&newer, 42).await.unwrap();

        let Json(table) = get_protest_agg_table(State(state.clone())).await;
        let table_agencies: Vec<String> =
            table.iter().map(|r| r.agency_id.clone().unwrap_or_default()).collect();
        assert_eq!(table_agencies, vec!["DOD", "GSA"]);

        let export = export_aggregates(State(state.clone())).await.unwrap();
        assert_eq!(csv_agencies(&body_text(export).await), table_agencies);

        let Json(all) = get_protest_agg(State(state), Query(AggregateFilter::default())).await;
        assert_eq!(all.records, table);
    }

    #[tokio::test]
    async fn successful_reload_resyncs_the_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        crate::pipeline::tests::write_sources(&state.cfg);
        crate::pipeline::run(&state.cfg, &state.segments).await.unwrap();
        write_model_artifacts(&state.cfg);

        // Stale mirror content from some other build.
        let stale = aggregate_table(&[crate::segment::tests::row(9, "NASA", "336414", "50M+", true, true, 90.0)]);
        state.segments.replace_all(&stale, 1).await.unwrap();

        let Json(health) = reload_snapshot(State(state.clone())).await.unwrap();
        assert_eq!(health.reloads, 1);
        assert_eq!(health.opportunities, 3);
        assert!(health.segments_computed_at.unwrap() > 1);

        let Json(table) = get_protest_agg_table(State(state.clone())).await;
        assert_eq!(state.segments.all().await.unwrap(), table);
    }

    fn write_model_artifacts(cfg: &Config) {
        let n = crate::features::FEATURE_COLUMNS.len();
        let model = crate::scorer::ModelSpec::Linear(crate::scorer::LinearModel {
            feature_names: crate::features::columns::canonical_columns(),
            means: vec![0.0; n],
            scales: vec![1.0; n],
            coefficients: vec![0.1; n],
            intercept: 0.0,
        });
        std::fs::write(
            cfg.artifact(crate::config::MODEL_FILE),
            serde_json::to_string(&model).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn export_is_csv_with_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        let response = export_aggregates(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let text = body_text(response).await;
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("agency_id,naics,value_band,opportunity_count,protest_rate,sustain_rate,median_resolution_days")
        );
        assert_eq!(lines.count(), 2);
    }

    #[tokio::test]
    async fn model_metrics_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let Json(metrics) = get_model_metrics(State(state(dir.path()).await)).await;
        assert_eq!(metrics.protest.auc, 0.0);
        assert_eq!(metrics.sustain.n_test, 0);
    }

    #[tokio::test]
    async fn failed_reload_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        assert!(reload_snapshot(State(state.clone())).await.is_err());
        let Json(health) = get_health(State(state)).await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.segments_computed_at, None);
        assert_eq!(health.opportunities, 3);
        assert_eq!(health.failed_reloads, 1);
        assert_eq!(health.reloads, 0);
    }
}
