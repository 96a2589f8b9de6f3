use tracing::info;

use crate::config::DAYS_SINCE_CLIP;
use crate::features::columns::FEATURE_COLUMNS;
use crate::segment::{self, SegmentKey, SegmentStats};
use crate::types::{BaseRow, ValueBand};

/// One opportunity's feature row. `values` follows `FEATURE_COLUMNS` order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub opp_id: i64,
    pub key: SegmentKey,
    pub protested: bool,
    pub sustained_flag: bool,
    pub sustain_rate_opp: f64,
    pub values: Vec<f64>,
}

/// Derive the feature table from the joined base table. Output rows keep the
/// base table's order, so identical input gives identical output.
pub fn build_features(base: &[BaseRow]) -> Vec<FeatureRow> {
    let segments = segment::aggregate(base);

    let rows: Vec<FeatureRow> = base
        .iter()
        .map(|row| {
            let key = SegmentKey::of(row);
            let stats = segments.get(&key).copied().unwrap_or_default();
            let values = FEATURE_COLUMNS
                .iter()
                .map(|name| finite_or_zero(column_value(name, row, &stats).unwrap_or(0.0)))
                .collect();
            FeatureRow {
                opp_id: row.opp_id,
                key,
                protested: row.protested,
                sustained_flag: row.sustained_flag,
                sustain_rate_opp: finite_or_zero(row.sustain_rate_opp),
                values,
            }
        })
        .collect();

    info!(rows = rows.len(), segments = segments.len(), "Built feature table");
    rows
}

fn column_value(name: &str, row: &BaseRow, stats: &SegmentStats) -> Option<f64> {
    let value = match name {
        "agency_prior_protest_rate" => row.agency_prior_protest_rate,
        "group_protest_rate" => stats.protest_rate,
        "group_sustain_rate" => stats.sustain_rate,
        "median_resolution_days" => row.median_resolution_days,
        "group_median_resolution_days" => stats.median_resolution_days,
        "value_millions" => row.value / 1_000_000.0,
        "log_value" => row.value.ln_1p(),
        "value_band_enc" => value_band_code(row.value_band.as_deref()) as f64,
        "incumbent_displacement_flag" => f64::from(u8::from(row.incumbent_displacement_flag)),
        "sow_ambiguity_score" => row.sow_ambiguity_score,
        "sow_incumbent_interaction" => {
            row.sow_ambiguity_score * f64::from(u8::from(row.incumbent_displacement_flag))
        }
        "protester_history" => f64::from(row.protester_history),
        "days_since_last_decision" => days_since_last_decision(row) as f64,
        _ => return None,
    };
    Some(value)
}

/// Ordinal code for a band label; -1 for anything outside the fixed mapping.
pub fn value_band_code(label: Option<&str>) -> i64 {
    label
        .and_then(ValueBand::from_label)
        .map_or(-1, ValueBand::ordinal)
}

/// Days from the last protest decision to the posted date, clipped to
/// ±DAYS_SINCE_CLIP. No decision (or no posted date) reads as the far bound.
pub fn days_since_last_decision(row: &BaseRow) -> i64 {
    match (row.posted_date, row.last_decision_date) {
        (Some(posted), Some(last)) => (posted - last)
            .num_days()
            .clamp(-DAYS_SINCE_CLIP, DAYS_SINCE_CLIP),
        _ => DAYS_SINCE_CLIP,
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::aggregates::{query_aggregates, AggregateFilter};
    use crate::segment::tests::row;
    use chrono::NaiveDate;

    fn col(name: &str) -> usize {
        FEATURE_COLUMNS.iter().position(|c| *c == name).unwrap()
    }

    #[test]
    fn every_canonical_column_is_populated() {
        let base = vec![row(1, "DOD", "541511", "1-10M", true, false, 30.0)];
        let features = build_features(&base);
        assert_eq!(features[0].values.len(), FEATURE_COLUMNS.len());
        assert!(features[0].values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn derived_features_follow_definitions() {
        let mut r = row(1, "DOD", "541511", "10-50M", true, false, 30.0);
        r.value = 12_500_000.0;
        r.sow_ambiguity_score = 0.8;
        r.incumbent_displacement_flag = true;
        r.protester_history = 3;
        let f = &build_features(&[r])[0];
        assert_eq!(f.values[col("value_millions")], 12.5);
        assert_eq!(f.values[col("value_band_enc")], 2.0);
        assert_eq!(f.values[col("sow_incumbent_interaction")], 0.8);
        assert_eq!(f.values[col("protester_history")], 3.0);
        assert!((f.values[col("log_value")] - 12_500_001.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn unknown_band_encodes_as_minus_one() {
        let f = &build_features(&[row(1, "DOD", "541511", "LARGE", false, false, 0.0)])[0];
        assert_eq!(f.values[col("value_band_enc")], -1.0);
        assert_eq!(value_band_code(None), -1);
    }

    #[test]
    fn days_since_last_decision_clips_and_defaults() {
        let mut r = row(1, "DOD", "541511", "LT1M", true, false, 10.0);
        assert_eq!(days_since_last_decision(&r), 365);

        r.posted_date = NaiveDate::from_ymd_opt(2023, 3, 1);
        r.last_decision_date = NaiveDate::from_ymd_opt(2023, 2, 1);
        assert_eq!(days_since_last_decision(&r), 28);

        r.last_decision_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert_eq!(days_since_last_decision(&r), -365);

        r.last_decision_date = NaiveDate::from_ymd_opt(2019, 3, 1);
        assert_eq!(days_since_last_decision(&r), 365);
    }

    #[test]
    fn segment_columns_match_the_query_engine() {
        let base = vec![
            row(1, "DOD", "541511", "1-10M", true, true, 40.0),
            row(2, "DOD", "541511", "1-10M", true, false, 80.0),
            row(3, "DOD", "541511", "1-10M", false, false, 0.0),
            row(4, "GSA", "541611", "LT1M", false, false, 0.0),
        ];
        let features = build_features(&base);
        let response = query_aggregates(&base, &AggregateFilter::default());

        for f in &features {
            let record = response
                .records
                .iter()
                .find(|r| {
                    r.agency_id == f.key.agency_id
                        && r.naics == f.key.naics
                        && r.value_band == f.key.value_band
                })
                .unwrap();
            assert_eq!(f.values[col("group_protest_rate")], record.protest_rate);
            assert_eq!(f.values[col("group_sustain_rate")], record.sustain_rate);
            assert_eq!(
                f.values[col("group_median_resolution_days")],
                record.median_resolution_days
            );
        }
        assert_eq!(features[0].values[col("group_sustain_rate")], 0.5);
        assert_eq!(features[0].values[col("group_median_resolution_days")], 60.0);
        assert_eq!(features[3].values[col("group_protest_rate")], 0.0);
    }
}
