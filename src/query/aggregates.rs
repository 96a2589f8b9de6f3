use serde::{Deserialize, Serialize};

use crate::segment::{self, SegmentRecord};
use crate::types::BaseRow;

/// Optional filters for an aggregate query. Values are trimmed and
/// upper-cased; blank values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateFilter {
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value_band: Option<String>,
}

impl AggregateFilter {
    pub fn new(agency_id: Option<&str>, naics: Option<&str>, value_band: Option<&str>) -> Self {
        Self {
            agency_id: agency_id.map(str::to_string),
            naics: naics.map(str::to_string),
            value_band: value_band.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResponse {
    pub records: Vec<SegmentRecord>,
    /// Sum of `opportunity_count` over `records`.
    pub total: usize,
}

fn normalize(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

fn upper_eq(cell: Option<&str>, wanted: &str) -> bool {
    cell.is_some_and(|c| c.to_uppercase() == wanted)
}

fn upper_prefix(cell: Option<&str>, prefix: &str) -> bool {
    cell.is_some_and(|c| c.to_uppercase().starts_with(prefix))
}

/// Grouped protest/sustain rates per (agency, NAICS, value band) over the
/// rows that pass `filter`. Agency and band match exactly, NAICS by prefix,
/// all case-insensitively. No matching rows gives an empty response.
pub fn query_aggregates(base: &[BaseRow], filter: &AggregateFilter) -> AggregateResponse {
    let agency = normalize(filter.agency_id.as_deref());
    let naics = normalize(filter.naics.as_deref());
    let band = normalize(filter.value_band.as_deref());

    let matching = base.iter().filter(|row| {
        agency.as_deref().map_or(true, |a| upper_eq(row.agency_id.as_deref(), a))
            && naics.as_deref().map_or(true, |n| upper_prefix(row.naics.as_deref(), n))
            && band.as_deref().map_or(true, |b| upper_eq(row.value_band.as_deref(), b))
    });

    let records: Vec<SegmentRecord> = segment::aggregate(matching)
        .into_iter()
        .map(|(key, stats)| SegmentRecord::new(key, stats))
        .collect();
    let total = records.iter().map(|r| r.opportunity_count).sum();

    AggregateResponse { records, total }
}

/// Every segment in the base table, unfiltered.
pub fn aggregate_table(base: &[BaseRow]) -> Vec<SegmentRecord> {
    query_aggregates(base, &AggregateFilter::default()).records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::row;

    fn sample_base() -> Vec<BaseRow> {
        vec![
            row(1, "DOD", "541511", "LARGE", true, false, 60.0),
            row(2, "DOD", "541511", "LARGE", false, false, 0.0),
            row(3, "GSA", "541512", "SMALL", true, true, 20.0),
            row(4, "DOD", "541512", "LARGE", true, true, 30.0),
            row(5, "DOD", "541611", "LARGE", false, false, 0.0),
        ]
    }

    fn matching_total(base: &[BaseRow], filter: &AggregateFilter) -> usize {
        query_aggregates(base, filter).total
    }

    #[test]
    fn single_segment_rates() {
        let response = query_aggregates(
            &sample_base(),
            &AggregateFilter::new(Some("DOD"), Some("541511"), Some("LARGE")),
        );
        assert_eq!(response.total, 2);
        assert_eq!(response.records.len(), 1);
        let record = &response.records[0];
        assert_eq!(record.opportunity_count, 2);
        assert!((record.protest_rate - 0.5).abs() < 1e-9);
        assert_eq!(record.sustain_rate, 0.0);
        assert_eq!(record.median_resolution_days, 60.0);
    }

    #[test]
    fn filters_are_case_insensitive_and_trimmed() {
        let base = sample_base();
        let upper = query_aggregates(&base, &AggregateFilter::new(Some("DOD"), None, Some("LARGE")));
        let lower = query_aggregates(&base, &AggregateFilter::new(Some(" dod "), None, Some("large")));
        assert_eq!(upper, lower);
        assert_eq!(upper.total, 4);
    }

    #[test]
    fn blank_filters_count_as_absent() {
        let base = sample_base();
        let all = query_aggregates(&base, &AggregateFilter::default());
        let blank = query_aggregates(&base, &AggregateFilter::new(Some("  "), Some(""), None));
        assert_eq!(all, blank);
        assert_eq!(all.total, base.len());
    }

    #[test]
    fn naics_matches_by_prefix() {
        let base = sample_base();
        let response = query_aggregates(&base, &AggregateFilter::new(Some("DOD"), Some("5415"), None));
        let codes: Vec<_> = response.records.iter().map(|r| r.naics.as_deref().unwrap()).collect();
        assert_eq!(codes, vec!["541511", "541512"]);
        assert_eq!(response.total, 3);
    }

    #[test]
    fn shorter_prefixes_return_supersets() {
        let base = sample_base();
        let prefixes = ["5", "54", "541", "5415", "54151", "541511"];
        let totals: Vec<usize> = prefixes
            .iter()
            .map(|p| matching_total(&base, &AggregateFilter::new(None, Some(*p), None)))
            .collect();
        assert!(totals.windows(2).all(|w| w[0] >= w[1]), "{totals:?}");
    }

    #[test]
    fn unmatched_filter_is_empty_not_an_error() {
        let response = query_aggregates(&sample_base(), &AggregateFilter::new(Some("NASA"), None, None));
        assert!(response.records.is_empty());
        assert_eq!(response.total, 0);
    }

    #[test]
    fn rates_stay_in_unit_interval() {
        for record in aggregate_table(&sample_base()) {
            assert!((0.0..=1.0).contains(&record.protest_rate));
            assert!((0.0..=1.0).contains(&record.sustain_rate));
        }
    }

    #[test]
    fn aggregate_table_covers_every_segment() {
        let rows = aggregate_table(&sample_base());
        assert_eq!(rows.len(), 4);
        let dod = rows
            .iter()
            .find(|r| r.agency_id.as_deref() == Some("DOD") && r.naics.as_deref() == Some("541511"))
            .unwrap();
        assert_eq!(dod.opportunity_count, 2);
        assert!((dod.protest_rate - 0.5).abs() < 1e-9);
    }
}
