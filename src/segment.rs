//! Segment aggregation shared by the feature engine and the aggregate query
//! engine. Both call [`aggregate`], so their per-segment arithmetic is the
//! same code path and cannot drift.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::BaseRow;

/// Grouping key (agency, NAICS, value band). Missing components group together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value_band: Option<String>,
}

impl SegmentKey {
    pub fn of(row: &BaseRow) -> Self {
        Self {
            agency_id: row.agency_id.clone(),
            naics: row.naics.clone(),
            value_band: row.value_band.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentStats {
    pub opportunity_count: usize,
    /// protested / opportunity_count
    pub protest_rate: f64,
    /// sustained / protested, 0.0 when nothing in the segment was protested
    pub sustain_rate: f64,
    /// Median over protested opportunities only, 0.0 when there are none
    pub median_resolution_days: f64,
}

/// One flattened segment, as returned by queries and written to exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value_band: Option<String>,
    pub opportunity_count: usize,
    pub protest_rate: f64,
    pub sustain_rate: f64,
    pub median_resolution_days: f64,
}

impl SegmentRecord {
    pub fn new(key: SegmentKey, stats: SegmentStats) -> Self {
        Self {
            agency_id: key.agency_id,
            naics: key.naics,
            value_band: key.value_band,
            opportunity_count: stats.opportunity_count,
            protest_rate: stats.protest_rate,
            sustain_rate: stats.sustain_rate,
            median_resolution_days: stats.median_resolution_days,
        }
    }
}

#[derive(Default)]
struct SegmentAccumulator {
    count: usize,
    protested: usize,
    sustained: usize,
    resolution_days: Vec<f64>,
}

impl SegmentAccumulator {
    fn push(&mut self, row: &BaseRow) {
        self.count += 1;
        if row.protested {
            self.protested += 1;
            self.resolution_days.push(row.median_resolution_days);
            if row.sustained_flag {
                self.sustained += 1;
            }
        }
    }

    fn finish(mut self) -> SegmentStats {
        let protest_rate = if self.count > 0 {
            self.protested as f64 / self.count as f64
        } else {
            0.0
        };
        let sustain_rate = if self.protested > 0 {
            self.sustained as f64 / self.protested as f64
        } else {
            0.0
        };
        SegmentStats {
            opportunity_count: self.count,
            protest_rate,
            sustain_rate,
            median_resolution_days: median(&mut self.resolution_days).unwrap_or(0.0),
        }
    }
}

/// Group rows by segment key. Keys come back in sorted order.
pub fn aggregate<'a, I>(rows: I) -> BTreeMap<SegmentKey, SegmentStats>
where
    I: IntoIterator<Item = &'a BaseRow>,
{
    let mut groups: BTreeMap<SegmentKey, SegmentAccumulator> = BTreeMap::new();
    for row in rows {
        groups.entry(SegmentKey::of(row)).or_default().push(row);
    }
    groups.into_iter().map(|(k, acc)| (k, acc.finish())).collect()
}

/// Median with the two middle values averaged for even counts. Sorts in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal base row for aggregation tests.
    pub(crate) fn row(opp_id: i64, agency: &str, naics: &str, band: &str, protested: bool, sustained: bool, days: f64) -> BaseRow {
        BaseRow {
            opp_id,
            agency_id: Some(agency.to_string()),
            naics: Some(naics.to_string()),
            value: 1_000_000.0,
            posted_date: None,
            due_date: None,
            incumbent_displacement_flag: false,
            sow_ambiguity_score: 0.0,
            protests: u32::from(protested),
            sustained: u32::from(sustained),
            protested,
            sustained_flag: sustained,
            sustain_rate_opp: if sustained { 1.0 } else { 0.0 },
            median_resolution_days: days,
            primary_protester: None,
            protester_history: 0,
            last_decision_date: None,
            value_band: Some(band.to_string()),
            log_value: 1_000_001.0f64.ln(),
            agency_prior_protest_rate: 0.0,
        }
    }

    #[test]
    fn median_handles_odd_even_and_empty() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn unprotested_rows_contribute_no_resolution_days() {
        let rows = vec![
            row(1, "DOD", "541511", "LARGE", true, false, 60.0),
            row(2, "DOD", "541511", "LARGE", false, false, 0.0),
        ];
        let segments = aggregate(&rows);
        let stats = segments.values().next().unwrap();
        assert_eq!(stats.opportunity_count, 2);
        assert_eq!(stats.protest_rate, 0.5);
        assert_eq!(stats.sustain_rate, 0.0);
        assert_eq!(stats.median_resolution_days, 60.0);
    }

    #[test]
    fn null_key_components_form_their_own_group() {
        let mut orphan = row(3, "DOD", "541511", "LARGE", true, true, 10.0);
        orphan.agency_id = None;
        let rows = vec![row(1, "DOD", "541511", "LARGE", false, false, 0.0), orphan];
        let segments = aggregate(&rows);
        assert_eq!(segments.len(), 2);
        let null_key = SegmentKey {
            agency_id: None,
            naics: Some("541511".to_string()),
            value_band: Some("LARGE".to_string()),
        };
        assert_eq!(segments[&null_key].sustain_rate, 1.0);
    }
}
