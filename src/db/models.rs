use crate::segment::SegmentRecord;

/// Row of the `segment_stats` table.
#[derive(Debug, sqlx::FromRow)]
pub struct SegmentStatsRow {
    pub id: i64,
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value_band: Option<String>,
    pub opportunity_count: i64,
    pub protest_rate: f64,
    pub sustain_rate: f64,
    pub median_resolution_days: f64,
    pub computed_at: i64,
}

impl From<SegmentStatsRow> for SegmentRecord {
    fn from(row: SegmentStatsRow) -> Self {
        SegmentRecord {
            agency_id: row.agency_id,
            naics: row.naics,
            value_band: row.value_band,
            opportunity_count: usize::try_from(row.opportunity_count).unwrap_or(0),
            protest_rate: row.protest_rate,
            sustain_rate: row.sustain_rate,
            median_resolution_days: row.median_resolution_days,
        }
    }
}
