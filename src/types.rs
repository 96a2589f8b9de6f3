use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value bands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueBand {
    /// value < $1M
    UnderOneMillion,
    /// $1M–$10M
    OneToTenMillion,
    /// $10M–$50M
    TenToFiftyMillion,
    /// value >= $50M
    FiftyMillionPlus,
}

impl ValueBand {
    pub const ALL: [ValueBand; 4] = [
        ValueBand::UnderOneMillion,
        ValueBand::OneToTenMillion,
        ValueBand::TenToFiftyMillion,
        ValueBand::FiftyMillionPlus,
    ];

    pub fn from_value(value: f64) -> Self {
        use crate::config::value_band_cuts::*;
        if value < SMALL_MAX {
            ValueBand::UnderOneMillion
        } else if value < MEDIUM_MAX {
            ValueBand::OneToTenMillion
        } else if value < LARGE_MAX {
            ValueBand::TenToFiftyMillion
        } else {
            ValueBand::FiftyMillionPlus
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ValueBand::UnderOneMillion => "LT1M",
            ValueBand::OneToTenMillion => "1-10M",
            ValueBand::TenToFiftyMillion => "10-50M",
            ValueBand::FiftyMillionPlus => "50M+",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.label() == label)
    }

    /// Ordinal code used by the `value_band_enc` feature.
    pub fn ordinal(self) -> i64 {
        self as i64
    }
}

impl std::fmt::Display for ValueBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Raw source records (post id normalization)
// ---------------------------------------------------------------------------

/// One contract award row. `value` is `None` when the cell was empty;
/// the joiner rejects such rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AwardRecord {
    pub opp_id: i64,
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value: Option<f64>,
    pub incumbent_changed: bool,
    /// `None` when absent or unparseable; defaulted to 0.0 at join time.
    pub sow_ambiguity_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolicitationRecord {
    pub opp_id: i64,
    pub posted_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtestDecision {
    pub opp_id: i64,
    pub protester_id: Option<String>,
    /// Blank cells read as not sustained.
    pub sustained: bool,
    /// `None` for a blank cell; left out of the per-opportunity median.
    pub resolution_days: Option<f64>,
    pub decision_date: Option<NaiveDate>,
}

/// The three raw record sets, as produced by the record loader.
#[derive(Debug, Clone, Default)]
pub struct SourceRecords {
    pub awards: Vec<AwardRecord>,
    pub solicitations: Vec<SolicitationRecord>,
    pub decisions: Vec<ProtestDecision>,
}

// ---------------------------------------------------------------------------
// Joined base table
// ---------------------------------------------------------------------------

/// Protest outcome reduced to one row per opportunity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtestSummary {
    pub protests: u32,
    pub sustained: u32,
    pub median_resolution_days: f64,
    pub primary_protester: Option<String>,
    pub protester_history: u32,
    pub last_decision_date: Option<NaiveDate>,
}

/// One joined opportunity. Persisted as `base.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRow {
    pub opp_id: i64,
    pub agency_id: Option<String>,
    pub naics: Option<String>,
    pub value: f64,
    pub posted_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub incumbent_displacement_flag: bool,
    pub sow_ambiguity_score: f64,
    pub protests: u32,
    pub sustained: u32,
    pub protested: bool,
    pub sustained_flag: bool,
    pub sustain_rate_opp: f64,
    pub median_resolution_days: f64,
    pub primary_protester: Option<String>,
    pub protester_history: u32,
    pub last_decision_date: Option<NaiveDate>,
    pub value_band: Option<String>,
    pub log_value: f64,
    pub agency_prior_protest_rate: f64,
}
