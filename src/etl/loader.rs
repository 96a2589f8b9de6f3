use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{AWARDS_FILE, DECISIONS_FILE, SOLICITATIONS_FILE};
use crate::error::{AppError, Result};
use crate::types::{AwardRecord, ProtestDecision, SolicitationRecord, SourceRecords};

// ---------------------------------------------------------------------------
// Raw CSV rows. Every cell is read as text, typed in a second pass so ids like
// "1001.0" and dates with a time component can be normalized.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawAward {
    #[serde(default)]
    opp_id: Option<String>,
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    naics: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    incumbent_changed: Option<String>,
    #[serde(default)]
    sow_ambiguity_score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSolicitation {
    #[serde(default)]
    opp_id: Option<String>,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    opp_id: Option<String>,
    #[serde(default)]
    protester_id: Option<String>,
    #[serde(default)]
    sustained: Option<String>,
    #[serde(default)]
    resolution_days: Option<String>,
    #[serde(default)]
    decision_date: Option<String>,
}

/// Load the award, solicitation, and protest-decision record sets from `data_dir`.
/// All three files must exist; no deduplication happens here.
pub fn load_sources(data_dir: &Path) -> Result<SourceRecords> {
    let awards_path = data_dir.join(AWARDS_FILE);
    let solicitations_path = data_dir.join(SOLICITATIONS_FILE);
    let decisions_path = data_dir.join(DECISIONS_FILE);

    for path in [&awards_path, &solicitations_path, &decisions_path] {
        if !path.exists() {
            return Err(AppError::SourceNotFound(path.to_path_buf()));
        }
    }

    let awards = read_awards(File::open(&awards_path)?, AWARDS_FILE)?;
    let solicitations = read_solicitations(File::open(&solicitations_path)?, SOLICITATIONS_FILE)?;
    let decisions = read_decisions(File::open(&decisions_path)?, DECISIONS_FILE)?;

    info!(
        awards = awards.len(),
        solicitations = solicitations.len(),
        decisions = decisions.len(),
        "Loaded source records from {}",
        data_dir.display(),
    );

    Ok(SourceRecords { awards, solicitations, decisions })
}

pub fn read_awards<R: Read>(reader: R, source_name: &str) -> Result<Vec<AwardRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<RawAward>().enumerate() {
        let line = idx as u64 + 2;
        let raw = row?;
        let opp_id = required_id(raw.opp_id.as_deref(), source_name, line)?;
        let value = match non_empty(raw.value.as_deref()) {
            None => None,
            Some(v) => Some(parse_number(v).ok_or_else(|| {
                AppError::malformed(source_name, line, format!("award value {v:?} is not numeric"))
            })?),
        };
        let ambiguity_cell = non_empty(raw.sow_ambiguity_score.as_deref());
        let ambiguity = ambiguity_cell.and_then(parse_number);
        if ambiguity.is_none() && ambiguity_cell.is_some() {
            debug!(opp_id, line, "Unparseable sow_ambiguity_score, leaving unset");
        }
        out.push(AwardRecord {
            opp_id,
            agency_id: non_empty(raw.agency_id.as_deref()).map(str::to_string),
            naics: non_empty(raw.naics.as_deref()).map(str::to_string),
            value,
            incumbent_changed: non_empty(raw.incumbent_changed.as_deref())
                .and_then(parse_flag)
                .unwrap_or(false),
            sow_ambiguity_score: ambiguity,
        });
    }
    Ok(out)
}

pub fn read_solicitations<R: Read>(reader: R, source_name: &str) -> Result<Vec<SolicitationRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<RawSolicitation>().enumerate() {
        let line = idx as u64 + 2;
        let raw = row?;
        out.push(SolicitationRecord {
            opp_id: required_id(raw.opp_id.as_deref(), source_name, line)?,
            posted_date: date_cell(raw.posted_date.as_deref(), "posted_date", source_name, line)?,
            due_date: date_cell(raw.due_date.as_deref(), "due_date", source_name, line)?,
        });
    }
    Ok(out)
}

pub fn read_decisions<R: Read>(reader: R, source_name: &str) -> Result<Vec<ProtestDecision>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<RawDecision>().enumerate() {
        let line = idx as u64 + 2;
        let raw = row?;
        let sustained = match non_empty(raw.sustained.as_deref()) {
            None => false,
            Some(cell) => parse_flag(cell).ok_or_else(|| {
                AppError::malformed(source_name, line, format!("sustained flag {cell:?} is unparseable"))
            })?,
        };
        let resolution_days = match non_empty(raw.resolution_days.as_deref()) {
            None => None,
            Some(cell) => Some(parse_number(cell).filter(|d| *d >= 0.0).ok_or_else(|| {
                AppError::malformed(
                    source_name,
                    line,
                    format!("resolution_days {cell:?} is unparseable or negative"),
                )
            })?),
        };
        out.push(ProtestDecision {
            opp_id: required_id(raw.opp_id.as_deref(), source_name, line)?,
            protester_id: non_empty(raw.protester_id.as_deref()).map(str::to_string),
            sustained,
            resolution_days,
            decision_date: date_cell(raw.decision_date.as_deref(), "decision_date", source_name, line)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

fn non_empty(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|s| !s.is_empty())
}

fn required_id(cell: Option<&str>, source_name: &str, line: u64) -> Result<i64> {
    let raw = non_empty(cell)
        .ok_or_else(|| AppError::malformed(source_name, line, "missing opp_id"))?;
    normalize_opp_id(raw)
        .ok_or_else(|| AppError::malformed(source_name, line, format!("opp_id {raw:?} is not an integer")))
}

fn date_cell(cell: Option<&str>, column: &str, source_name: &str, line: u64) -> Result<Option<NaiveDate>> {
    match non_empty(cell) {
        None => Ok(None),
        Some(raw) => parse_date(raw).map(Some).ok_or_else(|| {
            AppError::malformed(source_name, line, format!("{column} {raw:?} is not a date"))
        }),
    }
}

/// Canonical integer id from `"1001"`, `" 1001 "`, or `"1001.0"`.
pub fn normalize_opp_id(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(id) = s.parse::<i64>() {
        return Some(id);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        other => other.parse::<f64>().ok().map(|v| v != 0.0),
    }
}
