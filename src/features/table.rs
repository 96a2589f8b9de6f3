use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{AppError, Result};
use crate::etl::loader::normalize_opp_id;
use crate::features::columns::{canonical_columns, FEATURE_COLUMNS, ID_COLUMN, KEY_COLUMNS, LABEL_COLUMNS};
use crate::features::engine::FeatureRow;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub fn write_feature_table(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_feature_rows(std::fs::File::create(path)?, rows)
}

/// Write the feature table as CSV. Floats use the shortest round-trip
/// representation, so the same rows always produce the same bytes.
pub fn write_feature_rows<W: Write>(writer: W, rows: &[FeatureRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header: Vec<&str> = std::iter::once(ID_COLUMN)
        .chain(KEY_COLUMNS)
        .chain(LABEL_COLUMNS)
        .chain(FEATURE_COLUMNS)
        .collect();
    wtr.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        record.push(row.opp_id.to_string());
        for part in [&row.key.agency_id, &row.key.naics, &row.key.value_band] {
            record.push(part.clone().unwrap_or_default());
        }
        record.push(u8::from(row.protested).to_string());
        record.push(u8::from(row.sustained_flag).to_string());
        record.push(row.sustain_rate_opp.to_string());
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_feature_columns(path: &Path) -> Result<()> {
    std::fs::write(path, serde_json::to_string(&FEATURE_COLUMNS)?)?;
    Ok(())
}

pub fn read_feature_columns(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(AppError::InvalidSnapshot(format!(
            "feature column list {} is missing",
            path.display()
        )));
    }
    let columns: Vec<String> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    if columns.is_empty() {
        return Err(AppError::InvalidSnapshot("feature column list is empty".to_string()));
    }
    Ok(columns)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Persisted feature table reduced to what the scorer needs: one numeric
/// vector per opportunity, in `columns` order.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    index: HashMap<i64, usize>,
}

impl FeatureTable {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            index.insert(row.opp_id, i);
        }
        Self {
            columns: canonical_columns(),
            rows: rows.iter().map(|r| r.values.clone()).collect(),
            index,
        }
    }

    pub fn read(path: &Path, columns: &[String]) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::InvalidSnapshot(format!(
                "feature table {} is missing",
                path.display()
            )));
        }
        Self::from_reader(std::fs::File::open(path)?, columns)
    }

    /// Parse a feature table, keeping only `columns`. A missing column, a
    /// non-numeric cell, or a repeated id is an invalid snapshot.
    pub fn from_reader<R: Read>(reader: R, columns: &[String]) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        let position = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                AppError::InvalidSnapshot(format!("feature table is missing column {name:?}"))
            })
        };
        let id_pos = position(ID_COLUMN)?;
        let positions = columns
            .iter()
            .map(|c| position(c.as_str()))
            .collect::<Result<Vec<usize>>>()?;

        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for record in rdr.records() {
            let record = record?;
            let raw_id = record.get(id_pos).unwrap_or("");
            let opp_id = normalize_opp_id(raw_id).ok_or_else(|| {
                AppError::InvalidSnapshot(format!("feature table has invalid opp_id {raw_id:?}"))
            })?;

            let mut values = Vec::with_capacity(positions.len());
            for (name, &pos) in columns.iter().zip(&positions) {
                let cell = record.get(pos).unwrap_or("").trim();
                let value = cell.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                    AppError::InvalidSnapshot(format!(
                        "feature {name:?} for opportunity {opp_id} is not numeric: {cell:?}"
                    ))
                })?;
                values.push(value);
            }

            if index.insert(opp_id, rows.len()).is_some() {
                return Err(AppError::InvalidSnapshot(format!(
                    "feature table has more than one row for opportunity {opp_id}"
                )));
            }
            rows.push(values);
        }

        Ok(Self { columns: columns.to_vec(), rows, index })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn vector(&self, opp_id: i64) -> Option<&[f64]> {
        self.index.get(&opp_id).map(|&i| self.rows[i].as_slice())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
