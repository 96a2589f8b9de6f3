use std::io::{Read, Write};
use std::path::Path;

use crate::error::{AppError, Result};
use crate::types::BaseRow;

pub fn write_base_table(path: &Path, rows: &[BaseRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_base_rows(std::fs::File::create(path)?, rows)
}

pub fn write_base_rows<W: Write>(writer: W, rows: &[BaseRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_base_table(path: &Path) -> Result<Vec<BaseRow>> {
    if !path.exists() {
        return Err(AppError::SourceNotFound(path.to_path_buf()));
    }
    read_base_rows(std::fs::File::open(path)?)
}

pub fn read_base_rows<R: Read>(reader: R) -> Result<Vec<BaseRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
