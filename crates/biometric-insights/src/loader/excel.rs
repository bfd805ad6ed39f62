//! Spreadsheet reading through calamine.
//!
//! The first worksheet is read. Its first row is the header. A column whose
//! non-empty cells are all numbers becomes numeric; anything else is text.

use crate::error::{AnalysisError, Result};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Load the first worksheet of an `.xlsx`, `.xls`, `.xlsm` or `.ods` file.
pub fn read_first_sheet(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AnalysisError::NoValidValues(format!("{} (no worksheets)", path.display())))?;
    debug!("Reading worksheet '{}'", sheet);

    let range = workbook.worksheet_range(&sheet)?;
    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(cells) => cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell_text(cell) {
                Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                _ => format!("column_{}", i + 1),
            })
            .collect(),
        None => return Ok(DataFrame::empty()),
    };

    let body: Vec<&[Data]> = rows.collect();
    let columns = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Data> = body
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Data::Empty))
                .collect();
            build_column(name, &cells).into()
        })
        .collect::<Vec<Column>>();

    Ok(DataFrame::new(columns)?)
}

fn build_column(name: &str, cells: &[&Data]) -> Series {
    let non_empty = || cells.iter().filter(|c| !matches!(c, Data::Empty));

    if non_empty().all(|c| matches!(c, Data::Int(_))) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Series::new(name.into(), values);
    }

    if non_empty().all(|c| matches!(c, Data::Int(_) | Data::Float(_))) {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Data::Int(v) => Some(*v as f64),
                Data::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Series::new(name.into(), values);
    }

    let values: Vec<Option<String>> = cells.iter().map(|c| cell_text(c)).collect();
    Series::new(name.into(), values)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(v) => Some(v.to_string()),
        Data::Float(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).map(|d| d.format("%Y-%m-%d").to_string()),
        other => Some(other.to_string()),
    }
}

/// Excel serial day number to a calendar date (1900 date system).
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_column_detection() {
        let cells = [Data::Int(3), Data::Empty, Data::Float(4.5)];
        let refs: Vec<&Data> = cells.iter().collect();
        let series = build_column("Age", &refs);
        assert_eq!(series.dtype(), &DataType::Float64);
        assert_eq!(series.null_count(), 1);

        let cells = [Data::Int(3), Data::String("x".to_string())];
        let refs: Vec<&Data> = cells.iter().collect();
        assert_eq!(build_column("Mixed", &refs).dtype(), &DataType::String);

        let cells = [Data::Int(3), Data::Int(5)];
        let refs: Vec<&Data> = cells.iter().collect();
        assert_eq!(build_column("Count", &refs).dtype(), &DataType::Int64);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45366.0), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(excel_serial_to_date(0.0), None);
    }
}
