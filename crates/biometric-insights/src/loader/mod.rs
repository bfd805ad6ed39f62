//! Dataset loading and inspection.
//!
//! This module provides functionality for:
//! - Loading enrolment and update tables from CSV or spreadsheets
//! - Summarising a loaded table ([`DataInfo`])
//! - Converting text columns to dates
//! - Saving processed tables as CSV

mod csv;
mod dates;
#[cfg(feature = "excel")]
mod excel;

pub use csv::write_csv;
pub use dates::{convert_date_columns, parse_date};

use crate::config::ColumnNames;
use crate::error::{AnalysisError, Result, ResultExt};
use crate::table::RecordTable;
use crate::utils::dtype_label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "ods" => Ok(Self::Spreadsheet),
            _ => Err(AnalysisError::UnsupportedFormat(if ext.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", ext)
            })),
        }
    }
}

/// Load any supported file into a [`RecordTable`].
pub fn load_table(path: impl AsRef<Path>) -> Result<RecordTable> {
    let path = path.as_ref();
    let df = match InputFormat::from_path(path)? {
        InputFormat::Csv => csv::read_csv_with_fallbacks(path),
        InputFormat::Spreadsheet => read_spreadsheet(path),
    }
    .context(format!("Failed to load {}", path.display()))?;
    Ok(RecordTable::from_frame(df))
}

#[cfg(feature = "excel")]
fn read_spreadsheet(path: &Path) -> Result<polars::prelude::DataFrame> {
    excel::read_first_sheet(path)
}

#[cfg(not(feature = "excel"))]
fn read_spreadsheet(path: &Path) -> Result<polars::prelude::DataFrame> {
    Err(AnalysisError::UnsupportedFormat(format!(
        "{} (built without the `excel` feature)",
        path.display()
    )))
}

/// Load the enrolment dataset and report missing source columns.
pub fn load_enrolment_data(path: impl AsRef<Path>, columns: &ColumnNames) -> Result<RecordTable> {
    let path = path.as_ref();
    info!("Loading enrolment data from: {}", path.display());
    let table = load_table(path)?;
    check_expected_columns(&table, &columns.enrolment_columns(), "enrolment");
    info!(
        "Loaded {} enrolment records with {} columns",
        table.height(),
        table.width()
    );
    Ok(table)
}

/// Load the update dataset and report missing source columns.
pub fn load_update_data(path: impl AsRef<Path>, columns: &ColumnNames) -> Result<RecordTable> {
    let path = path.as_ref();
    info!("Loading update data from: {}", path.display());
    let table = load_table(path)?;
    check_expected_columns(&table, &columns.update_columns(), "update");
    info!(
        "Loaded {} update records with {} columns",
        table.height(),
        table.width()
    );
    Ok(table)
}

fn check_expected_columns(table: &RecordTable, expected: &[&str], dataset: &str) {
    let missing = table.missing_columns(expected);
    if !missing.is_empty() {
        warn!(
            "The {} dataset is missing expected column(s): {}",
            dataset,
            missing.join(", ")
        );
    }
}

// =============================================================================
// Dataset overview
// =============================================================================

/// Shape, size and quality overview of a loaded table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataInfo {
    pub dataset_name: String,
    pub total_records: usize,
    pub total_columns: usize,
    pub memory_usage_mb: f64,
    pub missing_values: usize,
    pub duplicate_rows: usize,
    pub column_names: Vec<String>,
    /// Column count per coarse dtype ("numeric", "text", "datetime", ...).
    pub dtype_counts: BTreeMap<String, usize>,
}

impl DataInfo {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("{} - Overview", self.dataset_name),
            format!("Total Records: {}", self.total_records),
            format!("Total Columns: {}", self.total_columns),
            format!("Memory Usage: {:.2} MB", self.memory_usage_mb),
            format!("Missing Values: {}", self.missing_values),
            format!("Duplicate Rows: {}", self.duplicate_rows),
            "Column Names:".to_string(),
        ];
        for (i, name) in self.column_names.iter().enumerate() {
            lines.push(format!("  {:2}. {}", i + 1, name));
        }
        lines.push("Data Types:".to_string());
        for (dtype, count) in &self.dtype_counts {
            lines.push(format!("  {}: {}", dtype, count));
        }
        lines.join("\n")
    }
}

/// Describe a table: shape, estimated memory, missing values, duplicates.
pub fn data_info(table: &RecordTable, dataset_name: &str) -> Result<DataInfo> {
    let mut dtype_counts = BTreeMap::new();
    for col in table.frame().get_columns() {
        *dtype_counts
            .entry(dtype_label(col.dtype()).to_string())
            .or_insert(0) += 1;
    }

    Ok(DataInfo {
        dataset_name: dataset_name.to_string(),
        total_records: table.height(),
        total_columns: table.width(),
        memory_usage_mb: table.frame().estimated_size() as f64 / (1024.0 * 1024.0),
        missing_values: table.total_nulls(),
        duplicate_rows: table.duplicate_row_count()?,
        column_names: table.column_names(),
        dtype_counts,
    })
}

/// Save a table as CSV under `output_dir`, appending `.csv` when missing.
///
/// Returns the written path.
pub fn save_processed_data(
    table: &RecordTable,
    file_name: &str,
    output_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let file_name = if file_name.ends_with(".csv") {
        file_name.to_string()
    } else {
        format!("{}.csv", file_name)
    };
    let path = output_dir.join(file_name);
    write_csv(table.frame(), &path)?;

    info!(
        "Saved processed data to: {} ({} records, {} columns)",
        path.display(),
        table.height(),
        table.width()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_unsupported_extension() {
        let err = load_table("data/records.json").unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
        assert!(err.to_string().contains(".json"));
        assert!(matches!(
            InputFormat::from_path(Path::new("x.XLSX")),
            Ok(InputFormat::Spreadsheet)
        ));
    }

    #[test]
    fn test_data_info() {
        let table: RecordTable = df! {
            "Age" => &[Some(3i64), Some(3), None],
            "State" => &[Some("Goa"), Some("Goa"), Some("Delhi")],
        }
        .unwrap()
        .into();

        let info = data_info(&table, "Enrolment").unwrap();
        assert_eq!(info.total_records, 3);
        assert_eq!(info.total_columns, 2);
        assert_eq!(info.missing_values, 1);
        assert_eq!(info.duplicate_rows, 1);
        assert_eq!(info.dtype_counts.get("numeric"), Some(&1));
        assert_eq!(info.dtype_counts.get("text"), Some(&1));
        assert!(info.summary().contains("Duplicate Rows: 1"));
    }

    #[test]
    fn test_save_processed_data_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let table: RecordTable = df! { "Age" => &[1i64, 2] }.unwrap().into();
        let path = save_processed_data(&table, "enrolment_cleaned", dir.path().join("out")).unwrap();
        assert!(path.ends_with("out/enrolment_cleaned.csv"));
        assert!(path.exists());

        let reloaded = load_table(&path).unwrap();
        assert_eq!(reloaded.height(), 2);
    }
}
