//! Text standardization and row filters.

use crate::config::{DateRange, TextCase};
use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{is_text_dtype, title_case};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Apply `case` to a trimmed value.
pub fn standardize_value(value: &str, case: TextCase) -> String {
    let trimmed = value.trim();
    match case {
        TextCase::Title => title_case(trimmed),
        TextCase::Upper => trimmed.to_uppercase(),
        TextCase::Lower => trimmed.to_lowercase(),
    }
}

/// Trim and re-case the named text columns.
///
/// Absent and non-text columns are skipped with a warning.
pub fn standardize_categorical_columns(
    table: &RecordTable,
    columns: &[&str],
    case: TextCase,
) -> Result<RecordTable> {
    let mut result = table.clone();

    for &name in columns {
        let Ok(series) = result.series(name) else {
            warn!("Column '{}' not found, skipping", name);
            continue;
        };
        if !is_text_dtype(series.dtype()) {
            warn!("'{}' is not a text column, skipping", name);
            continue;
        }

        let values: Vec<Option<String>> = result
            .str_values(name)?
            .into_iter()
            .map(|v| v.map(|text| standardize_value(&text, case)))
            .collect();
        result = result.with_column(Series::new(name.into(), values))?;
        debug!("Standardized '{}' ({:?} case)", name, case);
    }

    Ok(result)
}

/// Keep rows whose date lies within the inclusive window.
///
/// Rows with a missing date are dropped whenever a bound is set. Returns
/// the filtered table and the number of rows removed.
pub fn filter_by_date_range(
    table: &RecordTable,
    date_column: &str,
    range: &DateRange,
) -> Result<(RecordTable, usize)> {
    let (start, end) = range.bounds()?;
    let dates = table.date_values(date_column)?;

    if start.is_none() && end.is_none() {
        return Ok((table.clone(), 0));
    }

    let mask: Vec<bool> = dates
        .iter()
        .map(|d| match d {
            Some(date) => start.is_none_or(|s| *date >= s) && end.is_none_or(|e| *date <= e),
            None => false,
        })
        .collect();

    let filtered = table.filter_rows(&mask)?;
    let removed = table.height() - filtered.height();
    info!(
        "Date filter on '{}' kept {} records, removed {} ({:.2}%)",
        date_column,
        filtered.height(),
        removed,
        removed as f64 / table.height().max(1) as f64 * 100.0
    );
    Ok((filtered, removed))
}
