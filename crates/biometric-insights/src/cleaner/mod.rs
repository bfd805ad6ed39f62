//! Data cleaning module for preparing study tables.
//!
//! This module provides functionality for:
//! - Deriving age group and quality category columns
//! - Reporting and handling missing values
//! - Standardizing text columns
//! - Removing duplicate rows
//! - Filtering by date range

mod binning;
mod dedup;
mod missing;
mod sanitizers;

pub use binning::{assign_bin, bin_column, create_age_groups, create_biometric_quality_categories};
pub use dedup::{DedupOutcome, remove_duplicates};
pub use missing::{
    MissingColumnStat, MissingValueReport, handle_missing_values, missing_value_stats,
};
pub use sanitizers::{filter_by_date_range, standardize_categorical_columns, standardize_value};

use crate::table::RecordTable;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Before/after comparison of a cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub original_records: usize,
    pub cleaned_records: usize,
    pub records_removed: usize,
    pub removal_percentage: f64,
    pub original_columns: usize,
    pub cleaned_columns: usize,
    pub columns_removed: usize,
}

impl CleaningSummary {
    pub fn summary(&self) -> String {
        format!(
            "Original Records: {}\nCleaned Records: {}\nRecords Removed: {} ({:.2}%)\n\
             Original Columns: {}\nCleaned Columns: {}\nColumns Removed: {}",
            self.original_records,
            self.cleaned_records,
            self.records_removed,
            self.removal_percentage,
            self.original_columns,
            self.cleaned_columns,
            self.columns_removed
        )
    }
}

/// Compare a table before and after cleaning.
///
/// The removal percentage is 0 for an empty original table. Derived columns
/// can make the cleaned table wider, so removed counts saturate at 0.
pub fn cleaning_summary(original: &RecordTable, cleaned: &RecordTable) -> CleaningSummary {
    let records_removed = original.height().saturating_sub(cleaned.height());
    let removal_percentage = if original.height() == 0 {
        0.0
    } else {
        records_removed as f64 / original.height() as f64 * 100.0
    };

    let summary = CleaningSummary {
        original_records: original.height(),
        cleaned_records: cleaned.height(),
        records_removed,
        removal_percentage,
        original_columns: original.width(),
        cleaned_columns: cleaned.width(),
        columns_removed: original.width().saturating_sub(cleaned.width()),
    };
    info!(
        "Cleaning removed {} records ({:.2}%) and {} columns",
        summary.records_removed, summary.removal_percentage, summary.columns_removed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_cleaning_summary() {
        let original: RecordTable = df! {
            "a" => &[1i64, 2, 3, 4],
            "b" => &[1i64, 2, 3, 4],
        }
        .unwrap()
        .into();
        let cleaned: RecordTable = df! { "a" => &[1i64, 2, 3] }.unwrap().into();

        let summary = cleaning_summary(&original, &cleaned);
        assert_eq!(summary.records_removed, 1);
        assert_eq!(summary.removal_percentage, 25.0);
        assert_eq!(summary.columns_removed, 1);
        assert!(summary.summary().contains("Records Removed: 1 (25.00%)"));
    }

    #[test]
    fn test_cleaning_summary_empty_original() {
        let empty = RecordTable::default();
        let summary = cleaning_summary(&empty, &empty);
        assert_eq!(summary.removal_percentage, 0.0);
    }
}
