//! Missing value reporting and handling.

use crate::config::MissingValueStrategy;
use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{is_numeric_dtype, is_text_dtype, round_to, string_mode};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Missing count for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingColumnStat {
    pub column: String,
    pub missing_count: usize,
    /// Share of rows, in percent, rounded to 2 decimals.
    pub missing_percent: f64,
}

/// What a missing-value pass found and did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingValueReport {
    pub strategy: MissingValueStrategy,
    /// Columns with at least one missing value, most affected first.
    pub columns: Vec<MissingColumnStat>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub dropped_columns: Vec<String>,
    pub actions: Vec<String>,
}

impl MissingValueReport {
    pub fn has_missing(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.columns.is_empty() {
            return "No missing values found in dataset".to_string();
        }
        let mut lines = vec![format!(
            "Columns with missing values: {}",
            self.columns.len()
        )];
        for stat in &self.columns {
            lines.push(format!(
                "  {}: {} ({:.2}%)",
                stat.column, stat.missing_count, stat.missing_percent
            ));
        }
        lines.extend(self.actions.iter().map(|a| format!("  -> {}", a)));
        lines.join("\n")
    }
}

/// Per-column missing counts, sorted by percentage descending.
pub fn missing_value_stats(table: &RecordTable) -> Vec<MissingColumnStat> {
    let height = table.height();
    let mut stats: Vec<MissingColumnStat> = table
        .null_counts()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(column, missing_count)| MissingColumnStat {
            column,
            missing_count,
            missing_percent: if height == 0 {
                0.0
            } else {
                round_to(missing_count as f64 / height as f64 * 100.0, 2)
            },
        })
        .collect();
    stats.sort_by(|a, b| {
        b.missing_percent
            .partial_cmp(&a.missing_percent)
            .unwrap_or(Ordering::Equal)
    });
    stats
}

/// Apply `strategy` and return the new table with its report.
///
/// The input table is left untouched. When nothing is missing, the
/// table is returned as is whatever the strategy.
pub fn handle_missing_values(
    table: &RecordTable,
    strategy: MissingValueStrategy,
) -> Result<(RecordTable, MissingValueReport)> {
    let columns = missing_value_stats(table);
    let mut report = MissingValueReport {
        strategy,
        columns,
        rows_before: table.height(),
        rows_after: table.height(),
        dropped_columns: Vec::new(),
        actions: Vec::new(),
    };

    if report.columns.is_empty() {
        info!("No missing values found in dataset");
        return Ok((table.clone(), report));
    }
    info!("Columns with missing values: {}", report.columns.len());

    let result = match strategy {
        MissingValueStrategy::Report => {
            report
                .actions
                .push("Report only (no changes made)".to_string());
            table.clone()
        }
        MissingValueStrategy::DropRows => MissingValueHandler::drop_rows(table, &mut report)?,
        MissingValueStrategy::DropColumns { threshold } => {
            MissingValueHandler::drop_columns(table, threshold, &mut report)
        }
        MissingValueStrategy::FillMode => MissingValueHandler::fill_mode(table, &mut report)?,
        MissingValueStrategy::FillMedian => MissingValueHandler::fill_median(table, &mut report)?,
    };

    report.rows_after = result.height();
    Ok((result, report))
}

/// Strategy implementations. Each records what it did in the report.
struct MissingValueHandler;

impl MissingValueHandler {
    fn drop_rows(table: &RecordTable, report: &mut MissingValueReport) -> Result<RecordTable> {
        let result: RecordTable = table.frame().drop_nulls::<String>(None)?.into();
        let dropped = table.height() - result.height();
        report.actions.push(format!(
            "Dropped {} rows with missing values ({:.2}%)",
            dropped,
            dropped as f64 / table.height().max(1) as f64 * 100.0
        ));
        Ok(result)
    }

    fn drop_columns(
        table: &RecordTable,
        threshold: f64,
        report: &mut MissingValueReport,
    ) -> RecordTable {
        let height = table.height().max(1) as f64;
        let to_drop: Vec<String> = report
            .columns
            .iter()
            .filter(|stat| stat.missing_count as f64 / height > threshold)
            .map(|stat| stat.column.clone())
            .collect();

        if to_drop.is_empty() {
            report.actions.push(format!(
                "No columns exceed {}% missing threshold",
                threshold * 100.0
            ));
            return table.clone();
        }

        report.actions.push(format!(
            "Dropped columns with >{}% missing: {}",
            threshold * 100.0,
            to_drop.join(", ")
        ));
        let result = table.drop_columns(&to_drop);
        report.dropped_columns = to_drop;
        result
    }

    fn fill_mode(table: &RecordTable, report: &mut MissingValueReport) -> Result<RecordTable> {
        let mut fills = Vec::new();
        for stat in &report.columns {
            let series = table.series(&stat.column)?;
            if !is_text_dtype(series.dtype()) {
                continue;
            }
            let mode = string_mode(series)?.unwrap_or_else(|| "Unknown".to_string());
            debug!("Filled '{}' with mode: {}", stat.column, mode);
            report
                .actions
                .push(format!("Filled {} with mode: {}", stat.column, mode));
            fills.push(
                col(stat.column.as_str())
                    .cast(DataType::String)
                    .fill_null(lit(mode)),
            );
        }
        Self::apply(table, fills)
    }

    fn fill_median(table: &RecordTable, report: &mut MissingValueReport) -> Result<RecordTable> {
        let mut fills = Vec::new();
        for stat in &report.columns {
            let series = table.series(&stat.column)?;
            if !is_numeric_dtype(series.dtype()) {
                continue;
            }
            let Some(median_value) = series.median() else {
                continue;
            };
            debug!("Filled '{}' with median: {:.2}", stat.column, median_value);
            report.actions.push(format!(
                "Filled {} with median: {:.2}",
                stat.column, median_value
            ));
            fills.push(
                col(stat.column.as_str())
                    .cast(DataType::Float64)
                    .fill_null(lit(median_value)),
            );
        }
        Self::apply(table, fills)
    }

    fn apply(table: &RecordTable, fills: Vec<Expr>) -> Result<RecordTable> {
        if fills.is_empty() {
            return Ok(table.clone());
        }
        Ok(table.frame().clone().lazy().with_columns(fills).collect()?.into())
    }
}
