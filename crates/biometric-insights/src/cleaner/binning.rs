//! Derived bucket columns (age groups, quality categories).

use crate::config::{BinSpec, ColumnNames};
use crate::error::{Result, ResultExt};
use crate::table::RecordTable;
use crate::utils::sort_categories;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Label for `value`, or `None` when it is outside the bins.
///
/// Intervals are `[edges[i], edges[i + 1])`. The last interval also
/// includes the top edge, so the full span `[first, last]` is covered.
pub fn assign_bin(value: f64, bins: &BinSpec) -> Option<&str> {
    let (first, last) = (*bins.edges.first()?, *bins.edges.last()?);
    if value.is_nan() || value < first || value > last {
        return None;
    }
    let idx = bins
        .edges
        .windows(2)
        .position(|w| value >= w[0] && value < w[1])
        .unwrap_or(bins.labels.len().saturating_sub(1));
    bins.labels.get(idx).map(String::as_str)
}

/// Add `target` holding the bin label of each value in `source`.
///
/// Missing and out-of-range values get a null label.
pub fn bin_column(
    table: &RecordTable,
    source: &str,
    target: &str,
    bins: &BinSpec,
) -> Result<RecordTable> {
    bins.validate(target)?;
    let values = table.f64_values(source)?;

    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        warn!("{} missing value(s) in '{}'", missing, source);
    }

    let labels: Vec<Option<&str>> = values
        .iter()
        .map(|v| v.and_then(|x| assign_bin(x, bins)))
        .collect();

    let unlabeled = labels.iter().filter(|l| l.is_none()).count() - missing;
    if unlabeled > 0 {
        warn!("{} value(s) in '{}' fall outside the bins", unlabeled, source);
    }

    log_distribution(target, &labels);
    table
        .with_column(Series::new(target.into(), labels))
        .context(format!("While deriving '{}'", target))
}

fn log_distribution(target: &str, labels: &[Option<&str>]) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels.iter().flatten() {
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut keys: Vec<String> = counts.keys().map(|k| k.to_string()).collect();
    sort_categories(&mut keys);
    for key in keys {
        debug!("  {}: {}", key, counts.get(key.as_str()).copied().unwrap_or(0));
    }
    info!("Created {} column", target);
}

/// Bucket `Age` into the age group column.
pub fn create_age_groups(
    table: &RecordTable,
    columns: &ColumnNames,
    bins: &BinSpec,
) -> Result<RecordTable> {
    info!("Creating age groups from column: {}", columns.age);
    bin_column(table, &columns.age, &columns.age_group, bins)
}

/// Bucket the biometric quality score into quality categories.
pub fn create_biometric_quality_categories(
    table: &RecordTable,
    columns: &ColumnNames,
    bins: &BinSpec,
) -> Result<RecordTable> {
    info!("Creating quality categories from column: {}", columns.quality_score);
    bin_column(table, &columns.quality_score, &columns.quality_category, bins)
}
