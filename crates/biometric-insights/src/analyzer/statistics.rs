//! Grouped descriptive statistics and correlation.

use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{category_sort_key, mean, median, population_std, round_to, sample_std};
use anofox_statistics::correlation;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Descriptive statistics of one group, rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation; `None` below two values.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl GroupStats {
    pub fn from_values(group: impl Into<String>, values: &[f64]) -> Self {
        let round = |v: Option<f64>| v.map(|x| round_to(x, 2));
        Self {
            group: group.into(),
            count: values.len(),
            mean: round(mean(values)),
            median: round(median(values)),
            std: round(sample_std(values)),
            min: round(values.iter().copied().reduce(f64::min)),
            max: round(values.iter().copied().reduce(f64::max)),
        }
    }
}

const GROUP: &str = "group";
const VALUE: &str = "value";

/// Group labels beside parsed values, without rows whose label is missing.
fn labelled_values(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
) -> Result<LazyFrame> {
    let groups = Series::new(GROUP.into(), table.str_values(group_column)?);
    let values = Series::new(VALUE.into(), table.f64_values(value_column)?);
    let df = DataFrame::new(vec![groups.into(), values.into()])?;
    Ok(df.lazy().filter(col(GROUP).is_not_null()))
}

fn into_bucket_order<T>(mut rows: Vec<(String, T)>) -> Vec<(String, T)> {
    rows.sort_by_cached_key(|(label, _)| category_sort_key(label));
    rows
}

/// Non-null label counts of `column`, in bucket order.
pub fn label_counts(table: &RecordTable, column: &str) -> Result<Vec<(String, usize)>> {
    let labels = Series::new(GROUP.into(), table.str_values(column)?).drop_nulls();
    let counts: RecordTable = labels
        .value_counts(false, false, "count".into(), false)?
        .into();
    let rows = counts
        .str_values(GROUP)?
        .into_iter()
        .zip(counts.f64_values("count")?)
        .filter_map(|(label, count)| Some((label?, count? as usize)))
        .collect();
    Ok(into_bucket_order(rows))
}

/// Values of `value_column` for each label of `group_column`, in bucket order.
///
/// Rows with a missing label are skipped. A label whose values are all
/// missing still appears, with an empty vector.
pub fn group_values(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
) -> Result<Vec<(String, Vec<f64>)>> {
    let grouped = labelled_values(table, group_column, value_column)?
        .group_by_stable([col(GROUP)])
        .agg([col(VALUE).drop_nulls()])
        .collect()?;

    let labels = grouped.column(GROUP)?.as_materialized_series().str()?.clone();
    let lists = grouped.column(VALUE)?.as_materialized_series().list()?.clone();
    let mut rows = Vec::with_capacity(grouped.height());
    for (label, values) in labels.into_iter().zip(lists.into_iter()) {
        let Some(label) = label else { continue };
        let values = match values {
            Some(series) => series.f64()?.into_no_null_iter().collect(),
            None => Vec::new(),
        };
        rows.push((label.to_string(), values));
    }
    Ok(into_bucket_order(rows))
}

/// Per-group statistics of `value_column`, in bucket order.
pub fn grouped_stats(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
) -> Result<Vec<GroupStats>> {
    let aggregated: RecordTable = labelled_values(table, group_column, value_column)?
        .group_by_stable([col(GROUP)])
        .agg([
            col(VALUE).count().alias("count"),
            col(VALUE).mean().alias("mean"),
            col(VALUE).median().alias("median"),
            col(VALUE).std(1).alias("std"),
            col(VALUE).min().alias("min"),
            col(VALUE).max().alias("max"),
        ])
        .collect()?
        .into();

    let labels = aggregated.str_values(GROUP)?;
    let counts = aggregated.f64_values("count")?;
    let means = aggregated.f64_values("mean")?;
    let medians = aggregated.f64_values("median")?;
    let stds = aggregated.f64_values("std")?;
    let mins = aggregated.f64_values("min")?;
    let maxs = aggregated.f64_values("max")?;

    let round = |v: Option<f64>| v.map(|x| round_to(x, 2));
    let mut rows = Vec::with_capacity(labels.len());
    for (i, label) in labels.into_iter().enumerate() {
        let Some(label) = label else { continue };
        let count = counts[i].unwrap_or(0.0) as usize;
        rows.push((
            label.clone(),
            GroupStats {
                group: label,
                count,
                mean: round(means[i]),
                median: round(medians[i]),
                std: round(stds[i].filter(|_| count >= 2)),
                min: round(mins[i]),
                max: round(maxs[i]),
            },
        ));
    }
    Ok(into_bucket_order(rows)
        .into_iter()
        .map(|(_, stats)| stats)
        .collect())
}

/// Pearson correlation over the rows where both values are present.
///
/// `None` when fewer than three pairs remain or either side is constant.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();
    if xs.len() < 3 {
        return None;
    }
    let varies = |values: &[f64]| population_std(values).is_some_and(|s| s > 0.0);
    if !varies(&xs) || !varies(&ys) {
        return None;
    }
    correlation::pearson(&xs, &ys, None)
        .ok()
        .map(|result| result.estimate.clamp(-1.0, 1.0))
        .filter(|r| r.is_finite())
}
