//! Per-group z-score anomaly detection.

use crate::error::{AnalysisError, Result};
use crate::table::RecordTable;
use crate::utils::category_sort_key;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Column holding the per-record anomaly label.
pub const ANOMALY_TYPE_COLUMN: &str = "anomaly_type";
pub const NORMAL_LABEL: &str = "Normal";
pub const HIGH_QUALITY_LABEL: &str = "Unusually High Quality";
pub const LOW_QUALITY_LABEL: &str = "Unusually Low Quality";

/// Anomalies of one type within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAnomalyCount {
    pub group: String,
    pub anomaly_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreStats {
    pub total_records: usize,
    pub n_anomalies: usize,
    /// Share of all records, in percent.
    pub anomaly_rate: f64,
    pub n_unusually_high: usize,
    pub n_unusually_low: usize,
    pub threshold_std: f64,
    pub by_group: Vec<GroupAnomalyCount>,
}

impl ZScoreStats {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Threshold: +/-{} standard deviations from group mean",
                self.threshold_std
            ),
            format!("Total Records: {}", self.total_records),
            format!(
                "Anomalies Detected: {} ({:.2}%)",
                self.n_anomalies, self.anomaly_rate
            ),
            format!("Unusually High Quality: {}", self.n_unusually_high),
            format!("Unusually Low Quality: {}", self.n_unusually_low),
        ];
        if !self.by_group.is_empty() {
            lines.push("Anomalies by group:".to_string());
            for entry in &self.by_group {
                lines.push(format!(
                    "  {} / {}: {}",
                    entry.group, entry.anomaly_type, entry.count
                ));
            }
        }
        lines.join("\n")
    }
}

const GROUP_KEY: &str = "__zscore_group";
const VALUE_KEY: &str = "__zscore_value";

/// Flag records whose `value_column` deviates from their group mean by more
/// than `threshold_std` sample standard deviations.
///
/// Adds `group_mean`, `group_std`, `z_score`, `is_anomaly` and
/// `anomaly_type`. Records with a missing group or value are kept as
/// `Normal` with null statistics.
pub fn detect_age_quality_anomalies(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
    threshold_std: f64,
) -> Result<(RecordTable, ZScoreStats)> {
    if !(threshold_std > 0.0) {
        return Err(AnalysisError::InvalidConfig(format!(
            "z-score threshold must be positive, got {threshold_std}"
        )));
    }

    let keyed = table
        .with_column(Series::new(GROUP_KEY.into(), table.str_values(group_column)?))?
        .with_column(Series::new(VALUE_KEY.into(), table.f64_values(value_column)?))?;

    let in_group = col(GROUP_KEY).is_not_null();
    let value = col(VALUE_KEY);
    let scored = keyed
        .into_frame()
        .lazy()
        .with_columns([
            when(in_group.clone())
                .then(value.clone().mean().over([col(GROUP_KEY)]))
                .otherwise(lit(NULL))
                .alias("group_mean"),
            // Undefined below two values.
            when(in_group.and(value.clone().count().over([col(GROUP_KEY)]).gt_eq(lit(2))))
                .then(value.clone().std(1).over([col(GROUP_KEY)]))
                .otherwise(lit(NULL))
                .alias("group_std"),
        ])
        .with_column(
            when(col("group_std").gt(lit(0.0)))
                .then((value - col("group_mean")) / col("group_std"))
                .otherwise(lit(NULL))
                .alias("z_score"),
        )
        .with_column(
            when(col("z_score").gt(lit(threshold_std)))
                .then(lit(HIGH_QUALITY_LABEL))
                .when(col("z_score").lt(lit(-threshold_std)))
                .then(lit(LOW_QUALITY_LABEL))
                .otherwise(lit(NORMAL_LABEL))
                .alias(ANOMALY_TYPE_COLUMN),
        )
        .with_column(
            col(ANOMALY_TYPE_COLUMN)
                .neq(lit(NORMAL_LABEL))
                .alias("is_anomaly"),
        )
        .collect()?;

    let by_group = anomaly_counts(&scored)?;
    let result: RecordTable = scored.drop_many([GROUP_KEY, VALUE_KEY]).into();
    for group in &by_group {
        debug!(
            "Group '{}': {} {}",
            group.group, group.count, group.anomaly_type
        );
    }

    let types = result.str_values(ANOMALY_TYPE_COLUMN)?;
    let count_of = |label: &str| types.iter().filter(|t| t.as_deref() == Some(label)).count();
    let n_unusually_high = count_of(HIGH_QUALITY_LABEL);
    let n_unusually_low = count_of(LOW_QUALITY_LABEL);
    let n_anomalies = n_unusually_high + n_unusually_low;
    let height = result.height();

    let stats = ZScoreStats {
        total_records: height,
        n_anomalies,
        anomaly_rate: if height == 0 {
            0.0
        } else {
            n_anomalies as f64 / height as f64 * 100.0
        },
        n_unusually_high,
        n_unusually_low,
        threshold_std,
        by_group,
    };
    info!(
        "Z-score anomalies: {} ({:.2}%), {} high, {} low",
        stats.n_anomalies, stats.anomaly_rate, stats.n_unusually_high, stats.n_unusually_low
    );

    Ok((result, stats))
}

/// Anomaly counts per group and type, in bucket order with high before low.
fn anomaly_counts(scored: &DataFrame) -> Result<Vec<GroupAnomalyCount>> {
    let counts: RecordTable = scored
        .clone()
        .lazy()
        .filter(col("is_anomaly").and(col(GROUP_KEY).is_not_null()))
        .group_by([col(GROUP_KEY), col(ANOMALY_TYPE_COLUMN)])
        .agg([len().alias("count")])
        .collect()?
        .into();

    let groups = counts.str_values(GROUP_KEY)?;
    let types = counts.str_values(ANOMALY_TYPE_COLUMN)?;
    let totals = counts.f64_values("count")?;
    let mut by_group: Vec<GroupAnomalyCount> = groups
        .into_iter()
        .zip(types)
        .zip(totals)
        .filter_map(|((group, anomaly_type), count)| {
            Some(GroupAnomalyCount {
                group: group?,
                anomaly_type: anomaly_type?,
                count: count? as usize,
            })
        })
        .collect();
    by_group.sort_by_cached_key(|entry| {
        (
            category_sort_key(&entry.group),
            entry.anomaly_type != HIGH_QUALITY_LABEL,
        )
    });
    Ok(by_group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> RecordTable {
        let mut groups: Vec<Option<&str>> = Vec::new();
        let mut scores: Vec<Option<f64>> = Vec::new();
        for _ in 0..10 {
            groups.extend([Some("19-40 (Young Adult)"), Some("19-40 (Young Adult)")]);
            scores.extend([Some(45.0), Some(55.0)]);
        }
        groups.push(Some("19-40 (Young Adult)"));
        scores.push(Some(65.0));

        for _ in 0..2 {
            for s in [70.0, 72.0, 74.0, 76.0, 78.0] {
                groups.push(Some("60+ (Elderly)"));
                scores.push(Some(s));
            }
        }
        groups.push(Some("60+ (Elderly)"));
        scores.push(Some(20.0));

        groups.push(Some("0-5 (Child)"));
        scores.push(Some(10.0));
        groups.push(None);
        scores.push(Some(99.0));
        groups.push(Some("60+ (Elderly)"));
        scores.push(None);

        df! { "Age_Group" => groups, "Score" => scores }.unwrap().into()
    }

    fn labels(table: &RecordTable) -> Vec<Option<String>> {
        table.str_values("anomaly_type").unwrap()
    }

    #[test]
    fn test_flags_high_and_low() {
        let (result, stats) = detect_age_quality_anomalies(&sample(), "Age_Group", "Score", 2.0).unwrap();

        let types = labels(&result);
        assert_eq!(types[20].as_deref(), Some(HIGH_QUALITY_LABEL));
        assert_eq!(types[31].as_deref(), Some(LOW_QUALITY_LABEL));
        assert_eq!(stats.n_unusually_high, 1);
        assert_eq!(stats.n_unusually_low, 1);
        assert_eq!(stats.n_anomalies, 2);
        assert_eq!(stats.total_records, 35);
        assert_eq!(
            stats.by_group,
            vec![
                GroupAnomalyCount {
                    group: "19-40 (Young Adult)".to_string(),
                    anomaly_type: HIGH_QUALITY_LABEL.to_string(),
                    count: 1,
                },
                GroupAnomalyCount {
                    group: "60+ (Elderly)".to_string(),
                    anomaly_type: LOW_QUALITY_LABEL.to_string(),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_higher_threshold_flags_nothing() {
        let (_, stats) = detect_age_quality_anomalies(&sample(), "Age_Group", "Score", 4.0).unwrap();
        assert_eq!(stats.n_anomalies, 0);
        assert_eq!(stats.anomaly_rate, 0.0);
    }

    #[test]
    fn test_singletons_and_missing_rows_are_normal() {
        let (result, _) = detect_age_quality_anomalies(&sample(), "Age_Group", "Score", 2.0).unwrap();
        let types = labels(&result);
        let z = result.f64_values("z_score").unwrap();
        let std = result.f64_values("group_std").unwrap();

        // Single-member group.
        assert_eq!(types[32].as_deref(), Some(NORMAL_LABEL));
        assert_eq!(z[32], None);
        assert_eq!(std[32], None);
        // Missing group.
        assert_eq!(types[33].as_deref(), Some(NORMAL_LABEL));
        assert_eq!(result.f64_values("group_mean").unwrap()[33], None);
        // Missing value keeps its group's statistics but no z-score.
        assert_eq!(types[34].as_deref(), Some(NORMAL_LABEL));
        assert_eq!(z[34], None);
        assert!(std[34].is_some());
        assert_eq!(result.height(), 35);
    }

    #[test]
    fn test_zero_std_group_never_flags() {
        let table: RecordTable = df! {
            "Age_Group" => &["A", "A", "A"],
            "Score" => &[50.0, 50.0, 50.0],
        }
        .unwrap()
        .into();
        let (_, stats) = detect_age_quality_anomalies(&table, "Age_Group", "Score", 2.0).unwrap();
        assert_eq!(stats.n_anomalies, 0);
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = detect_age_quality_anomalies(&sample(), "Age_Group", "Score", 0.0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
