//! Exploratory analysis of the cleaned study tables.
//!
//! This module provides:
//! - Age group distribution and quality statistics per group
//! - Cross-tabulations of categorical columns
//! - Update patterns joined back to enrolment age groups
//! - Correlation matrices, grouped summaries and outlier scans
//!
//! Every function takes a [`RecordTable`] and returns a serializable result
//! with a `summary()` rendering.

mod crosstab;
mod outliers;
mod statistics;

pub use crosstab::{CrossTab, RateEntry, crosstab};
pub use outliers::{OutlierStats, identify_outliers};
pub use statistics::{GroupStats, group_values, grouped_stats, label_counts, pearson};

use crate::config::ColumnNames;
use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{is_numeric_dtype, round_to};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Quality category whose share ranks age groups.
pub const POOR_QUALITY_LABEL: &str = "Poor (0-40)";
/// Update type whose share ranks age groups.
pub const BIOMETRIC_UPDATE_LABEL: &str = "Biometric";
/// |r| above which a correlation is reported as strong.
pub const STRONG_CORRELATION: f64 = 0.5;

// =============================================================================
// Age distribution
// =============================================================================

/// Records in one age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub group: String,
    pub count: usize,
    /// Share of all records (including unlabeled ones), rounded to 2 decimals.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeDistribution {
    pub total_records: usize,
    pub groups: Vec<GroupCount>,
    pub largest: Option<GroupCount>,
    pub smallest: Option<GroupCount>,
}

impl AgeDistribution {
    pub fn summary(&self) -> String {
        let mut lines = vec!["Age Group Distribution:".to_string()];
        for g in &self.groups {
            lines.push(format!("  {}: {} ({:.2}%)", g.group, g.count, g.percentage));
        }
        if let (Some(l), Some(s)) = (&self.largest, &self.smallest) {
            lines.push(format!(
                "Largest group: {} ({} records, {:.1}%)",
                l.group, l.count, l.percentage
            ));
            lines.push(format!(
                "Smallest group: {} ({} records, {:.1}%)",
                s.group, s.count, s.percentage
            ));
        }
        lines.join("\n")
    }
}

/// Count records per age group.
pub fn analyze_age_distribution(
    table: &RecordTable,
    age_group_column: &str,
) -> Result<AgeDistribution> {
    let total = table.height();
    let groups: Vec<GroupCount> = label_counts(table, age_group_column)?
        .into_iter()
        .map(|(group, count)| GroupCount {
            percentage: if total == 0 {
                0.0
            } else {
                round_to(count as f64 / total as f64 * 100.0, 2)
            },
            group,
            count,
        })
        .collect();

    // First of equal counts wins, in bucket order.
    let largest = groups
        .iter()
        .fold(None::<&GroupCount>, |best, g| match best {
            Some(b) if b.count >= g.count => Some(b),
            _ => Some(g),
        })
        .cloned();
    let smallest = groups
        .iter()
        .fold(None::<&GroupCount>, |best, g| match best {
            Some(b) if b.count <= g.count => Some(b),
            _ => Some(g),
        })
        .cloned();

    info!("Age distribution across {} groups", groups.len());
    Ok(AgeDistribution {
        total_records: total,
        groups,
        largest,
        smallest,
    })
}

// =============================================================================
// Quality by age
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityByAge {
    pub quality_column: String,
    pub groups: Vec<GroupStats>,
    pub best_group: Option<String>,
    pub worst_group: Option<String>,
    /// Mean of the best group minus mean of the worst group.
    pub quality_gap: Option<f64>,
}

impl QualityByAge {
    pub fn group(&self, name: &str) -> Option<&GroupStats> {
        self.groups.iter().find(|g| g.group == name)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Quality Statistics by Age Group:".to_string()];
        for g in &self.groups {
            lines.push(format!(
                "  {}: n={} mean={} median={} std={}",
                g.group,
                g.count,
                fmt_opt(g.mean),
                fmt_opt(g.median),
                fmt_opt(g.std)
            ));
        }
        if let (Some(best), Some(worst), Some(gap)) =
            (&self.best_group, &self.worst_group, self.quality_gap)
        {
            lines.push(format!("Highest quality: {}", best));
            lines.push(format!("Lowest quality: {}", worst));
            lines.push(format!("Quality gap: {:.1} points", gap));
        }
        lines.join("\n")
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Quality score statistics per age group, with the best and worst groups.
pub fn analyze_biometric_quality_by_age(
    table: &RecordTable,
    columns: &ColumnNames,
) -> Result<QualityByAge> {
    let groups = grouped_stats(table, &columns.age_group, &columns.quality_score)?;

    let with_mean: Vec<(&str, f64)> = groups
        .iter()
        .filter_map(|g| g.mean.map(|m| (g.group.as_str(), m)))
        .collect();
    let best = with_mean
        .iter()
        .copied()
        .reduce(|a, b| if b.1 > a.1 { b } else { a });
    let worst = with_mean
        .iter()
        .copied()
        .reduce(|a, b| if b.1 < a.1 { b } else { a });

    let result = QualityByAge {
        quality_column: columns.quality_score.clone(),
        best_group: best.map(|b| b.0.to_string()),
        worst_group: worst.map(|w| w.0.to_string()),
        quality_gap: best.zip(worst).map(|(b, w)| round_to(b.1 - w.1, 2)),
        groups,
    };
    debug!("{}", result.summary());
    Ok(result)
}

// =============================================================================
// Categorical cross-tabulations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCategoryAnalysis {
    pub crosstab: CrossTab,
    /// Age groups ranked by their share of poor-quality records.
    pub poor_rate_ranking: Vec<RateEntry>,
}

/// Cross-tabulate age groups against quality categories.
pub fn analyze_quality_categories_by_age(
    table: &RecordTable,
    columns: &ColumnNames,
) -> Result<QualityCategoryAnalysis> {
    let ct = crosstab(table, &columns.age_group, &columns.quality_category)?;
    let poor_rate_ranking = ct.ranking(POOR_QUALITY_LABEL);
    info!(
        "Quality categories by age: {} groups x {} categories",
        ct.row_labels.len(),
        ct.column_labels.len()
    );
    Ok(QualityCategoryAnalysis {
        crosstab: ct,
        poor_rate_ranking,
    })
}

// =============================================================================
// Update patterns
// =============================================================================

const JOIN_KEY: &str = "__enrolment_id";
const JOINED_GROUP: &str = "__age_group";

/// Add the age group of each update's enrolment to the update table.
///
/// Each enrolment ID resolves to the age group of its first enrolment row.
/// Returns the joined table and the number of updates with no age group.
pub fn attach_age_groups(
    updates: &RecordTable,
    enrolments: &RecordTable,
    columns: &ColumnNames,
) -> Result<(RecordTable, usize)> {
    let lookup = DataFrame::new(vec![
        Series::new(JOIN_KEY.into(), enrolments.str_values(&columns.enrolment_id)?).into(),
        Series::new(JOINED_GROUP.into(), enrolments.str_values(&columns.age_group)?).into(),
    ])?
    .drop_nulls(Some(&[JOIN_KEY.to_string()][..]))?
    .unique_stable(Some(&[JOIN_KEY.to_string()]), UniqueKeepStrategy::First, None)?;
    let keys = DataFrame::new(vec![
        Series::new(JOIN_KEY.into(), updates.str_values(&columns.enrolment_id)?).into(),
    ])?;

    let joined = keys
        .lazy()
        .join(
            lookup.lazy(),
            [col(JOIN_KEY)],
            [col(JOIN_KEY)],
            JoinArgs {
                maintain_order: MaintainOrderJoin::Left,
                ..JoinArgs::new(JoinType::Left)
            },
        )
        .collect()?;
    let groups = joined
        .column(JOINED_GROUP)?
        .as_materialized_series()
        .clone()
        .with_name(columns.age_group.as_str().into());

    let unmatched = groups.null_count();
    if unmatched > 0 {
        warn!("{} update(s) have no matching enrolment age group", unmatched);
    }

    let table = updates.with_column(groups)?;
    Ok((table, unmatched))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRate {
    pub group: String,
    pub total_updates: usize,
    pub enrolments: usize,
    /// Rounded to 2 decimals; `None` when the group has no enrolments.
    pub updates_per_1000: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePatterns {
    pub groups: Vec<UpdateRate>,
    pub unmatched_updates: usize,
    pub highest_rate_group: Option<String>,
}

impl UpdatePatterns {
    pub fn summary(&self) -> String {
        let mut lines = vec!["Update Statistics by Age Group:".to_string()];
        for g in &self.groups {
            lines.push(format!(
                "  {}: {} updates / {} enrolments = {} per 1000",
                g.group,
                g.total_updates,
                g.enrolments,
                fmt_opt(g.updates_per_1000)
            ));
        }
        if let Some(highest) = &self.highest_rate_group {
            lines.push(format!("Highest update rate: {}", highest));
        }
        lines.join("\n")
    }
}

/// Updates per 1000 enrolments for each age group.
///
/// Only groups that received at least one update are listed.
pub fn analyze_update_patterns_by_age(
    updates: &RecordTable,
    enrolments: &RecordTable,
    columns: &ColumnNames,
) -> Result<UpdatePatterns> {
    let (joined, unmatched_updates) = attach_age_groups(updates, enrolments, columns)?;

    let enrolment_counts = label_counts(enrolments, &columns.age_group)?;
    let groups: Vec<UpdateRate> = label_counts(&joined, &columns.age_group)?
        .into_iter()
        .map(|(group, total_updates)| {
            let enrolments = enrolment_counts
                .iter()
                .find(|(label, _)| *label == group)
                .map_or(0, |(_, count)| *count);
            UpdateRate {
                updates_per_1000: (enrolments > 0)
                    .then(|| round_to(total_updates as f64 / enrolments as f64 * 1000.0, 2)),
                group,
                total_updates,
                enrolments,
            }
        })
        .collect();

    let highest_rate_group = groups
        .iter()
        .filter_map(|g| g.updates_per_1000.map(|r| (g, r)))
        .reduce(|a, b| if b.1 > a.1 { b } else { a })
        .map(|(g, _)| g.group.clone());

    info!("Update patterns across {} age groups", groups.len());
    Ok(UpdatePatterns {
        groups,
        unmatched_updates,
        highest_rate_group,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTypeAnalysis {
    pub crosstab: CrossTab,
    /// Age groups ranked by their share of biometric updates.
    pub biometric_rate_ranking: Vec<RateEntry>,
}

/// Cross-tabulate age groups against update types.
pub fn analyze_update_types_by_age(
    updates: &RecordTable,
    enrolments: &RecordTable,
    columns: &ColumnNames,
) -> Result<UpdateTypeAnalysis> {
    let (joined, _) = attach_age_groups(updates, enrolments, columns)?;
    let ct = crosstab(&joined, &columns.age_group, &columns.update_type)?;
    let biometric_rate_ranking = ct.ranking(BIOMETRIC_UPDATE_LABEL);
    Ok(UpdateTypeAnalysis {
        crosstab: ct,
        biometric_rate_ranking,
    })
}

// =============================================================================
// Correlation and grouped summaries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub r: f64,
    pub direction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Pearson r rounded to 3 decimals; `None` where undefined.
    pub values: Vec<Vec<Option<f64>>>,
    pub strong_pairs: Vec<CorrelationPair>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }

    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "Not enough numerical columns for correlation analysis".to_string();
        }
        let mut lines = vec![format!("Correlation Matrix ({})", self.columns.join(", "))];
        lines.push(format!("Strong Correlations (|r| > {}):", STRONG_CORRELATION));
        for p in &self.strong_pairs {
            lines.push(format!(
                "  {} <-> {}: {:.3} ({})",
                p.first, p.second, p.r, p.direction
            ));
        }
        lines.join("\n")
    }
}

/// Pairwise-complete Pearson correlation over the numeric `columns`.
///
/// Absent or non-numeric columns are skipped. With fewer than two usable
/// columns the matrix is empty.
pub fn calculate_correlation_matrix(
    table: &RecordTable,
    columns: &[&str],
) -> Result<CorrelationMatrix> {
    let available: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| table.dtype(c).is_ok_and(|d| is_numeric_dtype(&d)))
        .collect();

    if available.len() < 2 {
        warn!("Not enough numerical columns for correlation analysis");
        return Ok(CorrelationMatrix::default());
    }

    let data: Vec<Vec<Option<f64>>> = available
        .iter()
        .map(|c| table.f64_values(c))
        .collect::<Result<_>>()?;

    let n = available.len();
    let mut values = vec![vec![None; n]; n];
    let mut strong_pairs = Vec::new();
    for i in 0..n {
        for j in i..n {
            let r = pearson(&data[i], &data[j]).map(|r| round_to(r, 3));
            values[i][j] = r;
            values[j][i] = r;
            if let Some(r) = r
                && i != j
                && r.abs() > STRONG_CORRELATION
            {
                strong_pairs.push(CorrelationPair {
                    first: available[i].to_string(),
                    second: available[j].to_string(),
                    r,
                    direction: if r > 0.0 { "positive" } else { "negative" }.to_string(),
                });
            }
        }
    }

    Ok(CorrelationMatrix {
        columns: available.iter().map(|c| c.to_string()).collect(),
        values,
        strong_pairs,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub groups: Vec<GroupStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub group_column: String,
    pub columns: Vec<ColumnSummary>,
}

impl SummaryStatistics {
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Summary Statistics by {}", self.group_column)];
        for col in &self.columns {
            lines.push(format!("{}:", col.column));
            for g in &col.groups {
                lines.push(format!(
                    "  {}: count={} mean={} median={} std={} min={} max={}",
                    g.group,
                    g.count,
                    fmt_opt(g.mean),
                    fmt_opt(g.median),
                    fmt_opt(g.std),
                    fmt_opt(g.min),
                    fmt_opt(g.max)
                ));
            }
        }
        lines.join("\n")
    }
}

/// Count, mean, median, std, min and max of each numeric column per group.
///
/// Absent numeric columns are skipped with a warning.
pub fn generate_summary_statistics(
    table: &RecordTable,
    group_column: &str,
    numeric_columns: &[&str],
) -> Result<SummaryStatistics> {
    // Fail early on a missing group column.
    table.series(group_column)?;

    let mut columns = Vec::new();
    for &name in numeric_columns {
        if !table.has_column(name) {
            warn!("Column '{}' not found; skipping summary", name);
            continue;
        }
        columns.push(ColumnSummary {
            column: name.to_string(),
            groups: grouped_stats(table, group_column, name)?,
        });
    }
    if columns.is_empty() {
        warn!("No numerical columns found for summary statistics");
    }

    Ok(SummaryStatistics {
        group_column: group_column.to_string(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn enrolments() -> RecordTable {
        df! {
            "Enrolment_ID" => &["E1", "E2", "E3", "E4", "E5"],
            "Age_Group" => &[
                Some("0-5 (Child)"), Some("0-5 (Child)"), Some("60+ (Elderly)"),
                Some("19-40 (Young Adult)"), None,
            ],
            "Biometric_Quality_Score" => &[Some(40.0), Some(50.0), Some(30.0), Some(80.0), Some(70.0)],
            "Age" => &[2.0, 4.0, 70.0, 30.0, 150.0],
        }
        .unwrap()
        .into()
    }

    fn updates() -> RecordTable {
        df! {
            "Enrolment_ID" => &["E1", "E1", "E3", "E9", "E4"],
            "Update_Type" => &["Biometric", "Demographic", "Biometric", "Biometric", "Demographic"],
        }
        .unwrap()
        .into()
    }

    #[test]
    fn test_age_distribution_uses_full_length() {
        let dist = analyze_age_distribution(&enrolments(), "Age_Group").unwrap();
        assert_eq!(dist.total_records, 5);
        assert_eq!(dist.groups[0].group, "0-5 (Child)");
        assert_eq!(dist.groups[0].count, 2);
        assert_eq!(dist.groups[0].percentage, 40.0);
        assert_eq!(dist.largest.unwrap().group, "0-5 (Child)");
        assert_eq!(dist.smallest.unwrap().group, "19-40 (Young Adult)");
    }

    #[test]
    fn test_quality_by_age() {
        let q = analyze_biometric_quality_by_age(&enrolments(), &ColumnNames::default()).unwrap();
        assert_eq!(q.groups.len(), 3);
        assert_eq!(q.group("0-5 (Child)").unwrap().mean, Some(45.0));
        assert_eq!(q.best_group.as_deref(), Some("19-40 (Young Adult)"));
        assert_eq!(q.worst_group.as_deref(), Some("60+ (Elderly)"));
        assert_eq!(q.quality_gap, Some(50.0));
    }

    #[test]
    fn test_update_patterns() {
        let patterns =
            analyze_update_patterns_by_age(&updates(), &enrolments(), &ColumnNames::default())
                .unwrap();
        assert_eq!(patterns.unmatched_updates, 1);
        let child = &patterns.groups[0];
        assert_eq!(child.group, "0-5 (Child)");
        assert_eq!(child.total_updates, 2);
        assert_eq!(child.enrolments, 2);
        assert_eq!(child.updates_per_1000, Some(1000.0));
        assert_eq!(patterns.highest_rate_group.as_deref(), Some("0-5 (Child)"));
    }

    #[test]
    fn test_update_types_ranking() {
        let analysis =
            analyze_update_types_by_age(&updates(), &enrolments(), &ColumnNames::default())
                .unwrap();
        assert_eq!(analysis.crosstab.grand_total, 4);
        assert_eq!(analysis.biometric_rate_ranking[0].group, "60+ (Elderly)");
        assert_eq!(analysis.biometric_rate_ranking[0].rate, 100.0);
    }

    #[test]
    fn test_correlation_matrix() {
        let table = enrolments();
        let corr = calculate_correlation_matrix(
            &table,
            &["Age", "Biometric_Quality_Score", "Age_Group", "Nope"],
        )
        .unwrap();
        assert_eq!(corr.columns, vec!["Age", "Biometric_Quality_Score"]);
        assert_eq!(corr.get("Age", "Age"), Some(1.0));
        assert_eq!(
            corr.get("Age", "Biometric_Quality_Score"),
            corr.get("Biometric_Quality_Score", "Age")
        );

        let empty = calculate_correlation_matrix(&table, &["Age"]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_summary_statistics_skips_missing() {
        let stats = generate_summary_statistics(
            &enrolments(),
            "Age_Group",
            &["Biometric_Quality_Score", "Missing_Column"],
        )
        .unwrap();
        assert_eq!(stats.columns.len(), 1);
        assert_eq!(stats.columns[0].groups.len(), 3);

        let err = generate_summary_statistics(&enrolments(), "Nope", &["Age"]).unwrap_err();
        assert!(err.is_recoverable());
    }
}
