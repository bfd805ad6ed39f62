//! Hypothesis tests relating a categorical grouping to quality.
//!
//! The statistics come from `anofox_statistics`. All three tests fail with a
//! recoverable error on degenerate input instead of returning NaN statistics.

use crate::analyzer::{CrossTab, crosstab, group_values};
use crate::error::{AnalysisError, Result};
use crate::table::RecordTable;
use crate::utils::{mean, median};
use anofox_statistics::categorical::chisq_test;
use anofox_statistics::nonparametric::kruskal::kruskal_wallis;
use anofox_statistics::parametric::anova::{AnovaKind, one_way_anova};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;

// ============================================================================
// Shared result surface
// ============================================================================

/// Common view over a test result, used when rendering reports.
pub trait HypothesisTest {
    fn test_name(&self) -> &str;
    fn p_value(&self) -> f64;
    fn alpha(&self) -> f64;

    fn is_significant(&self) -> bool {
        self.p_value() < self.alpha()
    }
}

/// A labelled per-group value (mean or median).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupValue {
    pub group: String,
    pub value: f64,
}

fn significance_line(significant: bool, alpha: f64) -> String {
    if significant {
        format!("SIGNIFICANT (p < {alpha})")
    } else {
        format!("NOT SIGNIFICANT (p >= {alpha})")
    }
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

fn extreme<'a>(values: &'a [GroupValue], wanted: Ordering) -> Option<&'a GroupValue> {
    values.iter().fold(None, |best: Option<&GroupValue>, candidate| match best {
        Some(current) if candidate.value.partial_cmp(&current.value) != Some(wanted) => {
            Some(current)
        }
        _ => Some(candidate),
    })
}

// ============================================================================
// Chi-square test of independence
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    pub test_name: String,
    pub chi2_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    pub alpha: f64,
    pub is_significant: bool,
    /// Cramér's V.
    pub effect_size: f64,
    pub yates_correction: bool,
    pub observed_total: f64,
    pub expected_total: f64,
    pub expected: Vec<Vec<f64>>,
    pub contingency: CrossTab,
}

impl HypothesisTest for ChiSquareResult {
    fn test_name(&self) -> &str {
        &self.test_name
    }
    fn p_value(&self) -> f64 {
        self.p_value
    }
    fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ChiSquareResult {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "{}: {} x {}",
                self.test_name, self.contingency.row_variable, self.contingency.column_variable
            ),
            format!("Chi-Square Statistic: {:.4}", self.chi2_statistic),
            format!("Degrees of Freedom: {}", self.degrees_of_freedom),
            format!("P-value: {:.6}", self.p_value),
            format!("Effect Size (Cramér's V): {:.4}", self.effect_size),
            significance_line(self.is_significant, self.alpha),
        ];
        if self.is_significant {
            lines.push(format!(
                "{} distribution depends on {}",
                self.contingency.column_variable, self.contingency.row_variable
            ));
        } else {
            lines.push("No significant relationship between the two variables".to_string());
        }
        lines.join("\n")
    }
}

/// Expected cell frequencies, `row_total * column_total / n`.
fn expected_frequencies(contingency: &CrossTab) -> Vec<Vec<f64>> {
    let n = contingency.grand_total as f64;
    contingency
        .row_totals
        .iter()
        .map(|&r| {
            contingency
                .column_totals
                .iter()
                .map(|&c| r as f64 * c as f64 / n)
                .collect()
        })
        .collect()
}

/// Chi-square test of independence between two categorical columns.
pub fn chi_square_test(
    table: &RecordTable,
    row_column: &str,
    column_column: &str,
    alpha: f64,
) -> Result<ChiSquareResult> {
    let contingency = crosstab(table, row_column, column_column)?;
    if contingency.row_labels.len() < 2 {
        return Err(AnalysisError::InsufficientGroups {
            column: row_column.to_string(),
            found: contingency.row_labels.len(),
        });
    }
    if contingency.column_labels.len() < 2 {
        return Err(AnalysisError::InsufficientGroups {
            column: column_column.to_string(),
            found: contingency.column_labels.len(),
        });
    }

    let dof = (contingency.row_labels.len() - 1) * (contingency.column_labels.len() - 1);
    // Continuity correction only applies to 2 x 2 tables.
    let yates_correction = dof == 1;
    let test = chisq_test(&contingency.counts, yates_correction)
        .map_err(|e| AnalysisError::test_failed("Chi-square test", e))?;
    let chi2 = test.statistic;
    let p_value = test.p_value.clamp(0.0, 1.0);

    let n = contingency.grand_total as f64;
    let min_dim = contingency.row_labels.len().min(contingency.column_labels.len());
    // Cramér's V from the reported (corrected) statistic.
    let effect_size = (chi2 / (n * (min_dim - 1) as f64)).sqrt();
    let expected = expected_frequencies(&contingency);
    let expected_total = expected.iter().flatten().sum();

    info!(
        "Chi-square {} x {}: chi2={:.4}, dof={}, p={:.6}",
        row_column, column_column, chi2, dof, p_value
    );

    Ok(ChiSquareResult {
        test_name: "Chi-Square Test of Independence".to_string(),
        chi2_statistic: chi2,
        p_value,
        degrees_of_freedom: dof,
        alpha,
        is_significant: p_value < alpha,
        effect_size,
        yates_correction,
        observed_total: n,
        expected_total,
        expected,
        contingency,
    })
}

// ============================================================================
// One-way ANOVA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaResult {
    pub test_name: String,
    pub group_column: String,
    pub value_column: String,
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_between: usize,
    pub df_within: usize,
    pub alpha: f64,
    pub is_significant: bool,
    pub eta_squared: f64,
    pub group_means: Vec<GroupValue>,
}

impl HypothesisTest for AnovaResult {
    fn test_name(&self) -> &str {
        &self.test_name
    }
    fn p_value(&self) -> f64 {
        self.p_value
    }
    fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl AnovaResult {
    pub fn highest_mean(&self) -> Option<&GroupValue> {
        extreme(&self.group_means, Ordering::Greater)
    }

    pub fn lowest_mean(&self) -> Option<&GroupValue> {
        extreme(&self.group_means, Ordering::Less)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("{}: {} by {}", self.test_name, self.value_column, self.group_column),
            "Group Means:".to_string(),
        ];
        for gm in &self.group_means {
            lines.push(format!("  {}: {:.2}", gm.group, gm.value));
        }
        lines.push(format!(
            "F-Statistic: {:.4} (df {}, {})",
            self.f_statistic, self.df_between, self.df_within
        ));
        lines.push(format!("P-value: {:.6}", self.p_value));
        lines.push(format!("Effect Size (eta squared): {:.4}", self.eta_squared));
        lines.push(significance_line(self.is_significant, self.alpha));
        if self.is_significant
            && let (Some(best), Some(worst)) = (self.highest_mean(), self.lowest_mean())
        {
            lines.push(format!("Highest quality: {} ({:.2})", best.group, best.value));
            lines.push(format!("Lowest quality: {} ({:.2})", worst.group, worst.value));
            lines.push(format!("Difference: {:.2} points", best.value - worst.value));
        }
        lines.join("\n")
    }
}

fn ss_ratio(between: Option<f64>, total: Option<f64>) -> Option<f64> {
    let (between, total) = (between?, total?);
    (total > 0.0).then(|| between / total)
}

/// Share of total variance explained by group membership.
///
/// Returns 0 when the total variance is zero and 1 when every group is
/// constant but the groups differ.
pub fn eta_squared(groups: &[Vec<f64>]) -> f64 {
    let non_empty: Vec<&[f64]> = groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(Vec::as_slice)
        .collect();
    let pooled: Vec<f64> = non_empty.concat();
    if non_empty.len() < 2 || is_constant(&pooled) {
        return 0.0;
    }
    if non_empty.iter().all(|g| is_constant(g)) {
        return 1.0;
    }
    one_way_anova(&non_empty, AnovaKind::Fisher)
        .ok()
        .and_then(|result| ss_ratio(result.ss_between, result.ss_total))
        .unwrap_or(0.0)
}

/// Non-empty groups of `value_column`, keyed by `group_column`.
fn non_empty_groups(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
) -> Result<Vec<(String, Vec<f64>)>> {
    let groups: Vec<(String, Vec<f64>)> = group_values(table, group_column, value_column)?
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect();
    if groups.len() < 2 {
        return Err(AnalysisError::InsufficientGroups {
            column: group_column.to_string(),
            found: groups.len(),
        });
    }
    Ok(groups)
}

/// One-way ANOVA of `value_column` across the groups of `group_column`.
pub fn anova_test(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
    alpha: f64,
) -> Result<AnovaResult> {
    let groups = non_empty_groups(table, group_column, value_column)?;
    let k = groups.len();
    let n: usize = groups.iter().map(|(_, v)| v.len()).sum();
    if n <= k {
        return Err(AnalysisError::InsufficientGroups {
            column: group_column.to_string(),
            found: k,
        });
    }

    let values: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
    if is_constant(&values.concat()) {
        return Err(AnalysisError::ZeroVariance {
            column: value_column.to_string(),
        });
    }

    let df_between = k - 1;
    let df_within = n - k;

    let (f_statistic, p_value, eta_squared) = if values.iter().all(|g| is_constant(g)) {
        // Perfect separation: all variance lies between groups.
        (f64::INFINITY, 0.0, 1.0)
    } else {
        let test = one_way_anova(&values, AnovaKind::Fisher)
            .map_err(|e| AnalysisError::test_failed("ANOVA", e))?;
        let eta = ss_ratio(test.ss_between, test.ss_total).unwrap_or(0.0);
        (test.statistic, test.p_value.clamp(0.0, 1.0), eta)
    };

    let group_means = groups
        .iter()
        .filter_map(|(group, values)| {
            mean(values).map(|value| GroupValue {
                group: group.clone(),
                value,
            })
        })
        .collect();

    info!(
        "ANOVA {} by {}: F={:.4}, p={:.6}",
        value_column, group_column, f_statistic, p_value
    );

    Ok(AnovaResult {
        test_name: "One-Way ANOVA".to_string(),
        group_column: group_column.to_string(),
        value_column: value_column.to_string(),
        f_statistic,
        p_value,
        df_between,
        df_within,
        alpha,
        is_significant: p_value < alpha,
        eta_squared,
        group_means,
    })
}

// ============================================================================
// Kruskal-Wallis H test
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KruskalWallisResult {
    pub test_name: String,
    pub group_column: String,
    pub value_column: String,
    pub h_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    pub alpha: f64,
    pub is_significant: bool,
    pub group_medians: Vec<GroupValue>,
}

impl HypothesisTest for KruskalWallisResult {
    fn test_name(&self) -> &str {
        &self.test_name
    }
    fn p_value(&self) -> f64 {
        self.p_value
    }
    fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl KruskalWallisResult {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("{}: {} by {}", self.test_name, self.value_column, self.group_column),
            "Group Medians:".to_string(),
        ];
        for gm in &self.group_medians {
            lines.push(format!("  {}: {:.2}", gm.group, gm.value));
        }
        lines.push(format!("H-Statistic: {:.4}", self.h_statistic));
        lines.push(format!("P-value: {:.6}", self.p_value));
        lines.push(significance_line(self.is_significant, self.alpha));
        if self.is_significant
            && let (Some(best), Some(worst)) = (
                extreme(&self.group_medians, Ordering::Greater),
                extreme(&self.group_medians, Ordering::Less),
            )
        {
            lines.push(format!("Highest median: {} ({:.2})", best.group, best.value));
            lines.push(format!("Lowest median: {} ({:.2})", worst.group, worst.value));
        }
        lines.join("\n")
    }
}

/// Kruskal-Wallis H test of `value_column` across the groups of `group_column`.
pub fn kruskal_wallis_test(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
    alpha: f64,
) -> Result<KruskalWallisResult> {
    let groups = non_empty_groups(table, group_column, value_column)?;
    let values: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
    if is_constant(&values.concat()) {
        return Err(AnalysisError::ZeroVariance {
            column: value_column.to_string(),
        });
    }

    let test = kruskal_wallis(&values)
        .map_err(|e| AnalysisError::test_failed("Kruskal-Wallis test", e))?;
    let h = test.statistic;
    let p_value = test.p_value.clamp(0.0, 1.0);
    let dof = groups.len() - 1;

    let group_medians = groups
        .iter()
        .filter_map(|(group, values)| {
            median(values).map(|value| GroupValue {
                group: group.clone(),
                value,
            })
        })
        .collect();

    info!(
        "Kruskal-Wallis {} by {}: H={:.4}, p={:.6}",
        value_column, group_column, h, p_value
    );

    Ok(KruskalWallisResult {
        test_name: "Kruskal-Wallis H Test".to_string(),
        group_column: group_column.to_string(),
        value_column: value_column.to_string(),
        h_statistic: h,
        p_value,
        degrees_of_freedom: dof,
        alpha,
        is_significant: p_value < alpha,
        group_medians,
    })
}
