//! Executive summary and governance recommendation tables.

use crate::analyzer::{AgeDistribution, QualityByAge};
use crate::error::Result;
use crate::loader::write_csv;
use crate::stats::{AnovaResult, ChiSquareResult, HypothesisTest};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Label for a mean quality score.
pub fn quality_rating(mean: Option<f64>) -> &'static str {
    match mean {
        None => "N/A",
        Some(m) if m >= 81.0 => "Excellent",
        Some(m) if m >= 61.0 => "Good",
        Some(m) if m >= 41.0 => "Fair",
        Some(_) => "Poor",
    }
}

// ============================================================================
// Executive summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummaryRow {
    pub age_group: String,
    pub enrolments: usize,
    pub percent_of_total: f64,
    pub avg_quality: Option<f64>,
    pub std_dev: Option<f64>,
    pub rating: String,
}

/// p-value and verdict of a test, when it could be run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub p_value: Option<f64>,
    pub significant: bool,
}

impl TestOutcome {
    pub fn from_test(test: Option<&dyn HypothesisTest>) -> Self {
        match test {
            Some(t) => Self {
                p_value: Some(t.p_value()),
                significant: t.is_significant(),
            },
            None => Self::default(),
        }
    }

    fn describe(&self, name: &str) -> String {
        format!(
            "{}: {}\n  -> P-value: {}",
            name,
            if self.significant {
                "SIGNIFICANT"
            } else {
                "NOT SIGNIFICANT"
            },
            self.p_value
                .map(|p| format!("{p:.6}"))
                .unwrap_or_else(|| "N/A".to_string())
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub rows: Vec<ExecutiveSummaryRow>,
    pub chi_square: TestOutcome,
    pub anova: TestOutcome,
}

impl ExecutiveSummary {
    pub fn to_frame(&self) -> Result<DataFrame> {
        let df = df! {
            "Age Group" => self.rows.iter().map(|r| r.age_group.as_str()).collect::<Vec<_>>(),
            "Enrolments" => self.rows.iter().map(|r| r.enrolments as u64).collect::<Vec<_>>(),
            "% of Total" => self.rows.iter().map(|r| r.percent_of_total).collect::<Vec<_>>(),
            "Avg Quality" => self.rows.iter().map(|r| r.avg_quality).collect::<Vec<_>>(),
            "Std Dev" => self.rows.iter().map(|r| r.std_dev).collect::<Vec<_>>(),
            "Rating" => self.rows.iter().map(|r| r.rating.as_str()).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        write_csv(&self.to_frame()?, path)?;
        info!("Executive summary saved: {}", path.display());
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Key Metrics by Age Group:".to_string()];
        for r in &self.rows {
            lines.push(format!(
                "  {}: {} enrolments ({:.2}%), avg quality {}, rating {}",
                r.age_group,
                r.enrolments,
                r.percent_of_total,
                r.avg_quality
                    .map(|q| format!("{q:.2}"))
                    .unwrap_or_else(|| "N/A".to_string()),
                r.rating
            ));
        }
        lines.push(self.chi_square.describe("Chi-Square Test"));
        lines.push(self.anova.describe("ANOVA Test"));
        lines.join("\n")
    }
}

/// One row per age group: the distribution joined with the quality stats.
///
/// Groups with no quality statistics keep empty quality fields.
pub fn create_executive_summary_table(
    distribution: &AgeDistribution,
    quality: &QualityByAge,
    chi_square: Option<&ChiSquareResult>,
    anova: Option<&AnovaResult>,
) -> ExecutiveSummary {
    let rows = distribution
        .groups
        .iter()
        .map(|g| {
            let stats = quality.group(&g.group);
            let avg_quality = stats.and_then(|s| s.mean);
            ExecutiveSummaryRow {
                age_group: g.group.clone(),
                enrolments: g.count,
                percent_of_total: g.percentage,
                avg_quality,
                std_dev: stats.and_then(|s| s.std),
                rating: quality_rating(avg_quality).to_string(),
            }
        })
        .collect();

    ExecutiveSummary {
        rows,
        chi_square: TestOutcome::from_test(chi_square.map(|t| t as &dyn HypothesisTest)),
        anova: TestOutcome::from_test(anova.map(|t| t as &dyn HypothesisTest)),
    }
}

// ============================================================================
// Recommendations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn for_quality(mean: f64) -> Self {
        if mean < 50.0 {
            Priority::High
        } else if mean < 65.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    fn actions(&self) -> &'static [&'static str] {
        match self {
            Priority::High => &[
                "Deploy specialized biometric devices",
                "Implement assisted enrollment",
                "Conduct targeted re-enrollment campaign",
                "Train operators on age-specific challenges",
            ],
            Priority::Medium => &[
                "Monitor quality trends closely",
                "Provide additional enrollment support",
                "Consider multi-modal biometrics",
                "Improve operator training",
            ],
            Priority::Low => &[
                "Maintain current protocols",
                "Share best practices",
                "Monitor for quality degradation",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub age_group: String,
    /// Mean quality formatted to one decimal.
    pub current_quality: String,
    pub priority: Priority,
    pub primary_action: String,
    pub secondary_actions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationsTable {
    pub rows: Vec<Recommendation>,
}

impl RecommendationsTable {
    pub fn to_frame(&self) -> Result<DataFrame> {
        let df = df! {
            "Age_Group" => self.rows.iter().map(|r| r.age_group.as_str()).collect::<Vec<_>>(),
            "Current_Quality" => self.rows.iter().map(|r| r.current_quality.as_str()).collect::<Vec<_>>(),
            "Priority" => self.rows.iter().map(|r| r.priority.as_str()).collect::<Vec<_>>(),
            "Primary_Action" => self.rows.iter().map(|r| r.primary_action.as_str()).collect::<Vec<_>>(),
            "Secondary_Actions" => self.rows.iter().map(|r| r.secondary_actions.as_str()).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        write_csv(&self.to_frame()?, path)?;
        info!("Recommendations saved: {}", path.display());
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Recommended Actions:".to_string()];
        for r in &self.rows {
            lines.push(format!(
                "{} (Quality: {}) - Priority: {}",
                r.age_group,
                r.current_quality,
                r.priority.as_str()
            ));
            lines.push(format!("  -> {}", r.primary_action));
            lines.push(format!("  -> {}", r.secondary_actions));
        }
        lines.join("\n")
    }
}

/// Governance actions per age group, prioritised by mean quality.
///
/// Groups without a mean quality score get no recommendation.
pub fn create_recommendations_table(quality: &QualityByAge) -> RecommendationsTable {
    let rows = quality
        .groups
        .iter()
        .filter_map(|g| {
            let mean = g.mean?;
            let priority = Priority::for_quality(mean);
            let actions = priority.actions();
            Some(Recommendation {
                age_group: g.group.clone(),
                current_quality: format!("{mean:.1}"),
                priority,
                primary_action: actions[0].to_string(),
                secondary_actions: actions[1..].join("; "),
            })
        })
        .collect();
    RecommendationsTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{GroupCount, GroupStats};
    use crate::loader::load_table;
    use pretty_assertions::assert_eq;

    fn quality() -> QualityByAge {
        QualityByAge {
            quality_column: "Biometric_Quality_Score".to_string(),
            groups: vec![
                GroupStats::from_values("0-5 (Child)", &[40.0, 44.0]),
                GroupStats::from_values("19-40 (Young Adult)", &[80.0, 90.0]),
                GroupStats::from_values("60+ (Elderly)", &[60.0, 62.0]),
                GroupStats::from_values("6-18 (Youth)", &[]),
            ],
            best_group: Some("19-40 (Young Adult)".to_string()),
            worst_group: Some("0-5 (Child)".to_string()),
            quality_gap: Some(43.0),
        }
    }

    fn distribution() -> AgeDistribution {
        let group = |g: &str, c: usize, p: f64| GroupCount {
            group: g.to_string(),
            count: c,
            percentage: p,
        };
        AgeDistribution {
            total_records: 8,
            groups: vec![
                group("0-5 (Child)", 2, 25.0),
                group("19-40 (Young Adult)", 4, 50.0),
                group("41-60 (Middle Age)", 2, 25.0),
            ],
            largest: None,
            smallest: None,
        }
    }

    #[test]
    fn test_quality_rating_thresholds() {
        assert_eq!(quality_rating(Some(81.0)), "Excellent");
        assert_eq!(quality_rating(Some(80.9)), "Good");
        assert_eq!(quality_rating(Some(61.0)), "Good");
        assert_eq!(quality_rating(Some(41.0)), "Fair");
        assert_eq!(quality_rating(Some(40.9)), "Poor");
        assert_eq!(quality_rating(None), "N/A");
    }

    #[test]
    fn test_executive_summary_left_joins_quality() {
        let summary = create_executive_summary_table(&distribution(), &quality(), None, None);
        assert_eq!(summary.rows.len(), 3);
        assert_eq!(summary.rows[0].avg_quality, Some(42.0));
        assert_eq!(summary.rows[0].rating, "Fair");
        assert_eq!(summary.rows[1].rating, "Excellent");
        // Present in the distribution only.
        assert_eq!(summary.rows[2].avg_quality, None);
        assert_eq!(summary.rows[2].rating, "N/A");
        assert_eq!(summary.chi_square, TestOutcome::default());
        assert!(summary.summary().contains("P-value: N/A"));
    }

    #[test]
    fn test_executive_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executive_summary.csv");
        create_executive_summary_table(&distribution(), &quality(), None, None)
            .save_csv(&path)
            .unwrap();

        let loaded = load_table(&path).unwrap();
        assert_eq!(
            loaded.column_names(),
            vec!["Age Group", "Enrolments", "% of Total", "Avg Quality", "Std Dev", "Rating"]
        );
        assert_eq!(loaded.height(), 3);
    }

    #[test]
    fn test_recommendation_priorities() {
        let table = create_recommendations_table(&quality());
        assert_eq!(table.rows.len(), 3);

        let child = &table.rows[0];
        assert_eq!(child.current_quality, "42.0");
        assert_eq!(child.priority, Priority::High);
        assert_eq!(child.primary_action, "Deploy specialized biometric devices");
        assert_eq!(
            child.secondary_actions,
            "Implement assisted enrollment; Conduct targeted re-enrollment campaign; \
             Train operators on age-specific challenges"
        );
        assert_eq!(table.rows[1].priority, Priority::Low);
        assert_eq!(
            table.rows[1].secondary_actions,
            "Share best practices; Monitor for quality degradation"
        );
        assert_eq!(table.rows[2].priority, Priority::Medium);
    }

    #[test]
    fn test_priority_boundaries() {
        assert_eq!(Priority::for_quality(49.99), Priority::High);
        assert_eq!(Priority::for_quality(50.0), Priority::Medium);
        assert_eq!(Priority::for_quality(65.0), Priority::Low);
    }

    #[test]
    fn test_recommendations_frame_columns() {
        let df = create_recommendations_table(&quality()).to_frame().unwrap();
        assert_eq!(df.shape(), (3, 5));
        assert_eq!(
            df.column("Priority").unwrap().str().unwrap().get(0),
            Some("HIGH")
        );
    }
}
