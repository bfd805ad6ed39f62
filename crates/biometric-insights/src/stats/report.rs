//! Plain-text summary of the hypothesis tests and anomaly scan.

use super::hypothesis::{AnovaResult, ChiSquareResult, HypothesisTest, KruskalWallisResult};
use super::zscore::ZScoreStats;

const WIDTH: usize = 80;

fn push_test_section(
    report: &mut Vec<String>,
    heading: &str,
    test: Option<&dyn HypothesisTest>,
    significant_text: &str,
    not_significant_text: &str,
) {
    report.push(format!("\n{heading}"));
    report.push("-".repeat(WIDTH));
    match test {
        Some(test) => {
            let significant = test.is_significant();
            report.push(format!(
                "   Result: {}",
                if significant { "SIGNIFICANT" } else { "NOT SIGNIFICANT" }
            ));
            report.push(format!("   P-value: {:.6}", test.p_value()));
            report.push(format!(
                "   Interpretation: {}",
                if significant {
                    significant_text
                } else {
                    not_significant_text
                }
            ));
        }
        None => report.push("   Result: NOT AVAILABLE (test could not be run)".to_string()),
    }
}

/// Render the four-section statistical report with its overall conclusion.
///
/// A test that could not be run is reported as not available and counts as
/// not significant in the conclusion. Missing anomaly statistics read as zero.
pub fn generate_statistical_report(
    chi_square: Option<&ChiSquareResult>,
    anova: Option<&AnovaResult>,
    kruskal: Option<&KruskalWallisResult>,
    anomalies: Option<&ZScoreStats>,
) -> String {
    let mut report = vec![
        "=".repeat(WIDTH),
        "STATISTICAL TESTING SUMMARY REPORT".to_string(),
        "=".repeat(WIDTH),
    ];

    push_test_section(
        &mut report,
        "1. CHI-SQUARE TEST (Quality Categories × Age Groups)",
        chi_square.map(|t| t as &dyn HypothesisTest),
        "Age affects quality distribution",
        "No relationship found",
    );
    push_test_section(
        &mut report,
        "2. ONE-WAY ANOVA (Mean Quality Scores)",
        anova.map(|t| t as &dyn HypothesisTest),
        "Age groups have different mean quality",
        "No difference in means",
    );
    push_test_section(
        &mut report,
        "3. KRUSKAL-WALLIS TEST (Non-parametric)",
        kruskal.map(|t| t as &dyn HypothesisTest),
        "Confirms age-quality relationship (robust)",
        "No relationship",
    );

    let empty = ZScoreStats::default();
    let anomalies = anomalies.unwrap_or(&empty);
    report.push("\n4. ANOMALY DETECTION".to_string());
    report.push("-".repeat(WIDTH));
    report.push(format!(
        "   Anomalies Detected: {} ({:.2}%)",
        anomalies.n_anomalies, anomalies.anomaly_rate
    ));
    report.push(format!(
        "   Unusually High Quality: {}",
        anomalies.n_unusually_high
    ));
    report.push(format!("   Unusually Low Quality: {}", anomalies.n_unusually_low));

    report.push(format!("\n{}", "=".repeat(WIDTH)));
    report.push("OVERALL CONCLUSION".to_string());
    report.push("=".repeat(WIDTH));

    let all_significant = chi_square.is_some_and(|t| t.is_significant())
        && anova.is_some_and(|t| t.is_significant())
        && kruskal.is_some_and(|t| t.is_significant());
    if all_significant {
        report.push(
            "\nSTRONG EVIDENCE: All tests confirm age significantly affects biometric quality"
                .to_string(),
        );
        report.push("\nGovernance Recommendations:".to_string());
        report.push("  1. Implement age-specific enrollment protocols".to_string());
        report.push("  2. Deploy specialized biometric devices for challenging age groups".to_string());
        report.push("  3. Prioritize re-enrollment campaigns for low-quality demographics".to_string());
        report.push("  4. Investigate anomalies for quality improvement opportunities".to_string());
    } else {
        report.push("\nMIXED EVIDENCE: Some tests show significance, others don't".to_string());
        report.push("  -> Further investigation recommended".to_string());
    }

    report.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{anova_test, chi_square_test, kruskal_wallis_test};
    use crate::table::RecordTable;
    use polars::prelude::*;

    fn separated() -> RecordTable {
        let mut groups = Vec::new();
        let mut scores = Vec::new();
        let mut categories = Vec::new();
        for i in 0..30 {
            groups.push("0-5 (Child)");
            scores.push(30.0 + (i % 5) as f64);
            categories.push("Poor (0-40)");
            groups.push("19-40 (Young Adult)");
            scores.push(80.0 + (i % 5) as f64);
            categories.push("Good (61-80)");
        }
        df! {
            "Age_Group" => groups,
            "Score" => scores,
            "Quality_Category" => categories,
        }
        .unwrap()
        .into()
    }

    #[test]
    fn test_report_with_all_tests_significant() {
        let table = separated();
        let chi = chi_square_test(&table, "Age_Group", "Quality_Category", 0.05).unwrap();
        let anova = anova_test(&table, "Age_Group", "Score", 0.05).unwrap();
        let kw = kruskal_wallis_test(&table, "Age_Group", "Score", 0.05).unwrap();
        let anomalies = ZScoreStats {
            n_anomalies: 3,
            anomaly_rate: 5.0,
            n_unusually_high: 1,
            n_unusually_low: 2,
            ..Default::default()
        };

        let text = generate_statistical_report(Some(&chi), Some(&anova), Some(&kw), Some(&anomalies));
        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.contains("STATISTICAL TESTING SUMMARY REPORT"));
        assert!(text.contains("Interpretation: Age affects quality distribution"));
        assert!(text.contains("Interpretation: Age groups have different mean quality"));
        assert!(text.contains("Confirms age-quality relationship (robust)"));
        assert!(text.contains("Anomalies Detected: 3 (5.00%)"));
        assert!(text.contains("Unusually Low Quality: 2"));
        assert!(text.contains("STRONG EVIDENCE"));
        assert!(text.contains("4. Investigate anomalies"));
    }

    #[test]
    fn test_report_with_missing_tests_is_mixed() {
        let text = generate_statistical_report(None, None, None, None);
        assert!(text.contains("NOT AVAILABLE"));
        assert!(text.contains("Anomalies Detected: 0 (0.00%)"));
        assert!(text.contains("MIXED EVIDENCE"));
        assert!(text.contains("Further investigation recommended"));
    }
}
