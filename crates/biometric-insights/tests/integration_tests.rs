//! Integration tests for the study pipeline.
//!
//! These tests run the whole study over the CSV fixtures and check the
//! findings and the files written.

use biometric_insights::pipeline::{CLEANED_DATA_FILE, EXECUTIVE_SUMMARY_FILE, RECOMMENDATIONS_FILE};
use biometric_insights::reporting::{STATISTICAL_REPORT_FILE, STUDY_REPORT_FILE};
use biometric_insights::{
    AnalysisConfig, AnalysisStage, MissingValueStrategy, ProgressUpdate, StudyPipeline,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn config_for(output_dir: &Path) -> AnalysisConfig {
    AnalysisConfig::builder()
        .output_dir(output_dir)
        .render_charts(false)
        .build()
        .unwrap()
}

fn run_study(config: AnalysisConfig, with_updates: bool) -> biometric_insights::StudyResult {
    let updates = fixtures_path().join("updates.csv");
    StudyPipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run(
            fixtures_path().join("enrolment.csv"),
            with_updates.then_some(updates.as_path()),
        )
        .unwrap()
}

// ============================================================================
// Full Study Runs
// ============================================================================

#[test]
fn test_full_study_with_updates() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_study(config_for(dir.path()), true);
    let findings = &result.findings;

    // One exact duplicate of E010 in the fixture
    let duplicates = findings.duplicates.as_ref().unwrap();
    assert_eq!(duplicates.original_records, 51);
    assert_eq!(duplicates.duplicates_removed, 1);
    assert_eq!(result.enrolments.height(), 50);

    let distribution = findings.age_distribution.as_ref().unwrap();
    let counts: Vec<(&str, usize)> = distribution
        .groups
        .iter()
        .map(|g| (g.group.as_str(), g.count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("0-5 (Child)", 9),
            ("6-18 (Youth)", 11),
            ("19-40 (Young Adult)", 10),
            ("41-60 (Middle Age)", 10),
            ("60+ (Elderly)", 10),
        ]
    );

    let quality = findings.quality_by_age.as_ref().unwrap();
    assert_eq!(quality.best_group.as_deref(), Some("19-40 (Young Adult)"));
    assert_eq!(quality.worst_group.as_deref(), Some("0-5 (Child)"));

    let anova = findings.anova.as_ref().unwrap();
    assert!(anova.is_significant);
    assert_eq!(anova.df_between, 4);
    assert_eq!(anova.df_within, 45);
    assert!(findings.chi_square.as_ref().unwrap().is_significant);
    assert!(findings.kruskal_wallis.is_some());

    // E999 has no enrolment
    let patterns = findings.update_patterns.as_ref().unwrap();
    assert_eq!(patterns.unmatched_updates, 1);
    let update_types = findings.update_types.as_ref().unwrap();
    assert!(
        update_types
            .crosstab
            .column_labels
            .iter()
            .all(|label| label == "Address"
                || label == "Biometric"
                || label == "Demographic"
                || label == "Mobile")
    );

    let forest = findings.isolation_forest.as_ref().unwrap();
    assert_eq!(forest.total_records, 50);
    assert!(forest.n_anomalies >= 1);
    assert_eq!(findings.zscore_anomalies.as_ref().unwrap().total_records, 50);

    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn test_study_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_study(config_for(dir.path()), true);

    for file in [
        CLEANED_DATA_FILE,
        EXECUTIVE_SUMMARY_FILE,
        RECOMMENDATIONS_FILE,
        STATISTICAL_REPORT_FILE,
        STUDY_REPORT_FILE,
    ] {
        let path = dir.path().join(file);
        assert!(path.exists(), "missing {file}");
        assert!(result.outputs.contains(&path), "{file} not listed");
    }
    assert_eq!(
        result.report_path.as_deref(),
        Some(dir.path().join(STUDY_REPORT_FILE).as_path())
    );

    let cleaned = fs::read_to_string(dir.path().join(CLEANED_DATA_FILE)).unwrap();
    let header = cleaned.lines().next().unwrap();
    assert!(header.contains("Age_Group"));
    assert!(header.contains("Quality_Category"));
    assert!(header.contains("anomaly_type"));
    assert!(cleaned.contains("Tamil Nadu"));
    assert!(!cleaned.contains("TAMIL NADU"));

    let summary = fs::read_to_string(dir.path().join(EXECUTIVE_SUMMARY_FILE)).unwrap();
    assert!(summary.starts_with("Age Group,Enrolments,% of Total,Avg Quality,Std Dev,Rating"));
    assert_eq!(summary.lines().count(), 6);

    let report = fs::read_to_string(dir.path().join(STATISTICAL_REPORT_FILE)).unwrap();
    assert!(report.contains("ANOVA"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(STUDY_REPORT_FILE)).unwrap())
            .unwrap();
    assert_eq!(json["duplicates"]["duplicates_removed"], 1);
    assert_eq!(json["update_patterns"]["unmatched_updates"], 1);
    assert!(json["outputs"].as_array().unwrap().len() >= 4);
    assert!(json["update_file"].as_str().unwrap().ends_with("updates.csv"));
}

#[test]
fn test_study_without_updates() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_study(config_for(dir.path()), false);

    assert!(result.updates.is_none());
    assert!(result.findings.update_info.is_none());
    assert!(result.findings.update_patterns.is_none());
    assert!(result.findings.update_types.is_none());
    assert!(result.findings.anova.is_some());
}

#[test]
fn test_date_window_limits_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::builder()
        .output_dir(dir.path())
        .render_charts(false)
        .date_range(Some("2023-06-01".to_string()), Some("2023-09-30".to_string()))
        .build()
        .unwrap();
    let result = run_study(config, false);

    let cleaning = result.findings.cleaning.as_ref().unwrap();
    assert!(cleaning.cleaned_records > 0);
    assert!(cleaning.cleaned_records < 50);
    assert_eq!(result.enrolments.height(), cleaning.cleaned_records);
}

#[test]
fn test_drop_rows_removes_missing_gender() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::builder()
        .output_dir(dir.path())
        .render_charts(false)
        .missing_strategy(MissingValueStrategy::DropRows)
        .build()
        .unwrap();
    let result = run_study(config, false);

    let missing = result.findings.missing_values.as_ref().unwrap();
    assert_eq!(missing.rows_before, 50);
    assert_eq!(missing.rows_after, 49);
    assert_eq!(result.enrolments.height(), 49);
}

// ============================================================================
// Degraded and Failed Runs
// ============================================================================

#[test]
fn test_missing_quality_column_degrades_with_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ages_only.csv");
    fs::write(
        &input,
        "Enrolment_ID,Age,Enrolment_Date\nE1,3,2023-01-01\nE2,30,2023-02-01\nE3,70,2023-03-01\n",
    )
    .unwrap();

    let result = StudyPipeline::builder()
        .config(config_for(&dir.path().join("out")))
        .build()
        .unwrap()
        .run(&input, None)
        .unwrap();

    assert!(result.findings.age_distribution.is_some());
    assert!(result.findings.quality_by_age.is_none());
    assert!(result.findings.anova.is_none());
    assert!(result.findings.executive_summary.is_none());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.starts_with("ANOVA: ") && w.contains("Biometric_Quality_Score"))
    );

    let report =
        fs::read_to_string(dir.path().join("out").join(STATISTICAL_REPORT_FILE)).unwrap();
    assert!(report.contains("NOT AVAILABLE"));
}

#[test]
fn test_unsupported_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("enrolment.json");
    fs::write(&input, "{}").unwrap();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_clone = failures.clone();
    let err = StudyPipeline::builder()
        .config(config_for(dir.path()))
        .on_progress(move |update: ProgressUpdate| {
            if update.stage == AnalysisStage::Failed {
                failures_clone.lock().unwrap().push(update.message);
            }
        })
        .build()
        .unwrap()
        .run(&input, None)
        .unwrap_err();

    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    assert!(!err.is_recoverable());
    assert_eq!(failures.lock().unwrap().len(), 1);
    assert!(!dir.path().join(STUDY_REPORT_FILE).exists());
}

// ============================================================================
// Progress Reporting
// ============================================================================

#[test]
fn test_progress_visits_every_stage_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let updates_clone = updates.clone();

    StudyPipeline::builder()
        .config(config_for(dir.path()))
        .on_progress(move |update| updates_clone.lock().unwrap().push(update))
        .build()
        .unwrap()
        .run(fixtures_path().join("enrolment.csv"), None)
        .unwrap();

    let updates = updates.lock().unwrap();
    let mut stages: Vec<AnalysisStage> = updates.iter().map(|u| u.stage).collect();
    stages.dedup();
    let mut expected = AnalysisStage::PIPELINE.to_vec();
    expected.push(AnalysisStage::Complete);
    assert_eq!(stages, expected);

    let progress: Vec<f32> = updates.iter().map(|u| u.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(1.0));
}
