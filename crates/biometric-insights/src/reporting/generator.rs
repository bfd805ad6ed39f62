use super::tables::{ExecutiveSummary, RecommendationsTable};
use crate::analyzer::{
    AgeDistribution, CorrelationMatrix, OutlierStats, QualityByAge, QualityCategoryAnalysis,
    SummaryStatistics, UpdatePatterns, UpdateTypeAnalysis,
};
use crate::cleaner::{CleaningSummary, DedupOutcome, MissingValueReport};
use crate::error::Result;
use crate::loader::DataInfo;
use crate::stats::{
    AnovaResult, ChiSquareResult, IsolationForestStats, KruskalWallisResult, ZScoreStats,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const STUDY_REPORT_FILE: &str = "study_report.json";
pub const STATISTICAL_REPORT_FILE: &str = "statistical_report.txt";

// ============================================================================
// Study Report Types
// ============================================================================

/// Everything a study run found. Each field is empty when its step was
/// skipped or failed recoverably.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyFindings {
    // Data preparation
    pub enrolment_info: Option<DataInfo>,
    pub update_info: Option<DataInfo>,
    pub missing_values: Option<MissingValueReport>,
    pub duplicates: Option<DedupOutcome>,
    pub cleaning: Option<CleaningSummary>,

    // Analyses
    pub age_distribution: Option<AgeDistribution>,
    pub quality_by_age: Option<QualityByAge>,
    pub quality_categories: Option<QualityCategoryAnalysis>,
    pub update_patterns: Option<UpdatePatterns>,
    pub update_types: Option<UpdateTypeAnalysis>,
    pub correlation: Option<CorrelationMatrix>,
    pub summary_statistics: Option<SummaryStatistics>,
    pub outliers: Option<OutlierStats>,

    // Hypothesis tests
    pub chi_square: Option<ChiSquareResult>,
    pub anova: Option<AnovaResult>,
    pub kruskal_wallis: Option<KruskalWallisResult>,

    // Anomalies
    pub zscore_anomalies: Option<ZScoreStats>,
    pub isolation_forest: Option<IsolationForestStats>,

    // Tables
    pub executive_summary: Option<ExecutiveSummary>,
    pub recommendations: Option<RecommendationsTable>,
}

/// JSON record of one study run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub enrolment_file: String,
    pub update_file: Option<String>,
    pub output_dir: String,
    pub duration_ms: u64,
    /// Files written by the run, in order
    pub outputs: Vec<String>,
    /// Recoverable problems that degraded the run
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub findings: StudyFindings,
}

impl StudyReport {
    pub fn new(
        enrolment_file: &Path,
        update_file: Option<&Path>,
        output_dir: &Path,
        findings: StudyFindings,
    ) -> Self {
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            enrolment_file: enrolment_file.display().to_string(),
            update_file: update_file.map(|p| p.display().to_string()),
            output_dir: output_dir.display().to_string(),
            duration_ms: 0,
            outputs: Vec::new(),
            warnings: Vec::new(),
            findings,
        }
    }
}

// ============================================================================
// Report Generator
// ============================================================================

/// Writes study artifacts into one output directory.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of `file_name` inside the output directory.
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Write the study report as pretty-printed JSON.
    pub fn write_study_report(&self, report: &StudyReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let report_path = self.path(STUDY_REPORT_FILE);
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }

    /// Write a plain-text report under `file_name`.
    pub fn write_text_report(&self, file_name: &str, text: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let report_path = self.path(file_name);
        let mut file = File::create(&report_path)?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            file.write_all(b"\n")?;
        }

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ZScoreStats;

    #[test]
    fn test_write_study_report() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path().join("out"));

        let findings = StudyFindings {
            zscore_anomalies: Some(ZScoreStats {
                total_records: 10,
                n_anomalies: 1,
                anomaly_rate: 10.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut report = StudyReport::new(
            Path::new("data/enrolment.csv"),
            None,
            generator.output_dir(),
            findings,
        );
        report.warnings.push("ANOVA skipped".to_string());

        let path = generator.write_study_report(&report).unwrap();
        assert_eq!(path.file_name().unwrap(), STUDY_REPORT_FILE);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["enrolment_file"], "data/enrolment.csv");
        assert_eq!(json["update_file"], serde_json::Value::Null);
        assert_eq!(json["zscore_anomalies"]["n_anomalies"], 1);
        assert_eq!(json["warnings"][0], "ANOVA skipped");
        assert_eq!(json["generated_at"].as_str().unwrap().len(), 19);

        let back: StudyReport = serde_json::from_value(json).unwrap();
        assert!(back.findings.anova.is_none());
    }

    #[test]
    fn test_write_text_report_appends_newline() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path());
        let path = generator
            .write_text_report(STATISTICAL_REPORT_FILE, "line")
            .unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "line\n");
    }
}
