//! Study pipeline and its builder.
//!
//! [`StudyPipeline`] runs the whole study over an enrolment file and an
//! optional update file: cleaning, bucketing, analyses, tests, anomaly
//! detection and every output file.

use crate::analyzer::{
    analyze_age_distribution, analyze_biometric_quality_by_age,
    analyze_quality_categories_by_age, analyze_update_patterns_by_age,
    analyze_update_types_by_age, calculate_correlation_matrix, generate_summary_statistics,
    identify_outliers,
};
use crate::cleaner::{
    cleaning_summary, create_age_groups, create_biometric_quality_categories,
    filter_by_date_range, handle_missing_values, remove_duplicates,
    standardize_categorical_columns,
};
use crate::config::{AnalysisConfig, ConfigValidationError};
use crate::error::{AnalysisError, Result};
use crate::loader::{
    convert_date_columns, data_info, load_enrolment_data, load_update_data, save_processed_data,
};
use crate::pipeline::progress::{
    AnalysisStage, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
use crate::reporting::charts::{
    age_distribution_chart, anomaly_summary_chart, correlation_heatmap, mean_quality_chart,
    quality_box_plot, quality_category_chart, quality_comparison_chart, temporal_trend_chart,
    update_rate_chart, update_type_heatmap,
};
use crate::reporting::{
    ChartRenderer, ReportGenerator, STATISTICAL_REPORT_FILE, StudyFindings, StudyReport,
    create_executive_summary_table, create_final_report_dashboard, create_recommendations_table,
};
use crate::stats::{
    ANOMALY_TYPE_COLUMN, IsolationForestParams, anova_test, chi_square_test, detect_age_quality_anomalies,
    generate_statistical_report, isolation_forest_anomaly_detection, kruskal_wallis_test,
};
use crate::table::RecordTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub const CLEANED_DATA_FILE: &str = "cleaned_enrolment_data.csv";
pub const EXECUTIVE_SUMMARY_FILE: &str = "executive_summary.csv";
pub const RECOMMENDATIONS_FILE: &str = "recommendations.csv";

/// Outcome of a study run.
#[derive(Debug, Clone)]
pub struct StudyResult {
    /// Cleaned enrolments with age groups, quality categories and anomaly
    /// columns.
    pub enrolments: RecordTable,
    /// Cleaned updates, when an update file was given.
    pub updates: Option<RecordTable>,
    pub findings: StudyFindings,
    /// Files written, in order.
    pub outputs: Vec<PathBuf>,
    /// Steps skipped because of recoverable errors.
    pub warnings: Vec<String>,
    pub report_path: Option<PathBuf>,
    pub duration_ms: u64,
}

/// The end-to-end study pipeline.
///
/// Use [`StudyPipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use biometric_insights::{AnalysisConfig, StudyPipeline};
///
/// let result = StudyPipeline::builder()
///     .config(AnalysisConfig::builder().output_dir("outputs").build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run("data/enrolment.csv", Some("data/updates.csv".as_ref()))?;
/// ```
pub struct StudyPipeline {
    config: AnalysisConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    generator: ReportGenerator,
}

static_assertions::assert_impl_all!(StudyPipeline: Send);

/// Collects recoverable failures as warnings and passes the rest through.
struct Warnings(Vec<String>);

impl Warnings {
    fn recover<T>(&mut self, step: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_recoverable() => {
                warn!("{} skipped: {}", step, e);
                self.0.push(format!("{step}: {e}"));
                Ok(None)
            }
            Err(e) => Err(e.with_context(step)),
        }
    }
}

impl StudyPipeline {
    pub fn builder() -> StudyPipelineBuilder {
        StudyPipelineBuilder::default()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// One line per stage describing what a run will do.
    pub fn planned_steps(&self, with_updates: bool) -> Vec<String> {
        let config = &self.config;
        AnalysisStage::PIPELINE
            .iter()
            .map(|stage| {
                let detail = match stage {
                    AnalysisStage::Loading if with_updates => {
                        "enrolment and update files".to_string()
                    }
                    AnalysisStage::Loading => "enrolment file".to_string(),
                    AnalysisStage::DateConversion => format!(
                        "{}, {}",
                        config.columns.enrolment_date, config.columns.update_date
                    ),
                    AnalysisStage::Standardization => format!(
                        "{:?} case on {}",
                        config.standardize_case,
                        config.columns.categorical_columns().join(", ")
                    ),
                    AnalysisStage::Deduplication => format!("keep {:?}", config.dedup_keep),
                    AnalysisStage::MissingValues => format!("{:?}", config.missing_strategy),
                    AnalysisStage::DateFiltering if config.date_range.is_empty() => {
                        "no date window".to_string()
                    }
                    AnalysisStage::DateFiltering => format!(
                        "{} to {}",
                        config.date_range.start.as_deref().unwrap_or("start"),
                        config.date_range.end.as_deref().unwrap_or("end")
                    ),
                    AnalysisStage::Bucketing => format!(
                        "{} age groups, {} quality categories",
                        config.age_bins.labels.len(),
                        config.quality_bins.labels.len()
                    ),
                    AnalysisStage::Analysis if with_updates => {
                        "distribution, quality, categories, updates, correlation".to_string()
                    }
                    AnalysisStage::Analysis => {
                        "distribution, quality, categories, correlation".to_string()
                    }
                    AnalysisStage::StatisticalTesting => format!(
                        "alpha {}, z-score threshold {}, contamination {}",
                        config.alpha, config.zscore_threshold, config.contamination
                    ),
                    AnalysisStage::OutputGeneration => format!(
                        "{}{}",
                        config.output_dir.display(),
                        if config.render_charts { " (with charts)" } else { "" }
                    ),
                    AnalysisStage::Complete | AnalysisStage::Failed => String::new(),
                };
                format!("{}: {}", stage.display_name(), detail)
            })
            .collect()
    }

    /// Run the study and write every output under the configured directory.
    ///
    /// Missing columns, degenerate groups and chart failures skip their step
    /// and are listed in [`StudyResult::warnings`]. Load and IO failures
    /// abort the run.
    pub fn run(
        &self,
        enrolment_path: impl AsRef<Path>,
        update_path: Option<&Path>,
    ) -> Result<StudyResult> {
        match self.run_internal(enrolment_path.as_ref(), update_path) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Study completed with {} warning(s)",
                    result.warnings.len()
                )));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn start_stage(&self, stage: AnalysisStage) {
        info!("{}...", stage.display_name());
        self.report_progress(ProgressUpdate::new(
            stage,
            0.0,
            format!("{}...", stage.display_name()),
        ));
    }

    fn run_internal(&self, enrolment_path: &Path, update_path: Option<&Path>) -> Result<StudyResult> {
        let start_time = Instant::now();
        let config = &self.config;
        let columns = &config.columns;
        let mut findings = StudyFindings::default();
        let mut warnings = Warnings(Vec::new());

        // Step 1: Load
        self.start_stage(AnalysisStage::Loading);
        let original = load_enrolment_data(enrolment_path, columns)?;
        findings.enrolment_info = Some(data_info(&original, "Enrolment Data")?);
        let mut updates = match update_path {
            Some(path) => {
                let table = load_update_data(path, columns)?;
                findings.update_info = Some(data_info(&table, "Update Data")?);
                Some(table)
            }
            None => None,
        };

        // Step 2: Dates
        self.start_stage(AnalysisStage::DateConversion);
        let mut enrolments =
            convert_date_columns(&original, &[columns.enrolment_date.as_str()], None)?;
        if let Some(table) = &updates {
            updates = Some(convert_date_columns(
                table,
                &[columns.update_date.as_str()],
                None,
            )?);
        }

        // Step 3: Text
        self.start_stage(AnalysisStage::Standardization);
        let categorical = columns.categorical_columns();
        enrolments =
            standardize_categorical_columns(&enrolments, &categorical, config.standardize_case)?;
        if let Some(table) = &updates {
            updates = Some(standardize_categorical_columns(
                table,
                &categorical,
                config.standardize_case,
            )?);
        }

        // Step 4: Duplicates
        self.start_stage(AnalysisStage::Deduplication);
        let (deduped, outcome) = remove_duplicates(&enrolments, None, config.dedup_keep)?;
        enrolments = deduped;
        findings.duplicates = Some(outcome);

        // Step 5: Missing values
        self.start_stage(AnalysisStage::MissingValues);
        let (handled, report) = handle_missing_values(&enrolments, config.missing_strategy)?;
        enrolments = handled;
        findings.missing_values = Some(report);

        // Step 6: Date window
        self.start_stage(AnalysisStage::DateFiltering);
        if !config.date_range.is_empty()
            && let Some((filtered, _)) = warnings.recover(
                "Date filter",
                filter_by_date_range(&enrolments, &columns.enrolment_date, &config.date_range),
            )?
        {
            enrolments = filtered;
        }

        // Step 7: Buckets
        self.start_stage(AnalysisStage::Bucketing);
        if let Some(table) = warnings.recover(
            "Age groups",
            create_age_groups(&enrolments, columns, &config.age_bins),
        )? {
            enrolments = table;
        }
        if let Some(table) = warnings.recover(
            "Quality categories",
            create_biometric_quality_categories(&enrolments, columns, &config.quality_bins),
        )? {
            enrolments = table;
        }
        findings.cleaning = Some(cleaning_summary(&original, &enrolments));

        // Step 8: Analyses
        self.start_stage(AnalysisStage::Analysis);
        findings.age_distribution = warnings.recover(
            "Age distribution",
            analyze_age_distribution(&enrolments, &columns.age_group),
        )?;
        findings.quality_by_age = warnings.recover(
            "Quality by age",
            analyze_biometric_quality_by_age(&enrolments, columns),
        )?;
        findings.quality_categories = warnings.recover(
            "Quality categories by age",
            analyze_quality_categories_by_age(&enrolments, columns),
        )?;
        if let Some(table) = &updates {
            findings.update_patterns = warnings.recover(
                "Update patterns",
                analyze_update_patterns_by_age(table, &enrolments, columns),
            )?;
            findings.update_types = warnings.recover(
                "Update types",
                analyze_update_types_by_age(table, &enrolments, columns),
            )?;
        }
        let numeric = [columns.age.as_str(), columns.quality_score.as_str()];
        findings.correlation = warnings.recover(
            "Correlation matrix",
            calculate_correlation_matrix(&enrolments, &numeric),
        )?;
        findings.summary_statistics = warnings.recover(
            "Summary statistics",
            generate_summary_statistics(&enrolments, &columns.age_group, &numeric),
        )?;
        findings.outliers = warnings
            .recover(
                "Outliers",
                identify_outliers(&enrolments, &columns.quality_score, config.outlier_method),
            )?
            .map(|(_, stats)| stats);

        // Step 9: Tests and anomalies
        self.start_stage(AnalysisStage::StatisticalTesting);
        findings.chi_square = warnings.recover(
            "Chi-square test",
            chi_square_test(
                &enrolments,
                &columns.age_group,
                &columns.quality_category,
                config.alpha,
            ),
        )?;
        findings.anova = warnings.recover(
            "ANOVA",
            anova_test(
                &enrolments,
                &columns.age_group,
                &columns.quality_score,
                config.alpha,
            ),
        )?;
        findings.kruskal_wallis = warnings.recover(
            "Kruskal-Wallis test",
            kruskal_wallis_test(
                &enrolments,
                &columns.age_group,
                &columns.quality_score,
                config.alpha,
            ),
        )?;
        if let Some((table, stats)) = warnings.recover(
            "Z-score anomalies",
            detect_age_quality_anomalies(
                &enrolments,
                &columns.age_group,
                &columns.quality_score,
                config.zscore_threshold,
            ),
        )? {
            enrolments = table;
            findings.zscore_anomalies = Some(stats);
        }
        if let Some((table, stats)) = warnings.recover(
            "Isolation forest",
            isolation_forest_anomaly_detection(
                &enrolments,
                &numeric,
                &IsolationForestParams::from_config(config),
            ),
        )? {
            enrolments = table;
            findings.isolation_forest = Some(stats);
        }

        // Step 10: Outputs
        self.start_stage(AnalysisStage::OutputGeneration);
        let mut outputs = Vec::new();
        outputs.push(save_processed_data(
            &enrolments,
            CLEANED_DATA_FILE,
            self.generator.output_dir(),
        )?);

        if let (Some(distribution), Some(quality)) =
            (&findings.age_distribution, &findings.quality_by_age)
        {
            let summary = create_executive_summary_table(
                distribution,
                quality,
                findings.chi_square.as_ref(),
                findings.anova.as_ref(),
            );
            let path = self.generator.path(EXECUTIVE_SUMMARY_FILE);
            summary.save_csv(&path)?;
            outputs.push(path);
            findings.executive_summary = Some(summary);
        }
        if let Some(quality) = &findings.quality_by_age {
            let recommendations = create_recommendations_table(quality);
            let path = self.generator.path(RECOMMENDATIONS_FILE);
            recommendations.save_csv(&path)?;
            outputs.push(path);
            findings.recommendations = Some(recommendations);
        }

        let statistical_report = generate_statistical_report(
            findings.chi_square.as_ref(),
            findings.anova.as_ref(),
            findings.kruskal_wallis.as_ref(),
            findings.zscore_anomalies.as_ref(),
        );
        outputs.push(
            self.generator
                .write_text_report(STATISTICAL_REPORT_FILE, &statistical_report)?,
        );

        if config.render_charts {
            outputs.extend(self.render_charts(
                &enrolments,
                &findings,
                updates.is_some(),
                &mut warnings,
            )?);
        }

        let mut report = StudyReport::new(
            enrolment_path,
            update_path,
            self.generator.output_dir(),
            findings,
        );
        report.duration_ms = start_time.elapsed().as_millis() as u64;
        report.outputs = outputs.iter().map(|p| p.display().to_string()).collect();
        report.warnings = warnings.0;
        let report_path = self.generator.write_study_report(&report)?;
        outputs.push(report_path.clone());

        info!(
            "Study complete: {} records, {} outputs, {} warnings",
            enrolments.height(),
            outputs.len(),
            report.warnings.len()
        );

        Ok(StudyResult {
            enrolments,
            updates,
            findings: report.findings,
            outputs,
            warnings: report.warnings,
            report_path: Some(report_path),
            duration_ms: report.duration_ms,
        })
    }

    /// Render every chart whose inputs are available.
    fn render_charts(
        &self,
        enrolments: &RecordTable,
        findings: &StudyFindings,
        with_updates: bool,
        warnings: &mut Warnings,
    ) -> Result<Vec<PathBuf>> {
        let Some(renderer) =
            warnings.recover("Charts", ChartRenderer::new(self.config.chart.clone()))?
        else {
            return Ok(Vec::new());
        };
        let columns = &self.config.columns;
        let mut written = Vec::new();
        let mut chart = |file: &str, result: Result<()>| -> Result<()> {
            self.report_progress(ProgressUpdate::with_sub_stage(
                AnalysisStage::OutputGeneration,
                format!("Chart: {file}"),
                0.5,
                "Rendering charts",
            ));
            if warnings.recover(file, result)?.is_some() {
                written.push(self.generator.path(file));
            }
            Ok(())
        };
        let path = |file: &str| self.generator.path(file);

        if let Some(distribution) = &findings.age_distribution {
            let spec = age_distribution_chart(distribution);
            chart(
                "age_distribution.png",
                renderer.render_bar_chart(&spec, &path("age_distribution.png")),
            )?;
        }
        if let Some(quality) = &findings.quality_by_age {
            let spec = quality_comparison_chart(quality);
            chart(
                "quality_comparison.png",
                renderer.render_quality_comparison(&spec, &path("quality_comparison.png")),
            )?;
            let spec = mean_quality_chart(quality);
            chart(
                "mean_quality_by_age.png",
                renderer.render_line_chart(&spec, &path("mean_quality_by_age.png")),
            )?;
        }
        chart(
            "quality_box_plot.png",
            quality_box_plot(enrolments, &columns.age_group, &columns.quality_score)
                .and_then(|spec| renderer.render_box_plot(&spec, &path("quality_box_plot.png"))),
        )?;
        if let Some(categories) = &findings.quality_categories {
            let spec = quality_category_chart(&categories.crosstab);
            chart(
                "quality_categories_by_age.png",
                renderer
                    .render_stacked_bar_chart(&spec, &path("quality_categories_by_age.png")),
            )?;
        }
        chart(
            "temporal_trend.png",
            temporal_trend_chart(
                enrolments,
                &columns.enrolment_date,
                &columns.quality_score,
                self.config.chart.trend_frequency,
            )
            .and_then(|spec| renderer.render_line_chart(&spec, &path("temporal_trend.png"))),
        )?;
        if findings.zscore_anomalies.is_some() {
            chart(
                "anomaly_summary.png",
                anomaly_summary_chart(enrolments, &columns.age_group, ANOMALY_TYPE_COLUMN).and_then(
                    |spec| renderer.render_stacked_bar_chart(&spec, &path("anomaly_summary.png")),
                ),
            )?;
        }
        if with_updates {
            if let Some(patterns) = &findings.update_patterns {
                let spec = update_rate_chart(patterns);
                chart(
                    "update_rates_by_age.png",
                    renderer.render_bar_chart(&spec, &path("update_rates_by_age.png")),
                )?;
            }
            if let Some(types) = &findings.update_types {
                let spec = update_type_heatmap(&types.crosstab);
                chart(
                    "update_types_heatmap.png",
                    renderer.render_heatmap(&spec, &path("update_types_heatmap.png")),
                )?;
            }
        }
        if let Some(matrix) = &findings.correlation
            && !matrix.is_empty()
        {
            let spec = correlation_heatmap(matrix);
            chart(
                "correlation_heatmap.png",
                renderer.render_heatmap(&spec, &path("correlation_heatmap.png")),
            )?;
        }
        chart(
            "final_dashboard.png",
            create_final_report_dashboard(enrolments, columns).and_then(|dashboard| {
                renderer.render_dashboard(&dashboard, &path("final_dashboard.png"))
            }),
        )?;

        Ok(written)
    }
}

/// Builder for creating a [`StudyPipeline`] instance.
///
/// Use [`StudyPipeline::builder()`] to get started.
#[derive(Default)]
pub struct StudyPipelineBuilder {
    config: Option<AnalysisConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(StudyPipelineBuilder: Send);

impl StudyPipelineBuilder {
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a custom progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<StudyPipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let generator = ReportGenerator::new(config.output_dir.clone());
        Ok(StudyPipeline {
            config,
            progress_reporter: self.progress_reporter,
            generator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingValueStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_default() {
        let pipeline = StudyPipeline::builder().build().unwrap();
        assert_eq!(pipeline.config().alpha, 0.05);
        assert!(pipeline.progress_reporter.is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = AnalysisConfig {
            contamination: 0.9,
            ..Default::default()
        };
        assert!(matches!(
            StudyPipeline::builder().config(config).build(),
            Err(ConfigValidationError::InvalidContamination(_))
        ));
    }

    #[test]
    fn test_builder_with_progress_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let pipeline = StudyPipeline::builder()
            .on_progress(move |_update| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        pipeline.report_progress(ProgressUpdate::new(AnalysisStage::Loading, 0.5, "Test"));

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_planned_steps_cover_every_stage() {
        let config = AnalysisConfig {
            missing_strategy: MissingValueStrategy::DropColumns { threshold: 0.5 },
            ..Default::default()
        };
        let pipeline = StudyPipeline::builder().config(config).build().unwrap();
        let steps = pipeline.planned_steps(true);
        assert_eq!(steps.len(), AnalysisStage::PIPELINE.len());
        assert!(steps[0].contains("update files"));
        assert!(steps[4].contains("DropColumns"));
        assert!(steps[5].contains("no date window"));
    }

    #[test]
    fn test_warnings_recover_only_recoverable_errors() {
        let mut warnings = Warnings(Vec::new());
        let skipped: Option<()> = warnings
            .recover("ANOVA", Err(AnalysisError::ColumnNotFound("Age".to_string())))
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(warnings.0.len(), 1);
        assert!(warnings.0[0].starts_with("ANOVA: "));

        let fatal = warnings.recover::<()>(
            "Load",
            Err(AnalysisError::UnsupportedFormat(".json".to_string())),
        );
        assert_eq!(fatal.unwrap_err().error_code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            output_dir: dir.path().to_path_buf(),
            render_charts: false,
            ..Default::default()
        };
        let pipeline = StudyPipeline::builder().config(config).build().unwrap();
        assert!(pipeline.run(dir.path().join("absent.csv"), None).is_err());
    }
}
