//! Progress reporting for the study pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use biometric_insights::StudyPipeline;
//!
//! let result = StudyPipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run("data/enrolment.csv", None)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of a study run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// Reading the enrolment and update files
    Loading,
    /// Parsing date columns
    DateConversion,
    /// Trimming and re-casing text columns
    Standardization,
    /// Removing duplicate records
    Deduplication,
    /// Applying the missing-value strategy
    MissingValues,
    /// Restricting records to the configured date window
    DateFiltering,
    /// Deriving age groups and quality categories
    Bucketing,
    /// Descriptive analyses by age group
    Analysis,
    /// Hypothesis tests and anomaly detection
    StatisticalTesting,
    /// Writing tables, charts and reports
    OutputGeneration,
    /// Run completed
    Complete,
    /// Run failed with an error
    Failed,
}

impl AnalysisStage {
    /// The working stages in execution order.
    pub const PIPELINE: [AnalysisStage; 10] = [
        Self::Loading,
        Self::DateConversion,
        Self::Standardization,
        Self::Deduplication,
        Self::MissingValues,
        Self::DateFiltering,
        Self::Bucketing,
        Self::Analysis,
        Self::StatisticalTesting,
        Self::OutputGeneration,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loading => "Loading Data",
            Self::DateConversion => "Converting Dates",
            Self::Standardization => "Standardizing Text",
            Self::Deduplication => "Removing Duplicates",
            Self::MissingValues => "Handling Missing Values",
            Self::DateFiltering => "Filtering Date Range",
            Self::Bucketing => "Creating Age Groups",
            Self::Analysis => "Analyzing Age Groups",
            Self::StatisticalTesting => "Running Statistical Tests",
            Self::OutputGeneration => "Writing Outputs",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run spent in this stage (0.0 - 1.0).
    ///
    /// Working stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Loading => 0.10,
            Self::DateConversion
            | Self::Standardization
            | Self::Deduplication
            | Self::MissingValues
            | Self::DateFiltering
            | Self::Bucketing => 0.05,
            Self::Analysis => 0.15,
            Self::StatisticalTesting => 0.20,
            Self::OutputGeneration => 0.25,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Complete => 1.0,
            Self::Failed => 0.0,
            stage => Self::PIPELINE
                .iter()
                .take_while(|s| *s != stage)
                .map(|s| s.weight())
                .sum(),
        }
    }
}

/// A progress update emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: AnalysisStage,

    /// Optional sub-step description (e.g., "Chart: age_distribution.png")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: AnalysisStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn with_sub_stage(
        stage: AnalysisStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: AnalysisStage::Complete,
            sub_stage: None,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: AnalysisStage::Failed,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Receives progress updates during a study run.
///
/// Implementations must be `Send + Sync` so a pipeline can run on a
/// background thread.
///
/// # Example
///
/// ```rust,ignore
/// use biometric_insights::{ProgressReporter, ProgressUpdate};
///
/// struct LogReporter;
///
/// impl ProgressReporter for LogReporter {
///     fn report(&self, update: ProgressUpdate) {
///         eprintln!("{}: {}", update.stage.display_name(), update.message);
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_stage_weights_sum() {
        let total: f32 = AnalysisStage::PIPELINE.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.001, "Weights should sum to 1.0");
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        assert_eq!(AnalysisStage::Loading.base_progress(), 0.0);
        assert!((AnalysisStage::DateConversion.base_progress() - 0.10).abs() < 1e-6);
        assert!((AnalysisStage::Analysis.base_progress() - 0.40).abs() < 1e-6);
        assert!((AnalysisStage::OutputGeneration.base_progress() - 0.75).abs() < 1e-6);
        assert_eq!(AnalysisStage::Complete.base_progress(), 1.0);
    }

    #[test]
    fn test_stage_progress_scales_by_weight() {
        let half = ProgressUpdate::new(AnalysisStage::StatisticalTesting, 0.5, "Testing...");
        assert_eq!(half.stage, AnalysisStage::StatisticalTesting);
        assert!((half.progress - 0.65).abs() < 1e-6);

        let overshoot = ProgressUpdate::new(AnalysisStage::OutputGeneration, 3.0, "Charts");
        assert_eq!(overshoot.stage_progress, 1.0);
        assert_eq!(overshoot.progress, 1.0);
    }

    #[test]
    fn test_terminal_updates() {
        assert_eq!(ProgressUpdate::complete("ok").progress, 1.0);
        let failed = ProgressUpdate::failed("Column 'Age' not found");
        assert_eq!(failed.stage, AnalysisStage::Failed);
        assert_eq!(failed.progress, 0.0);
    }

    #[test]
    fn test_closure_reporter_records_stages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ClosureProgressReporter::new(move |update: ProgressUpdate| {
            sink.lock().unwrap().push(update.stage);
        });

        for stage in AnalysisStage::PIPELINE {
            reporter.report(ProgressUpdate::new(stage, 0.0, stage.display_name()));
        }
        reporter.report(ProgressUpdate::complete("Study completed"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 11);
        assert_eq!(seen.first(), Some(&AnalysisStage::Loading));
        assert_eq!(seen.last(), Some(&AnalysisStage::Complete));
    }

    #[test]
    fn test_sub_stage_json() {
        let update = ProgressUpdate::with_sub_stage(
            AnalysisStage::OutputGeneration,
            "Chart: age_distribution.png",
            0.2,
            "Rendering charts",
        );

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["stage"], "output_generation");
        assert_eq!(json["sub_stage"], "Chart: age_distribution.png");

        let plain = serde_json::to_value(ProgressUpdate::new(AnalysisStage::Loading, 0.0, "")).unwrap();
        assert!(plain.get("sub_stage").is_none());
    }

    #[test]
    fn test_stage_json_values() {
        let expectations = [
            (AnalysisStage::Loading, "\"loading\""),
            (AnalysisStage::DateConversion, "\"date_conversion\""),
            (AnalysisStage::StatisticalTesting, "\"statistical_testing\""),
            (AnalysisStage::Complete, "\"complete\""),
        ];
        for (stage, expected) in expectations {
            assert_eq!(serde_json::to_string(&stage).unwrap(), expected);
        }
    }

    #[test]
    fn test_reporter_shared_with_worker_thread() {
        let last = Arc::new(Mutex::new(None));
        let sink = last.clone();
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(ClosureProgressReporter::new(move |update: ProgressUpdate| {
                *sink.lock().unwrap() = Some(update.progress);
            }));

        let worker = reporter.clone();
        std::thread::spawn(move || {
            worker.report(ProgressUpdate::new(AnalysisStage::Analysis, 1.0, "Analyses done"));
        })
        .join()
        .unwrap();

        let progress = last.lock().unwrap().unwrap();
        assert!((progress - 0.55).abs() < 1e-6);
    }
}
