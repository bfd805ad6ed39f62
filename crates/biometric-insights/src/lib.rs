//! Biometric Quality Analysis Library
//!
//! Analyses how biometric capture quality and update behaviour vary across
//! age groups, built with Rust and Polars.
//!
//! # Overview
//!
//! - **Loading**: CSV and spreadsheet enrolment and update files, column
//!   checks and date parsing
//! - **Cleaning**: text standardization, deduplication, missing-value
//!   strategies, date windows, age groups and quality categories
//! - **Analysis**: per-group distributions, quality statistics,
//!   cross-tabulations, update rates, correlations and outliers
//! - **Statistical Testing**: chi-square, ANOVA, Kruskal-Wallis, z-score
//!   anomalies and an isolation forest
//! - **Reporting**: PNG charts, an executive dashboard, summary tables and
//!   JSON/text reports
//! - **Progress Reporting**: stage-by-stage updates from the study pipeline
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use biometric_insights::{AnalysisConfig, StudyPipeline};
//!
//! let config = AnalysisConfig::builder()
//!     .output_dir("outputs")
//!     .alpha(0.01)
//!     .build()?;
//!
//! let result = StudyPipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run("data/enrolment.csv", Some("data/updates.csv".as_ref()))?;
//!
//! for warning in &result.warnings {
//!     println!("skipped: {warning}");
//! }
//! ```
//!
//! # Using the steps directly
//!
//! Every stage is also a plain function over a [`RecordTable`]:
//!
//! ```rust,ignore
//! use biometric_insights::{cleaner, loader, stats, BinSpec, ColumnNames};
//!
//! let columns = ColumnNames::default();
//! let table = loader::load_enrolment_data("data/enrolment.csv", &columns)?;
//! let table = cleaner::create_age_groups(&table, &columns, &BinSpec::age_default())?;
//! let anova = stats::anova_test(&table, &columns.age_group, &columns.quality_score, 0.05)?;
//! println!("{}", anova.summary());
//! ```

pub mod analyzer;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod reporting;
pub mod stats;
pub mod table;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, BinSpec, ChartConfig, ColumnNames,
    ConfigValidationError, DateRange, KeepPolicy, MissingValueStrategy, OutlierMethod, TextCase,
    TrendFrequency,
};
pub use error::{AnalysisError, Result as AnalysisResult, ResultExt};
pub use pipeline::{
    AnalysisStage, ClosureProgressReporter, ProgressReporter, ProgressUpdate, StudyPipeline,
    StudyPipelineBuilder, StudyResult,
};
pub use reporting::{ChartRenderer, ReportGenerator, StudyFindings, StudyReport};
pub use table::RecordTable;
