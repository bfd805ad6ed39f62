//! Pipeline module.
//!
//! This module provides the end-to-end study pipeline and its progress
//! reporting.

mod builder;
pub mod progress;

pub use builder::{
    CLEANED_DATA_FILE, EXECUTIVE_SUMMARY_FILE, RECOMMENDATIONS_FILE, StudyPipeline,
    StudyPipelineBuilder, StudyResult,
};
pub use progress::{AnalysisStage, ClosureProgressReporter, ProgressReporter, ProgressUpdate};
