//! Report generation module.
//!
//! This module turns analysis results into files:
//! - Chart specifications ([`charts`]) rendered to PNG by [`ChartRenderer`]
//! - Executive summary and recommendation tables, saved as CSV
//! - The single-page executive [`Dashboard`]
//! - The JSON [`StudyReport`] and plain-text reports via [`ReportGenerator`]
//!
//! # Example
//!
//! ```rust,ignore
//! use biometric_insights::reporting::{ChartRenderer, charts};
//!
//! let renderer = ChartRenderer::new(config.chart.clone())?;
//! let spec = charts::age_distribution_chart(&distribution);
//! renderer.render_bar_chart(&spec, &output_dir.join("age_distribution.png"))?;
//! ```

pub mod charts;
mod dashboard;
mod generator;
mod render;
mod tables;

pub use dashboard::{Dashboard, create_final_report_dashboard};
pub use generator::{
    ReportGenerator, STATISTICAL_REPORT_FILE, STUDY_REPORT_FILE, StudyFindings, StudyReport,
};
pub use render::ChartRenderer;
pub use tables::{
    ExecutiveSummary, ExecutiveSummaryRow, Priority, Recommendation, RecommendationsTable,
    TestOutcome, create_executive_summary_table, create_recommendations_table, quality_rating,
};
