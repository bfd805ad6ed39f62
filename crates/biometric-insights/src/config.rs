//! Configuration types for the analysis toolkit.
//!
//! This module provides configuration options using the builder pattern.
//! Every operation also accepts its parameters directly; [`AnalysisConfig`]
//! bundles the values the study pipeline and the CLI thread through.

use crate::error::AnalysisError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// =============================================================================
// Column names
// =============================================================================

/// Column-name contract for the enrolment and update tables.
///
/// Every field has the default used by the source datasets. Override a field
/// when a dataset ships with different headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub age: String,
    pub quality_score: String,
    pub age_group: String,
    pub quality_category: String,
    pub enrolment_id: String,
    pub update_type: String,
    pub enrolment_date: String,
    pub update_date: String,
    pub state: String,
    pub gender: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            age: "Age".to_string(),
            quality_score: "Biometric_Quality_Score".to_string(),
            age_group: "Age_Group".to_string(),
            quality_category: "Quality_Category".to_string(),
            enrolment_id: "Enrolment_ID".to_string(),
            update_type: "Update_Type".to_string(),
            enrolment_date: "Enrolment_Date".to_string(),
            update_date: "Update_Date".to_string(),
            state: "State".to_string(),
            gender: "Gender".to_string(),
        }
    }
}

impl ColumnNames {
    /// Source columns an enrolment file is expected to carry.
    pub fn enrolment_columns(&self) -> Vec<&str> {
        vec![
            self.enrolment_id.as_str(),
            self.age.as_str(),
            self.quality_score.as_str(),
            self.enrolment_date.as_str(),
            self.state.as_str(),
            self.gender.as_str(),
        ]
    }

    /// Source columns an update file is expected to carry.
    pub fn update_columns(&self) -> Vec<&str> {
        vec![
            self.enrolment_id.as_str(),
            self.update_type.as_str(),
            self.update_date.as_str(),
        ]
    }

    /// Text columns that get case-standardized during cleaning.
    pub fn categorical_columns(&self) -> Vec<&str> {
        vec![
            self.state.as_str(),
            self.gender.as_str(),
            self.update_type.as_str(),
        ]
    }
}

// =============================================================================
// Binning
// =============================================================================

/// Ordered bin edges with one label per half-open interval.
///
/// `edges[i] <= x < edges[i + 1]` maps to `labels[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl BinSpec {
    pub fn new(edges: Vec<f64>, labels: Vec<impl Into<String>>) -> Self {
        Self {
            edges,
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Age bins: child, youth, young adult, middle age, elderly.
    pub fn age_default() -> Self {
        Self::new(
            vec![0.0, 6.0, 19.0, 41.0, 61.0, 120.0],
            vec![
                "0-5 (Child)",
                "6-18 (Youth)",
                "19-40 (Young Adult)",
                "41-60 (Middle Age)",
                "60+ (Elderly)",
            ],
        )
    }

    /// Biometric quality bins on a 0-100 score.
    pub fn quality_default() -> Self {
        Self::new(
            vec![0.0, 41.0, 61.0, 81.0, 101.0],
            vec![
                "Poor (0-40)",
                "Fair (41-60)",
                "Good (61-80)",
                "Excellent (81-100)",
            ],
        )
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigValidationError> {
        if self.edges.len() < 2 {
            return Err(ConfigValidationError::InvalidBins {
                name: name.to_string(),
                reason: "at least two edges are required".to_string(),
            });
        }
        if self.labels.len() + 1 != self.edges.len() {
            return Err(ConfigValidationError::InvalidBins {
                name: name.to_string(),
                reason: format!(
                    "{} edges need {} labels, got {}",
                    self.edges.len(),
                    self.edges.len() - 1,
                    self.labels.len()
                ),
            });
        }
        if self
            .edges
            .windows(2)
            .any(|w| !w[0].is_finite() || !w[1].is_finite() || w[0] >= w[1])
        {
            return Err(ConfigValidationError::InvalidBins {
                name: name.to_string(),
                reason: "edges must be finite and strictly increasing".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Strategy for handling missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum MissingValueStrategy {
    /// Report missing counts without touching the table
    #[default]
    Report,
    /// Drop every row that has at least one missing value
    DropRows,
    /// Drop columns whose missing fraction is strictly above the threshold
    DropColumns { threshold: f64 },
    /// Fill text columns with their most frequent value
    FillMode,
    /// Fill numeric columns with their median
    FillMedian,
}

/// Casing applied when standardizing text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TextCase {
    #[default]
    Title,
    Upper,
    Lower,
}

/// Which occurrence of a duplicated row survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeepPolicy {
    /// Keep the first occurrence
    #[default]
    First,
    /// Keep the last occurrence
    Last,
    /// Drop every occurrence of a duplicated key
    None,
}

/// Method used to flag univariate outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutlierMethod {
    /// Outside Q1 - 1.5*IQR or Q3 + 1.5*IQR
    #[default]
    Iqr,
    /// |z| above 3
    ZScore,
}

/// Resampling period for temporal trend charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrendFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

/// Inclusive date window, as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Parse both bounds.
    pub fn bounds(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ConfigValidationError> {
        let parse = |field: &str, value: &Option<String>| -> Result<Option<NaiveDate>, ConfigValidationError> {
            match value {
                Some(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| ConfigValidationError::InvalidDate {
                        field: field.to_string(),
                        value: text.clone(),
                    }),
                None => Ok(None),
            }
        };
        Ok((parse("start", &self.start)?, parse("end", &self.end)?))
    }
}

// =============================================================================
// Chart configuration
// =============================================================================

/// Rendering defaults shared by every chart.
///
/// Sizes are in points and inches, converted to pixels through `dpi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub dpi: u32,
    pub font_family: String,
    pub font_size: f64,
    pub label_size: f64,
    pub title_size: f64,
    pub tick_size: f64,
    pub legend_size: f64,
    /// TrueType font to draw text with. When unset, common system
    /// locations are searched.
    pub font_path: Option<PathBuf>,
    /// Resampling period of the temporal trend chart.
    pub trend_frequency: TrendFrequency,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            font_family: "sans-serif".to_string(),
            font_size: 11.0,
            label_size: 12.0,
            title_size: 14.0,
            tick_size: 10.0,
            legend_size: 10.0,
            font_path: None,
            trend_frequency: TrendFrequency::default(),
        }
    }
}

impl ChartConfig {
    /// Figure size in inches to pixel dimensions.
    pub fn pixels(&self, width_in: f64, height_in: f64) -> (u32, u32) {
        let dpi = self.dpi as f64;
        ((width_in * dpi).round() as u32, (height_in * dpi).round() as u32)
    }

    /// Point size to pixel size at the configured DPI.
    pub fn px(&self, points: f64) -> f64 {
        points * self.dpi as f64 / 72.0
    }
}

// =============================================================================
// Analysis configuration
// =============================================================================

/// Configuration for a full study run.
///
/// Use [`AnalysisConfig::builder()`] to create a configuration with a
/// fluent API, or [`AnalysisConfig::from_json_file`] to load one.
///
/// # Example
///
/// ```rust,ignore
/// use biometric_insights::config::{AnalysisConfig, MissingValueStrategy};
///
/// let config = AnalysisConfig::builder()
///     .missing_strategy(MissingValueStrategy::FillMedian)
///     .zscore_threshold(2.5)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Column-name contract.
    pub columns: ColumnNames,

    /// Bins used to derive the age group column.
    pub age_bins: BinSpec,

    /// Bins used to derive the quality category column.
    pub quality_bins: BinSpec,

    /// Missing value handling applied to the enrolment table.
    /// Default: Report
    pub missing_strategy: MissingValueStrategy,

    /// Significance level for every hypothesis test.
    /// Default: 0.05
    pub alpha: f64,

    /// Per-group z-score magnitude above which a record is anomalous.
    /// Default: 2.0
    pub zscore_threshold: f64,

    /// Expected anomaly fraction for the isolation forest (0.0 - 0.5].
    /// Default: 0.05
    pub contamination: f64,

    /// Number of isolation trees.
    /// Default: 100
    pub n_estimators: usize,

    /// Seed for the isolation forest.
    /// Default: 42
    pub random_state: u64,

    /// Univariate outlier method used on the quality score.
    /// Default: Iqr
    pub outlier_method: OutlierMethod,

    /// Casing applied to categorical text columns.
    /// Default: Title
    pub standardize_case: TextCase,

    /// Which duplicate survives deduplication.
    /// Default: First
    pub dedup_keep: KeepPolicy,

    /// Optional enrolment date window.
    pub date_range: DateRange,

    /// Output directory for tables, charts and reports.
    /// Default: "outputs"
    pub output_dir: PathBuf,

    /// Chart rendering defaults.
    pub chart: ChartConfig,

    /// Whether to render PNG charts.
    /// Default: true
    pub render_charts: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            age_bins: BinSpec::age_default(),
            quality_bins: BinSpec::quality_default(),
            missing_strategy: MissingValueStrategy::default(),
            alpha: 0.05,
            zscore_threshold: 2.0,
            contamination: 0.05,
            n_estimators: 100,
            random_state: 42,
            outlier_method: OutlierMethod::default(),
            standardize_case: TextCase::default(),
            dedup_keep: KeepPolicy::default(),
            date_range: DateRange::default(),
            output_dir: PathBuf::from("outputs"),
            chart: ChartConfig::default(),
            render_charts: true,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// Fields absent from the file keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "alpha".to_string(),
                value: self.alpha,
            });
        }

        if !(self.zscore_threshold > 0.0 && self.zscore_threshold.is_finite()) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "zscore_threshold".to_string(),
                value: self.zscore_threshold,
            });
        }

        if let MissingValueStrategy::DropColumns { threshold } = self.missing_strategy
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "missing_strategy.threshold".to_string(),
                value: threshold,
            });
        }

        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigValidationError::InvalidContamination(
                self.contamination,
            ));
        }

        if self.n_estimators == 0 {
            return Err(ConfigValidationError::InvalidEstimators(self.n_estimators));
        }

        if self.chart.dpi == 0 {
            return Err(ConfigValidationError::InvalidDpi(self.chart.dpi));
        }

        self.age_bins.validate("age_bins")?;
        self.quality_bins.validate("quality_bins")?;
        self.date_range.bounds()?;

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid value for '{field}': {value}")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid contamination: {0} (must be in (0.0, 0.5])")]
    InvalidContamination(f64),

    #[error("Invalid number of estimators: {0} (must be at least 1)")]
    InvalidEstimators(usize),

    #[error("Invalid DPI: {0} (must be at least 1)")]
    InvalidDpi(u32),

    #[error("Invalid bins '{name}': {reason}")]
    InvalidBins { name: String, reason: String },

    #[error("Invalid date for '{field}': '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { field: String, value: String },
}

impl From<ConfigValidationError> for AnalysisError {
    fn from(err: ConfigValidationError) -> Self {
        AnalysisError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    columns: Option<ColumnNames>,
    age_bins: Option<BinSpec>,
    quality_bins: Option<BinSpec>,
    missing_strategy: Option<MissingValueStrategy>,
    alpha: Option<f64>,
    zscore_threshold: Option<f64>,
    contamination: Option<f64>,
    n_estimators: Option<usize>,
    random_state: Option<u64>,
    outlier_method: Option<OutlierMethod>,
    standardize_case: Option<TextCase>,
    dedup_keep: Option<KeepPolicy>,
    date_range: Option<DateRange>,
    output_dir: Option<PathBuf>,
    chart: Option<ChartConfig>,
    render_charts: Option<bool>,
}

impl AnalysisConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from JSON).
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self {
            columns: Some(config.columns),
            age_bins: Some(config.age_bins),
            quality_bins: Some(config.quality_bins),
            missing_strategy: Some(config.missing_strategy),
            alpha: Some(config.alpha),
            zscore_threshold: Some(config.zscore_threshold),
            contamination: Some(config.contamination),
            n_estimators: Some(config.n_estimators),
            random_state: Some(config.random_state),
            outlier_method: Some(config.outlier_method),
            standardize_case: Some(config.standardize_case),
            dedup_keep: Some(config.dedup_keep),
            date_range: Some(config.date_range),
            output_dir: Some(config.output_dir),
            chart: Some(config.chart),
            render_charts: Some(config.render_charts),
        }
    }

    pub fn columns(mut self, columns: ColumnNames) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn age_bins(mut self, bins: BinSpec) -> Self {
        self.age_bins = Some(bins);
        self
    }

    pub fn quality_bins(mut self, bins: BinSpec) -> Self {
        self.quality_bins = Some(bins);
        self
    }

    /// Set the missing value strategy.
    pub fn missing_strategy(mut self, strategy: MissingValueStrategy) -> Self {
        self.missing_strategy = Some(strategy);
        self
    }

    /// Set the significance level shared by all tests.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn zscore_threshold(mut self, threshold: f64) -> Self {
        self.zscore_threshold = Some(threshold);
        self
    }

    /// Set the expected anomaly fraction for the isolation forest.
    ///
    /// # Arguments
    /// * `contamination` - Value in (0.0, 0.5] (e.g., 0.05 = 5%)
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.contamination = Some(contamination);
        self
    }

    pub fn n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = Some(n);
        self
    }

    pub fn random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn outlier_method(mut self, method: OutlierMethod) -> Self {
        self.outlier_method = Some(method);
        self
    }

    pub fn standardize_case(mut self, case: TextCase) -> Self {
        self.standardize_case = Some(case);
        self
    }

    pub fn dedup_keep(mut self, keep: KeepPolicy) -> Self {
        self.dedup_keep = Some(keep);
        self
    }

    /// Restrict enrolments to an inclusive `YYYY-MM-DD` window.
    pub fn date_range(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.date_range = Some(DateRange { start, end });
        self
    }

    /// Set the output directory for tables, charts and reports.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn chart(mut self, chart: ChartConfig) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Enable or disable PNG chart rendering.
    pub fn render_charts(mut self, render: bool) -> Self {
        self.render_charts = Some(render);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalysisConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        let defaults = AnalysisConfig::default();
        let config = AnalysisConfig {
            columns: self.columns.unwrap_or(defaults.columns),
            age_bins: self.age_bins.unwrap_or(defaults.age_bins),
            quality_bins: self.quality_bins.unwrap_or(defaults.quality_bins),
            missing_strategy: self.missing_strategy.unwrap_or_default(),
            alpha: self.alpha.unwrap_or(defaults.alpha),
            zscore_threshold: self.zscore_threshold.unwrap_or(defaults.zscore_threshold),
            contamination: self.contamination.unwrap_or(defaults.contamination),
            n_estimators: self.n_estimators.unwrap_or(defaults.n_estimators),
            random_state: self.random_state.unwrap_or(defaults.random_state),
            outlier_method: self.outlier_method.unwrap_or_default(),
            standardize_case: self.standardize_case.unwrap_or_default(),
            dedup_keep: self.dedup_keep.unwrap_or_default(),
            date_range: self.date_range.unwrap_or_default(),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            chart: self.chart.unwrap_or(defaults.chart),
            render_charts: self.render_charts.unwrap_or(defaults.render_charts),
        };

        config.validate()?;
        Ok(config)
    }
}
