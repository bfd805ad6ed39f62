//! Custom error types for the biometric analysis toolkit.
//!
//! All library operations return [`Result`], whose error side is
//! [`AnalysisError`]. Errors carry a stable machine-readable code and are
//! serializable, so a caller can forward them to a JSON report unchanged.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the analysis toolkit.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Column was not found in the table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Input file extension is not one the loader understands.
    #[error("Unsupported file format: '{0}' (expected .csv, .xlsx, .xls, .xlsm or .ods)")]
    UnsupportedFormat(String),

    /// A grouped statistic needs at least two non-empty groups.
    #[error("Column '{column}' has {found} non-empty group(s); at least 2 are required")]
    InsufficientGroups { column: String, found: usize },

    /// All values entering a test are identical.
    #[error("Column '{column}' has zero variance; the test statistic is undefined")]
    ZeroVariance { column: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No valid values found in a column for computation.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// Spreadsheet could not be opened or decoded.
    #[cfg(feature = "excel")]
    #[error("Excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// A statistical routine rejected its input.
    #[error("{test} failed: {reason}")]
    StatisticalTest { test: String, reason: String },

    /// Chart drawing failed (missing font, backend error).
    #[error("Failed to render chart '{chart}': {reason}")]
    ChartRender { chart: String, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AnalysisError>,
    },
}

impl AnalysisError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AnalysisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a chart rendering failure.
    pub fn chart(chart: impl Into<String>, reason: impl ToString) -> Self {
        AnalysisError::ChartRender {
            chart: chart.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a failure reported by a statistical routine.
    pub fn test_failed(test: impl Into<String>, reason: impl ToString) -> Self {
        AnalysisError::StatisticalTest {
            test: test.into(),
            reason: reason.to_string(),
        }
    }

    /// Get a stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::InsufficientGroups { .. } => "INSUFFICIENT_GROUPS",
            Self::ZeroVariance { .. } => "ZERO_VARIANCE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            #[cfg(feature = "excel")]
            Self::Excel(_) => "EXCEL_ERROR",
            Self::StatisticalTest { .. } => "STATISTICAL_TEST_FAILED",
            Self::ChartRender { .. } => "CHART_RENDER_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is recoverable.
    ///
    /// Recoverable errors describe a degraded analysis (a column that is not
    /// there, a test that has nothing to compare). A caller running several
    /// steps logs them and moves on to the next step.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::InsufficientGroups { .. }
            | Self::ZeroVariance { .. }
            | Self::NoValidValues(_)
            | Self::StatisticalTest { .. }
            | Self::ChartRender { .. } => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for AnalysisError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AnalysisError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalysisError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            AnalysisError::ColumnNotFound("Age".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            AnalysisError::UnsupportedFormat(".json".to_string()).error_code(),
            "UNSUPPORTED_FORMAT"
        );
        assert_eq!(
            AnalysisError::InsufficientGroups {
                column: "Age_Group".to_string(),
                found: 1
            }
            .error_code(),
            "INSUFFICIENT_GROUPS"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(AnalysisError::ColumnNotFound("Age".to_string()).is_recoverable());
        assert!(
            AnalysisError::ZeroVariance {
                column: "Biometric_Quality_Score".to_string()
            }
            .is_recoverable()
        );
        assert!(AnalysisError::test_failed("ANOVA", "empty group").is_recoverable());
        assert!(!AnalysisError::UnsupportedFormat(".txt".to_string()).is_recoverable());
        assert!(!AnalysisError::InvalidConfig("bad".to_string()).is_recoverable());
    }

    #[test]
    fn test_insufficient_groups_message_names_column() {
        let error = AnalysisError::InsufficientGroups {
            column: "Age_Group".to_string(),
            found: 1,
        };
        let message = error.to_string();
        assert!(message.contains("Age_Group"));
        assert!(message.contains("1 non-empty group"));
    }

    #[test]
    fn test_error_serialization() {
        let error = AnalysisError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            AnalysisError::ColumnNotFound("Age".to_string()).with_context("While bucketing ages");
        assert!(error.to_string().contains("While bucketing ages"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
        assert!(error.is_recoverable());
    }
}
