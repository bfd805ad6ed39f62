//! Univariate outlier detection (IQR and z-score).

use crate::config::OutlierMethod;
use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{mean, quantile, sample_std};
use serde::{Deserialize, Serialize};
use tracing::info;

/// IQR multiplier for the outlier fences.
const IQR_FENCE: f64 = 1.5;
/// |z| above which a value is an outlier.
const ZSCORE_LIMIT: f64 = 3.0;

/// Bounds and counts from an outlier scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierStats {
    pub column: String,
    pub method: OutlierMethod,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub iqr: Option<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub threshold: Option<f64>,
    pub outlier_count: usize,
    /// Share of all rows, in percent.
    pub outlier_percentage: f64,
}

impl OutlierStats {
    pub fn summary(&self) -> String {
        let detail = match self.method {
            OutlierMethod::Iqr => format!(
                "Method: Interquartile Range (IQR)\nQ1: {:.2}\nQ3: {:.2}\nIQR: {:.2}\n\
                 Lower Bound: {:.2}\nUpper Bound: {:.2}",
                self.q1.unwrap_or(f64::NAN),
                self.q3.unwrap_or(f64::NAN),
                self.iqr.unwrap_or(f64::NAN),
                self.lower_bound.unwrap_or(f64::NAN),
                self.upper_bound.unwrap_or(f64::NAN)
            ),
            OutlierMethod::ZScore => format!(
                "Method: Z-Score (threshold: {})\nMean: {:.2}\nStd Dev: {:.2}",
                self.threshold.unwrap_or(ZSCORE_LIMIT),
                self.mean.unwrap_or(f64::NAN),
                self.std.unwrap_or(f64::NAN)
            ),
        };
        format!(
            "{}\nOutliers found: {} ({:.2}%)",
            detail, self.outlier_count, self.outlier_percentage
        )
    }
}

/// Find rows whose `column` value is an outlier under `method`.
///
/// Returns the outlier rows and the scan statistics. Missing values are
/// never outliers.
pub fn identify_outliers(
    table: &RecordTable,
    column: &str,
    method: OutlierMethod,
) -> Result<(RecordTable, OutlierStats)> {
    let values = table.f64_values(column)?;
    let present: Vec<f64> = values.iter().flatten().copied().collect();

    let mut stats = OutlierStats {
        column: column.to_string(),
        method,
        q1: None,
        q3: None,
        iqr: None,
        lower_bound: None,
        upper_bound: None,
        mean: None,
        std: None,
        threshold: None,
        outlier_count: 0,
        outlier_percentage: 0.0,
    };

    let mask: Vec<bool> = match method {
        OutlierMethod::Iqr => match (quantile(&present, 0.25), quantile(&present, 0.75)) {
            (Some(q1), Some(q3)) => {
                let iqr = q3 - q1;
                let (lower, upper) = (q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr);
                stats.q1 = Some(q1);
                stats.q3 = Some(q3);
                stats.iqr = Some(iqr);
                stats.lower_bound = Some(lower);
                stats.upper_bound = Some(upper);
                values
                    .iter()
                    .map(|v| v.is_some_and(|x| x < lower || x > upper))
                    .collect()
            }
            _ => vec![false; values.len()],
        },
        OutlierMethod::ZScore => {
            let m = mean(&present);
            let s = sample_std(&present);
            stats.mean = m;
            stats.std = s;
            stats.threshold = Some(ZSCORE_LIMIT);
            match (m, s) {
                (Some(m), Some(s)) if s > 0.0 => values
                    .iter()
                    .map(|v| v.is_some_and(|x| ((x - m) / s).abs() > ZSCORE_LIMIT))
                    .collect(),
                _ => vec![false; values.len()],
            }
        }
    };

    let outliers = table.filter_rows(&mask)?;
    stats.outlier_count = outliers.height();
    stats.outlier_percentage = if table.height() == 0 {
        0.0
    } else {
        outliers.height() as f64 / table.height() as f64 * 100.0
    };
    info!(
        "Outliers in '{}': {} ({:.2}%)",
        column, stats.outlier_count, stats.outlier_percentage
    );

    Ok((outliers, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_iqr_outliers() {
        let table: RecordTable = df! {
            "Score" => &[Some(10.0), Some(12.0), Some(11.0), Some(13.0), Some(100.0), None],
        }
        .unwrap()
        .into();

        let (outliers, stats) = identify_outliers(&table, "Score", OutlierMethod::Iqr).unwrap();
        assert_eq!(stats.q1, Some(11.0));
        assert_eq!(stats.q3, Some(13.0));
        assert_eq!(stats.upper_bound, Some(16.0));
        assert_eq!(outliers.height(), 1);
        assert_eq!(outliers.f64_values("Score").unwrap(), vec![Some(100.0)]);
        assert!((stats.outlier_percentage - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_outliers() {
        let mut values = vec![50.0; 20];
        values.extend([49.0, 51.0, 49.0, 51.0, 120.0]);
        let table: RecordTable = df! { "Score" => values }.unwrap().into();

        let (outliers, stats) =
            identify_outliers(&table, "Score", OutlierMethod::ZScore).unwrap();
        assert_eq!(outliers.height(), 1);
        assert_eq!(stats.threshold, Some(3.0));
        assert!(stats.summary().contains("Z-Score"));
    }

    #[test]
    fn test_constant_column_has_no_zscore_outliers() {
        let table: RecordTable = df! { "Score" => &[5.0, 5.0, 5.0] }.unwrap().into();
        let (outliers, _) = identify_outliers(&table, "Score", OutlierMethod::ZScore).unwrap();
        assert_eq!(outliers.height(), 0);
    }
}
