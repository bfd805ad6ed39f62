//! Shared utilities for the analysis toolkit.
//!
//! This module contains dtype checks, string parsing helpers, and thin
//! wrappers over polars aggregations (mean, std, linear quantiles) for the
//! value slices the analyzer, tester and report modules pass around.

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType holds text or categories.
#[inline]
pub fn is_text_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

/// Check if a DataType is a date or datetime.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Date | DataType::Datetime(_, _))
}

/// Coarse dtype label used in dataset overviews.
pub fn dtype_label(dtype: &DataType) -> &'static str {
    if is_numeric_dtype(dtype) {
        "numeric"
    } else if is_temporal_dtype(dtype) {
        "datetime"
    } else if matches!(dtype, DataType::Boolean) {
        "boolean"
    } else if is_text_dtype(dtype) {
        "text"
    } else {
        "other"
    }
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 4] = [',', '%', ' ', '_'];

/// Common error/missing value markers in data.
pub const ERROR_MARKERS: [&str; 9] = [
    "error", "unknown", "n/a", "na", "nan", "null", "missing", "none", "#n/a",
];

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Check if a string is an error/missing value marker.
pub fn is_error_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    ERROR_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    if is_error_marker(s) {
        return None;
    }
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Capitalize the first letter of every word and lowercase the rest.
///
/// A word starts at any letter not preceded by another letter, so
/// `"o'neil"` becomes `"O'Neil"` and `"3rd"` becomes `"3Rd"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}

// =============================================================================
// Category Ordering
// =============================================================================

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+").unwrap_or_else(|_| unreachable!("static pattern is valid"))
});

/// Sort key for bucket labels such as `"19-40 (Young Adult)"`.
///
/// Labels are ordered by the first integer they contain, then lexically, so
/// `"6-18"` sorts before `"19-40"` and `"60+"` sorts last.
pub fn category_sort_key(label: &str) -> (i64, String) {
    let number = LEADING_NUMBER
        .find(label)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(i64::MAX);
    (number, label.to_string())
}

/// Sort labels in bucket order.
pub fn sort_categories(labels: &mut [String]) {
    labels.sort_by_cached_key(|label| category_sort_key(label));
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Most frequent non-null value of `series` as text; ties resolve to the
/// lexicographically smallest.
pub fn string_mode(series: &Series) -> PolarsResult<Option<String>> {
    let text = series.cast(&DataType::String)?.drop_nulls();
    if text.is_empty() {
        return Ok(None);
    }
    let counts = text.value_counts(false, false, "count".into(), false)?;
    let values = counts
        .column(text.name().as_str())?
        .as_materialized_series()
        .str()?
        .clone();
    let counts = counts
        .column("count")?
        .as_materialized_series()
        .cast(&DataType::UInt64)?;
    let counts = counts.u64()?;

    let mode = values
        .into_iter()
        .zip(counts)
        .filter_map(|(value, count)| Some((value?, count?)))
        .max_by(|(a_val, a_count), (b_val, b_count)| {
            a_count.cmp(b_count).then_with(|| b_val.cmp(a_val))
        })
        .map(|(value, _)| value.to_string());
    Ok(mode)
}

fn float_chunked(values: &[f64]) -> Float64Chunked {
    Float64Chunked::from_slice("values".into(), values)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    float_chunked(values).mean()
}

/// Sample standard deviation (ddof = 1), `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    float_chunked(values).std(1)
}

/// Population standard deviation (ddof = 0).
pub fn population_std(values: &[f64]) -> Option<f64> {
    float_chunked(values).std(0)
}

/// Linear-interpolated quantile, `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    float_chunked(values)
        .quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)
        .ok()
        .flatten()
}

/// Median, `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    float_chunked(values).median()
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_dtype_label() {
        assert_eq!(dtype_label(&DataType::Int32), "numeric");
        assert_eq!(dtype_label(&DataType::Date), "datetime");
        assert_eq!(dtype_label(&DataType::String), "text");
        assert_eq!(dtype_label(&DataType::Boolean), "boolean");
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("42"), Some(42.0));
        assert_eq!(parse_numeric_string(" 1,234.5 "), Some(1234.5));
        assert_eq!(parse_numeric_string("N/A"), None);
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("abc"), None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("uttar pradesh"), "Uttar Pradesh");
        assert_eq!(title_case("MALE"), "Male");
        assert_eq!(title_case("jammu-and-kashmir"), "Jammu-And-Kashmir");
        assert_eq!(title_case("o'neil"), "O'Neil");
        assert_eq!(title_case("3rd"), "3Rd");
    }

    #[test]
    fn test_category_order() {
        let mut labels = vec![
            "60+ (Elderly)".to_string(),
            "19-40 (Young Adult)".to_string(),
            "0-5 (Child)".to_string(),
            "41-60 (Middle Age)".to_string(),
            "6-18 (Youth)".to_string(),
        ];
        sort_categories(&mut labels);
        assert_eq!(
            labels,
            vec![
                "0-5 (Child)",
                "6-18 (Youth)",
                "19-40 (Young Adult)",
                "41-60 (Middle Age)",
                "60+ (Elderly)",
            ]
        );

        let mut plain = vec!["Demographic".to_string(), "Biometric".to_string()];
        sort_categories(&mut plain);
        assert_eq!(plain, vec!["Biometric", "Demographic"]);
    }

    #[test]
    fn test_string_mode_tie_break() {
        let series = Series::new("g".into(), &["a", "b", "a", "c", "a"]);
        assert_eq!(string_mode(&series).unwrap(), Some("a".to_string()));
        let tied = Series::new("g".into(), &[Some("m"), Some("f"), None, Some("f"), Some("m")]);
        assert_eq!(string_mode(&tied).unwrap(), Some("f".to_string()));
        let empty = Series::new("g".into(), &[None::<&str>, None]);
        assert_eq!(string_mode(&empty).unwrap(), None);
    }

    #[test]
    fn test_descriptive_kernels() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert!((population_std(&values).unwrap() - 2.0).abs() < 1e-12);
        assert!((sample_std(&values).unwrap() - 2.138_089_935).abs() < 1e-6);
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0, 10.0]), Some(2.5));
    }

    #[test]
    fn test_quantile_linear() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&values, 0.75), Some(3.25));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.33333, 2), 33.33);
        assert_eq!(round_to(0.12345, 3), 0.123);
    }
}
