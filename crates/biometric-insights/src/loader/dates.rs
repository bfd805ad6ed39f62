//! Date parsing and date-column conversion.

use crate::error::Result;
use crate::table::{RecordTable, date_series};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Date-only formats tried in order when no explicit format is given.
/// Slash dates are read month-first.
const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y%m%d", "%d %b %Y",
    "%b %d, %Y",
];

/// Date-time formats tried after the date-only ones.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

/// Parse a single date string.
///
/// With `format`, only that format is tried (as a date, then as a
/// date-time). Without it, the common formats above plus RFC 3339 are tried.
pub fn parse_date(text: &str, format: Option<&str>) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(text, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date()));
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// Convert the named columns to polars `Date`.
///
/// Values that fail to parse become null. Absent columns are skipped with a
/// warning. Columns already typed as dates are left alone.
pub fn convert_date_columns(
    table: &RecordTable,
    columns: &[&str],
    format: Option<&str>,
) -> Result<RecordTable> {
    let mut result = table.clone();

    for &name in columns {
        if !result.has_column(name) {
            warn!("Column '{}' not found; skipping date conversion", name);
            continue;
        }

        let dtype = result.dtype(name)?;
        if dtype == DataType::Date {
            debug!("Column '{}' is already a date", name);
            continue;
        }

        let before_nulls = result.series(name)?.null_count();
        let dates: Vec<Option<NaiveDate>> = match dtype {
            DataType::Datetime(_, _) => result.date_values(name)?,
            _ => result
                .str_values(name)?
                .into_iter()
                .map(|v| v.and_then(|text| parse_date(&text, format)))
                .collect(),
        };

        let series = date_series(name, &dates)?;
        let failed = series.null_count().saturating_sub(before_nulls);
        result = result.with_column(series)?;

        if failed > 0 {
            warn!("Column '{}': {} value(s) could not be parsed as dates", name, failed);
        }
        info!("Converted '{}' to date", name);
    }

    Ok(result)
}
