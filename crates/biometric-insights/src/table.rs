//! Typed record table.
//!
//! [`RecordTable`] wraps a polars `DataFrame` and is the only way the
//! analysis modules read columns. Every accessor checks column presence and
//! returns [`AnalysisError::ColumnNotFound`] for an absent name.

use crate::error::{AnalysisError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// An in-memory table of enrolment or update records.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    df: DataFrame,
}

impl From<DataFrame> for RecordTable {
    fn from(df: DataFrame) -> Self {
        Self { df }
    }
}

impl RecordTable {
    pub fn from_frame(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_frame(self) -> DataFrame {
        self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    /// Names from `names` that are absent from the table.
    pub fn missing_columns<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
        names
            .iter()
            .copied()
            .filter(|name| !self.has_column(name))
            .collect()
    }

    /// Borrow a column as a series.
    pub fn series(&self, name: &str) -> Result<&Series> {
        self.df
            .column(name)
            .map(|col| col.as_materialized_series())
            .map_err(|_| AnalysisError::ColumnNotFound(name.to_string()))
    }

    pub fn dtype(&self, name: &str) -> Result<DataType> {
        Ok(self.series(name)?.dtype().clone())
    }

    /// Column values as floats. Text that does not parse becomes `None`.
    pub fn f64_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.series(name)?;
        if series.dtype() == &DataType::String {
            let text = series.str()?;
            return Ok(text
                .into_iter()
                .map(|v| v.and_then(crate::utils::parse_numeric_string))
                .collect());
        }
        let cast = series.cast(&DataType::Float64)?;
        Ok(cast
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// Column values rendered as text.
    pub fn str_values(&self, name: &str) -> Result<Vec<Option<String>>> {
        let series = self.series(name)?;
        let cast = series.cast(&DataType::String)?;
        Ok(cast
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect())
    }

    /// Column values as calendar dates.
    ///
    /// Date and datetime columns are read directly. Text columns are parsed
    /// with the loader's fallback formats.
    pub fn date_values(&self, name: &str) -> Result<Vec<Option<NaiveDate>>> {
        let series = self.series(name)?;
        match series.dtype() {
            DataType::Date => days_to_dates(series),
            DataType::Datetime(_, _) => days_to_dates(&series.cast(&DataType::Date)?),
            _ => Ok(self
                .str_values(name)?
                .into_iter()
                .map(|v| v.and_then(|text| crate::loader::parse_date(&text, None)))
                .collect()),
        }
    }

    /// Return a copy with `series` added, replacing a column of the same name.
    pub fn with_column(&self, series: Series) -> Result<Self> {
        let mut df = self.df.clone();
        df.with_column(series)?;
        Ok(Self { df })
    }

    /// Keep the rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        Ok(Self {
            df: self.df.filter(&mask)?,
        })
    }

    /// Return a copy without the named columns. Absent names are ignored.
    pub fn drop_columns(&self, names: &[String]) -> Self {
        let names: Vec<PlSmallStr> = names
            .iter()
            .filter(|name| self.has_column(name))
            .map(|name| name.as_str().into())
            .collect();
        Self {
            df: self.df.drop_many(names),
        }
    }

    /// Null count per column, in column order.
    pub fn null_counts(&self) -> Vec<(String, usize)> {
        self.df
            .get_columns()
            .iter()
            .map(|col| (col.name().to_string(), col.null_count()))
            .collect()
    }

    pub fn total_nulls(&self) -> usize {
        self.df.get_columns().iter().map(|col| col.null_count()).sum()
    }

    /// Return a copy with one row per distinct combination of `columns` (all
    /// columns when `None`). Row order is preserved and nulls compare equal.
    pub fn unique_rows(&self, columns: Option<&[&str]>, keep: UniqueKeepStrategy) -> Result<Self> {
        if self.width() == 0 {
            return Ok(self.clone());
        }
        let subset = match columns {
            Some(cols) => {
                for name in cols {
                    self.series(name)?;
                }
                Some(cols.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            }
            None => None,
        };
        Ok(Self {
            df: self.df.unique_stable(subset.as_deref(), keep, None)?,
        })
    }

    /// Rows identical to an earlier row across every column.
    pub fn duplicate_row_count(&self) -> Result<usize> {
        let unique = self.unique_rows(None, UniqueKeepStrategy::First)?;
        Ok(self.height() - unique.height())
    }
}

fn days_to_dates(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    let days = series.cast(&DataType::Int32)?;
    Ok(days
        .i32()?
        .into_iter()
        .map(|d| {
            d.and_then(|d| d.checked_add(UNIX_EPOCH_DAYS_FROM_CE))
                .and_then(NaiveDate::from_num_days_from_ce_opt)
        })
        .collect())
}

/// Build a polars `Date` series from calendar dates.
pub fn date_series(name: &str, values: &[Option<NaiveDate>]) -> PolarsResult<Series> {
    let days: Vec<Option<i32>> = values
        .iter()
        .map(|d| d.map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE))
        .collect();
    Series::new(name.into(), days).cast(&DataType::Date)
}
