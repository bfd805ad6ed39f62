//! Cross-tabulation of two categorical columns.

use crate::error::Result;
use crate::table::RecordTable;
use crate::utils::{round_to, sort_categories};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const ROW_KEY: &str = "row";
const COLUMN_KEY: &str = "column";

/// Counts and row percentages for a pair of categorical columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTab {
    pub row_variable: String,
    pub column_variable: String,
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    /// `counts[row][column]`.
    pub counts: Vec<Vec<usize>>,
    pub row_totals: Vec<usize>,
    pub column_totals: Vec<usize>,
    pub grand_total: usize,
    /// Each row normalized to 100, rounded to 2 decimals.
    pub row_percentages: Vec<Vec<f64>>,
}

/// One entry of a ranking by row percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub group: String,
    pub rate: f64,
}

impl CrossTab {
    fn row_index(&self, row: &str) -> Option<usize> {
        self.row_labels.iter().position(|r| r == row)
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.column_labels.iter().position(|c| c == column)
    }

    pub fn count(&self, row: &str, column: &str) -> Option<usize> {
        Some(self.counts[self.row_index(row)?][self.column_index(column)?])
    }

    pub fn row_percentage(&self, row: &str, column: &str) -> Option<f64> {
        Some(self.row_percentages[self.row_index(row)?][self.column_index(column)?])
    }

    /// Rows ranked by their percentage in `column`, highest first.
    ///
    /// Empty when `column` is not one of the column labels.
    pub fn ranking(&self, column: &str) -> Vec<RateEntry> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        let mut entries: Vec<RateEntry> = self
            .row_labels
            .iter()
            .zip(&self.row_percentages)
            .map(|(group, pcts)| RateEntry {
                group: group.clone(),
                rate: pcts[idx],
            })
            .collect();
        entries.sort_by(|a, b| b.rate.partial_cmp(&a.rate).unwrap_or(Ordering::Equal));
        entries
    }

    /// Counts with a `Total` column and a `Total` row.
    pub fn counts_frame(&self) -> Result<DataFrame> {
        let mut row_names = self.row_labels.clone();
        row_names.push("Total".to_string());
        let mut columns: Vec<Column> =
            vec![Series::new(self.row_variable.as_str().into(), row_names).into()];

        for (j, label) in self.column_labels.iter().enumerate() {
            let mut values: Vec<u64> = self.counts.iter().map(|row| row[j] as u64).collect();
            values.push(self.column_totals[j] as u64);
            columns.push(Series::new(label.as_str().into(), values).into());
        }
        let mut totals: Vec<u64> = self.row_totals.iter().map(|t| *t as u64).collect();
        totals.push(self.grand_total as u64);
        columns.push(Series::new("Total".into(), totals).into());

        Ok(DataFrame::new(columns)?)
    }

    /// Row percentages, one column per column label.
    pub fn percentage_frame(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> =
            vec![Series::new(self.row_variable.as_str().into(), self.row_labels.clone()).into()];
        for (j, label) in self.column_labels.iter().enumerate() {
            let values: Vec<f64> = self.row_percentages.iter().map(|row| row[j]).collect();
            columns.push(Series::new(label.as_str().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} x {} ({} records)",
            self.row_variable, self.column_variable, self.grand_total
        )];
        for (label, pcts) in self.row_labels.iter().zip(&self.row_percentages) {
            let cells: Vec<String> = self
                .column_labels
                .iter()
                .zip(pcts)
                .map(|(c, p)| format!("{}: {:.2}%", c, p))
                .collect();
            lines.push(format!("  {}: {}", label, cells.join(", ")));
        }
        lines.join("\n")
    }
}

/// Cross-tabulate two categorical columns.
///
/// Rows with a missing value in either column are excluded. Labels are
/// ordered by their leading number, then lexically.
pub fn crosstab(table: &RecordTable, row_column: &str, column_column: &str) -> Result<CrossTab> {
    let pairs = DataFrame::new(vec![
        Series::new(ROW_KEY.into(), table.str_values(row_column)?).into(),
        Series::new(COLUMN_KEY.into(), table.str_values(column_column)?).into(),
    ])?
    .drop_nulls::<String>(None)?;
    let pair_counts: RecordTable = pairs
        .lazy()
        .group_by([col(ROW_KEY), col(COLUMN_KEY)])
        .agg([len().alias("count")])
        .collect()?
        .into();

    let row_values = pair_counts.str_values(ROW_KEY)?;
    let column_values = pair_counts.str_values(COLUMN_KEY)?;
    let cell_counts = pair_counts.f64_values("count")?;

    let distinct = |values: &[Option<String>]| {
        let mut labels: Vec<String> = values.iter().flatten().cloned().collect();
        sort_categories(&mut labels);
        labels.dedup();
        labels
    };
    let row_labels = distinct(&row_values);
    let column_labels = distinct(&column_values);

    let mut counts = vec![vec![0usize; column_labels.len()]; row_labels.len()];
    for ((row, column), count) in row_values.iter().zip(&column_values).zip(&cell_counts) {
        let (Some(row), Some(column), Some(count)) = (row, column, count) else {
            continue;
        };
        let i = row_labels.iter().position(|l| l == row);
        let j = column_labels.iter().position(|l| l == column);
        if let (Some(i), Some(j)) = (i, j) {
            counts[i][j] = *count as usize;
        }
    }

    let row_totals: Vec<usize> = counts.iter().map(|row| row.iter().sum()).collect();
    let column_totals: Vec<usize> = (0..column_labels.len())
        .map(|j| counts.iter().map(|row| row[j]).sum())
        .collect();
    let grand_total = row_totals.iter().sum();

    let row_percentages = counts
        .iter()
        .zip(&row_totals)
        .map(|(row, &total)| {
            row.iter()
                .map(|&c| {
                    if total == 0 {
                        0.0
                    } else {
                        round_to(c as f64 / total as f64 * 100.0, 2)
                    }
                })
                .collect()
        })
        .collect();

    Ok(CrossTab {
        row_variable: row_column.to_string(),
        column_variable: column_column.to_string(),
        row_labels,
        column_labels,
        counts,
        row_totals,
        column_totals,
        grand_total,
        row_percentages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> RecordTable {
        df! {
            "Age_Group" => &[
                Some("6-18 (Youth)"), Some("0-5 (Child)"), Some("0-5 (Child)"),
                Some("6-18 (Youth)"), Some("6-18 (Youth)"), None,
            ],
            "Quality_Category" => &[
                Some("Poor (0-40)"), Some("Poor (0-40)"), Some("Good (61-80)"),
                Some("Good (61-80)"), Some("Good (61-80)"), Some("Poor (0-40)"),
            ],
        }
        .unwrap()
        .into()
    }

    #[test]
    fn test_crosstab_counts_and_totals() {
        let ct = crosstab(&sample(), "Age_Group", "Quality_Category").unwrap();
        assert_eq!(ct.row_labels, vec!["0-5 (Child)", "6-18 (Youth)"]);
        assert_eq!(ct.column_labels, vec!["Poor (0-40)", "Good (61-80)"]);
        assert_eq!(ct.counts, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(ct.row_totals, vec![2, 3]);
        assert_eq!(ct.column_totals, vec![2, 3]);
        assert_eq!(ct.grand_total, 5);
        assert_eq!(ct.count("6-18 (Youth)", "Good (61-80)"), Some(2));
    }

    #[test]
    fn test_row_percentages_sum_to_100() {
        let ct = crosstab(&sample(), "Age_Group", "Quality_Category").unwrap();
        for row in &ct.row_percentages {
            let total: f64 = row.iter().sum();
            assert!((total - 100.0).abs() <= 0.05, "row sums to {total}");
        }
        assert_eq!(ct.row_percentage("6-18 (Youth)", "Poor (0-40)"), Some(33.33));
    }

    #[test]
    fn test_ranking_and_frames() {
        let ct = crosstab(&sample(), "Age_Group", "Quality_Category").unwrap();
        let ranking = ct.ranking("Poor (0-40)");
        assert_eq!(ranking[0].group, "0-5 (Child)");
        assert_eq!(ranking[0].rate, 50.0);
        assert!(ct.ranking("Excellent (81-100)").is_empty());

        let counts = ct.counts_frame().unwrap();
        assert_eq!(counts.shape(), (3, 4));
        let pct = ct.percentage_frame().unwrap();
        assert_eq!(pct.shape(), (2, 3));
    }
}
