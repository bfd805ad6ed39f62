//! Single-page executive dashboard.

use super::charts::{
    BarChart, BoxPlotChart, LineChart, ReferenceLine, STEEL_BLUE, StackedBarChart,
    age_distribution_chart, mean_quality_chart, quality_box_plot, quality_category_chart,
};
use crate::analyzer::{
    GroupStats, analyze_age_distribution, analyze_biometric_quality_by_age, crosstab,
};
use crate::config::ColumnNames;
use crate::error::Result;
use crate::table::RecordTable;
use serde::{Deserialize, Serialize};

/// Four chart panels and the per-group statistics shown beneath them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub title: String,
    pub age_distribution: BarChart,
    pub quality_box_plot: BoxPlotChart,
    pub mean_quality: LineChart,
    pub category_percentages: StackedBarChart,
    pub stats: Vec<GroupStats>,
}

impl Dashboard {
    pub const TABLE_HEADER: [&'static str; 7] =
        ["Age Group", "Count", "Mean", "Median", "Std Dev", "Min", "Max"];

    /// Formatted cells of the statistics table.
    pub fn table_rows(&self) -> Vec<Vec<String>> {
        let fixed = |v: Option<f64>, decimals: usize| {
            v.map(|v| format!("{v:.decimals$}"))
                .unwrap_or_else(|| "N/A".to_string())
        };
        self.stats
            .iter()
            .map(|s| {
                vec![
                    s.group.clone(),
                    thousands(s.count),
                    fixed(s.mean, 1),
                    fixed(s.median, 1),
                    fixed(s.std, 1),
                    fixed(s.min, 0),
                    fixed(s.max, 0),
                ]
            })
            .collect()
    }
}

fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Build the dashboard panels from a cleaned, bucketed table.
pub fn create_final_report_dashboard(
    table: &RecordTable,
    columns: &ColumnNames,
) -> Result<Dashboard> {
    let distribution = analyze_age_distribution(table, &columns.age_group)?;
    let quality = analyze_biometric_quality_by_age(table, columns)?;
    let categories = crosstab(table, &columns.age_group, &columns.quality_category)?;

    let age_distribution = BarChart {
        title: "Age Group Distribution".to_string(),
        y_label: "Count".to_string(),
        annotations: Vec::new(),
        color: STEEL_BLUE,
        ..age_distribution_chart(&distribution)
    };

    let mut box_plot = quality_box_plot(table, &columns.age_group, &columns.quality_score)?;
    box_plot.title = "Quality Distribution by Age".to_string();
    box_plot.y_label = "Quality Score".to_string();

    let mut mean_quality = mean_quality_chart(&quality);
    mean_quality.title = "Mean Quality Trend".to_string();
    mean_quality.y_label = "Mean Quality".to_string();
    mean_quality.annotate = false;
    mean_quality.reference_lines = vec![ReferenceLine::fair("Fair Threshold")];

    let mut category_percentages = quality_category_chart(&categories);
    category_percentages.title = "Quality Category Distribution".to_string();
    category_percentages.legend_title = "Quality".to_string();

    Ok(Dashboard {
        title: "Biometric Quality Analysis - Executive Dashboard".to_string(),
        age_distribution,
        quality_box_plot: box_plot,
        mean_quality,
        category_percentages,
        stats: quality.groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(7), "7");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_dashboard_panels() {
        let table: RecordTable = df! {
            "Age_Group" => &["0-5 (Child)", "0-5 (Child)", "60+ (Elderly)", "60+ (Elderly)"],
            "Biometric_Quality_Score" => &[30.0, 40.0, 70.0, 80.0],
            "Quality_Category" => &["Poor (0-40)", "Poor (0-40)", "Good (61-80)", "Good (61-80)"],
        }
        .unwrap()
        .into();

        let dashboard = create_final_report_dashboard(&table, &ColumnNames::default()).unwrap();
        assert_eq!(dashboard.age_distribution.values, vec![2.0, 2.0]);
        assert!(dashboard.age_distribution.annotations.is_empty());
        assert_eq!(dashboard.quality_box_plot.boxes.len(), 2);
        assert_eq!(dashboard.mean_quality.reference_lines.len(), 1);
        assert_eq!(dashboard.category_percentages.y_max, Some(100.0));

        let rows = dashboard.table_rows();
        assert_eq!(
            rows[0],
            vec!["0-5 (Child)", "2", "35.0", "35.0", "7.1", "30", "40"]
        );
    }

    #[test]
    fn test_missing_quality_column() {
        let table: RecordTable = df! { "Age_Group" => &["0-5 (Child)"] }.unwrap().into();
        let err = create_final_report_dashboard(&table, &ColumnNames::default()).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
