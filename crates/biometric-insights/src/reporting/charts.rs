//! Chart specifications.
//!
//! Each builder turns analysis results into a plain description of what to
//! draw: categories, values, labels and colours. Rendering lives in
//! [`super::render`], so every builder here can be tested without a
//! drawing backend.

use crate::analyzer::{
    AgeDistribution, CorrelationMatrix, CrossTab, QualityByAge, UpdatePatterns, crosstab,
    group_values,
};
use crate::config::TrendFrequency;
use crate::error::Result;
use crate::stats::{HIGH_QUALITY_LABEL, LOW_QUALITY_LABEL, NORMAL_LABEL};
use crate::table::RecordTable;
use crate::utils::{mean, quantile};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Threshold between Fair and Good quality.
pub const FAIR_THRESHOLD: f64 = 60.0;
/// Threshold between Poor and Fair quality.
pub const POOR_THRESHOLD: f64 = 40.0;

pub type Rgb = [u8; 3];

pub const STEEL_BLUE: Rgb = [70, 130, 180];
pub const DARK_BLUE: Rgb = [0, 0, 139];
pub const DARK_GREEN: Rgb = [0, 100, 0];
pub const CORAL: Rgb = [255, 127, 80];
pub const ORANGE: Rgb = [255, 165, 0];
pub const RED: Rgb = [255, 0, 0];
pub const LIGHT_GRAY: Rgb = [211, 211, 211];
pub const GRAY: Rgb = [128, 128, 128];

const ANOMALY_LOW_COLOR: Rgb = [214, 39, 40];
const ANOMALY_NORMAL_COLOR: Rgb = [127, 127, 127];
const ANOMALY_HIGH_COLOR: Rgb = [44, 160, 44];

/// Box fill colours, cycled across groups.
pub const SET2: [Rgb; 8] = [
    [102, 194, 165],
    [252, 141, 98],
    [141, 160, 203],
    [231, 138, 195],
    [166, 216, 84],
    [255, 217, 47],
    [229, 196, 148],
    [179, 179, 179],
];

/// A horizontal line marking a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub label: String,
    pub value: f64,
    pub color: Rgb,
}

impl ReferenceLine {
    pub fn fair(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value: FAIR_THRESHOLD,
            color: ORANGE,
        }
    }

    pub fn poor(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value: POOR_THRESHOLD,
            color: RED,
        }
    }
}

// ============================================================================
// Spec types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
    /// Text drawn above each bar.
    pub annotations: Vec<String>,
    pub color: Rgb,
}

/// Mean ± std per group on the left axis, sample size bars on the right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityComparisonChart {
    pub title: String,
    pub categories: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<Option<f64>>,
    pub counts: Vec<usize>,
    pub reference_lines: Vec<ReferenceLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSeriesSpec {
    pub name: String,
    /// One value per category; `None` leaves a gap.
    pub values: Vec<Option<f64>>,
    pub color: Rgb,
    pub markers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub series: Vec<LineSeriesSpec>,
    pub reference_lines: Vec<ReferenceLine>,
    /// Label each point of the first series with its value.
    pub annotate: bool,
    /// Start the value axis at zero.
    pub y_from_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSegment {
    pub name: String,
    pub values: Vec<f64>,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedBarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    /// Bottom segment first.
    pub segments: Vec<StackSegment>,
    /// Fixed top of the value axis, e.g. 100 for percentages.
    pub y_max: Option<f64>,
    pub legend_title: String,
}

impl StackedBarChart {
    /// Height of each stacked bar.
    pub fn totals(&self) -> Vec<f64> {
        (0..self.categories.len())
            .map(|i| self.segments.iter().map(|s| s.values[i]).sum())
            .collect()
    }
}

/// Five-number summary of one group, with whiskers at 1.5·IQR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub group: String,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest value within `q1 - 1.5·IQR`.
    pub lower_whisker: f64,
    /// Largest value within `q3 + 1.5·IQR`.
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    /// `None` for an empty group.
    pub fn from_values(group: impl Into<String>, values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);
        let q1 = quantile(&sorted, 0.25)?;
        let median = quantile(&sorted, 0.5)?;
        let q3 = quantile(&sorted, 0.75)?;
        let iqr = q3 - q1;
        let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let inside: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|v| *v >= low_fence && *v <= high_fence)
            .collect();
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < low_fence || *v > high_fence)
            .collect();

        Some(Self {
            group: group.into(),
            q1,
            median,
            q3,
            lower_whisker: inside.first().copied().unwrap_or(q1),
            upper_whisker: inside.last().copied().unwrap_or(q3),
            outliers,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxPlotChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub boxes: Vec<BoxStats>,
    pub reference_lines: Vec<ReferenceLine>,
}

/// Colour ramp used by a heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColorScale {
    /// Yellow to red over `[min, max]` of the data.
    Sequential,
    /// Blue through white to red over a fixed range.
    Diverging { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    /// `values[row][column]`.
    pub values: Vec<Vec<Option<f64>>>,
    /// Decimal places of the cell annotations.
    pub decimals: usize,
    pub scale: ColorScale,
    pub legend_label: String,
}

impl HeatmapChart {
    /// Value range the colour ramp spans.
    pub fn color_range(&self) -> (f64, f64) {
        match self.scale {
            ColorScale::Diverging { min, max } => (min, max),
            ColorScale::Sequential => {
                let present = self.values.iter().flatten().flatten().copied();
                let (lo, hi) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) }
            }
        }
    }

    /// Fill colour for `value`.
    pub fn color_for(&self, value: f64) -> Rgb {
        let (lo, hi) = self.color_range();
        let t = if hi > lo {
            ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        match self.scale {
            ColorScale::Sequential => ramp(&[[255, 255, 204], [253, 141, 60], [189, 0, 38]], t),
            ColorScale::Diverging { .. } => {
                ramp(&[[59, 76, 192], [221, 221, 221], [180, 4, 38]], t)
            }
        }
    }
}

/// Linear interpolation through evenly spaced colour stops.
pub fn ramp(stops: &[Rgb], t: f64) -> Rgb {
    match stops {
        [] => [0, 0, 0],
        [only] => *only,
        _ => {
            let scaled = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
            let idx = (scaled.floor() as usize).min(stops.len() - 2);
            let frac = scaled - idx as f64;
            let (a, b) = (stops[idx], stops[idx + 1]);
            let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
            [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
        }
    }
}

/// `n` colours running red through yellow to green.
pub fn red_yellow_green(n: usize) -> Vec<Rgb> {
    let stops = [[215, 48, 39], [254, 224, 139], [26, 152, 80]];
    match n {
        0 => Vec::new(),
        1 => vec![ramp(&stops, 1.0)],
        _ => (0..n).map(|i| ramp(&stops, i as f64 / (n - 1) as f64)).collect(),
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Enrolments per age group, annotated with count and share.
pub fn age_distribution_chart(distribution: &AgeDistribution) -> BarChart {
    BarChart {
        title: "Aadhaar Enrolment Distribution by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Number of Enrolments".to_string(),
        categories: distribution.groups.iter().map(|g| g.group.clone()).collect(),
        values: distribution.groups.iter().map(|g| g.count as f64).collect(),
        annotations: distribution
            .groups
            .iter()
            .map(|g| format!("{} ({:.1}%)", g.count, g.percentage))
            .collect(),
        color: STEEL_BLUE,
    }
}

/// Mean quality with std error bars and sample sizes.
///
/// Groups without a mean are left out.
pub fn quality_comparison_chart(quality: &QualityByAge) -> QualityComparisonChart {
    let groups: Vec<_> = quality.groups.iter().filter(|g| g.mean.is_some()).collect();
    QualityComparisonChart {
        title: "Biometric Quality Score by Age Group with Sample Sizes".to_string(),
        categories: groups.iter().map(|g| g.group.clone()).collect(),
        means: groups.iter().filter_map(|g| g.mean).collect(),
        stds: groups.iter().map(|g| g.std).collect(),
        counts: groups.iter().map(|g| g.count).collect(),
        reference_lines: vec![
            ReferenceLine::fair("Fair Threshold (60)"),
            ReferenceLine::poor("Poor Threshold (40)"),
        ],
    }
}

/// Start of the period containing `date`. Weeks end on Sunday and are
/// labelled by that Sunday.
fn period_key(date: NaiveDate, frequency: TrendFrequency) -> NaiveDate {
    match frequency {
        TrendFrequency::Daily => date,
        TrendFrequency::Weekly => {
            date + Duration::days(6 - date.weekday().num_days_from_monday() as i64)
        }
        TrendFrequency::Monthly => date.with_day(1).unwrap_or(date),
    }
}

fn next_period(key: NaiveDate, frequency: TrendFrequency) -> Option<NaiveDate> {
    match frequency {
        TrendFrequency::Daily => key.succ_opt(),
        TrendFrequency::Weekly => key.checked_add_signed(Duration::days(7)),
        TrendFrequency::Monthly => {
            let (year, month) = if key.month() == 12 {
                (key.year() + 1, 1)
            } else {
                (key.year(), key.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
        }
    }
}

fn period_label(key: NaiveDate, frequency: TrendFrequency) -> String {
    match frequency {
        TrendFrequency::Monthly => key.format("%Y-%m").to_string(),
        _ => key.format("%Y-%m-%d").to_string(),
    }
}

/// Centred moving average over three periods; needs all three values.
pub fn centered_moving_average(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i == 0 || i + 1 >= values.len() {
                return None;
            }
            let window = [values[i - 1]?, values[i]?, values[i + 1]?];
            Some(window.iter().sum::<f64>() / 3.0)
        })
        .collect()
}

/// Mean quality per period, with a moving average once there are more than
/// three periods. Periods without records are gaps.
pub fn temporal_trend_chart(
    table: &RecordTable,
    date_column: &str,
    value_column: &str,
    frequency: TrendFrequency,
) -> Result<LineChart> {
    let dates = table.date_values(date_column)?;
    let values = table.f64_values(value_column)?;

    let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (date, value) in dates.into_iter().zip(values) {
        if let (Some(date), Some(value)) = (date, value) {
            buckets
                .entry(period_key(date, frequency))
                .or_default()
                .push(value);
        }
    }
    if buckets.is_empty() {
        warn!("No dated values in '{}' for the trend chart", date_column);
    }

    let mut categories = Vec::new();
    let mut means = Vec::new();
    if let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) {
        let mut key = first;
        while key <= last {
            categories.push(period_label(key, frequency));
            means.push(buckets.get(&key).and_then(|v| mean(v)));
            match next_period(key, frequency) {
                Some(next) => key = next,
                None => break,
            }
        }
    }

    let mut series = vec![LineSeriesSpec {
        name: "Mean Quality".to_string(),
        values: means.clone(),
        color: DARK_GREEN,
        markers: true,
    }];
    if means.len() > 3 {
        series.push(LineSeriesSpec {
            name: "3-Period Moving Average".to_string(),
            values: centered_moving_average(&means),
            color: RED,
            markers: false,
        });
    }

    Ok(LineChart {
        title: "Biometric Quality Trend Over Time".to_string(),
        x_label: "Time Period".to_string(),
        y_label: "Mean Biometric Quality Score".to_string(),
        categories,
        series,
        reference_lines: vec![ReferenceLine::fair("Fair Threshold")],
        annotate: false,
        y_from_zero: false,
    })
}

/// Records per age group split by anomaly type, stacked Low, Normal, High.
pub fn anomaly_summary_chart(
    table: &RecordTable,
    group_column: &str,
    anomaly_type_column: &str,
) -> Result<StackedBarChart> {
    let ct = crosstab(table, group_column, anomaly_type_column)?;
    let order = [
        (LOW_QUALITY_LABEL, ANOMALY_LOW_COLOR),
        (NORMAL_LABEL, ANOMALY_NORMAL_COLOR),
        (HIGH_QUALITY_LABEL, ANOMALY_HIGH_COLOR),
    ];
    let segments = order
        .iter()
        .filter_map(|(label, color)| {
            let j = ct.column_labels.iter().position(|c| c == label)?;
            Some(StackSegment {
                name: label.to_string(),
                values: ct.counts.iter().map(|row| row[j] as f64).collect(),
                color: *color,
            })
        })
        .collect();

    Ok(StackedBarChart {
        title: "Anomaly Distribution by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Number of Records".to_string(),
        categories: ct.row_labels,
        segments,
        y_max: None,
        legend_title: "Anomaly Type".to_string(),
    })
}

/// Quality score distribution per age group.
pub fn quality_box_plot(
    table: &RecordTable,
    group_column: &str,
    value_column: &str,
) -> Result<BoxPlotChart> {
    let boxes = group_values(table, group_column, value_column)?
        .into_iter()
        .filter_map(|(group, values)| BoxStats::from_values(group, &values))
        .collect();
    Ok(BoxPlotChart {
        title: "Biometric Quality Scores by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Biometric Quality Score".to_string(),
        boxes,
        reference_lines: vec![ReferenceLine::fair("Fair/Good Threshold")],
    })
}

/// Row percentages of each quality category, stacked to 100.
pub fn quality_category_chart(categories: &CrossTab) -> StackedBarChart {
    let colors = red_yellow_green(categories.column_labels.len());
    let segments = categories
        .column_labels
        .iter()
        .enumerate()
        .map(|(j, label)| StackSegment {
            name: label.clone(),
            values: categories.row_percentages.iter().map(|row| row[j]).collect(),
            color: colors[j],
        })
        .collect();
    StackedBarChart {
        title: "Biometric Quality Distribution by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Percentage (%)".to_string(),
        categories: categories.row_labels.clone(),
        segments,
        y_max: Some(100.0),
        legend_title: "Quality Category".to_string(),
    }
}

/// Mean quality per age group as a labelled line.
pub fn mean_quality_chart(quality: &QualityByAge) -> LineChart {
    LineChart {
        title: "Mean Biometric Quality Score by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Mean Quality Score".to_string(),
        categories: quality.groups.iter().map(|g| g.group.clone()).collect(),
        series: vec![LineSeriesSpec {
            name: "Mean Quality".to_string(),
            values: quality.groups.iter().map(|g| g.mean).collect(),
            color: DARK_BLUE,
            markers: true,
        }],
        reference_lines: vec![
            ReferenceLine::fair("Fair Threshold"),
            ReferenceLine::poor("Poor Threshold"),
        ],
        annotate: true,
        y_from_zero: true,
    }
}

/// Updates per 1,000 enrolments per age group.
///
/// Groups without enrolments are left out.
pub fn update_rate_chart(patterns: &UpdatePatterns) -> BarChart {
    let groups: Vec<_> = patterns
        .groups
        .iter()
        .filter(|g| g.updates_per_1000.is_some())
        .collect();
    let values: Vec<f64> = groups.iter().filter_map(|g| g.updates_per_1000).collect();
    BarChart {
        title: "Update Rate by Age Group".to_string(),
        x_label: "Age Group".to_string(),
        y_label: "Updates per 1,000 Enrolments".to_string(),
        categories: groups.iter().map(|g| g.group.clone()).collect(),
        annotations: values.iter().map(|v| format!("{v:.1}")).collect(),
        values,
        color: CORAL,
    }
}

/// Update type shares per age group.
pub fn update_type_heatmap(update_types: &CrossTab) -> HeatmapChart {
    HeatmapChart {
        title: "Update Type Distribution by Age Group (%)".to_string(),
        x_label: "Update Type".to_string(),
        y_label: "Age Group".to_string(),
        row_labels: update_types.row_labels.clone(),
        column_labels: update_types.column_labels.clone(),
        values: update_types
            .row_percentages
            .iter()
            .map(|row| row.iter().map(|v| Some(*v)).collect())
            .collect(),
        decimals: 1,
        scale: ColorScale::Sequential,
        legend_label: "Percentage (%)".to_string(),
    }
}

pub fn correlation_heatmap(matrix: &CorrelationMatrix) -> HeatmapChart {
    HeatmapChart {
        title: "Correlation Matrix".to_string(),
        x_label: String::new(),
        y_label: String::new(),
        row_labels: matrix.columns.clone(),
        column_labels: matrix.columns.clone(),
        values: matrix.values.clone(),
        decimals: 3,
        scale: ColorScale::Diverging {
            min: -1.0,
            max: 1.0,
        },
        legend_label: "Correlation Coefficient".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{GroupCount, GroupStats};
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn quality() -> QualityByAge {
        QualityByAge {
            quality_column: "Biometric_Quality_Score".to_string(),
            groups: vec![
                GroupStats::from_values("0-5 (Child)", &[30.0, 40.0]),
                GroupStats::from_values("6-18 (Youth)", &[]),
                GroupStats::from_values("19-40 (Young Adult)", &[80.0]),
            ],
            best_group: Some("19-40 (Young Adult)".to_string()),
            worst_group: Some("0-5 (Child)".to_string()),
            quality_gap: Some(45.0),
        }
    }

    #[test]
    fn test_age_distribution_annotations() {
        let distribution = AgeDistribution {
            total_records: 4,
            groups: vec![
                GroupCount {
                    group: "0-5 (Child)".to_string(),
                    count: 3,
                    percentage: 75.0,
                },
                GroupCount {
                    group: "60+ (Elderly)".to_string(),
                    count: 1,
                    percentage: 25.0,
                },
            ],
            largest: None,
            smallest: None,
        };
        let chart = age_distribution_chart(&distribution);
        assert_eq!(chart.values, vec![3.0, 1.0]);
        assert_eq!(chart.annotations[0], "3 (75.0%)");
    }

    #[test]
    fn test_quality_charts_skip_missing_means() {
        let comparison = quality_comparison_chart(&quality());
        assert_eq!(comparison.categories.len(), 2);
        assert_eq!(comparison.means, vec![35.0, 80.0]);
        assert_eq!(comparison.stds[1], None);
        assert_eq!(comparison.reference_lines[0].value, 60.0);
        assert_eq!(comparison.reference_lines[1].value, 40.0);

        let line = mean_quality_chart(&quality());
        assert_eq!(line.series[0].values, vec![Some(35.0), None, Some(80.0)]);
        assert!(line.annotate);
    }

    #[test]
    fn test_box_stats_whiskers_clip_to_data() {
        let stats = BoxStats::from_values("g", &[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.lower_whisker, 1.0);
        assert_eq!(stats.upper_whisker, 4.0);
        assert_eq!(stats.outliers, vec![100.0]);
        assert!(BoxStats::from_values("empty", &[]).is_none());
    }

    #[test]
    fn test_centered_moving_average() {
        let values = [Some(1.0), Some(2.0), Some(3.0), None, Some(5.0), Some(6.0), Some(7.0)];
        assert_eq!(
            centered_moving_average(&values),
            vec![None, Some(2.0), None, None, None, Some(6.0), None]
        );
    }

    #[test]
    fn test_temporal_trend_fills_gaps() {
        let table: RecordTable = df! {
            "Enrolment_Date" => &["2024-01-05", "2024-01-20", "2024-03-02", "2024-04-11", "2024-05-30"],
            "Score" => &[50.0, 70.0, 40.0, 80.0, 60.0],
        }
        .unwrap()
        .into();
        let chart =
            temporal_trend_chart(&table, "Enrolment_Date", "Score", TrendFrequency::Monthly)
                .unwrap();

        assert_eq!(
            chart.categories,
            vec!["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]
        );
        assert_eq!(
            chart.series[0].values,
            vec![Some(60.0), None, Some(40.0), Some(80.0), Some(60.0)]
        );
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[1].values[3], Some(60.0));
    }

    #[test]
    fn test_weekly_periods_end_on_sunday() {
        // 2024-01-03 is a Wednesday.
        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(period_key(wednesday, TrendFrequency::Weekly), sunday);
        assert_eq!(period_key(sunday, TrendFrequency::Weekly), sunday);
    }

    #[test]
    fn test_anomaly_chart_segment_order() {
        let table: RecordTable = df! {
            "Age_Group" => &["A", "A", "B", "B"],
            "anomaly_type" => &[HIGH_QUALITY_LABEL, NORMAL_LABEL, LOW_QUALITY_LABEL, NORMAL_LABEL],
        }
        .unwrap()
        .into();
        let chart = anomaly_summary_chart(&table, "Age_Group", "anomaly_type").unwrap();
        let names: Vec<&str> = chart.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![LOW_QUALITY_LABEL, NORMAL_LABEL, HIGH_QUALITY_LABEL]);
        assert_eq!(chart.totals(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_heatmap_colors() {
        let chart = HeatmapChart {
            title: String::new(),
            x_label: String::new(),
            y_label: String::new(),
            row_labels: vec!["a".into()],
            column_labels: vec!["x".into(), "y".into()],
            values: vec![vec![Some(10.0), Some(30.0)]],
            decimals: 1,
            scale: ColorScale::Sequential,
            legend_label: String::new(),
        };
        assert_eq!(chart.color_range(), (10.0, 30.0));
        assert_eq!(chart.color_for(10.0), [255, 255, 204]);
        assert_eq!(chart.color_for(30.0), [189, 0, 38]);
        assert_eq!(red_yellow_green(3)[1], [254, 224, 139]);
    }
}
