//! PNG rendering of chart specifications with plotters.

use super::charts::{
    BarChart, BoxPlotChart, DARK_BLUE, GRAY, HeatmapChart, LIGHT_GRAY, LineChart,
    QualityComparisonChart, ReferenceLine, Rgb, SET2, StackedBarChart,
};
use super::dashboard::Dashboard;
use crate::config::ChartConfig;
use crate::error::{AnalysisError, Result};
use anyhow::bail;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle, register_font};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fonts tried when `ChartConfig::font_path` is unset.
const SYSTEM_FONTS: [&str; 7] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Registered plotters family name per (configured family, font file).
static REGISTERED_FONTS: Lazy<Mutex<HashMap<(String, PathBuf), String>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn font_candidates(config: &ChartConfig) -> Vec<PathBuf> {
    config
        .font_path
        .iter()
        .cloned()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from))
        .collect()
}

/// Register the configured TrueType font with plotters and return the family
/// name to draw with.
///
/// Each (family, file) pair is registered once. A family already bound to a
/// different file gets a name suffixed with that file's path, so renderers
/// never change each other's glyphs.
fn ensure_font(config: &ChartConfig) -> Result<String> {
    let path = font_candidates(config)
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| AnalysisError::chart("font", "no TrueType font found; set chart.font_path"))?;
    let key = (config.font_family.clone(), path);

    let mut registered = REGISTERED_FONTS.lock();
    if let Some(name) = registered.get(&key) {
        return Ok(name.clone());
    }

    let taken = registered.values().any(|name| *name == key.0);
    let name = if taken {
        format!("{} ({})", key.0, key.1.display())
    } else {
        key.0.clone()
    };
    // plotters keeps registered font data for the life of the process.
    let bytes: &'static [u8] = Box::leak(fs::read(&key.1)?.into_boxed_slice());
    register_font(&name, FontStyle::Normal, bytes).map_err(|_| {
        let reason = format!("{} is not a valid TrueType font", key.1.display());
        AnalysisError::chart("font", reason)
    })?;
    debug!("Registered chart font {} as '{}'", key.1.display(), name);

    registered.insert(key, name.clone());
    Ok(name)
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color[0], color[1], color[2])
}

// ============================================================================
// Theme
// ============================================================================

/// Pixel sizes derived from a `ChartConfig`.
struct Theme<'a> {
    family: &'a str,
    title: f64,
    label: f64,
    tick: f64,
    legend: f64,
    margin: u32,
    x_label_area: u32,
    y_label_area: u32,
    stroke: u32,
    marker: u32,
    bar_gap: u32,
}

impl<'a> Theme<'a> {
    fn new(config: &ChartConfig, family: &'a str) -> Self {
        let px = |points: f64| config.px(points);
        Self {
            family,
            title: px(config.title_size),
            label: px(config.label_size),
            tick: px(config.tick_size),
            legend: px(config.legend_size),
            margin: px(10.0) as u32,
            x_label_area: px(40.0) as u32,
            y_label_area: px(52.0) as u32,
            stroke: (px(2.0) as u32).max(1),
            marker: (px(4.0) as u32).max(2),
            bar_gap: px(6.0) as u32,
        }
    }

    /// Smaller text for the panels of a multi-chart figure.
    fn scaled(&self, factor: f64) -> Self {
        Self {
            family: self.family,
            title: self.title * factor,
            label: self.label * factor,
            tick: self.tick * factor,
            legend: self.legend * factor,
            margin: (self.margin as f64 * factor) as u32,
            x_label_area: (self.x_label_area as f64 * factor) as u32,
            y_label_area: (self.y_label_area as f64 * factor) as u32,
            stroke: self.stroke,
            marker: self.marker,
            bar_gap: (self.bar_gap as f64 * factor) as u32,
        }
    }

    fn font(&self, size: f64) -> FontDesc<'a> {
        FontDesc::new(FontFamily::Name(self.family), size, FontStyle::Normal)
    }

    fn centered(&self, size: f64, vertical: VPos) -> TextStyle<'a> {
        TextStyle::from(self.font(size)).pos(Pos::new(HPos::Center, vertical))
    }
}

/// Top of a value axis with headroom above `max`.
fn axis_top(max: f64) -> f64 {
    if max.is_finite() && max > 0.0 {
        max * 1.12
    } else {
        1.0
    }
}

fn segment_label(labels: &[String], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => usize::try_from(*i)
            .ok()
            .and_then(|i| labels.get(i))
            .cloned()
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    }
}

/// Consecutive present values as `(index, value)` runs.
fn contiguous_runs(values: &[Option<f64>]) -> Vec<Vec<(usize, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push((i, *v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn draw_reference_lines<DB, X, Y>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<X, Y>>,
    lines: &[ReferenceLine],
    categories: usize,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
    X: Ranged<ValueType = SegmentValue<i32>>,
    Y: Ranged<ValueType = f64>,
{
    for line in lines {
        let style = rgb(line.color).mix(0.7).stroke_width(theme.stroke);
        chart
            .draw_series(LineSeries::new(
                vec![
                    (SegmentValue::Exact(0), line.value),
                    (SegmentValue::Exact(categories as i32), line.value),
                ],
                style,
            ))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }
    Ok(())
}

// ============================================================================
// Chart drawing, generic over the backend so the dashboard can reuse it
// ============================================================================

fn draw_bar_chart<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &BarChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.categories.is_empty() {
        bail!("no categories to draw");
    }
    let n = spec.categories.len() as i32;
    let top = axis_top(spec.values.iter().copied().fold(0.0, f64::max));

    let mut chart = ChartBuilder::on(area)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..top)?;

    let x_labels = |v: &SegmentValue<i32>| segment_label(&spec.categories, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(spec.categories.len() + 1)
        .x_label_formatter(&x_labels)
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let fill = rgb(spec.color).mix(0.8).filled();
    let outline = BLACK.stroke_width(1);
    for style in [fill, outline] {
        chart.draw_series(spec.values.iter().enumerate().map(|(i, v)| {
            let i = i as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
                style,
            );
            bar.set_margin(0, 0, theme.bar_gap, theme.bar_gap);
            bar
        }))?;
    }

    let text = theme.centered(theme.tick, VPos::Bottom);
    chart.draw_series(
        spec.annotations
            .iter()
            .zip(&spec.values)
            .enumerate()
            .map(|(i, (label, v))| {
                Text::new(
                    label.clone(),
                    (SegmentValue::CenterOf(i as i32), *v),
                    text.clone(),
                )
            }),
    )?;
    Ok(())
}

fn draw_quality_comparison<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &QualityComparisonChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.categories.is_empty() {
        bail!("no groups with a mean quality score");
    }
    let n = spec.categories.len() as i32;
    let upper = spec
        .means
        .iter()
        .zip(&spec.stds)
        .map(|(m, s)| m + s.unwrap_or(0.0))
        .chain(spec.reference_lines.iter().map(|l| l.value))
        .fold(0.0, f64::max);
    let count_top = axis_top(spec.counts.iter().copied().max().unwrap_or(0) as f64);

    let mut chart = ChartBuilder::on(area)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area)
        .right_y_label_area_size(theme.y_label_area)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..axis_top(upper))?
        .set_secondary_coord((0..n).into_segmented(), 0f64..count_top);

    let x_labels = |v: &SegmentValue<i32>| segment_label(&spec.categories, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(spec.categories.len() + 1)
        .x_label_formatter(&x_labels)
        .x_desc("Age Group")
        .y_desc("Mean Biometric Quality Score")
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("Number of Enrolments")
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let sample_style = rgb(LIGHT_GRAY).mix(0.5).filled();
    chart
        .draw_secondary_series(spec.counts.iter().enumerate().map(|(i, c)| {
            let i = i as i32;
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(i), 0.0),
                    (SegmentValue::Exact(i + 1), *c as f64),
                ],
                sample_style,
            );
            bar.set_margin(0, 0, theme.bar_gap, theme.bar_gap);
            bar
        }))?
        .label("Sample Size")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], sample_style));

    let gray = rgb(GRAY).stroke_width(theme.stroke);
    chart.draw_series(spec.means.iter().zip(&spec.stds).enumerate().filter_map(
        |(i, (m, s))| {
            s.map(|s| {
                ErrorBar::new_vertical(
                    SegmentValue::CenterOf(i as i32),
                    m - s,
                    *m,
                    m + s,
                    gray,
                    theme.marker * 3,
                )
            })
        },
    ))?;

    let line = rgb(DARK_BLUE).stroke_width(theme.stroke);
    let points: Vec<(SegmentValue<i32>, f64)> = spec
        .means
        .iter()
        .enumerate()
        .map(|(i, m)| (SegmentValue::CenterOf(i as i32), *m))
        .collect();
    chart
        .draw_series(LineSeries::new(points.clone(), line))?
        .label("Mean Quality ± Std Dev")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line));
    chart.draw_series(
        points
            .into_iter()
            .map(|p| Circle::new(p, theme.marker, line.color.filled())),
    )?;

    draw_reference_lines(&mut *chart, &spec.reference_lines, spec.categories.len(), theme)?;
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.9))
        .border_style(&BLACK)
        .label_font(theme.font(theme.legend))
        .draw()?;
    Ok(())
}

fn draw_line_chart<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &LineChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.categories.is_empty() {
        bail!("no periods to draw");
    }
    let n = spec.categories.len() as i32;
    let present: Vec<f64> = spec
        .series
        .iter()
        .flat_map(|s| s.values.iter().flatten().copied())
        .chain(spec.reference_lines.iter().map(|l| l.value))
        .collect();
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let (bottom, top) = if !max.is_finite() {
        (0.0, 1.0)
    } else if spec.y_from_zero {
        (0.0, axis_top(max))
    } else {
        let pad = ((max - min) * 0.1).max(1.0);
        (min - pad, max + pad)
    };

    let mut chart = ChartBuilder::on(area)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area)
        .build_cartesian_2d((0..n).into_segmented(), bottom..top)?;

    // Keep period labels readable on long series.
    let step = spec.categories.len().div_ceil(12).max(1);
    let x_labels = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) if (*i as usize) % step == 0 => {
            segment_label(&spec.categories, v)
        }
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .x_labels(spec.categories.len() + 1)
        .x_label_formatter(&x_labels)
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    for series in &spec.series {
        let style = rgb(series.color).stroke_width(theme.stroke);
        for (k, run) in contiguous_runs(&series.values).into_iter().enumerate() {
            let points: Vec<(SegmentValue<i32>, f64)> = run
                .iter()
                .map(|(i, v)| (SegmentValue::CenterOf(*i as i32), *v))
                .collect();
            let anno = chart.draw_series(LineSeries::new(points.clone(), style))?;
            if k == 0 {
                anno.label(series.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
            }
            if series.markers {
                chart.draw_series(
                    points
                        .into_iter()
                        .map(|p| Circle::new(p, theme.marker, style.color.filled())),
                )?;
            }
        }
    }

    if spec.annotate
        && let Some(first) = spec.series.first()
    {
        let text = theme.centered(theme.tick, VPos::Bottom);
        let offset = (top - bottom) * 0.02;
        chart.draw_series(first.values.iter().enumerate().filter_map(|(i, v)| {
            v.map(|v| {
                Text::new(
                    format!("{v:.1}"),
                    (SegmentValue::CenterOf(i as i32), v + offset),
                    text.clone(),
                )
            })
        }))?;
    }

    draw_reference_lines(&mut chart, &spec.reference_lines, spec.categories.len(), theme)?;
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(&WHITE.mix(0.9))
        .border_style(&BLACK)
        .label_font(theme.font(theme.legend))
        .draw()?;
    Ok(())
}

fn draw_stacked_bar_chart<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &StackedBarChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.categories.is_empty() || spec.segments.is_empty() {
        bail!("no stacked values to draw");
    }
    let n = spec.categories.len() as i32;
    let top = spec
        .y_max
        .unwrap_or_else(|| axis_top(spec.totals().into_iter().fold(0.0, f64::max)));

    let mut chart = ChartBuilder::on(area)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..top)?;

    let x_labels = |v: &SegmentValue<i32>| segment_label(&spec.categories, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(spec.categories.len() + 1)
        .x_label_formatter(&x_labels)
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let mut base = vec![0.0; spec.categories.len()];
    for segment in &spec.segments {
        let fill = rgb(segment.color).mix(0.85).filled();
        let bars: Vec<Rectangle<(SegmentValue<i32>, f64)>> = segment
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let x = i as i32;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(x), base[i]),
                        (SegmentValue::Exact(x + 1), base[i] + v),
                    ],
                    fill,
                );
                bar.set_margin(0, 0, theme.bar_gap, theme.bar_gap);
                bar
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(segment.name.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill));
        for (b, v) in base.iter_mut().zip(&segment.values) {
            *b += v;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.9))
        .border_style(&BLACK)
        .label_font(theme.font(theme.legend))
        .draw()?;
    Ok(())
}

fn draw_box_plot<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &BoxPlotChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.boxes.is_empty() {
        bail!("no groups with values");
    }
    let n = spec.boxes.len() as i32;
    let labels: Vec<String> = spec.boxes.iter().map(|b| b.group.clone()).collect();
    let values = spec
        .boxes
        .iter()
        .flat_map(|b| {
            [b.lower_whisker, b.upper_whisker]
                .into_iter()
                .chain(b.outliers.iter().copied())
        })
        .chain(spec.reference_lines.iter().map(|l| l.value));
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let pad = ((max - min) * 0.05).max(1.0);

    let mut chart = ChartBuilder::on(area)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area)
        .build_cartesian_2d((0..n).into_segmented(), (min - pad)..(max + pad))?;

    let x_labels = |v: &SegmentValue<i32>| segment_label(&labels, v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len() + 1)
        .x_label_formatter(&x_labels)
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let edge = BLACK.stroke_width((theme.stroke / 2).max(1));
    let gap = theme.bar_gap * 3;
    let boxed = |i: usize, low: f64, high: f64, style: ShapeStyle| {
        let x = i as i32;
        let mut rect = Rectangle::new(
            [(SegmentValue::Exact(x), low), (SegmentValue::Exact(x + 1), high)],
            style,
        );
        rect.set_margin(0, 0, gap, gap);
        rect
    };

    chart.draw_series(
        spec.boxes
            .iter()
            .enumerate()
            .map(|(i, b)| boxed(i, b.q1, b.q3, rgb(SET2[i % SET2.len()]).filled())),
    )?;
    chart.draw_series(
        spec.boxes
            .iter()
            .enumerate()
            .map(|(i, b)| boxed(i, b.q1, b.q3, edge)),
    )?;
    chart.draw_series(
        spec.boxes
            .iter()
            .enumerate()
            .map(|(i, b)| boxed(i, b.median, b.median, BLACK.stroke_width(theme.stroke))),
    )?;
    chart.draw_series(spec.boxes.iter().enumerate().flat_map(|(i, b)| {
        let x = SegmentValue::CenterOf(i as i32);
        [
            PathElement::new(vec![(x.clone(), b.lower_whisker), (x.clone(), b.q1)], edge),
            PathElement::new(vec![(x.clone(), b.q3), (x, b.upper_whisker)], edge),
        ]
    }))?;
    chart.draw_series(spec.boxes.iter().enumerate().flat_map(|(i, b)| {
        b.outliers.iter().map(move |v| {
            Circle::new((SegmentValue::CenterOf(i as i32), *v), theme.marker, edge)
        })
    }))?;

    draw_reference_lines(&mut chart, &spec.reference_lines, labels.len(), theme)?;
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.9))
        .border_style(&BLACK)
        .label_font(theme.font(theme.legend))
        .draw()?;
    Ok(())
}

fn draw_heatmap<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &HeatmapChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if spec.row_labels.is_empty() || spec.column_labels.is_empty() {
        bail!("empty matrix");
    }
    let rows = spec.row_labels.len() as i32;
    let cols = spec.column_labels.len() as i32;

    let (width, _) = area.dim_in_pixel();
    let bar_width = (width / 9).max(1);
    let (main, color_bar) = area.split_horizontally(width - bar_width);

    let mut chart = ChartBuilder::on(&main)
        .caption(&spec.title, theme.font(theme.title))
        .margin(theme.margin)
        .x_label_area_size(theme.x_label_area)
        .y_label_area_size(theme.y_label_area * 2)
        .build_cartesian_2d((0..cols).into_segmented(), (0..rows).into_segmented())?;

    // Row 0 is drawn at the top.
    let flip = |i: i32| rows - 1 - i;
    let x_labels = |v: &SegmentValue<i32>| segment_label(&spec.column_labels, v);
    let y_labels = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) if *i < rows => {
            segment_label(&spec.row_labels, &SegmentValue::CenterOf(flip(*i)))
        }
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(spec.column_labels.len() + 1)
        .y_labels(spec.row_labels.len() + 1)
        .x_label_formatter(&x_labels)
        .y_label_formatter(&y_labels)
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let cells: Vec<(i32, i32, Option<f64>)> = spec
        .values
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(j, v)| (i as i32, j as i32, *v))
        })
        .collect();

    chart.draw_series(cells.iter().map(|(i, j, v)| {
        let y = flip(*i);
        let fill = match v {
            Some(v) => rgb(spec.color_for(*v)).filled(),
            None => rgb([230, 230, 230]).filled(),
        };
        Rectangle::new(
            [
                (SegmentValue::Exact(*j), SegmentValue::Exact(y)),
                (SegmentValue::Exact(j + 1), SegmentValue::Exact(y + 1)),
            ],
            fill,
        )
    }))?;

    let text = theme.centered(theme.tick, VPos::Center);
    chart.draw_series(cells.iter().filter_map(|(i, j, v)| {
        v.map(|v| {
            Text::new(
                format!("{:.*}", spec.decimals, v),
                (SegmentValue::CenterOf(*j), SegmentValue::CenterOf(flip(*i))),
                text.clone(),
            )
        })
    }))?;

    draw_color_bar(&color_bar, spec, theme)
}

fn draw_color_bar<DB>(
    area: &DrawingArea<DB, Shift>,
    spec: &HeatmapChart,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    const STEPS: usize = 64;
    let (lo, hi) = spec.color_range();
    let hi = if hi > lo { hi } else { lo + 1.0 };

    let mut bar: ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>> =
        ChartBuilder::on(area)
            .margin_top(theme.margin + theme.title as u32)
            .margin_bottom(theme.margin + theme.x_label_area)
            .margin_right(theme.margin)
            .y_label_area_size(theme.y_label_area)
            .build_cartesian_2d(0f64..1f64, lo..hi)?;
    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(spec.legend_label.as_str())
        .label_style(theme.font(theme.tick))
        .axis_desc_style(theme.font(theme.label))
        .draw()?;

    let step = (hi - lo) / STEPS as f64;
    bar.draw_series((0..STEPS).map(|k| {
        let from = lo + step * k as f64;
        Rectangle::new(
            [(0.0, from), (1.0, from + step)],
            rgb(spec.color_for(from + step / 2.0)).filled(),
        )
    }))?;
    Ok(())
}

/// Summary statistics table drawn in pixel coordinates.
fn draw_stats_table<DB>(
    area: &DrawingArea<DB, Shift>,
    header: &[&str],
    rows: &[Vec<String>],
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, height) = area.dim_in_pixel();
    let n_rows = rows.len() as i32 + 1;
    let n_cols = header.len().max(1) as i32;
    let margin = theme.margin as i32;
    let cell_w = (width as i32 - 2 * margin) / n_cols;
    let cell_h = ((height as i32 - 2 * margin) / n_rows).min((theme.tick * 2.5) as i32);

    let header_fill = rgb([68, 114, 196]).filled();
    let stripe_fill = rgb([231, 230, 230]).filled();
    let header_text = TextStyle::from(theme.font(theme.tick))
        .color(&WHITE)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let body_text = theme.centered(theme.tick, VPos::Center);

    let cells = std::iter::once(header.iter().map(|h| h.to_string()).collect::<Vec<_>>())
        .chain(rows.iter().cloned());
    for (r, row) in cells.enumerate() {
        let r = r as i32;
        let y0 = margin + r * cell_h;
        for (c, value) in row.iter().enumerate() {
            let c = c as i32;
            let x0 = margin + c * cell_w;
            let corners = [(x0, y0), (x0 + cell_w, y0 + cell_h)];
            if r == 0 {
                area.draw(&Rectangle::new(corners, header_fill))?;
            } else if r % 2 == 0 {
                area.draw(&Rectangle::new(corners, stripe_fill))?;
            }
            area.draw(&Rectangle::new(corners, BLACK.stroke_width(1)))?;
            let style = if r == 0 { &header_text } else { &body_text };
            area.draw(&Text::new(
                value.clone(),
                (x0 + cell_w / 2, y0 + cell_h / 2),
                style.clone(),
            ))?;
        }
    }
    Ok(())
}

fn draw_dashboard<DB>(
    area: &DrawingArea<DB, Shift>,
    dashboard: &Dashboard,
    theme: &Theme<'_>,
) -> anyhow::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = area.titled(&dashboard.title, theme.font(theme.title * 1.3))?;
    let (_, height) = area.dim_in_pixel();
    let (charts, table) = area.split_vertically(height * 2 / 3);
    let panels = charts.split_evenly((2, 2));
    let small = theme.scaled(0.8);

    draw_bar_chart(&panels[0], &dashboard.age_distribution, &small)?;
    draw_box_plot(&panels[1], &dashboard.quality_box_plot, &small)?;
    draw_line_chart(&panels[2], &dashboard.mean_quality, &small)?;
    draw_stacked_bar_chart(&panels[3], &dashboard.category_percentages, &small)?;

    let rows = dashboard.table_rows();
    draw_stats_table(&table, &Dashboard::TABLE_HEADER, &rows, &small)
}

// ============================================================================
// Renderer
// ============================================================================

/// Writes chart specifications to PNG files.
///
/// Construction registers a TrueType font; it fails with a recoverable
/// `ChartRender` error when none can be found.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    config: ChartConfig,
    font_name: String,
}

impl ChartRenderer {
    pub fn new(config: ChartConfig) -> Result<Self> {
        let font_name = ensure_font(&config)?;
        Ok(Self { config, font_name })
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Family name the renderer's text is drawn with.
    pub fn font_name(&self) -> &str {
        &self.font_name
    }

    fn render<F>(&self, path: &Path, size_in: (f64, f64), chart: &str, draw: F) -> Result<()>
    where
        F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>, &Theme<'_>) -> anyhow::Result<()>,
    {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let theme = Theme::new(&self.config, &self.font_name);
        let size = self.config.pixels(size_in.0, size_in.1);
        let root = BitMapBackend::new(path, size).into_drawing_area();

        let outcome = (|| -> anyhow::Result<()> {
            root.fill(&WHITE)?;
            draw(&root, &theme)?;
            root.present()?;
            Ok(())
        })();
        outcome.map_err(|e| AnalysisError::chart(chart, e))?;

        info!("Saved {}: {}", chart, path.display());
        Ok(())
    }

    /// Bar chart (age distribution, update rate).
    pub fn render_bar_chart(&self, spec: &BarChart, path: &Path) -> Result<()> {
        self.render(path, (10.0, 6.0), &spec.title, |area, theme| {
            draw_bar_chart(area, spec, theme)
        })
    }

    pub fn render_quality_comparison(
        &self,
        spec: &QualityComparisonChart,
        path: &Path,
    ) -> Result<()> {
        self.render(path, (12.0, 7.0), &spec.title, |area, theme| {
            draw_quality_comparison(area, spec, theme)
        })
    }

    /// Line chart (temporal trend, mean quality).
    pub fn render_line_chart(&self, spec: &LineChart, path: &Path) -> Result<()> {
        self.render(path, (14.0, 6.0), &spec.title, |area, theme| {
            draw_line_chart(area, spec, theme)
        })
    }

    /// Stacked bar chart (anomaly summary, quality categories).
    pub fn render_stacked_bar_chart(&self, spec: &StackedBarChart, path: &Path) -> Result<()> {
        self.render(path, (12.0, 7.0), &spec.title, |area, theme| {
            draw_stacked_bar_chart(area, spec, theme)
        })
    }

    pub fn render_box_plot(&self, spec: &BoxPlotChart, path: &Path) -> Result<()> {
        self.render(path, (12.0, 6.0), &spec.title, |area, theme| {
            draw_box_plot(area, spec, theme)
        })
    }

    /// Heatmap (update types, correlation matrix).
    pub fn render_heatmap(&self, spec: &HeatmapChart, path: &Path) -> Result<()> {
        self.render(path, (12.0, 8.0), &spec.title, |area, theme| {
            draw_heatmap(area, spec, theme)
        })
    }

    /// Four chart panels above a summary statistics table.
    pub fn render_dashboard(&self, dashboard: &Dashboard, path: &Path) -> Result<()> {
        self.render(path, (18.0, 12.0), "dashboard", |area, theme| {
            draw_dashboard(area, dashboard, theme)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::charts::{STEEL_BLUE, red_yellow_green};
    use crate::reporting::charts::{StackSegment, ramp};

    fn fixture_font() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts/DejaVuSansMono.ttf")
    }

    fn fixture_config(family: &str) -> ChartConfig {
        ChartConfig {
            dpi: 40,
            font_family: family.to_string(),
            font_path: Some(fixture_font()),
            ..Default::default()
        }
    }

    #[test]
    fn test_contiguous_runs() {
        let runs = contiguous_runs(&[Some(1.0), None, Some(2.0), Some(3.0), None]);
        assert_eq!(runs, vec![vec![(0, 1.0)], vec![(2, 2.0), (3, 3.0)]]);
        assert!(contiguous_runs(&[None, None]).is_empty());
    }

    #[test]
    fn test_segment_label() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(1)), "b");
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(2)), "");
        assert_eq!(segment_label(&labels, &SegmentValue::Last), "");
    }

    #[test]
    fn test_axis_top() {
        assert_eq!(axis_top(0.0), 1.0);
        assert!((axis_top(100.0) - 112.0).abs() < 1e-9);
    }

    #[test]
    fn test_theme_scales_with_dpi() {
        let config = ChartConfig {
            dpi: 144,
            ..Default::default()
        };
        let theme = Theme::new(&config, "sans-serif");
        assert_eq!(theme.title, 28.0);
        assert_eq!(theme.scaled(0.5).title, 14.0);
    }

    #[test]
    fn test_render_writes_png() {
        let renderer = ChartRenderer::new(fixture_config("render-png")).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let bar = BarChart {
            title: "Counts".to_string(),
            x_label: "Group".to_string(),
            y_label: "Count".to_string(),
            categories: vec!["a".to_string(), "b".to_string()],
            values: vec![3.0, 5.0],
            annotations: vec!["3".to_string(), "5".to_string()],
            color: STEEL_BLUE,
        };
        let bar_path = dir.path().join("bar.png");
        renderer.render_bar_chart(&bar, &bar_path).unwrap();
        assert!(bar_path.exists());

        let colors = red_yellow_green(2);
        let stacked = StackedBarChart {
            title: "Shares".to_string(),
            x_label: "Group".to_string(),
            y_label: "%".to_string(),
            categories: vec!["a".to_string()],
            segments: vec![
                StackSegment {
                    name: "low".to_string(),
                    values: vec![40.0],
                    color: colors[0],
                },
                StackSegment {
                    name: "high".to_string(),
                    values: vec![60.0],
                    color: ramp(&colors, 1.0),
                },
            ],
            y_max: Some(100.0),
            legend_title: "Level".to_string(),
        };
        let stacked_path = dir.path().join("nested/stacked.png");
        renderer
            .render_stacked_bar_chart(&stacked, &stacked_path)
            .unwrap();
        assert!(stacked_path.exists());
    }

    #[test]
    fn test_empty_chart_is_a_recoverable_error() {
        let renderer = ChartRenderer::new(fixture_config("render-empty")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let empty = BarChart {
            title: "Empty".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            categories: Vec::new(),
            values: Vec::new(),
            annotations: Vec::new(),
            color: STEEL_BLUE,
        };
        let err = renderer
            .render_bar_chart(&empty, &dir.path().join("empty.png"))
            .unwrap_err();
        assert_eq!(err.error_code(), "CHART_RENDER_FAILED");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_renderers_keep_their_own_font_family() {
        let first = ChartRenderer::new(fixture_config("family-one")).unwrap();
        let second = ChartRenderer::new(fixture_config("family-two")).unwrap();
        assert_eq!(first.font_name(), "family-one");
        assert_eq!(second.font_name(), "family-two");

        let again = ChartRenderer::new(fixture_config("family-one")).unwrap();
        assert_eq!(again.font_name(), "family-one");

        let dir = tempfile::tempdir().unwrap();
        let bar = BarChart {
            title: "Counts".to_string(),
            x_label: "Group".to_string(),
            y_label: "Count".to_string(),
            categories: vec!["a".to_string()],
            values: vec![1.0],
            annotations: Vec::new(),
            color: STEEL_BLUE,
        };
        first.render_bar_chart(&bar, &dir.path().join("one.png")).unwrap();
        second.render_bar_chart(&bar, &dir.path().join("two.png")).unwrap();
    }

    #[test]
    fn test_same_family_with_other_file_gets_distinct_name() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("copy.ttf");
        fs::copy(fixture_font(), &copy).unwrap();

        let original = ChartRenderer::new(fixture_config("family-shared")).unwrap();
        let other = ChartRenderer::new(ChartConfig {
            font_path: Some(copy.clone()),
            ..fixture_config("family-shared")
        })
        .unwrap();
        assert_eq!(original.font_name(), "family-shared");
        assert_ne!(other.font_name(), original.font_name());
        assert!(other.font_name().contains(&copy.display().to_string()));
    }

    #[test]
    fn test_invalid_font_file_is_a_chart_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").unwrap();
        let err = ChartRenderer::new(ChartConfig {
            font_path: Some(bogus),
            ..fixture_config("family-bogus")
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "CHART_RENDER_FAILED");
        assert!(err.to_string().contains("is not a valid TrueType font"));
    }
}
