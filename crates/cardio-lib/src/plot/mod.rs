use serde::{Deserialize, Serialize};

use crate::error::HrError;
use crate::metrics::hr::median;
use crate::signal::{format_timestamp, HrSeries};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
    /// 0.0 transparent .. 1.0 opaque
    pub opacity: f32,
}

impl Style {
    fn solid(color: u32, width: f32) -> Self {
        Self {
            width,
            dash: None,
            color: Color(color),
            opacity: 1.0,
        }
    }

    fn dashed(color: u32, width: f32) -> Self {
        Self {
            dash: Some([6.0, 4.0]),
            ..Self::solid(color, width)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Histogram bars as `[left, right, height]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSeries {
    pub name: String,
    pub bars: Vec<[f64; 3]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(LineSeries),
    Bars(BarSeries),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RefLineKind {
    Horizontal,
    Vertical,
}

/// Full-width (or full-height) marker such as a mean line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefLine {
    pub name: String,
    pub kind: RefLineKind,
    pub value: f64,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    pub ref_lines: Vec<RefLine>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
            ref_lines: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    pub fn add_ref_line(&mut self, line: RefLine) {
        self.ref_lines.push(line);
    }

    /// Data extent `(x_min, x_max, y_min, y_max)` across series and markers.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for series in &self.series {
            match series {
                Series::Line(line) | Series::Scatter(line) => {
                    xs.extend(line.points.iter().map(|p| p[0]));
                    ys.extend(line.points.iter().map(|p| p[1]));
                }
                Series::Bars(bars) => {
                    for bar in &bars.bars {
                        xs.extend([bar[0], bar[1]]);
                        ys.extend([0.0, bar[2]]);
                    }
                }
            }
        }
        for line in &self.ref_lines {
            match line.kind {
                RefLineKind::Horizontal => ys.push(line.value),
                RefLineKind::Vertical => xs.push(line.value),
            }
        }
        let span = |values: &[f64]| -> Option<(f64, f64)> {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !min.is_finite() || !max.is_finite() {
                return None;
            }
            if (max - min).abs() < f64::EPSILON {
                Some((min - 1.0, max + 1.0))
            } else {
                Some((min, max))
            }
        };
        let (x0, x1) = span(&xs)?;
        let (y0, y1) = span(&ys)?;
        Some((x0, x1, y0, y1))
    }
}

/// Renders a [`Figure`] to some output (PNG file, window, ...).
pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

fn require(len: usize, needed: usize) -> Result<(), HrError> {
    if len < needed {
        Err(HrError::NotEnoughData {
            needed,
            actual: len,
        })
    } else {
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// `[hours since first sample, bpm]` plus the label for the x axis.
fn time_points(series: &HrSeries) -> Result<(Vec<[f64; 2]>, String), HrError> {
    let (first, _) = series.time_bounds().ok_or(HrError::NotEnoughData {
        needed: 1,
        actual: 0,
    })?;
    let points = series
        .samples()
        .map(|s| {
            let hours = (s.timestamp - first).num_milliseconds() as f64 / 3_600_000.0;
            [hours, s.bpm]
        })
        .collect();
    Ok((points, format!("Hours since {}", format_timestamp(&first))))
}

fn global_mean_line(values: &[f64], color: u32) -> RefLine {
    let avg = mean(values);
    RefLine {
        name: format!("Global Avg: {:.1} BPM", avg),
        kind: RefLineKind::Horizontal,
        value: avg,
        style: Style::dashed(color, 2.0),
    }
}

pub fn figure_hr_scatter(series: &HrSeries) -> Result<Figure, HrError> {
    require(series.len(), 1)?;
    let (points, x_label) = time_points(series)?;
    let mut fig = Figure::new(Some("Heart Rate vs Time (Scatter Plot)".into()))
        .with_labels(&x_label, "Heart Rate (BPM)");
    fig.add_series(Series::Scatter(LineSeries {
        name: "Minute Avg HR".into(),
        points,
        style: Style {
            opacity: 0.4,
            ..Style::solid(0xDC143C, 3.0)
        },
    }));
    fig.add_ref_line(global_mean_line(&series.heart_rates, 0x000080));
    Ok(fig)
}

pub fn figure_hr_line(series: &HrSeries, max_points: usize) -> Result<Figure, HrError> {
    require(series.len(), 1)?;
    let (points, x_label) = time_points(series)?;
    let mut fig = Figure::new(Some("Heart Rate vs Time (Line Plot)".into()))
        .with_labels(&x_label, "Heart Rate (BPM)");
    fig.add_series(Series::Line(LineSeries {
        name: "Minute Avg HR".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            opacity: 0.8,
            ..Style::solid(0x00008B, 1.5)
        },
    }));
    fig.add_ref_line(global_mean_line(&series.heart_rates, 0xFF0000));
    Ok(fig)
}

/// Equal-width histogram over `[min, max]`; the last bin is closed.
pub fn histogram(values: &[f64], bins: usize) -> Vec<[f64; 3]> {
    let bins = bins.max(1);
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    };
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let left = lo + i as f64 * width;
            [left, left + width, c as f64]
        })
        .collect()
}

pub fn figure_hr_histogram(values: &[f64], bins: usize) -> Result<Figure, HrError> {
    require(values.len(), 1)?;
    let mut fig = Figure::new(Some("Heart Rate Frequency Distribution".into()))
        .with_labels("Heart Rate (BPM)", "Frequency");
    fig.add_series(Series::Bars(BarSeries {
        name: "HR".into(),
        bars: histogram(values, bins),
        style: Style {
            opacity: 0.7,
            ..Style::solid(0x87CEEB, 1.0)
        },
    }));
    let avg = mean(values);
    let mid = median(values);
    fig.add_ref_line(RefLine {
        name: format!("Mean: {:.1} BPM", avg),
        kind: RefLineKind::Vertical,
        value: avg,
        style: Style::dashed(0xFF0000, 2.0),
    });
    fig.add_ref_line(RefLine {
        name: format!("Median: {:.1} BPM", mid),
        kind: RefLineKind::Vertical,
        value: mid,
        style: Style::dashed(0x008000, 2.0),
    });
    Ok(fig)
}

/// HR(n) against HR(n+1) with the identity line.
pub fn figure_hr_poincare(values: &[f64]) -> Result<Figure, HrError> {
    require(values.len(), 2)?;
    let points: Vec<[f64; 2]> = values.windows(2).map(|w| [w[0], w[1]]).collect();
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut fig = Figure::new(Some("HR Poincare Scatter Plot".into()))
        .with_labels("HR(n) (BPM)", "HR(n+1) (BPM)");
    fig.add_series(Series::Scatter(LineSeries {
        name: "HR(n) vs HR(n+1)".into(),
        points,
        style: Style {
            opacity: 0.6,
            ..Style::solid(0x006400, 2.0)
        },
    }));
    fig.add_series(Series::Line(LineSeries {
        name: "Identity Line (HR(n)=HR(n+1))".into(),
        points: vec![[lo, lo], [hi, hi]],
        style: Style::dashed(0xFF0000, 2.0),
    }));
    Ok(fig)
}
