use chrono::NaiveDateTime;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::HrError;
use crate::signal::HrSeries;

/// Successive differences above this many BPM count towards `pnn50`.
pub const PNN_THRESHOLD_BPM: f64 = 5.0;

/// Descriptive statistics over an ordered HR sequence, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrTimeStats {
    pub mean_hr: f64,
    pub median_hr: f64,
    pub std_hr: f64,
    pub var_hr: f64,
    pub min_hr: f64,
    pub max_hr: f64,
    pub range_hr: f64,
    pub rmssd: f64,
    pub cv_sd: f64,
    pub cv_nn: f64,
    pub pnn50: f64,
}

/// Two decimals, exact halves away from zero.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Time-domain statistics; `None` for fewer than two values.
///
/// Successive-difference metrics depend on order, so pass values in time order.
pub fn hr_time_stats(heart_rates: &[f64]) -> Option<HrTimeStats> {
    let n = heart_rates.len();
    if n < 2 {
        return None;
    }
    let mean = heart_rates.iter().sum::<f64>() / n as f64;
    let var = heart_rates.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let std = var.sqrt();
    let min = heart_rates.iter().copied().fold(f64::INFINITY, f64::min);
    let max = heart_rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let diffs: Vec<f64> = heart_rates.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let over = diffs
        .iter()
        .filter(|d| d.abs() > PNN_THRESHOLD_BPM)
        .count();
    let pnn50 = 100.0 * over as f64 / diffs.len() as f64;

    Some(HrTimeStats {
        mean_hr: round2(mean),
        median_hr: round2(median(heart_rates)),
        std_hr: round2(std),
        var_hr: round2(var),
        min_hr: round2(min),
        max_hr: round2(max),
        range_hr: round2(max - min),
        rmssd: round2(rmssd),
        cv_sd: round2(rmssd / mean),
        cv_nn: round2(std / mean),
        pnn50: round2(pnn50),
    })
}

/// Statistics for the sub-range `start..=end` of a combined dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeStats {
    #[serde(with = "crate::signal::serde_wall_clock")]
    pub start: NaiveDateTime,
    #[serde(with = "crate::signal::serde_wall_clock")]
    pub end: NaiveDateTime,
    pub points: usize,
    pub stats: Option<HrTimeStats>,
}

pub fn range_stats(
    series: &HrSeries,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<RangeStats, HrError> {
    if start > end {
        return Err(HrError::InvalidTimeRange);
    }
    if let Some((first, last)) = series.time_bounds() {
        if start < first || end > last {
            warn!(
                "Time range exceeds data range ({} ~ {})",
                crate::signal::format_timestamp(&first),
                crate::signal::format_timestamp(&last)
            );
        }
    }
    let filtered = series.filter_range(start, end);
    if filtered.is_empty() {
        return Err(HrError::EmptyRange);
    }
    let stats = hr_time_stats(&filtered.heart_rates);
    info!(
        "Time-range stats: {} valid HR point(s) between {} and {}",
        filtered.len(),
        crate::signal::format_timestamp(&start),
        crate::signal::format_timestamp(&end)
    );
    Ok(RangeStats {
        start,
        end,
        points: filtered.len(),
        stats,
    })
}
