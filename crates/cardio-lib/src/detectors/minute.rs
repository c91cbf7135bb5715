use chrono::{Duration, NaiveDateTime, Timelike};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::HrError;
use crate::signal::{Events, HrSample, RRSeries, SignalSegment, TimeSeries};

/// Tunables for minute-wise heart rate estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinuteHrConfig {
    /// Seconds of signal a minute needs before it is analysed.
    pub min_signal_s: f64,
    /// Peak threshold in standard deviations above the minute mean.
    pub threshold_k: f64,
    /// Minimum spacing between kept peaks (seconds).
    pub refractory_s: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for MinuteHrConfig {
    fn default() -> Self {
        Self {
            min_signal_s: 5.0,
            threshold_k: 1.5,
            refractory_s: 0.2,
            min_bpm: 30.0,
            max_bpm: 200.0,
        }
    }
}

pub fn validate_sampling_rate(fs: f64) -> Result<(), HrError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(HrError::InvalidSamplingRate(fs))
    }
}

/// Truncate to the start of the containing minute.
pub fn minute_start(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Concatenate segment samples per calendar minute, in arrival order.
pub fn group_by_minute(segments: &[SignalSegment]) -> BTreeMap<NaiveDateTime, Vec<f64>> {
    let mut buckets: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
    for segment in segments {
        buckets
            .entry(minute_start(segment.timestamp))
            .or_default()
            .extend_from_slice(&segment.samples);
    }
    buckets
}

/// Indices whose sample exceeds `mean + k * std` (population std).
pub fn threshold_peaks(signal: &[f64], k: f64) -> Vec<usize> {
    if signal.is_empty() {
        return Vec::new();
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    let std = (signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    let threshold = mean + k * std;
    signal
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Greedy refractory filter: keep a peak only if it lies more than
/// `min_distance` samples after the last kept peak.
pub fn refractory_filter(peaks: &[usize], min_distance: usize) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::new();
    for &peak in peaks {
        match kept.last() {
            Some(&last) if peak - last <= min_distance => {}
            _ => kept.push(peak),
        }
    }
    kept
}

/// Average BPM of one minute's merged signal, or `None` when the minute is unusable.
pub fn bucket_heart_rate(signal: &TimeSeries, cfg: &MinuteHrConfig) -> Option<f64> {
    let fs = signal.fs;
    if (signal.len() as f64) < fs * cfg.min_signal_s {
        return None;
    }
    let candidates = threshold_peaks(&signal.data, cfg.threshold_k);
    let min_distance = (fs * cfg.refractory_s).floor() as usize;
    let peaks = Events::from_indices(refractory_filter(&candidates, min_distance));
    if peaks.indices.len() < 2 {
        return None;
    }
    let rr = RRSeries::from_events(&peaks, fs);
    let bpm = rr.instantaneous_bpm();
    let avg = bpm.iter().sum::<f64>() / bpm.len() as f64;
    if !avg.is_finite() || avg < cfg.min_bpm || avg > cfg.max_bpm {
        return None;
    }
    Some(avg)
}

pub fn estimate_minute_hr(segments: &[SignalSegment], fs: f64) -> Result<Vec<HrSample>, HrError> {
    estimate_minute_hr_with_config(segments, fs, &MinuteHrConfig::default())
}

/// One HR sample per usable minute, stamped at the end of that minute.
pub fn estimate_minute_hr_with_config(
    segments: &[SignalSegment],
    fs: f64,
    cfg: &MinuteHrConfig,
) -> Result<Vec<HrSample>, HrError> {
    validate_sampling_rate(fs)?;
    let mut out = Vec::new();
    for (minute, data) in group_by_minute(segments) {
        let signal = TimeSeries { fs, data };
        match bucket_heart_rate(&signal, cfg) {
            Some(bpm) => out.push(HrSample {
                timestamp: minute + Duration::minutes(1),
                bpm,
            }),
            None => debug!(
                "minute {} discarded ({} samples, {:.1}s)",
                minute,
                signal.len(),
                signal.duration()
            ),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    /// Flat baseline with unit spikes every `period` samples.
    fn spike_train(len: usize, period: usize) -> Vec<f64> {
        (0..len)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn refractory_filter_compares_against_last_kept() {
        assert_eq!(refractory_filter(&[0, 5, 10, 60], 50), vec![0, 60]);
        assert_eq!(refractory_filter(&[0, 50, 51, 102], 50), vec![0, 51, 102]);
        assert!(refractory_filter(&[], 50).is_empty());
    }

    #[test]
    fn constant_signal_has_no_peaks() {
        let signal = TimeSeries {
            fs: 250.0,
            data: vec![1.0; 250 * 10],
        };
        assert!(threshold_peaks(&signal.data, 1.5).is_empty());
        assert_eq!(bucket_heart_rate(&signal, &MinuteHrConfig::default()), None);
    }

    #[test]
    fn regular_spikes_give_expected_rate() {
        // one spike per 200 samples at 250 Hz -> 0.8 s -> 75 BPM
        let signal = TimeSeries {
            fs: 250.0,
            data: spike_train(250 * 10, 200),
        };
        let bpm = bucket_heart_rate(&signal, &MinuteHrConfig::default()).unwrap();
        assert!((bpm - 75.0).abs() < 1e-9);
    }

    #[test]
    fn short_minutes_are_discarded() {
        let signal = TimeSeries {
            fs: 250.0,
            data: spike_train(250 * 5 - 1, 200),
        };
        assert_eq!(bucket_heart_rate(&signal, &MinuteHrConfig::default()), None);
    }

    #[test]
    fn out_of_band_rates_are_dropped() {
        // 0.25 s spacing -> 240 BPM
        let fast = TimeSeries {
            fs: 250.0,
            data: spike_train(250 * 10, 62),
        };
        assert_eq!(bucket_heart_rate(&fast, &MinuteHrConfig::default()), None);
        // 2.5 s spacing -> 24 BPM
        let slow = TimeSeries {
            fs: 250.0,
            data: spike_train(250 * 10, 625),
        };
        assert_eq!(bucket_heart_rate(&slow, &MinuteHrConfig::default()), None);
    }

    #[test]
    fn groups_segments_by_minute_in_order() {
        let segments = vec![
            SignalSegment {
                samples: vec![3.0],
                timestamp: at(10, 1, 5),
            },
            SignalSegment {
                samples: vec![1.0],
                timestamp: at(10, 0, 59),
            },
            SignalSegment {
                samples: vec![4.0, 5.0],
                timestamp: at(10, 1, 30),
            },
        ];
        let buckets = group_by_minute(&segments);
        let keys: Vec<_> = buckets.keys().copied().collect();
        assert_eq!(keys, vec![at(10, 0, 0), at(10, 1, 0)]);
        assert_eq!(buckets[&at(10, 1, 0)], vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn estimates_one_sample_per_usable_minute() {
        let mut segments = Vec::new();
        // minute 10:00: 12 one-second records of a 75 BPM spike train
        let train = spike_train(250 * 12, 200);
        for (i, chunk) in train.chunks(250).enumerate() {
            segments.push(SignalSegment {
                samples: chunk.to_vec(),
                timestamp: at(10, 0, i as u32),
            });
        }
        // minute 10:01: too short
        segments.push(SignalSegment {
            samples: spike_train(250, 200),
            timestamp: at(10, 1, 0),
        });
        let out = estimate_minute_hr(&segments, 250.0).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, at(10, 1, 0));
        assert!((out[0].bpm - 75.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_sampling_rate() {
        assert_eq!(
            estimate_minute_hr(&[], 0.0),
            Err(HrError::InvalidSamplingRate(0.0))
        );
        assert!(estimate_minute_hr(&[], f64::NAN).is_err());
    }
}
