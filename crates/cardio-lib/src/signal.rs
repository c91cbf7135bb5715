use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock format used by HR-JSON files and exports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` wall-clock timestamp.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Clock used to turn epoch record times into wall-clock minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockZone {
    #[default]
    Local,
    Utc,
}

impl ClockZone {
    /// Convert epoch seconds (possibly fractional) into wall-clock time.
    pub fn wall_clock(self, epoch_s: f64) -> Option<NaiveDateTime> {
        if !epoch_s.is_finite() {
            return None;
        }
        let secs = epoch_s.floor();
        let nanos = ((epoch_s - secs) * 1e9).round().min(999_999_999.0) as u32;
        let utc = DateTime::<Utc>::from_timestamp(secs as i64, nanos)?;
        Some(match self {
            ClockZone::Utc => utc.naive_utc(),
            ClockZone::Local => utc.with_timezone(&Local).naive_local(),
        })
    }
}

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// One record's samples for the selected lead.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSegment {
    pub samples: Vec<f64>,
    pub timestamp: NaiveDateTime,
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let mut rr = Vec::new();
        for w in events.indices.windows(2) {
            let dt = (w[1] as f64 - w[0] as f64) / fs;
            rr.push(dt);
        }
        Self { rr }
    }

    /// Instantaneous heart rate (BPM) for each interval.
    pub fn instantaneous_bpm(&self) -> Vec<f64> {
        self.rr.iter().map(|interval| 60.0 / interval).collect()
    }
}

/// Minute-averaged heart rate stamped at the end of its minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrSample {
    #[serde(with = "serde_wall_clock")]
    pub timestamp: NaiveDateTime,
    pub bpm: f64,
}

/// Heart rate points accumulated across files, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HrSeries {
    #[serde(with = "serde_wall_clock_vec")]
    pub timestamps: Vec<NaiveDateTime>,
    pub heart_rates: Vec<f64>,
}

impl HrSeries {
    pub fn from_samples(samples: &[HrSample]) -> Self {
        let mut series = Self::default();
        series.extend_samples(samples);
        series
    }

    pub fn push(&mut self, timestamp: NaiveDateTime, bpm: f64) {
        self.timestamps.push(timestamp);
        self.heart_rates.push(bpm);
    }

    pub fn extend_samples(&mut self, samples: &[HrSample]) {
        for sample in samples {
            self.push(sample.timestamp, sample.bpm);
        }
    }

    pub fn extend(&mut self, other: &HrSeries) {
        self.timestamps.extend_from_slice(&other.timestamps);
        self.heart_rates.extend_from_slice(&other.heart_rates);
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.heart_rates.clear();
    }

    pub fn len(&self) -> usize {
        self.heart_rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heart_rates.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = HrSample> + '_ {
        self.timestamps
            .iter()
            .zip(&self.heart_rates)
            .map(|(&timestamp, &bpm)| HrSample { timestamp, bpm })
    }

    /// Earliest and latest timestamps, regardless of storage order.
    pub fn time_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.timestamps.iter().min()?;
        let max = self.timestamps.iter().max()?;
        Some((*min, *max))
    }

    /// Points with `start <= t <= end`, keeping dataset order.
    pub fn filter_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> HrSeries {
        let mut out = HrSeries::default();
        for sample in self.samples() {
            if sample.timestamp >= start && sample.timestamp <= end {
                out.push(sample.timestamp, sample.bpm);
            }
        }
        out
    }
}

/// Serde adapter for `YYYY-MM-DD HH:MM:SS` wall-clock fields.
pub mod serde_wall_clock {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_timestamp(&text).map_err(serde::de::Error::custom)
    }
}

pub mod serde_wall_clock_vec {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        values: &[NaiveDateTime],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(format_timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<NaiveDateTime>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts
            .iter()
            .map(|text| parse_timestamp(text).map_err(serde::de::Error::custom))
            .collect()
    }
}
