use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::waveform::display_name;
use crate::signal::{parse_timestamp, HrSeries};

const TIMESTAMPS_KEY: &str = "timestamps";
const RATES_KEY: &str = "heart_rates_bpm";
const NESTED_KEY: &str = "heart_rate_time_domain";

fn arrays(obj: &Value) -> Option<(&Vec<Value>, &Vec<Value>)> {
    Some((
        obj.get(TIMESTAMPS_KEY)?.as_array()?,
        obj.get(RATES_KEY)?.as_array()?,
    ))
}

/// Flat `{timestamps, heart_rates_bpm}` or the exporter's nested layout.
fn locate_arrays(doc: &Value) -> Option<(&Vec<Value>, &Vec<Value>)> {
    arrays(doc).or_else(|| doc.get(NESTED_KEY).and_then(arrays))
}

fn entry(ts: &Value, hr: &Value) -> Result<(chrono::NaiveDateTime, f64)> {
    let text = ts
        .as_str()
        .ok_or_else(|| anyhow!("timestamp is not a string: {}", ts))?;
    let timestamp = parse_timestamp(text).with_context(|| format!("parsing timestamp {}", text))?;
    let bpm = match hr {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("heart rate is not numeric: {}", hr))?;
    Ok((timestamp, bpm))
}

/// Parse an HR-JSON document. Structural problems reject the whole document.
pub fn parse_hr_json(text: &str, source: &str) -> Result<HrSeries> {
    let doc: Value = serde_json::from_str(text).context("decoding HR JSON")?;
    let (timestamps, rates) =
        locate_arrays(&doc).ok_or_else(|| anyhow!("invalid JSON structure"))?;
    let mut series = HrSeries::default();
    for (idx, (ts, hr)) in timestamps.iter().zip(rates).enumerate() {
        match entry(ts, hr) {
            Ok((timestamp, bpm)) => series.push(timestamp, bpm),
            Err(err) => warn!("{}: entry {}: {:#}. Skipped entry.", source, idx, err),
        }
    }
    Ok(series)
}

/// Read one HR-JSON file. Unreadable or malformed files yield an empty series.
pub fn read_hr_json_file(path: &Path) -> HrSeries {
    let name = display_name(path);
    let parsed = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
        .and_then(|text| parse_hr_json(&text, &name));
    match parsed {
        Ok(series) => {
            info!(
                "Processed JSON HR file {}: {} valid HR data point(s)",
                name,
                series.len()
            );
            series
        }
        Err(err) => {
            error!("Error reading JSON file {}: {:#}. Skipped file.", name, err);
            HrSeries::default()
        }
    }
}
