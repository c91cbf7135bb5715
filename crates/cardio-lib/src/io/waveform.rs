use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::HrError;
use crate::signal::{ClockZone, SignalSegment};

/// Lead to pull out of each record, 1-based like the device labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSelection {
    pub target_lead: usize,
    pub total_leads: usize,
}

impl LeadSelection {
    pub fn new(target_lead: usize, total_leads: usize) -> Result<Self, HrError> {
        let selection = Self {
            target_lead,
            total_leads,
        };
        selection.validate()?;
        Ok(selection)
    }

    pub fn validate(&self) -> Result<(), HrError> {
        if self.target_lead < 1 || self.target_lead > self.total_leads {
            return Err(HrError::LeadRange {
                target: self.target_lead,
                total: self.total_leads,
            });
        }
        Ok(())
    }

    fn index(&self) -> usize {
        self.target_lead - 1
    }
}

/// One decoded line of a raw waveform file. Sample values stay undecoded
/// until a lead is asked for, so a bad value only spoils its own lead.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformRecord {
    /// Epoch seconds as written by the recorder.
    pub record_time: f64,
    pub lead_samples: Vec<Vec<SampleValue>>,
}

impl WaveformRecord {
    pub fn lead_count(&self) -> usize {
        self.lead_samples.len()
    }

    /// Numeric samples of the selected lead.
    pub fn lead(&self, selection: &LeadSelection) -> Result<Vec<f64>> {
        let values = self.lead_samples.get(selection.index()).ok_or_else(|| {
            anyhow!(
                "record has {} lead(s), lead {} requested",
                self.lead_count(),
                selection.target_lead
            )
        })?;
        values.iter().map(SampleValue::to_f64).collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLine {
    record_time: f64,
    data: RawData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawData {
    wave_data_list: Vec<RawLead>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLead {
    wave_data_vo_list: Vec<RawSample>,
}

#[derive(Deserialize)]
struct RawSample {
    sample: SampleValue,
}

/// A `sample` field as the recorder wrote it: a number, a numeric string, or junk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl SampleValue {
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            SampleValue::Number(v) => Ok(*v),
            SampleValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .with_context(|| format!("sample is not numeric: {}", s)),
            SampleValue::Other(v) => Err(anyhow!("sample is not numeric: {}", v)),
        }
    }
}

/// Decode the envelope of a single newline-delimited record.
pub fn parse_waveform_record(line: &str) -> Result<WaveformRecord> {
    let raw: RawLine = serde_json::from_str(line).context("decoding waveform record")?;
    let lead_samples: Vec<Vec<SampleValue>> = raw
        .data
        .wave_data_list
        .into_iter()
        .map(|lead| {
            lead.wave_data_vo_list
                .into_iter()
                .map(|s| s.sample)
                .collect()
        })
        .collect();
    Ok(WaveformRecord {
        record_time: raw.record_time,
        lead_samples,
    })
}

/// Segments pulled from one stream plus what had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub segments: Vec<SignalSegment>,
    pub skipped_records: usize,
}

impl ExtractReport {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn segment_from_line(
    line: &[u8],
    selection: &LeadSelection,
    zone: ClockZone,
) -> Result<SignalSegment> {
    let line = std::str::from_utf8(line).context("record is not valid UTF-8")?;
    let record = parse_waveform_record(line)?;
    let timestamp = zone
        .wall_clock(record.record_time)
        .ok_or_else(|| anyhow!("record time {} out of range", record.record_time))?;
    let samples = record.lead(selection)?;
    Ok(SignalSegment { samples, timestamp })
}

/// Extract the selected lead from every decodable record; bad records are skipped.
///
/// Only an I/O failure of the reader itself ends the scan early.
pub fn extract_lead_from_reader<R: BufRead>(
    reader: R,
    selection: &LeadSelection,
    zone: ClockZone,
    source: &str,
) -> Result<ExtractReport, HrError> {
    selection.validate()?;
    let mut report = ExtractReport::default();
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("{}: read error at line {}: {}. Stopped.", source, idx + 1, err);
                report.skipped_records += 1;
                break;
            }
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match segment_from_line(&line, selection, zone) {
            Ok(segment) => report.segments.push(segment),
            Err(err) => {
                warn!("{}: line {}: {:#}. Skipped line.", source, idx + 1, err);
                report.skipped_records += 1;
            }
        }
    }
    Ok(report)
}

pub fn extract_lead_from_str(
    text: &str,
    selection: &LeadSelection,
    zone: ClockZone,
) -> Result<ExtractReport, HrError> {
    extract_lead_from_reader(text.as_bytes(), selection, zone, "<memory>")
}

/// Read one raw waveform file. An unreadable file yields an empty report.
pub fn read_file_lead_segments(
    path: &Path,
    selection: &LeadSelection,
    zone: ClockZone,
) -> Result<ExtractReport, HrError> {
    selection.validate()?;
    let name = display_name(path);
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            error!("Error reading file {}: {}. Skipped file.", name, err);
            return Ok(ExtractReport::default());
        }
    };
    let report = extract_lead_from_reader(BufReader::new(file), selection, zone, &name)?;
    info!(
        "Processed file {}: {} valid signal segment(s), {} skipped",
        name,
        report.segments.len(),
        report.skipped_records
    );
    Ok(report)
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
