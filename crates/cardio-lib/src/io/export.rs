use anyhow::{Context, Result};
use chrono::Local;
use csv::WriterBuilder;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::metrics::hr::{round2, HrTimeStats};
use crate::signal::{format_timestamp, HrSeries, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub export_timestamp: String,
    pub total_hr_data_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrTimeDomain {
    pub timestamps: Vec<String>,
    pub heart_rates_bpm: Vec<f64>,
}

/// Global statistics alone, or global plus time-range statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportStats {
    Combined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        global_stats: Option<HrTimeStats>,
        time_range_stats: HrTimeStats,
    },
    Global(HrTimeStats),
}

impl ExportStats {
    pub fn from_parts(global: Option<HrTimeStats>, range: Option<HrTimeStats>) -> Option<Self> {
        match (global, range) {
            (global, Some(range)) => Some(ExportStats::Combined {
                global_stats: global,
                time_range_stats: range,
            }),
            (Some(global), None) => Some(ExportStats::Global(global)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrExport {
    pub analysis_info: AnalysisInfo,
    pub heart_rate_time_domain: HrTimeDomain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_time_domain_stats: Option<ExportStats>,
}

impl HrExport {
    pub fn new(series: &HrSeries, stats: Option<ExportStats>) -> Self {
        Self {
            analysis_info: AnalysisInfo {
                export_timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
                total_hr_data_points: series.len(),
            },
            heart_rate_time_domain: HrTimeDomain {
                timestamps: series.timestamps.iter().map(format_timestamp).collect(),
                heart_rates_bpm: series
                    .heart_rates
                    .iter()
                    .map(|&hr| round2(hr))
                    .collect(),
            },
            hr_time_domain_stats: stats,
        }
    }
}

pub fn write_export_json(path: &Path, export: &HrExport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, export)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Data exported to: {}", path.display());
    Ok(())
}

/// Plain `timestamp,heart_rate_bpm` table.
pub fn write_hr_csv(path: &Path, series: &HrSeries) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["timestamp", "heart_rate_bpm"])?;
    for sample in series.samples() {
        writer.write_record(&[format_timestamp(&sample.timestamp), format!("{:.2}", sample.bpm)])?;
    }
    writer.flush()?;
    info!("HR table written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::hr_json::read_hr_json_file;
    use crate::metrics::hr::hr_time_stats;
    use crate::signal::parse_timestamp;

    fn series() -> HrSeries {
        let mut s = HrSeries::default();
        s.push(parse_timestamp("2024-01-01 10:01:00").unwrap(), 60.004);
        s.push(parse_timestamp("2024-01-01 10:02:00").unwrap(), 65.456);
        s.push(parse_timestamp("2024-01-01 10:03:00").unwrap(), 70.0);
        s
    }

    #[test]
    fn export_layout_matches_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        let data = series();
        let stats = ExportStats::from_parts(hr_time_stats(&data.heart_rates), None);
        write_export_json(&path, &HrExport::new(&data, stats)).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["analysis_info"]["total_hr_data_points"], 3);
        assert_eq!(doc["heart_rate_time_domain"]["heart_rates_bpm"][1], 65.46);
        assert_eq!(doc["hr_time_domain_stats"]["mean_hr"], 65.15);

        let back = read_hr_json_file(&path);
        assert_eq!(back.timestamps, data.timestamps);
        assert_eq!(back.heart_rates, vec![60.0, 65.46, 70.0]);
    }

    #[test]
    fn range_stats_nest_with_global() {
        let global = hr_time_stats(&[60.0, 70.0]);
        let range = hr_time_stats(&[60.0, 65.0, 70.0]);
        let js = serde_json::to_value(ExportStats::from_parts(global, range)).unwrap();
        assert_eq!(js["global_stats"]["mean_hr"], 65.0);
        assert_eq!(js["time_range_stats"]["rmssd"], 5.0);
        assert!(ExportStats::from_parts(None, None).is_none());
    }

    #[test]
    fn range_only_stats_omit_global_block() {
        let range = hr_time_stats(&[60.0, 65.0, 70.0]);
        let stats = ExportStats::from_parts(None, range).unwrap();
        let js = serde_json::to_value(&stats).unwrap();
        assert!(js.get("global_stats").is_none());
        assert_eq!(js["time_range_stats"]["mean_hr"], 65.0);
        let back: ExportStats = serde_json::from_value(js).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn exported_rates_use_stats_rounding() {
        let mut data = HrSeries::default();
        data.push(parse_timestamp("2024-01-01 10:01:00").unwrap(), 72.125);
        let export = HrExport::new(&data, None);
        assert_eq!(export.heart_rate_time_domain.heart_rates_bpm, vec![72.13]);
    }

    #[test]
    fn writes_csv_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hr.csv");
        write_hr_csv(&path, &series()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,heart_rate_bpm");
        assert_eq!(lines[2], "2024-01-01 10:02:00,65.46");
        assert_eq!(lines.len(), 4);
    }
}
