use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::detectors::minute::MinuteHrConfig;
use crate::io::waveform::LeadSelection;
use crate::pipeline::{AnalysisRequest, ExtractionParams, InputKind};
use crate::signal::ClockZone;

/// Analysis settings as read from a TOML file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input_kind: InputKind,
    pub total_leads: usize,
    pub target_lead: usize,
    pub sampling_rate: f64,
    pub clock_zone: ClockZone,
    pub minute_hr: MinuteHrConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let params = ExtractionParams::default();
        Self {
            input_kind: InputKind::default(),
            total_leads: params.lead.total_leads,
            target_lead: params.lead.target_lead,
            sampling_rate: params.sampling_rate,
            clock_zone: params.zone,
            minute_hr: params.minute_hr,
        }
    }
}

impl AnalysisConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing analysis config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn params(&self) -> ExtractionParams {
        ExtractionParams {
            lead: LeadSelection {
                target_lead: self.target_lead,
                total_leads: self.total_leads,
            },
            sampling_rate: self.sampling_rate,
            zone: self.clock_zone,
            minute_hr: self.minute_hr,
        }
    }

    /// Build an unvalidated request; `AnalysisRequest::validate` does the checks.
    pub fn to_request(&self, files: Vec<PathBuf>) -> AnalysisRequest {
        AnalysisRequest {
            files,
            kind: self.input_kind,
            params: self.params(),
        }
    }
}
