//! Sequential multi-file heart rate extraction with cooperative pause.
//!
//! Files are processed one at a time on a single worker. The pause token is
//! only consulted between files (and once more before the final statistics),
//! so a file that has started is always finished before a pause takes effect.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::detectors::minute::{
    estimate_minute_hr_with_config, validate_sampling_rate, MinuteHrConfig,
};
use crate::error::HrError;
use crate::io::hr_json::read_hr_json_file;
use crate::io::waveform::{display_name, read_file_lead_segments, LeadSelection};
use crate::metrics::hr::{hr_time_stats, HrTimeStats};
use crate::signal::{ClockZone, HrSeries};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    /// Newline-delimited multi-lead waveform records (`.txt`).
    #[default]
    RawEcg,
    /// Pre-computed `{timestamps, heart_rates_bpm}` files (`.json`).
    HrJson,
}

impl InputKind {
    pub fn extension(self) -> &'static str {
        match self {
            InputKind::RawEcg => "txt",
            InputKind::HrJson => "json",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::RawEcg => write!(f, "raw ECG"),
            InputKind::HrJson => write!(f, "HR JSON"),
        }
    }
}

/// Parameters for the raw waveform path. Ignored for HR-JSON inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionParams {
    pub lead: LeadSelection,
    pub sampling_rate: f64,
    pub zone: ClockZone,
    pub minute_hr: MinuteHrConfig,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            lead: LeadSelection {
                target_lead: 4,
                total_leads: 9,
            },
            sampling_rate: 250.0,
            zone: ClockZone::default(),
            minute_hr: MinuteHrConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub files: Vec<PathBuf>,
    pub kind: InputKind,
    pub params: ExtractionParams,
}

impl AnalysisRequest {
    /// Reject configuration problems before any file is touched.
    pub fn validate(&self) -> Result<(), HrError> {
        if self.files.is_empty() {
            return Err(HrError::NoInputFiles);
        }
        if self.kind == InputKind::RawEcg {
            self.params.lead.validate()?;
            validate_sampling_rate(self.params.sampling_rate)?;
        }
        Ok(())
    }
}

/// Shared pause flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct PauseToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, paused: bool) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = paused;
        cvar.notify_all();
    }

    pub fn pause(&self) {
        self.set(true);
    }

    pub fn resume(&self) {
        self.set(false);
    }

    /// Flip the flag and return the new paused state.
    pub fn toggle(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = !*state;
        cvar.notify_all();
        *state
    }

    pub fn is_paused(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until the token is resumed. Returns whether any waiting happened.
    pub fn wait_while_paused(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let waited = *guard;
        let _guard = cvar
            .wait_while(guard, |paused| *paused)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        waited
    }
}

/// Why a file did or did not contribute to the combined dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "points")]
pub enum FileOutcome {
    Contributed(usize),
    NoSegments,
    NoHeartRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PipelineUpdate {
    Started { files: usize },
    FileStarted { index: usize, total: usize, name: String },
    FileFinished { index: usize, name: String, outcome: FileOutcome },
    Paused,
    Resumed,
    Completed { points: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_contributing: usize,
    pub files_skipped: usize,
    pub points: usize,
    pub stats: Option<HrTimeStats>,
}

/// Heart rate points for one file, no matter which input kind it is.
pub fn process_file(
    path: &Path,
    kind: InputKind,
    params: &ExtractionParams,
) -> Result<(HrSeries, FileOutcome), HrError> {
    match kind {
        InputKind::HrJson => {
            let series = read_hr_json_file(path);
            let outcome = if series.is_empty() {
                FileOutcome::NoHeartRate
            } else {
                FileOutcome::Contributed(series.len())
            };
            Ok((series, outcome))
        }
        InputKind::RawEcg => {
            let report = read_file_lead_segments(path, &params.lead, params.zone)?;
            if report.is_empty() {
                return Ok((HrSeries::default(), FileOutcome::NoSegments));
            }
            let samples = estimate_minute_hr_with_config(
                &report.segments,
                params.sampling_rate,
                &params.minute_hr,
            )?;
            let series = HrSeries::from_samples(&samples);
            let outcome = if series.is_empty() {
                FileOutcome::NoHeartRate
            } else {
                FileOutcome::Contributed(series.len())
            };
            Ok((series, outcome))
        }
    }
}

fn pause_point<F: FnMut(PipelineUpdate)>(pause: &PauseToken, on_update: &mut F) {
    if pause.is_paused() {
        info!("Analysis paused");
        on_update(PipelineUpdate::Paused);
        pause.wait_while_paused();
        info!("Analysis resumed");
        on_update(PipelineUpdate::Resumed);
    }
}

/// Runs requests against a caller-owned dataset.
#[derive(Debug, Default)]
pub struct Orchestrator;

impl Orchestrator {
    /// Clear `dataset`, then fill it from every file in order.
    pub fn run<F>(
        &self,
        request: &AnalysisRequest,
        dataset: &mut HrSeries,
        pause: &PauseToken,
        mut on_update: F,
    ) -> Result<RunSummary, HrError>
    where
        F: FnMut(PipelineUpdate),
    {
        request.validate()?;
        dataset.clear();
        let total = request.files.len();
        info!("Found {} {} file(s). Starting processing...", total, request.kind);
        on_update(PipelineUpdate::Started { files: total });

        let mut contributing = 0;
        for (idx, path) in request.files.iter().enumerate() {
            pause_point(pause, &mut on_update);
            let name = display_name(path);
            info!("Processing file {}/{}: {}", idx + 1, total, name);
            on_update(PipelineUpdate::FileStarted {
                index: idx + 1,
                total,
                name: name.clone(),
            });
            let (series, outcome) = process_file(path, request.kind, &request.params)?;
            match outcome {
                FileOutcome::Contributed(n) => {
                    dataset.extend(&series);
                    contributing += 1;
                    info!("  Success: extracted {} valid HR point(s)", n);
                }
                FileOutcome::NoSegments => warn!("  No valid signal data in {}. Skipping.", name),
                FileOutcome::NoHeartRate => warn!("  No valid HR data from {}.", name),
            }
            on_update(PipelineUpdate::FileFinished {
                index: idx + 1,
                name,
                outcome,
            });
        }
        pause_point(pause, &mut on_update);

        let stats = hr_time_stats(&dataset.heart_rates);
        info!("Analysis completed: {} valid HR data point(s)", dataset.len());
        if let Some(stats) = &stats {
            info!(
                "Global average HR: {:.1} BPM, range {:.1} - {:.1} BPM",
                stats.mean_hr, stats.min_hr, stats.max_hr
            );
        } else if dataset.is_empty() {
            warn!("No valid HR data found in any file");
        }
        on_update(PipelineUpdate::Completed {
            points: dataset.len(),
        });
        Ok(RunSummary {
            files_total: total,
            files_contributing: contributing,
            files_skipped: total - contributing,
            points: dataset.len(),
            stats,
        })
    }
}

/// Finished run handed back by [`AnalysisWorker::join`].
#[derive(Debug, Clone)]
pub struct RunResult {
    pub dataset: HrSeries,
    pub summary: RunSummary,
}

/// One background run. The dataset stays with the worker until `join`.
pub struct AnalysisWorker {
    updates: Receiver<PipelineUpdate>,
    pause: PauseToken,
    handle: JoinHandle<Result<RunResult, HrError>>,
}

impl AnalysisWorker {
    /// Validate the request, then start processing on a new thread.
    pub fn spawn(request: AnalysisRequest, pause: PauseToken) -> Result<Self, HrError> {
        request.validate()?;
        let (tx, rx): (Sender<PipelineUpdate>, Receiver<PipelineUpdate>) = unbounded();
        let worker_pause = pause.clone();
        let handle = std::thread::spawn(move || {
            let mut dataset = HrSeries::default();
            let summary = Orchestrator.run(&request, &mut dataset, &worker_pause, |update| {
                let _ = tx.send(update);
            })?;
            Ok(RunResult { dataset, summary })
        });
        Ok(Self {
            updates: rx,
            pause,
            handle,
        })
    }

    pub fn updates(&self) -> &Receiver<PipelineUpdate> {
        &self.updates
    }

    pub fn pause_token(&self) -> &PauseToken {
        &self.pause
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish. A worker panic is re-raised on the caller.
    pub fn join(self) -> Result<RunResult, HrError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
