use thiserror::Error;

/// Request-level failures. Everything else in the pipeline is skipped and logged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HrError {
    #[error("lead {target} out of range (1-{total})")]
    LeadRange { target: usize, total: usize },
    #[error("sampling rate must be a positive number of Hz, got {0}")]
    InvalidSamplingRate(f64),
    #[error("start time cannot be later than end time")]
    InvalidTimeRange,
    #[error("no heart rate data in the selected time range")]
    EmptyRange,
    #[error("no input files to process")]
    NoInputFiles,
    #[error("not enough heart rate data: need at least {needed} point(s), got {actual}")]
    NotEnoughData { needed: usize, actual: usize },
}
