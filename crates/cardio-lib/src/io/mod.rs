pub mod discover;
pub mod export;
pub mod hr_json;
pub mod waveform;
