pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod signal;

pub use detectors::*;
pub use error::HrError;
pub use metrics::*;
pub use signal::*;
