//! Data models and structures for the sweep harness

pub mod config;
pub mod trial;

// Re-export main model types
pub use config::Config;
pub use trial::{AttemptReport, RecordResult, ResultRecord, SweepGrid, Trial, TrialOutcome};
