pub mod config;
pub mod controller;
pub mod feedback;
pub mod reconciler;

pub use config::ScanConfig;
pub use controller::{ScanController, ScanError, ScanEvent};
pub use feedback::{FeedbackDebouncer, FeedbackKind, FeedbackPulse, FeedbackSeverity};
pub use reconciler::{Classification, Observation, Reconciler};
