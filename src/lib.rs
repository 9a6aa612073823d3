//! Session reconciliation engine for QR-code checklists.
//!
//! A caller extracts the expected code set from a paginated document
//! ([`extract_codes`]), creates a [`Session`], then feeds decoded camera
//! observations through a [`ScanController`] which classifies each one,
//! updates the found set at most once per code, and persists through a
//! [`SessionStore`].

pub mod db;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod scan;

pub use db::{Database, MemoryStore, SessionStore};
pub use extract::{
    extract_codes, extract_codes_blocking, BarcodeDecoder, DecodeOutcome, ExtractError,
    PageRenderer,
};
#[cfg(feature = "pdfium")]
pub use extract::PdfiumRenderer;
pub use models::Session;
pub use normalize::normalize;
pub use scan::{
    Classification, FeedbackDebouncer, FeedbackKind, FeedbackPulse, FeedbackSeverity, Observation,
    Reconciler, ScanConfig, ScanController, ScanError, ScanEvent,
};
