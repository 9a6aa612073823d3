//! Rate limiting for user-facing scan feedback.
//!
//! A code held in front of the camera classifies on every frame; the
//! debouncer collapses that into one visible pulse. One pulse is shown at a
//! time, and a given code cannot re-trigger within its cooldown window.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::ScanConfig;
use super::reconciler::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackKind {
    AlreadyFound,
    NewlyFound,
    NotExpected,
}

impl FeedbackKind {
    /// Each kind gets a distinct haptic duration so the three outcomes are
    /// tellable apart without looking at the screen.
    pub fn haptic_ms(self) -> u64 {
        match self {
            FeedbackKind::AlreadyFound => 30,
            FeedbackKind::NewlyFound => 60,
            FeedbackKind::NotExpected => 120,
        }
    }

    pub fn severity(self) -> FeedbackSeverity {
        match self {
            FeedbackKind::AlreadyFound => FeedbackSeverity::Warning,
            FeedbackKind::NewlyFound => FeedbackSeverity::Success,
            FeedbackKind::NotExpected => FeedbackSeverity::Error,
        }
    }
}

impl From<&Classification> for FeedbackKind {
    fn from(classification: &Classification) -> Self {
        match classification {
            Classification::AlreadyFound { .. } => FeedbackKind::AlreadyFound,
            Classification::NewlyFound { .. } => FeedbackKind::NewlyFound,
            Classification::NotExpected { .. } => FeedbackKind::NotExpected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackSeverity {
    Success,
    Warning,
    Error,
}

/// One emitted feedback pulse, ready for the host UI to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPulse {
    pub kind: FeedbackKind,
    pub severity: FeedbackSeverity,
    pub haptic_ms: u64,
    pub code: String,
}

pub struct FeedbackDebouncer {
    cooldown: Duration,
    display: Duration,
    last_code: Option<String>,
    last_emitted_at: Option<Instant>,
    pulse_shown_at: Option<Instant>,
}

impl Default for FeedbackDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackDebouncer {
    pub fn new() -> Self {
        Self::from_config(&ScanConfig::default())
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::with_windows(config.cooldown(), config.display())
    }

    pub fn with_windows(cooldown: Duration, display: Duration) -> Self {
        Self {
            cooldown,
            display,
            last_code: None,
            last_emitted_at: None,
            pulse_shown_at: None,
        }
    }

    /// Whether a previously emitted pulse is still inside its display
    /// window. Expiry is lazy; the pulse clears by this returning false.
    pub fn pulse_visible(&self, now: Instant) -> bool {
        self.pulse_shown_at
            .map(|shown| now.saturating_duration_since(shown) < self.display)
            .unwrap_or(false)
    }

    /// Decides whether `classification` produces a visible pulse at `now`.
    pub fn signal(&mut self, classification: &Classification, now: Instant) -> Option<FeedbackPulse> {
        if self.pulse_visible(now) {
            return None;
        }

        let code = classification.code();
        if let (Some(last_code), Some(last_at)) = (&self.last_code, self.last_emitted_at) {
            if last_code == code && now.saturating_duration_since(last_at) < self.cooldown {
                return None;
            }
        }

        self.last_code = Some(code.to_string());
        self.last_emitted_at = Some(now);
        self.pulse_shown_at = Some(now);

        let kind = FeedbackKind::from(classification);
        Some(FeedbackPulse {
            severity: kind.severity(),
            haptic_ms: kind.haptic_ms(),
            kind,
            code: code.to_string(),
        })
    }
}
