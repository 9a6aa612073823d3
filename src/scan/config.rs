use std::time::Duration;

/// Tunable feedback windows for a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Minimum gap before the same code can pulse again.
    pub cooldown_ms: u64,
    /// How long an emitted pulse stays visible; nothing else shows while
    /// one is up.
    pub display_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            display_ms: 1200,
        }
    }
}

impl ScanConfig {
    pub(crate) fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub(crate) fn display(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}
