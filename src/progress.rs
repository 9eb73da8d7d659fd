use crate::config::Warmup;

/// Why the ready signal fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ReadyCause {
    WarmupComplete,
    Elapsed,
}

/// Tracks composed buildings against the warm-up target and latches the
/// one-shot ready signal.
#[derive(Clone, Debug)]
pub struct ProgressGate {
    warmup_enabled: bool,
    target: u32,
    fallback_ms: u64,
    latched: bool,
}

impl ProgressGate {
    pub fn new(warmup: &Warmup) -> Self {
        Self {
            warmup_enabled: warmup.enabled,
            target: warmup.target_buildings.max(1),
            fallback_ms: warmup.preview_fallback_ms,
            latched: false,
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Raw ratio; may exceed 1 once warm-up has passed.
    pub fn progress(&self, composed: u64) -> f64 {
        composed as f64 / f64::from(self.target)
    }

    /// Ratio clamped to `[0, 1]` for display.
    pub fn display_progress(&self, composed: u64) -> f64 {
        self.progress(composed).clamp(0.0, 1.0)
    }

    pub fn warming_up(&self, composed: u64) -> bool {
        self.warmup_enabled && composed < u64::from(self.target)
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Adopt edited warm-up settings; a fired signal stays latched.
    pub fn reconfigure(&mut self, warmup: &Warmup) {
        let latched = self.latched;
        *self = Self::new(warmup);
        self.latched = latched;
    }

    /// Re-arm the latch for a fresh run.
    pub fn rearm(&mut self) {
        self.latched = false;
    }

    /// Returns the cause exactly once: the first time the trigger condition
    /// holds. Every later call returns `None`.
    pub fn poll(&mut self, composed: u64, elapsed_ms: u64) -> Option<ReadyCause> {
        if self.latched {
            return None;
        }
        let cause = if self.warmup_enabled {
            (self.progress(composed) >= 1.0).then_some(ReadyCause::WarmupComplete)
        } else {
            (elapsed_ms > self.fallback_ms).then_some(ReadyCause::Elapsed)
        };
        if cause.is_some() {
            self.latched = true;
        }
        cause
    }
}
