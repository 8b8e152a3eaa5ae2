#![forbid(unsafe_code)]

//! Frame-pacing arithmetic shared by the executor and the event loop.
//!
//! The budget rule is `period - elapsed`, saturating at zero: a frame that
//! overran its period proceeds immediately instead of sleeping into the next
//! one.

use std::time::{Duration, Instant};

/// Target frame period at the default 60 Hz cadence.
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Tracks one frame's time budget against a fixed period.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    frame_start: Instant,
}

impl FramePacer {
    /// Start pacing with the current instant as the first frame's start.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            frame_start: Instant::now(),
        }
    }

    /// The fixed frame period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left in the current frame's budget. Zero when the frame overran.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        remaining_budget(self.period, self.frame_start.elapsed())
    }

    /// Roll the reference timestamp to now, starting the next frame.
    pub fn advance(&mut self) {
        self.frame_start = Instant::now();
    }
}

/// `period - elapsed`, saturating at zero when the frame overran its budget.
#[must_use]
pub fn remaining_budget(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}
