//! Lost-frame detection.
//!
//! Frame numbers within one session are monotonically increasing; a
//! gap means the driver dropped EOF notifications. Two independent
//! detectors run per session: one on the callback thread (counting
//! frames the driver never reported) and one on the writer thread
//! (additionally counting frames lost to queue overflow between the
//! two). The writer-side total is therefore always >= the
//! callback-side total; both are exposed as session metrics.

use tracing::{error, warn};

/// Tracks the last frame number seen and counts gaps.
#[derive(Debug, Default)]
pub struct LostFrameDetector {
    last_seen: u32,
    total_lost: u64,
}

impl LostFrameDetector {
    /// New detector with no frame seen yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `frame_nr` and return how many frames were skipped since
    /// the previous one.
    ///
    /// The first frame of a session seeds the sequence without being
    /// checked. Each missing number in a gap is logged individually. An
    /// out-of-order number is logged and force-advances the sequence so
    /// one corrupt callback cannot flood the log forever.
    pub fn check(&mut self, frame_nr: u32) -> u32 {
        if self.last_seen == 0 {
            self.last_seen = frame_nr;
            return 0;
        }
        if frame_nr <= self.last_seen {
            error!(
                frame_nr,
                last_seen = self.last_seen,
                "out-of-order frame number, forcing sequence forward"
            );
            self.last_seen = frame_nr.max(self.last_seen);
            return 0;
        }

        let gap = frame_nr - self.last_seen - 1;
        for missing in (self.last_seen + 1)..frame_nr {
            warn!(frame_nr = missing, "frame lost");
        }
        self.total_lost += u64::from(gap);
        self.last_seen = frame_nr;
        gap
    }

    /// Frames lost so far this session.
    #[must_use]
    pub fn total_lost(&self) -> u64 {
        self.total_lost
    }

    /// Highest frame number seen so far (0 before the first frame).
    #[must_use]
    pub fn last_seen(&self) -> u32 {
        self.last_seen
    }

    /// Clear state for a new session.
    pub fn reset(&mut self) {
        self.last_seen = 0;
        self.total_lost = 0;
    }
}
