//! Tick-rate gate for incoming frames.
//!
//! The pose provider may run faster than the processing tick. Frames that
//! arrive before the next tick is due are dropped, never queued.

use biomech_core::Timestamp;

#[derive(Debug, Clone)]
pub struct FrameGate {
    min_interval_secs: f64,
    last_accepted: Option<Timestamp>,
    dropped: u64,
}

impl FrameGate {
    /// Gate capped at `target_fps`; a non-positive rate admits every frame
    pub fn new(target_fps: f64) -> Self {
        let min_interval_secs = if target_fps > 0.0 { 1.0 / target_fps } else { 0.0 };
        Self {
            min_interval_secs,
            last_accepted: None,
            dropped: 0,
        }
    }

    pub fn admit(&mut self, timestamp: Timestamp) -> bool {
        let due = match self.last_accepted {
            None => true,
            // Provider clock went backwards (restart); resynchronise
            Some(last) if timestamp < last => true,
            // Small epsilon so a 20 Hz source is not rejected by float rounding
            Some(last) => timestamp.secs_since(last) + 1e-6 >= self.min_interval_secs,
        };

        if due {
            self.last_accepted = Some(timestamp);
        } else {
            self.dropped += 1;
        }
        due
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.dropped = 0;
    }
}
