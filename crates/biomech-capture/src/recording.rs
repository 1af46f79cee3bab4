//! Recording state machine.
//!
//! ```text
//! idle ──start(Immediate)──────────────► countdown ──delay elapsed──► recording
//!   │                                        ▲                           │
//!   └─start(OnStartingPosture)─► armed ──────┘ posture held              │ elapsed ≥ duration
//!                                                                        ▼ or stop()
//! idle ◄──────────────── display grace elapsed ──────────────────── complete
//! ```
//!
//! The countdown does not count toward the recording. The recording window is
//! measured from the first accepted frame. `cancel()` from armed or countdown
//! returns to idle with nothing left behind.

use biomech_core::{Clock, Error, FrameSize, PoseFrame, Result, Timer, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Durations supplied by the caller for one assessment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Recording length in seconds
    pub duration_secs: f64,
    /// Countdown before recording starts, in seconds
    pub detection_delay_secs: f64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30.0,
            detection_delay_secs: 3.0,
        }
    }
}

/// Secondary timings of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingTiming {
    /// How long the starting posture must be held before the countdown
    pub posture_debounce_secs: f64,
    /// How long the complete phase is shown before returning to idle
    pub display_grace_secs: f64,
    /// Capacity of the frame buffer
    pub max_frames: usize,
}

impl Default for RecordingTiming {
    fn default() -> Self {
        Self {
            posture_debounce_secs: 2.0,
            display_grace_secs: 2.0,
            max_frames: 2400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// Countdown starts right away
    Immediate,
    /// Wait until the subject holds the starting posture
    OnStartingPosture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    Idle,
    Armed,
    Countdown,
    Recording,
    Complete,
}

/// Transition notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum RecordingEvent {
    Armed,
    CountdownStarted { seconds: f64 },
    RecordingStarted,
    Completed {
        frame_count: usize,
        duration_secs: f64,
        stopped_early: bool,
    },
    Cancelled,
    ReturnedToIdle,
}

/// Captured frame with elapsed-time bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: PoseFrame,
    pub size: FrameSize,
    /// Seconds since the first accepted frame
    pub elapsed_secs: f64,
}

/// Output of one finished recording window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRecording {
    pub frames: Vec<RecordedFrame>,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub duration_secs: f64,
    pub target_duration_secs: f64,
    pub stopped_early: bool,
}

impl CompletedRecording {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Read-only view of the machine for callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingState {
    pub phase: RecordingPhase,
    pub is_recording: bool,
    pub start_time: Option<Timestamp>,
    pub elapsed_secs: f64,
    pub target_duration_secs: f64,
    pub countdown_remaining_secs: Option<f64>,
    pub frame_count: usize,
}

enum Phase {
    Idle,
    Armed {
        posture_since: Option<Timestamp>,
    },
    Countdown {
        timer: Timer,
    },
    Recording {
        /// Started on the first accepted frame
        timer: Option<Timer>,
        frames: Vec<RecordedFrame>,
    },
    Complete {
        grace: Timer,
        recording: Option<CompletedRecording>,
    },
}

pub struct RecordingStateMachine {
    clock: Arc<dyn Clock>,
    config: AssessmentConfig,
    timing: RecordingTiming,
    phase: Phase,
}

impl RecordingStateMachine {
    pub fn new(clock: Arc<dyn Clock>, config: AssessmentConfig, timing: RecordingTiming) -> Self {
        Self {
            clock,
            config,
            timing,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> RecordingPhase {
        match self.phase {
            Phase::Idle => RecordingPhase::Idle,
            Phase::Armed { .. } => RecordingPhase::Armed,
            Phase::Countdown { .. } => RecordingPhase::Countdown,
            Phase::Recording { .. } => RecordingPhase::Recording,
            Phase::Complete { .. } => RecordingPhase::Complete,
        }
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    /// Replace the durations; only allowed while nothing is pending
    pub fn set_config(&mut self, config: AssessmentConfig) -> Result<()> {
        match self.phase {
            Phase::Idle | Phase::Complete { .. } => {
                self.config = config;
                Ok(())
            }
            _ => Err(Error::Recording(
                "cannot change configuration while a recording is pending".to_string(),
            )),
        }
    }

    pub fn start(&mut self, mode: StartMode) -> Result<RecordingEvent> {
        if !matches!(self.phase, Phase::Idle | Phase::Complete { .. }) {
            return Err(Error::Recording(format!(
                "cannot start from {:?}",
                self.phase()
            )));
        }
        if self.config.duration_secs <= 0.0 {
            return Err(Error::Recording("duration must be positive".to_string()));
        }

        match mode {
            StartMode::Immediate => Ok(self.begin_countdown()),
            StartMode::OnStartingPosture => {
                self.phase = Phase::Armed { posture_since: None };
                Ok(RecordingEvent::Armed)
            }
        }
    }

    fn begin_countdown(&mut self) -> RecordingEvent {
        let seconds = self.config.detection_delay_secs.max(0.0);
        self.phase = Phase::Countdown {
            timer: Timer::start(self.clock.clone(), seconds),
        };
        RecordingEvent::CountdownStarted { seconds }
    }

    /// Report whether the subject currently holds the starting posture.
    ///
    /// Only meaningful while armed; a posture change never aborts a recording.
    pub fn report_posture(&mut self, valid: bool) -> Option<RecordingEvent> {
        let now = self.clock.now();
        let debounce = self.timing.posture_debounce_secs;

        let Phase::Armed { posture_since } = &mut self.phase else {
            return None;
        };

        if !valid {
            *posture_since = None;
            return None;
        }

        let since = *posture_since.get_or_insert(now);
        if now.secs_since(since) >= debounce {
            Some(self.begin_countdown())
        } else {
            None
        }
    }

    /// Advance time-driven transitions
    pub fn tick(&mut self) -> Option<RecordingEvent> {
        let expired = match &self.phase {
            Phase::Countdown { timer } | Phase::Complete { grace: timer, .. } => timer.is_expired(),
            Phase::Recording { timer: Some(timer), .. } => timer.is_expired(),
            _ => false,
        };
        if !expired {
            return None;
        }

        match self.phase() {
            RecordingPhase::Countdown => {
                self.phase = Phase::Recording {
                    timer: None,
                    frames: Vec::new(),
                };
                tracing::info!("Countdown finished, recording");
                Some(RecordingEvent::RecordingStarted)
            }
            RecordingPhase::Recording => Some(self.complete(false)),
            RecordingPhase::Complete => {
                self.phase = Phase::Idle;
                Some(RecordingEvent::ReturnedToIdle)
            }
            _ => None,
        }
    }

    /// Offer a frame to the recording buffer.
    ///
    /// The first accepted frame starts the duration timer. A frame arriving at
    /// or after the end of the window completes the recording instead of being
    /// captured.
    pub fn accept_frame(&mut self, frame: &PoseFrame, size: FrameSize) -> Option<RecordingEvent> {
        let clock = self.clock.clone();
        let duration = self.config.duration_secs;
        let max_frames = self.timing.max_frames;

        let Phase::Recording { timer, frames } = &mut self.phase else {
            return None;
        };

        let timer = timer.get_or_insert_with(|| Timer::start(clock, duration));
        if timer.is_expired() {
            return Some(self.complete(false));
        }

        if frames.len() < max_frames {
            frames.push(RecordedFrame {
                frame: frame.clone(),
                size,
                elapsed_secs: timer.elapsed(),
            });
        } else {
            tracing::debug!("Recording buffer full, dropping frame");
        }
        None
    }

    /// Manual stop: completes a running recording, cancels a pending one
    pub fn stop(&mut self) -> Result<RecordingEvent> {
        match self.phase {
            Phase::Recording { .. } => Ok(self.complete(true)),
            Phase::Armed { .. } | Phase::Countdown { .. } => {
                self.cancel();
                Ok(RecordingEvent::Cancelled)
            }
            _ => Err(Error::Recording("no recording in progress".to_string())),
        }
    }

    /// Abort a pending start. Returns false if nothing was pending.
    pub fn cancel(&mut self) -> bool {
        match &mut self.phase {
            Phase::Armed { .. } => {}
            Phase::Countdown { timer } => timer.cancel(),
            _ => return false,
        }
        self.phase = Phase::Idle;
        true
    }

    /// Drop everything, including an unclaimed completed recording
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Claim the recording produced by the last completion
    pub fn take_completed(&mut self) -> Option<CompletedRecording> {
        match &mut self.phase {
            Phase::Complete { recording, .. } => recording.take(),
            _ => None,
        }
    }

    fn complete(&mut self, stopped_early: bool) -> RecordingEvent {
        let now = self.clock.now();
        let previous = std::mem::replace(&mut self.phase, Phase::Idle);

        let (timer, frames) = match previous {
            Phase::Recording { timer, frames } => (timer, frames),
            other => {
                self.phase = other;
                return RecordingEvent::Cancelled;
            }
        };

        let started_at = timer.as_ref().map(|t| t.started_at()).unwrap_or(now);
        let duration_secs = timer
            .as_ref()
            .map(|t| t.elapsed().min(self.config.duration_secs))
            .unwrap_or(0.0);
        let frame_count = frames.len();

        tracing::info!(
            "Recording complete: {} frames over {:.2}s (stopped early: {})",
            frame_count,
            duration_secs,
            stopped_early
        );

        self.phase = Phase::Complete {
            grace: Timer::start(self.clock.clone(), self.timing.display_grace_secs),
            recording: Some(CompletedRecording {
                frames,
                started_at,
                ended_at: now,
                duration_secs,
                target_duration_secs: self.config.duration_secs,
                stopped_early,
            }),
        };

        RecordingEvent::Completed {
            frame_count,
            duration_secs,
            stopped_early,
        }
    }

    pub fn state(&self) -> RecordingState {
        let target = self.config.duration_secs;
        let base = RecordingState {
            phase: self.phase(),
            is_recording: false,
            start_time: None,
            elapsed_secs: 0.0,
            target_duration_secs: target,
            countdown_remaining_secs: None,
            frame_count: 0,
        };

        match &self.phase {
            Phase::Idle | Phase::Armed { .. } => base,
            Phase::Countdown { timer } => RecordingState {
                countdown_remaining_secs: Some(timer.remaining()),
                ..base
            },
            Phase::Recording { timer, frames } => RecordingState {
                is_recording: true,
                start_time: timer.as_ref().map(|t| t.started_at()),
                elapsed_secs: timer.as_ref().map(|t| t.elapsed().min(target)).unwrap_or(0.0),
                frame_count: frames.len(),
                ..base
            },
            Phase::Complete { recording, .. } => RecordingState {
                start_time: recording.as_ref().map(|r| r.started_at),
                elapsed_secs: recording.as_ref().map(|r| r.duration_secs).unwrap_or(0.0),
                frame_count: recording.as_ref().map(|r| r.frame_count()).unwrap_or(0),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomech_core::ManualClock;

    fn machine(duration: f64, delay: f64) -> (Arc<ManualClock>, RecordingStateMachine) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(100.0)));
        let sm = RecordingStateMachine::new(
            clock.clone(),
            AssessmentConfig {
                duration_secs: duration,
                detection_delay_secs: delay,
            },
            RecordingTiming::default(),
        );
        (clock, sm)
    }

    fn frame(clock: &ManualClock) -> PoseFrame {
        PoseFrame::new(clock.now(), Vec::new())
    }

    const SIZE: FrameSize = FrameSize { width: 640.0, height: 480.0 };

    #[test]
    fn test_countdown_not_counted() {
        let (clock, mut sm) = machine(2.0, 3.0);
        assert_eq!(
            sm.start(StartMode::Immediate).unwrap(),
            RecordingEvent::CountdownStarted { seconds: 3.0 }
        );

        clock.advance_secs(2.9);
        assert_eq!(sm.tick(), None);
        clock.advance_secs(0.1);
        assert_eq!(sm.tick(), Some(RecordingEvent::RecordingStarted));

        // Idle time before the first frame does not count either
        clock.advance_secs(5.0);
        assert_eq!(sm.accept_frame(&frame(&clock), SIZE), None);
        assert_eq!(sm.state().frame_count, 1);
        assert_eq!(sm.tick(), None);
    }

    #[test]
    fn test_auto_stop_exactly_at_duration() {
        let (clock, mut sm) = machine(1.0, 0.0);
        sm.start(StartMode::Immediate).unwrap();
        assert_eq!(sm.tick(), Some(RecordingEvent::RecordingStarted));

        for _ in 0..20 {
            assert_eq!(sm.accept_frame(&frame(&clock), SIZE), None);
            clock.advance_secs(0.05);
        }
        // elapsed is now exactly 1.0
        let event = sm.accept_frame(&frame(&clock), SIZE);
        assert_eq!(
            event,
            Some(RecordingEvent::Completed {
                frame_count: 20,
                duration_secs: 1.0,
                stopped_early: false
            })
        );

        let recording = sm.take_completed().unwrap();
        assert_eq!(recording.frame_count(), 20);
        assert!(recording.frames.iter().all(|f| f.elapsed_secs < 1.0));
        assert!(sm.take_completed().is_none());
        assert_eq!(sm.phase(), RecordingPhase::Complete);
    }

    #[test]
    fn test_never_stops_early() {
        let (clock, mut sm) = machine(1.0, 0.0);
        sm.start(StartMode::Immediate).unwrap();
        sm.tick();
        sm.accept_frame(&frame(&clock), SIZE);
        clock.advance_secs(0.999);
        assert_eq!(sm.tick(), None);
        assert_eq!(sm.phase(), RecordingPhase::Recording);
        clock.advance_secs(0.001);
        assert!(matches!(sm.tick(), Some(RecordingEvent::Completed { .. })));
    }

    #[test]
    fn test_grace_returns_to_idle() {
        let (clock, mut sm) = machine(0.5, 0.0);
        sm.start(StartMode::Immediate).unwrap();
        sm.tick();
        sm.accept_frame(&frame(&clock), SIZE);
        assert!(matches!(
            sm.stop().unwrap(),
            RecordingEvent::Completed { stopped_early: true, .. }
        ));

        clock.advance_secs(2.0);
        assert_eq!(sm.tick(), Some(RecordingEvent::ReturnedToIdle));
        assert_eq!(sm.phase(), RecordingPhase::Idle);
    }

    #[test]
    fn test_cancel_leaves_no_state() {
        let (clock, mut sm) = machine(1.0, 3.0);
        sm.start(StartMode::Immediate).unwrap();
        assert!(sm.cancel());
        assert_eq!(sm.phase(), RecordingPhase::Idle);
        assert_eq!(sm.state().countdown_remaining_secs, None);

        clock.advance_secs(10.0);
        assert_eq!(sm.tick(), None);
        assert!(!sm.cancel());
        assert!(sm.take_completed().is_none());
    }

    #[test]
    fn test_posture_debounce() {
        let (clock, mut sm) = machine(1.0, 1.0);
        assert_eq!(sm.start(StartMode::OnStartingPosture).unwrap(), RecordingEvent::Armed);

        assert_eq!(sm.report_posture(true), None);
        clock.advance_secs(1.5);
        // Posture lost, debounce restarts
        assert_eq!(sm.report_posture(false), None);
        assert_eq!(sm.report_posture(true), None);
        clock.advance_secs(1.9);
        assert_eq!(sm.report_posture(true), None);
        clock.advance_secs(0.1);
        assert_eq!(
            sm.report_posture(true),
            Some(RecordingEvent::CountdownStarted { seconds: 1.0 })
        );

        clock.advance_secs(1.0);
        sm.tick();
        sm.accept_frame(&frame(&clock), SIZE);
        // Losing the posture does not abort a started recording
        assert_eq!(sm.report_posture(false), None);
        assert_eq!(sm.phase(), RecordingPhase::Recording);
    }

    #[test]
    fn test_cannot_start_twice() {
        let (_clock, mut sm) = machine(1.0, 1.0);
        sm.start(StartMode::Immediate).unwrap();
        assert!(sm.start(StartMode::Immediate).is_err());
        assert!(sm.set_config(AssessmentConfig::default()).is_err());
    }
}
