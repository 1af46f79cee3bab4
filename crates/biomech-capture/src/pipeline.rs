//! Frame-by-frame capture pipeline.
//!
//! Wires the angle computer, raw history, static metrics calculator, optional
//! frontal analyzer and recording state machine into one owner that the
//! service layer drives with `process_frame`.

use std::collections::BTreeMap;
use std::sync::Arc;

use biomech_core::{
    AngleName, CameraView, Clock, Error, ExerciseId, FrameSize, PatternFlag, PoseFrame, Result,
};
use biomech_metrics::{
    AngleComputer, ExerciseLimits, FrontalAnalyzer, FrontalMetrics, RawMetricsAggregator,
    RawMetricsHistory, StaticAngles, StaticMetrics, StaticMetricsCalculator, StaticThresholds,
    DEFAULT_HISTORY_CAPACITY,
};
use serde::{Deserialize, Serialize};

use crate::gate::FrameGate;
use crate::recording::{
    AssessmentConfig, CompletedRecording, RecordingEvent, RecordingState, RecordingStateMachine,
    RecordingTiming, StartMode,
};

/// Configuration for the capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Processing tick cap; faster frames are dropped
    pub target_fps: f64,
    /// Static metrics are recomputed every `metrics_cadence` processed frames
    pub metrics_cadence: usize,
    pub min_confidence: f64,
    pub history_capacity: usize,
    /// Minimum history length before metrics are reported
    pub min_samples: usize,
    pub posture_debounce_secs: f64,
    pub display_grace_secs: f64,
    pub max_recorded_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let timing = RecordingTiming::default();
        Self {
            target_fps: 20.0,
            metrics_cadence: 5,
            min_confidence: 0.5,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            min_samples: 5,
            posture_debounce_secs: timing.posture_debounce_secs,
            display_grace_secs: timing.display_grace_secs,
            max_recorded_frames: timing.max_frames,
        }
    }
}

impl CaptureConfig {
    pub fn timing(&self) -> RecordingTiming {
        RecordingTiming {
            posture_debounce_secs: self.posture_debounce_secs,
            display_grace_secs: self.display_grace_secs,
            max_frames: self.max_recorded_frames,
        }
    }
}

/// Currently selected exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSelection {
    pub id: ExerciseId,
    pub view: CameraView,
    /// Exercise-specific pattern flag limits
    #[serde(default)]
    pub limits: ExerciseLimits,
}

impl ExerciseSelection {
    pub fn new(id: ExerciseId, view: CameraView) -> Self {
        Self {
            id,
            view,
            limits: ExerciseLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ExerciseLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Everything measured for one finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedExercise {
    pub exercise_id: ExerciseId,
    pub view: CameraView,
    pub recording: CompletedRecording,
    /// Mean of each angle over the recorded frames
    pub measured_angles: BTreeMap<AngleName, f64>,
    /// Static metrics over the recorded frames only
    pub metrics: StaticMetrics,
}

/// Notifications delivered to pipeline observers
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Recording(RecordingEvent),
    MetricsUpdated(StaticMetrics),
    ExerciseCompleted(ExerciseId),
}

/// Result of one `process_frame` call
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    /// False when the frame gate dropped the frame
    pub accepted: bool,
    pub metrics_updated: bool,
    pub events: Vec<RecordingEvent>,
}

type PostureCheck = Box<dyn Fn(&StaticAngles) -> bool + Send + Sync>;
type Observer = Box<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Default starting-posture check: both knees and both hips measurable
pub fn lower_body_visible(angles: &StaticAngles) -> bool {
    angles.left_knee.is_some()
        && angles.right_knee.is_some()
        && angles.left_hip.is_some()
        && angles.right_hip.is_some()
}

pub struct CapturePipeline {
    config: CaptureConfig,
    computer: AngleComputer,
    aggregator: RawMetricsAggregator,
    calculator: StaticMetricsCalculator,
    frontal: Option<Box<dyn FrontalAnalyzer>>,
    gate: FrameGate,
    recorder: RecordingStateMachine,
    exercise: Option<ExerciseSelection>,
    angles: StaticAngles,
    metrics: StaticMetrics,
    frontal_metrics: Option<FrontalMetrics>,
    processed: usize,
    completed: Option<CompletedExercise>,
    posture_check: PostureCheck,
    observers: Vec<Observer>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig, assessment: AssessmentConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            computer: AngleComputer::new(config.min_confidence),
            aggregator: RawMetricsAggregator::new(
                config.history_capacity,
                config.min_confidence,
            ),
            calculator: StaticMetricsCalculator::new(
                StaticThresholds::default(),
                config.min_samples,
            ),
            frontal: None,
            gate: FrameGate::new(config.target_fps),
            recorder: RecordingStateMachine::new(clock, assessment, config.timing()),
            exercise: None,
            angles: StaticAngles::default(),
            metrics: StaticMetrics::default(),
            frontal_metrics: None,
            processed: 0,
            completed: None,
            posture_check: Box::new(lower_body_visible),
            observers: Vec::new(),
            config,
        }
    }

    pub fn with_thresholds(mut self, thresholds: StaticThresholds) -> Self {
        self.calculator.set_thresholds(thresholds);
        self
    }

    pub fn with_frontal_analyzer(mut self, analyzer: Box<dyn FrontalAnalyzer>) -> Self {
        self.frontal = Some(analyzer);
        self
    }

    /// Replace the starting-posture predicate used by `StartMode::OnStartingPosture`
    pub fn with_posture_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&StaticAngles) -> bool + Send + Sync + 'static,
    {
        self.posture_check = Box::new(check);
        self
    }

    /// Add an observer for recording transitions and metric updates
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    fn emit(&self, event: PipelineEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Process one frame from the pose provider
    pub fn process_frame(&mut self, frame: &PoseFrame, size: FrameSize) -> Result<FrameOutcome> {
        size.validate()?;

        if !self.gate.admit(frame.timestamp) {
            return Ok(FrameOutcome::default());
        }

        let mut outcome = FrameOutcome {
            accepted: true,
            ..Default::default()
        };
        if let Some(event) = self.recorder.tick() {
            self.handle_event(&event);
            outcome.events.push(event);
        }

        self.angles = self.computer.compute(frame);

        if let Some(selection) = &self.exercise {
            let view = selection.view;
            let limits = selection.limits;
            self.aggregator.push_frame(frame, size, &self.angles)?;
            if view.uses_frontal_metrics() {
                if let Some(analyzer) = self.frontal.as_mut() {
                    self.frontal_metrics = analyzer.analyze(frame, size);
                }
            }

            self.processed += 1;
            if self.processed % self.config.metrics_cadence.max(1) == 0 {
                self.metrics = self.calculator.calculate_with_limits(
                    self.aggregator.history(),
                    self.frontal_metrics.as_ref(),
                    view,
                    &limits,
                );
                outcome.metrics_updated = true;
                self.emit(PipelineEvent::MetricsUpdated(self.metrics.clone()));
            }
        }

        let posture_ok = (self.posture_check)(&self.angles);
        let events = [
            self.recorder.report_posture(posture_ok),
            self.recorder.accept_frame(frame, size),
        ];
        for event in events.into_iter().flatten() {
            self.handle_event(&event);
            outcome.events.push(event);
        }
        Ok(outcome)
    }

    /// Advance timers when no frames are arriving
    pub fn tick(&mut self) -> Option<RecordingEvent> {
        let event = self.recorder.tick()?;
        self.handle_event(&event);
        Some(event)
    }

    fn handle_event(&mut self, event: &RecordingEvent) {
        match event {
            RecordingEvent::RecordingStarted => {
                // Frontal running means cover the recording window only
                if let Some(analyzer) = self.frontal.as_mut() {
                    analyzer.reset();
                }
                self.frontal_metrics = None;
            }
            RecordingEvent::Completed { .. } => self.finish_exercise(),
            _ => {}
        }
        self.emit(PipelineEvent::Recording(event.clone()));
    }

    fn finish_exercise(&mut self) {
        let (Some(selection), Some(recording)) =
            (self.exercise.clone(), self.recorder.take_completed())
        else {
            return;
        };

        let metrics = self.summarize(&recording, &selection);
        let measured_angles = metrics.mean_angles.clone();

        tracing::info!(
            "Exercise {} recorded: {} frames, {} flags",
            selection.id,
            recording.frame_count(),
            metrics.pattern_flags.len()
        );

        self.completed = Some(CompletedExercise {
            exercise_id: selection.id.clone(),
            view: selection.view,
            recording,
            measured_angles,
            metrics,
        });
        self.emit(PipelineEvent::ExerciseCompleted(selection.id));
    }

    /// Static metrics over the recorded frames alone
    fn summarize(
        &self,
        recording: &CompletedRecording,
        selection: &ExerciseSelection,
    ) -> StaticMetrics {
        let capacity = recording.frame_count().max(1);
        let mut aggregator = RawMetricsAggregator::new(capacity, self.computer.min_confidence());
        for recorded in &recording.frames {
            let angles = self.computer.compute(&recorded.frame);
            if let Err(e) = aggregator.push_frame(&recorded.frame, recorded.size, &angles) {
                tracing::warn!("Skipping recorded frame: {}", e);
            }
        }
        self.calculator.calculate_with_limits(
            aggregator.history(),
            self.frontal_metrics.as_ref(),
            selection.view,
            &selection.limits,
        )
    }

    /// Select the exercise to assess, discarding all per-exercise state
    pub fn select_exercise(&mut self, selection: ExerciseSelection) {
        tracing::info!("Exercise selected: {} ({:?} view)", selection.id, selection.view);
        self.reset_exercise_state();
        self.exercise = Some(selection);
    }

    /// Select with the global pattern thresholds
    pub fn set_exercise(&mut self, id: ExerciseId, view: CameraView) {
        self.select_exercise(ExerciseSelection::new(id, view));
    }

    pub fn clear_exercise(&mut self) {
        self.reset_exercise_state();
        self.exercise = None;
    }

    fn reset_exercise_state(&mut self) {
        self.aggregator.reset();
        if let Some(analyzer) = self.frontal.as_mut() {
            analyzer.reset();
        }
        self.recorder.reset();
        self.angles = StaticAngles::default();
        self.metrics = StaticMetrics::default();
        self.frontal_metrics = None;
        self.processed = 0;
        self.completed = None;
    }

    pub fn start_recording(&mut self, mode: StartMode) -> Result<RecordingEvent> {
        let Some(selection) = &self.exercise else {
            return Err(Error::NoExerciseSelected);
        };
        tracing::info!("Starting recording for {}", selection.id);

        self.completed = None;
        let event = self.recorder.start(mode)?;
        self.handle_event(&event);
        Ok(event)
    }

    pub fn stop_recording(&mut self) -> Result<RecordingEvent> {
        let event = self.recorder.stop()?;
        self.handle_event(&event);
        Ok(event)
    }

    pub fn cancel_recording(&mut self) -> bool {
        let cancelled = self.recorder.cancel();
        if cancelled {
            self.handle_event(&RecordingEvent::Cancelled);
        }
        cancelled
    }

    pub fn set_assessment_config(&mut self, config: AssessmentConfig) -> Result<()> {
        self.recorder.set_config(config)
    }

    pub fn set_thresholds(&mut self, thresholds: StaticThresholds) {
        self.calculator.set_thresholds(thresholds);
    }

    /// Claim the last finished exercise, if any
    pub fn take_completed(&mut self) -> Option<CompletedExercise> {
        self.completed.take()
    }

    pub fn exercise(&self) -> Option<&ExerciseSelection> {
        self.exercise.as_ref()
    }

    pub fn angles(&self) -> &StaticAngles {
        &self.angles
    }

    pub fn metrics(&self) -> &StaticMetrics {
        &self.metrics
    }

    pub fn pattern_flags(&self) -> Vec<PatternFlag> {
        self.metrics.pattern_flags.iter().copied().collect()
    }

    pub fn history(&self) -> &RawMetricsHistory {
        self.aggregator.history()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.gate.dropped()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingPhase;
    use biomech_core::{names, Keypoint, ManualClock, Timestamp};
    use biomech_metrics::KeypointFrontalAnalyzer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SIZE: FrameSize = FrameSize { width: 640.0, height: 720.0 };

    fn standing(timestamp: Timestamp) -> PoseFrame {
        let kp = |name: &str, x: f64, y: f64| Keypoint::new(name, x, y, 0.9);
        PoseFrame::new(
            timestamp,
            vec![
                kp(names::LEFT_SHOULDER, 380.0, 180.0),
                kp(names::RIGHT_SHOULDER, 260.0, 180.0),
                kp(names::LEFT_HIP, 360.0, 380.0),
                kp(names::RIGHT_HIP, 280.0, 380.0),
                kp(names::LEFT_KNEE, 360.0, 520.0),
                kp(names::RIGHT_KNEE, 280.0, 520.0),
                kp(names::LEFT_ANKLE, 360.0, 650.0),
                kp(names::RIGHT_ANKLE, 280.0, 650.0),
                kp(names::LEFT_FOOT_INDEX, 385.0, 680.0),
                kp(names::RIGHT_FOOT_INDEX, 255.0, 680.0),
            ],
        )
    }

    fn pipeline(duration: f64) -> (Arc<ManualClock>, CapturePipeline) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(10.0)));
        let assessment = AssessmentConfig {
            duration_secs: duration,
            detection_delay_secs: 0.0,
        };
        let p = CapturePipeline::new(CaptureConfig::default(), assessment, clock.clone());
        (clock, p)
    }

    #[test]
    fn test_metrics_on_cadence() {
        let (clock, mut p) = pipeline(1.0);
        p.set_exercise(ExerciseId::new("bilateral_stance"), CameraView::Side);

        for i in 0..10 {
            let outcome = p.process_frame(&standing(clock.now()), SIZE).unwrap();
            assert!(outcome.accepted);
            assert_eq!(outcome.metrics_updated, (i + 1) % 5 == 0);
            clock.advance_secs(0.05);
        }
        assert_eq!(p.metrics().sample_count, 10);
        assert!(p.pattern_flags().is_empty());
    }

    fn shifted(timestamp: Timestamp, dx: f64) -> PoseFrame {
        let mut frame = standing(timestamp);
        for kp in frame.keypoints.iter_mut() {
            kp.x += dx;
        }
        frame
    }

    #[test]
    fn test_switching_exercise_discards_history() {
        let (clock, mut p) = pipeline(1.0);
        p.set_exercise(ExerciseId::new("bilateral_stance"), CameraView::Side);
        for i in 0..10 {
            let dx = if i % 2 == 0 { 40.0 } else { -40.0 };
            p.process_frame(&shifted(clock.now(), dx), SIZE).unwrap();
            clock.advance_secs(0.05);
        }
        assert_eq!(p.history().frame_count, 10);
        assert!(p.metrics().sway.total > 0.05);
        assert!(p.pattern_flags().contains(&PatternFlag::StaticInstability));

        p.set_exercise(ExerciseId::new("single_leg_stance_left"), CameraView::Front);
        assert!(p.history().is_empty());
        assert!(p.angles().is_empty());
        assert!(p.metrics().is_empty());
        assert_eq!(p.exercise().unwrap().view, CameraView::Front);

        // Only steady post-switch frames feed the next metrics update
        for _ in 0..5 {
            p.process_frame(&standing(clock.now()), SIZE).unwrap();
            clock.advance_secs(0.05);
        }
        assert_eq!(p.metrics().sample_count, 5);
        assert!(p.metrics().sway.total < 1e-9);
        assert!(p.pattern_flags().is_empty());
    }

    #[test]
    fn test_starting_posture_arms_then_counts_down() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(10.0)));
        let assessment = AssessmentConfig {
            duration_secs: 1.0,
            detection_delay_secs: 1.0,
        };
        let mut p = CapturePipeline::new(CaptureConfig::default(), assessment, clock.clone());
        p.set_exercise(ExerciseId::new("bilateral_stance"), CameraView::Side);
        assert_eq!(
            p.start_recording(StartMode::OnStartingPosture).unwrap(),
            RecordingEvent::Armed
        );

        // Left knee out of frame: the starting posture is not held
        for _ in 0..50 {
            let mut frame = standing(clock.now());
            frame.keypoints.retain(|kp| kp.name != names::LEFT_KNEE);
            p.process_frame(&frame, SIZE).unwrap();
            clock.advance_secs(0.05);
        }
        assert_eq!(p.recording_state().phase, RecordingPhase::Armed);

        let mut countdown_at = None;
        for i in 0..60 {
            let outcome = p.process_frame(&standing(clock.now()), SIZE).unwrap();
            let started = outcome
                .events
                .iter()
                .any(|e| matches!(e, RecordingEvent::CountdownStarted { .. }));
            if started {
                countdown_at = Some(i);
                break;
            }
            assert_eq!(p.recording_state().phase, RecordingPhase::Armed);
            clock.advance_secs(0.05);
        }

        // Posture debounce: 2 s at 20 fps
        assert_eq!(countdown_at, Some(40));
        assert_eq!(p.recording_state().phase, RecordingPhase::Countdown);
    }

    #[test]
    fn test_recording_requires_exercise() {
        let (_clock, mut p) = pipeline(1.0);
        assert!(matches!(
            p.start_recording(StartMode::Immediate),
            Err(Error::NoExerciseSelected)
        ));
    }

    #[test]
    fn test_full_recording() {
        let (clock, mut p) = pipeline(1.0);
        let completions = Arc::new(AtomicUsize::new(0));
        let seen = completions.clone();
        p.on_event(move |event| {
            if matches!(event, PipelineEvent::ExerciseCompleted(_)) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut p = p.with_frontal_analyzer(Box::new(KeypointFrontalAnalyzer::new(0.5)));
        p.set_exercise(ExerciseId::new("bilateral_stance"), CameraView::Front);
        p.start_recording(StartMode::Immediate).unwrap();

        for _ in 0..21 {
            p.process_frame(&standing(clock.now()), SIZE).unwrap();
            clock.advance_secs(0.05);
        }

        assert_eq!(p.recording_state().phase, RecordingPhase::Complete);
        let done = p.take_completed().unwrap();
        assert_eq!(done.recording.frame_count(), 20);
        assert_eq!(done.metrics.sample_count, 20);
        assert!((done.measured_angles[&AngleName::LeftKnee] - 180.0).abs() < 1e-6);
        assert!(done.metrics.frontal.is_some());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(p.take_completed().is_none());
    }

    #[test]
    fn test_gate_drops_fast_frames() {
        let (clock, mut p) = pipeline(1.0);
        p.set_exercise(ExerciseId::new("bilateral_stance"), CameraView::Side);
        assert!(p.process_frame(&standing(clock.now()), SIZE).unwrap().accepted);
        clock.advance_secs(0.01);
        assert!(!p.process_frame(&standing(clock.now()), SIZE).unwrap().accepted);
        assert_eq!(p.dropped_frames(), 1);
        assert_eq!(p.history().frame_count, 1);
    }

    #[test]
    fn test_invalid_frame_size_is_error() {
        let (clock, mut p) = pipeline(1.0);
        let result = p.process_frame(&standing(clock.now()), FrameSize::new(0.0, 0.0));
        assert!(result.is_err());
    }
}
