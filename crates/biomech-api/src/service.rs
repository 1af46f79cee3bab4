//! Async facade over the capture pipeline and the session manager.
//!
//! The pipeline and the session manager share one `tokio::sync::Mutex`, so a
//! frame's effects and a result write are each applied as a unit.

use std::sync::Arc;

use biomech_assessment::{
    AssessmentSession, AssessmentSessionManager, ExerciseAssessmentResult, ExerciseDefinition,
    ExerciseRecording, ExerciseStandardsRegistry, ExportedReport, InlineReportExporter,
    PainPredictor, ReportExporter, ReportFormat, ReportedPain, SessionMode, SessionPhase,
    SessionStore,
};
use biomech_capture::{
    AssessmentConfig, CapturePipeline, CompletedExercise, ExerciseSelection, FrameOutcome,
    RecordingEvent, RecordingState, StartMode,
};
use biomech_core::{
    Clock, Error, ExerciseId, FrameSize, PatternFlag, PoseFrame, Result, SessionId, SystemClock,
};
use biomech_metrics::{KeypointFrontalAnalyzer, StaticAngles, StaticMetrics};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::EngineConfig;

/// Live readout for the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSnapshot {
    pub exercise: Option<ExerciseSelection>,
    pub angles: StaticAngles,
    pub metrics: StaticMetrics,
    pub pattern_flags: Vec<PatternFlag>,
    pub recording: RecordingState,
    pub dropped_frames: u64,
}

/// Build the session manager input from a finished capture
pub fn exercise_recording(
    completed: CompletedExercise,
    reported_pain: Option<ReportedPain>,
) -> ExerciseRecording {
    ExerciseRecording {
        exercise_id: completed.exercise_id,
        duration_secs: completed.recording.duration_secs,
        frame_count: completed.recording.frame_count(),
        measured_angles: completed.measured_angles,
        metrics: completed.metrics,
        reported_pain,
    }
}

struct Engine {
    capture: CapturePipeline,
    sessions: AssessmentSessionManager,
}

pub struct AssessmentService {
    config: EngineConfig,
    registry: Arc<ExerciseStandardsRegistry>,
    engine: Mutex<Engine>,
    exporter: Arc<dyn ReportExporter>,
}

impl AssessmentService {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = config.session_store();
        Self::from_parts(config, store, clock)
    }

    pub fn from_parts(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(config.load_registry()?);

        let frontal = KeypointFrontalAnalyzer::new(config.capture.min_confidence);
        let capture = CapturePipeline::new(config.capture.clone(), config.assessment, clock.clone())
            .with_thresholds(config.thresholds)
            .with_frontal_analyzer(Box::new(frontal));

        let sessions = AssessmentSessionManager::new(registry.clone(), store)
            .with_thresholds(config.thresholds)
            .with_clock(clock);

        tracing::info!(
            "Assessment service ready: {} exercises, {}s recordings",
            registry.len(),
            config.assessment.duration_secs
        );

        Ok(Self {
            config,
            registry,
            engine: Mutex::new(Engine { capture, sessions }),
            exporter: Arc::new(InlineReportExporter),
        })
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ReportExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_pain_predictor(self, predictor: Arc<dyn PainPredictor>) -> Self {
        let Engine { capture, sessions } = self.engine.into_inner();
        Self {
            engine: Mutex::new(Engine {
                capture,
                sessions: sessions.with_pain_predictor(predictor),
            }),
            ..self
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExerciseStandardsRegistry {
        &self.registry
    }

    pub fn exercises(&self) -> Vec<ExerciseDefinition> {
        self.registry.definitions().cloned().collect()
    }

    // Capture

    pub async fn process_frame(&self, frame: &PoseFrame, size: FrameSize) -> Result<FrameOutcome> {
        self.engine.lock().await.capture.process_frame(frame, size)
    }

    /// Advance recording timers when no frames arrive
    pub async fn tick(&self) -> Option<RecordingEvent> {
        self.engine.lock().await.capture.tick()
    }

    /// Select an exercise from the registry; the camera view comes from its definition
    pub async fn set_exercise(&self, id: &ExerciseId) -> Result<ExerciseSelection> {
        let definition = self
            .registry
            .definition(id)
            .ok_or_else(|| Error::UnknownExercise(id.to_string()))?;

        let selection = ExerciseSelection::new(definition.id().clone(), definition.camera_view)
            .with_limits(definition.standard.limits());
        self.engine.lock().await.capture.select_exercise(selection.clone());
        Ok(selection)
    }

    pub async fn clear_exercise(&self) {
        self.engine.lock().await.capture.clear_exercise();
    }

    pub async fn start_recording(&self, mode: StartMode) -> Result<RecordingEvent> {
        self.engine.lock().await.capture.start_recording(mode)
    }

    pub async fn stop_recording(&self) -> Result<RecordingEvent> {
        self.engine.lock().await.capture.stop_recording()
    }

    pub async fn cancel_recording(&self) -> bool {
        self.engine.lock().await.capture.cancel_recording()
    }

    pub async fn set_assessment_config(&self, config: AssessmentConfig) -> Result<()> {
        self.engine.lock().await.capture.set_assessment_config(config)
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.engine.lock().await.capture.recording_state()
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        let engine = self.engine.lock().await;
        let capture = &engine.capture;
        CaptureSnapshot {
            exercise: capture.exercise().cloned(),
            angles: *capture.angles(),
            metrics: capture.metrics().clone(),
            pattern_flags: capture.pattern_flags(),
            recording: capture.recording_state(),
            dropped_frames: capture.dropped_frames(),
        }
    }

    // Sessions

    pub async fn start_session(&self, mode: SessionMode) -> SessionId {
        self.engine.lock().await.sessions.start_session(mode)
    }

    pub async fn session_phase(&self) -> SessionPhase {
        self.engine.lock().await.sessions.phase()
    }

    pub async fn current_session(&self) -> Option<AssessmentSession> {
        self.engine.lock().await.sessions.session().cloned()
    }

    pub async fn record_exercise_result(
        &self,
        input: ExerciseRecording,
    ) -> Result<ExerciseAssessmentResult> {
        self.engine.lock().await.sessions.record_exercise_result(input)
    }

    /// Score the last finished recording into the active session.
    ///
    /// Returns `Ok(None)` when no recording has completed. The recording is
    /// left in place when there is no active session to receive it.
    pub async fn record_completed(
        &self,
        reported_pain: Option<ReportedPain>,
    ) -> Result<Option<ExerciseAssessmentResult>> {
        if let Some(pain) = reported_pain.as_ref().filter(|p| p.intensity > 10) {
            return Err(Error::InvalidInput(format!(
                "pain intensity {} outside 0-10",
                pain.intensity
            )));
        }

        let mut engine = self.engine.lock().await;
        match engine.sessions.phase() {
            SessionPhase::Active => {}
            SessionPhase::None => return Err(Error::NoActiveSession),
            SessionPhase::Finalized => {
                let id = engine.sessions.session().map(|s| s.id.to_string()).unwrap_or_default();
                return Err(Error::SessionFinalized(id));
            }
        }

        let Some(completed) = engine.capture.take_completed() else {
            return Ok(None);
        };
        let recording = exercise_recording(completed, reported_pain);
        let result = engine.sessions.record_exercise_result(recording)?;
        Ok(Some(result))
    }

    pub async fn get_exercise_result(&self, id: &ExerciseId) -> Option<ExerciseAssessmentResult> {
        self.engine.lock().await.sessions.get_exercise_result(id).cloned()
    }

    pub async fn clear_exercise_result(
        &self,
        id: &ExerciseId,
    ) -> Result<Option<ExerciseAssessmentResult>> {
        self.engine.lock().await.sessions.clear_exercise_result(id)
    }

    pub async fn end_session(&self) -> Option<AssessmentSession> {
        self.engine.lock().await.sessions.end_session()
    }

    pub async fn recent_sessions(&self, n: usize) -> Result<Vec<AssessmentSession>> {
        self.engine.lock().await.sessions.recent_sessions(n)
    }

    /// Export the current session, finalized or not
    pub async fn export(&self, format: ReportFormat) -> Result<ExportedReport> {
        let session = self.current_session().await.ok_or(Error::NoActiveSession)?;
        self.exporter.export(&session, format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomech_assessment::InMemorySessionStore;
    use biomech_capture::RecordingPhase;
    use biomech_core::{names, AngleName, Keypoint, ManualClock, Timestamp};

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
            ],
        )
    }

    fn service() -> (Arc<ManualClock>, Arc<InMemorySessionStore>, AssessmentService) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(1_700_000_000.0)));
        let store = Arc::new(InMemorySessionStore::default());
        let mut config = EngineConfig::default();
        config.assessment = AssessmentConfig {
            duration_secs: 1.0,
            detection_delay_secs: 0.0,
        };
        let service = AssessmentService::from_parts(config, store.clone(), clock.clone()).unwrap();
        (clock, store, service)
    }

    #[tokio::test]
    async fn test_unknown_exercise_rejected() {
        let (_clock, _store, service) = service();
        let err = service.set_exercise(&ExerciseId::new("handstand")).await.unwrap_err();
        assert!(matches!(err, Error::UnknownExercise(_)));
        assert!(service.snapshot().await.exercise.is_none());
    }

    #[tokio::test]
    async fn test_record_completed_requires_session() {
        let (_clock, _store, service) = service();
        assert!(matches!(
            service.record_completed(None).await,
            Err(Error::NoActiveSession)
        ));
        service.start_session(SessionMode::Single).await;
        assert!(service.record_completed(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capture_to_report() {
        let (clock, store, service) = service();
        service.start_session(SessionMode::Full).await;
        let selection = service
            .set_exercise(&ExerciseId::new("standing_posture_side"))
            .await
            .unwrap();
        assert_eq!(selection.view, biomech_core::CameraView::Side);

        service.start_recording(StartMode::Immediate).await.unwrap();
        for _ in 0..21 {
            service.process_frame(&standing(clock.now()), SIZE).await.unwrap();
            clock.advance_secs(0.05);
        }
        assert_eq!(service.recording_state().await.phase, RecordingPhase::Complete);

        let result = service.record_completed(None).await.unwrap().unwrap();
        assert_eq!(result.frame_count, 20);
        assert_eq!(result.exercise_name, "Standing Posture (Side)");
        assert!(result.score >= 70);
        assert!(result
            .deviations
            .iter()
            .any(|d| d.angle == AngleName::LeftKnee && d.within_tolerance));

        let session = service.end_session().await.unwrap();
        assert_eq!(session.summary.exercise_count, 1);
        assert_eq!(store.len(), 1);

        let report = service.export(ReportFormat::Json).await.unwrap();
        let restored = biomech_assessment::import_json(&report.content).unwrap();
        assert_eq!(restored.id, session.id);
        assert!(service.export(ReportFormat::Pdf).await.is_err());
    }

    /// Standing on the left leg, right thigh horizontal, right shin vertical
    fn left_leg_stance(timestamp: Timestamp) -> PoseFrame {
        let kp = |name: &str, x: f64, y: f64| Keypoint::new(name, x, y, 0.9);
        PoseFrame::new(
            timestamp,
            vec![
                kp(names::LEFT_SHOULDER, 350.0, 180.0),
                kp(names::RIGHT_SHOULDER, 310.0, 180.0),
                kp(names::LEFT_HIP, 350.0, 380.0),
                kp(names::RIGHT_HIP, 310.0, 380.0),
                kp(names::LEFT_KNEE, 350.0, 520.0),
                kp(names::RIGHT_KNEE, 230.0, 380.0),
                kp(names::LEFT_ANKLE, 350.0, 650.0),
                kp(names::RIGHT_ANKLE, 230.0, 460.0),
            ],
        )
    }

    #[tokio::test]
    async fn test_correct_single_leg_stance_is_not_penalised() {
        let (clock, _store, service) = service();
        service.start_session(SessionMode::Single).await;
        let selection = service
            .set_exercise(&ExerciseId::new("single_leg_stance_left"))
            .await
            .unwrap();
        assert_eq!(selection.view, biomech_core::CameraView::Front);
        assert_eq!(selection.limits.angle_asymmetry, Some(200.0));

        service.start_recording(StartMode::Immediate).await.unwrap();
        for _ in 0..21 {
            service.process_frame(&left_leg_stance(clock.now()), SIZE).await.unwrap();
            clock.advance_secs(0.05);
        }

        let result = service.record_completed(None).await.unwrap().unwrap();
        assert!((result.measured_angles[&AngleName::RightKnee] - 90.0).abs() < 1e-6);
        assert!(!result.pattern_flags.contains(&PatternFlag::StaticKneeAsymmetry));
        assert!(!result.pattern_flags.contains(&PatternFlag::StaticLateralShift));
        assert!(result.asymmetries.is_empty());
        assert!(result.deviations.iter().all(|d| d.within_tolerance));
        assert_eq!(result.score, 100);
        assert_eq!(result.status, biomech_assessment::AssessmentStatus::Excellent);
    }
}
