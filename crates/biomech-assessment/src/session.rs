//! Assessment session lifecycle.
//!
//! ```text
//! none ──start_session──► active ──end_session──► finalized
//!                           ▲                         │
//!                           └──────start_session──────┘
//! ```
//!
//! Results are keyed by exercise id. Recording an exercise again replaces its
//! result as a whole; results are never edited in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use biomech_core::{
    AngleName, CameraView, Clock, Error, ExerciseId, PatternFlag, Result, SessionId, SystemClock,
};
use biomech_metrics::{FrontalMetrics, StaticMetrics, StaticThresholds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deviation::{AngleDeviation, DeviationCalculator};
use crate::observations::{
    AsymmetryObservation, Findings, InstabilityObservation, ObservationAnalyzer,
};
use crate::pain::{PainPredictor, PredictedPain, RuleBasedPainPredictor};
use crate::persistence::SessionStore;
use crate::recommendations::{RecommendationBundle, RecommendationEngine};
use crate::scoring::{AssessmentStatus, ScoringEngine};
use crate::standards::{ExerciseCategory, ExerciseStandardsRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// One exercise picked by the user
    Single,
    /// The full assessment battery
    Full,
}

/// Pain reported by the subject during an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedPain {
    pub location: String,
    /// 0 (none) to 10 (worst)
    pub intensity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Metrics persisted with a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub sample_count: usize,
    pub sway_x: f64,
    pub sway_y: f64,
    pub sway_total: f64,
    pub knee_angle_asymmetry: Option<f64>,
    pub hip_angle_asymmetry: Option<f64>,
    pub hip_height_asymmetry: Option<f64>,
    pub shoulder_height_asymmetry: Option<f64>,
    pub max_variability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontal: Option<FrontalMetrics>,
}

impl From<&StaticMetrics> for MetricsSummary {
    fn from(m: &StaticMetrics) -> Self {
        Self {
            sample_count: m.sample_count,
            sway_x: m.sway.x,
            sway_y: m.sway.y,
            sway_total: m.sway.total,
            knee_angle_asymmetry: m.asymmetry.knee_angle,
            hip_angle_asymmetry: m.asymmetry.hip_angle,
            hip_height_asymmetry: m.asymmetry.hip_height,
            shoulder_height_asymmetry: m.asymmetry.shoulder_height,
            max_variability: m.max_variability().map(|(_, v)| v),
            frontal: m.frontal,
        }
    }
}

/// Input for one finished exercise recording
#[derive(Debug, Clone)]
pub struct ExerciseRecording {
    pub exercise_id: ExerciseId,
    pub duration_secs: f64,
    pub frame_count: usize,
    pub measured_angles: BTreeMap<AngleName, f64>,
    pub metrics: StaticMetrics,
    pub reported_pain: Option<ReportedPain>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseAssessmentResult {
    pub exercise_id: ExerciseId,
    pub exercise_name: String,
    pub category: Option<ExerciseCategory>,
    pub duration_secs: f64,
    pub frame_count: usize,
    pub measured_angles: BTreeMap<AngleName, f64>,
    pub deviations: Vec<AngleDeviation>,
    pub pattern_flags: Vec<PatternFlag>,
    pub metrics: MetricsSummary,
    pub asymmetries: Vec<AsymmetryObservation>,
    pub instabilities: Vec<InstabilityObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_pain: Option<ReportedPain>,
    pub score: u8,
    pub status: AssessmentStatus,
    pub recommendations: RecommendationBundle,
    pub probable_pains: Vec<PredictedPain>,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub exercise_count: usize,
    pub average_score: f64,
    /// Flags raised in at least two exercises, most frequent first
    pub common_issues: Vec<PatternFlag>,
    /// Exercises scoring 85 or more
    pub strengths: Vec<ExerciseId>,
    /// Exercises scoring below 70
    pub areas_for_improvement: Vec<ExerciseId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: SessionId,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub results: Vec<ExerciseAssessmentResult>,
    pub global_recommendations: RecommendationBundle,
    pub summary: SessionSummary,
}

impl AssessmentSession {
    pub fn new(mode: SessionMode, started_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            started_at,
            ended_at: None,
            results: Vec::new(),
            global_recommendations: RecommendationBundle::default(),
            summary: SessionSummary::default(),
        }
    }

    pub fn result(&self, id: &ExerciseId) -> Option<&ExerciseAssessmentResult> {
        self.results.iter().find(|r| &r.exercise_id == id)
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Summary statistics over a list of results
pub fn summarize(results: &[ExerciseAssessmentResult]) -> SessionSummary {
    let exercise_count = results.len();
    let average_score = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.score as f64).sum::<f64>() / exercise_count as f64
    };

    let mut counts: BTreeMap<PatternFlag, usize> = BTreeMap::new();
    for result in results {
        for flag in &result.pattern_flags {
            *counts.entry(*flag).or_default() += 1;
        }
    }
    let mut common: Vec<(PatternFlag, usize)> =
        counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    common.sort_by(|a, b| b.1.cmp(&a.1));

    SessionSummary {
        exercise_count,
        average_score,
        common_issues: common.into_iter().map(|(flag, _)| flag).collect(),
        strengths: results
            .iter()
            .filter(|r| r.score >= 85)
            .map(|r| r.exercise_id.clone())
            .collect(),
        areas_for_improvement: results
            .iter()
            .filter(|r| r.score < 70)
            .map(|r| r.exercise_id.clone())
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    None,
    Active,
    Finalized,
}

enum SessionState {
    None,
    Active(AssessmentSession),
    Finalized(AssessmentSession),
}

pub struct AssessmentSessionManager {
    registry: Arc<ExerciseStandardsRegistry>,
    observations: ObservationAnalyzer,
    deviations: DeviationCalculator,
    scoring: ScoringEngine,
    recommendations: RecommendationEngine,
    pain: Arc<dyn PainPredictor>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    state: SessionState,
}

impl AssessmentSessionManager {
    pub fn new(registry: Arc<ExerciseStandardsRegistry>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            registry,
            observations: ObservationAnalyzer::default(),
            deviations: DeviationCalculator,
            scoring: ScoringEngine,
            recommendations: RecommendationEngine,
            pain: Arc::new(RuleBasedPainPredictor),
            store,
            clock: Arc::new(SystemClock),
            state: SessionState::None,
        }
    }

    pub fn with_pain_predictor(mut self, predictor: Arc<dyn PainPredictor>) -> Self {
        self.pain = predictor;
        self
    }

    pub fn with_thresholds(mut self, thresholds: StaticThresholds) -> Self {
        self.observations = ObservationAnalyzer::new(thresholds);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &ExerciseStandardsRegistry {
        &self.registry
    }

    pub fn set_registry(&mut self, registry: Arc<ExerciseStandardsRegistry>) {
        self.registry = registry;
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().to_datetime()
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::None => SessionPhase::None,
            SessionState::Active(_) => SessionPhase::Active,
            SessionState::Finalized(_) => SessionPhase::Finalized,
        }
    }

    pub fn session(&self) -> Option<&AssessmentSession> {
        match &self.state {
            SessionState::None => None,
            SessionState::Active(s) | SessionState::Finalized(s) => Some(s),
        }
    }

    /// Begin a fresh session, discarding any previous results
    pub fn start_session(&mut self, mode: SessionMode) -> SessionId {
        if let SessionState::Active(previous) = &self.state {
            tracing::warn!("Discarding unfinished session {}", previous.id);
        }

        let session = AssessmentSession::new(mode, self.now());
        let id = session.id;
        tracing::info!("Started {:?} assessment session {}", mode, id);
        self.state = SessionState::Active(session);
        id
    }

    fn active_mut(&mut self) -> Result<&mut AssessmentSession> {
        match &mut self.state {
            SessionState::Active(s) => Ok(s),
            SessionState::Finalized(s) => Err(Error::SessionFinalized(s.id.to_string())),
            SessionState::None => Err(Error::NoActiveSession),
        }
    }

    /// Score one exercise and store the result, replacing any earlier one
    pub fn record_exercise_result(
        &mut self,
        input: ExerciseRecording,
    ) -> Result<ExerciseAssessmentResult> {
        if let Some(pain) = &input.reported_pain {
            if pain.intensity > 10 {
                return Err(Error::InvalidInput(format!(
                    "pain intensity {} outside 0-10",
                    pain.intensity
                )));
            }
        }
        self.active_mut()?;

        let result = self.assess(input);
        tracing::info!(
            "Recorded {}: score {} ({})",
            result.exercise_id,
            result.score,
            result.status.as_str()
        );

        let session = self.active_mut()?;
        match session.results.iter_mut().find(|r| r.exercise_id == result.exercise_id) {
            Some(existing) => *existing = result.clone(),
            None => session.results.push(result.clone()),
        }
        Ok(result)
    }

    fn assess(&self, input: ExerciseRecording) -> ExerciseAssessmentResult {
        let definition = self.registry.definition(&input.exercise_id);
        let standard = definition.map(|d| &d.standard);
        let view = definition.map(|d| d.camera_view).unwrap_or(CameraView::Either);
        if definition.is_none() {
            tracing::warn!(
                "No standard for exercise {}, scoring without deviations",
                input.exercise_id
            );
        }

        let deviations = self.deviations.calculate(&input.measured_angles, standard);
        let asymmetries = self.observations.asymmetries(&input.metrics, standard);
        let instabilities = self.observations.instabilities(&input.metrics, standard, view);
        let flags: Vec<PatternFlag> = input.metrics.pattern_flags.iter().copied().collect();

        let score = self
            .scoring
            .score(&deviations, input.metrics.sway.total, &flags, &asymmetries);
        tracing::debug!("Score breakdown for {}: {:?}", input.exercise_id, score.breakdown);

        let findings = Findings {
            flags,
            asymmetries,
            instabilities,
            deviations,
            category: definition.map(|d| d.category),
        };
        let recommendations = self.recommendations.generate(&findings);
        let probable_pains = self.pain.predict(&findings);

        let exercise_name = definition
            .map(|d| d.name.clone())
            .unwrap_or_else(|| input.exercise_id.to_string());
        let summary = result_summary(&exercise_name, score.score, score.status, &findings);

        let Findings {
            flags,
            asymmetries,
            instabilities,
            deviations,
            category,
        } = findings;

        ExerciseAssessmentResult {
            exercise_id: input.exercise_id,
            exercise_name,
            category,
            duration_secs: input.duration_secs,
            frame_count: input.frame_count,
            measured_angles: input.measured_angles,
            deviations,
            pattern_flags: flags,
            metrics: MetricsSummary::from(&input.metrics),
            asymmetries,
            instabilities,
            reported_pain: input.reported_pain,
            score: score.score,
            status: score.status,
            recommendations,
            probable_pains,
            summary,
            recorded_at: self.now(),
        }
    }

    pub fn get_exercise_result(&self, id: &ExerciseId) -> Option<&ExerciseAssessmentResult> {
        self.session()?.result(id)
    }

    /// Remove a result so the exercise can be recorded again
    pub fn clear_exercise_result(
        &mut self,
        id: &ExerciseId,
    ) -> Result<Option<ExerciseAssessmentResult>> {
        let session = self.active_mut()?;
        let removed = session
            .results
            .iter()
            .position(|r| &r.exercise_id == id)
            .map(|i| session.results.remove(i));
        if removed.is_some() {
            tracing::info!("Cleared result for {}", id);
        }
        Ok(removed)
    }

    pub fn results(&self) -> &[ExerciseAssessmentResult] {
        self.session().map(|s| s.results.as_slice()).unwrap_or(&[])
    }

    /// Finalize and persist the session.
    ///
    /// Returns `None` when no session was started. Calling again after
    /// finalization returns the same session.
    pub fn end_session(&mut self) -> Option<AssessmentSession> {
        let state = std::mem::replace(&mut self.state, SessionState::None);
        let session = match state {
            SessionState::None => return None,
            SessionState::Finalized(session) => session,
            SessionState::Active(mut session) => {
                session.global_recommendations = self
                    .recommendations
                    .aggregate(session.results.iter().map(|r| &r.recommendations));
                session.summary = summarize(&session.results);
                session.ended_at = Some(self.now());
                tracing::info!(
                    "Session {} finalized: {} exercises, average score {:.1}",
                    session.id,
                    session.summary.exercise_count,
                    session.summary.average_score
                );
                session
            }
        };

        if let Err(e) = self.store.save(&session) {
            tracing::warn!("Failed to persist session {}: {}", session.id, e);
        }

        self.state = SessionState::Finalized(session.clone());
        Some(session)
    }

    pub fn recent_sessions(&self, n: usize) -> Result<Vec<AssessmentSession>> {
        self.store.load_recent(n)
    }
}

fn result_summary(name: &str, score: u8, status: AssessmentStatus, findings: &Findings) -> String {
    let mut text = format!("{}: {}/100 ({}).", name, score, status.as_str());

    let off = findings.deviations.iter().filter(|d| d.status.is_problem()).count();
    if off > 0 {
        text.push_str(&format!(" {} angle(s) outside tolerance.", off));
    }

    if findings.flags.is_empty() {
        text.push_str(" No compensation patterns detected.");
    } else {
        let issues: Vec<&str> = findings.flags.iter().map(|f| f.description()).collect();
        text.push_str(&format!(" Detected: {}.", issues.join("; ")));
    }

    if let Some(worst) = findings.asymmetries.iter().max_by_key(|a| a.significance) {
        text.push_str(&format!(" Largest imbalance: {}.", worst.description));
    }
    text
}
