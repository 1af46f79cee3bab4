//! Fundamental types for the BiomechCoach engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Assessment session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Pose providers report frame times in milliseconds
    pub fn from_millis(millis: f64) -> Self {
        Self((millis * 1_000_000.0).round() as i64)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000_000.0).round() as i64)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Seconds elapsed since `earlier`; negative if `earlier` is in the future.
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0) as f64 / 1_000_000_000.0
    }

    pub fn add_secs(&self, secs: f64) -> Self {
        Self(self.0 + (secs * 1_000_000_000.0).round() as i64)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

/// Identifier of an assessable exercise (e.g. `single_leg_stance_left`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExerciseId(pub String);

impl ExerciseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExerciseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Body side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Camera view an exercise must be filmed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraView {
    Side,
    Front,
    Either,
}

impl CameraView {
    /// Whether frontal-plane metrics apply to this view
    pub fn uses_frontal_metrics(&self) -> bool {
        matches!(self, CameraView::Front | CameraView::Either)
    }
}

/// Keypoint names as emitted by the pose provider (MediaPipe naming)
pub mod names {
    pub const NOSE: &str = "nose";
    pub const LEFT_SHOULDER: &str = "left_shoulder";
    pub const RIGHT_SHOULDER: &str = "right_shoulder";
    pub const LEFT_ELBOW: &str = "left_elbow";
    pub const RIGHT_ELBOW: &str = "right_elbow";
    pub const LEFT_WRIST: &str = "left_wrist";
    pub const RIGHT_WRIST: &str = "right_wrist";
    pub const LEFT_HIP: &str = "left_hip";
    pub const RIGHT_HIP: &str = "right_hip";
    pub const LEFT_KNEE: &str = "left_knee";
    pub const RIGHT_KNEE: &str = "right_knee";
    pub const LEFT_ANKLE: &str = "left_ankle";
    pub const RIGHT_ANKLE: &str = "right_ankle";
    pub const LEFT_HEEL: &str = "left_heel";
    pub const RIGHT_HEEL: &str = "right_heel";
    pub const LEFT_FOOT_INDEX: &str = "left_foot_index";
    pub const RIGHT_FOOT_INDEX: &str = "right_foot_index";
}

/// A named 2D/3D anatomical landmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Detection confidence [0, 1]
    pub score: f64,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64, score: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z: None,
            score,
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Width and height of the source video frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

impl FrameSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> crate::Result<()> {
        let positive = |v: f64| v > 0.0 && v.is_finite();
        if positive(self.width) && positive(self.height) {
            Ok(())
        } else {
            Err(crate::Error::FrameSize {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// One frame of keypoints from the pose provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseFrame {
    pub timestamp: Timestamp,
    pub keypoints: Vec<Keypoint>,
    pub is_valid: bool,
}

impl PoseFrame {
    pub fn new(timestamp: Timestamp, keypoints: Vec<Keypoint>) -> Self {
        let is_valid = !keypoints.is_empty();
        Self {
            timestamp,
            keypoints,
            is_valid,
        }
    }

    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }

    /// Keypoint by name, only if its score reaches `min_confidence`
    pub fn confident(&self, name: &str, min_confidence: f64) -> Option<&Keypoint> {
        self.keypoint(name).filter(|kp| kp.score >= min_confidence)
    }
}

/// Joint angles tracked by the static assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleName {
    LeftKnee,
    RightKnee,
    LeftHip,
    RightHip,
    LeftAnkle,
    RightAnkle,
    TrunkLean,
}

impl AngleName {
    pub const ALL: [AngleName; 7] = [
        AngleName::LeftKnee,
        AngleName::RightKnee,
        AngleName::LeftHip,
        AngleName::RightHip,
        AngleName::LeftAnkle,
        AngleName::RightAnkle,
        AngleName::TrunkLean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AngleName::LeftKnee => "left_knee",
            AngleName::RightKnee => "right_knee",
            AngleName::LeftHip => "left_hip",
            AngleName::RightHip => "right_hip",
            AngleName::LeftAnkle => "left_ankle",
            AngleName::RightAnkle => "right_ankle",
            AngleName::TrunkLean => "trunk_lean",
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            AngleName::LeftKnee | AngleName::LeftHip | AngleName::LeftAnkle => Some(Side::Left),
            AngleName::RightKnee | AngleName::RightHip | AngleName::RightAnkle => Some(Side::Right),
            AngleName::TrunkLean => None,
        }
    }

    /// Joint name without side, used when grouping recommendations
    pub fn joint(&self) -> &'static str {
        match self {
            AngleName::LeftKnee | AngleName::RightKnee => "knee",
            AngleName::LeftHip | AngleName::RightHip => "hip",
            AngleName::LeftAnkle | AngleName::RightAnkle => "ankle",
            AngleName::TrunkLean => "trunk",
        }
    }
}

impl fmt::Display for AngleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compensatory movement signatures detected from thresholded metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFlag {
    StaticInstability,
    StaticHipDrop,
    StaticShoulderAsymmetry,
    StaticKneeAsymmetry,
    StaticTrunkLean,
    StaticJointTremor,
    StaticKneeValgus,
    StaticPelvicTilt,
    StaticLateralShift,
}

impl PatternFlag {
    pub const ALL: [PatternFlag; 9] = [
        PatternFlag::StaticInstability,
        PatternFlag::StaticHipDrop,
        PatternFlag::StaticShoulderAsymmetry,
        PatternFlag::StaticKneeAsymmetry,
        PatternFlag::StaticTrunkLean,
        PatternFlag::StaticJointTremor,
        PatternFlag::StaticKneeValgus,
        PatternFlag::StaticPelvicTilt,
        PatternFlag::StaticLateralShift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternFlag::StaticInstability => "static_instability",
            PatternFlag::StaticHipDrop => "static_hip_drop",
            PatternFlag::StaticShoulderAsymmetry => "static_shoulder_asymmetry",
            PatternFlag::StaticKneeAsymmetry => "static_knee_asymmetry",
            PatternFlag::StaticTrunkLean => "static_trunk_lean",
            PatternFlag::StaticJointTremor => "static_joint_tremor",
            PatternFlag::StaticKneeValgus => "static_knee_valgus",
            PatternFlag::StaticPelvicTilt => "static_pelvic_tilt",
            PatternFlag::StaticLateralShift => "static_lateral_shift",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PatternFlag::StaticInstability => "Excessive postural sway while holding the position",
            PatternFlag::StaticHipDrop => "One hip sits noticeably lower than the other",
            PatternFlag::StaticShoulderAsymmetry => "Uneven shoulder height",
            PatternFlag::StaticKneeAsymmetry => "Left and right knee angles differ",
            PatternFlag::StaticTrunkLean => "Trunk leans away from vertical",
            PatternFlag::StaticJointTremor => "Joint angles fluctuate during the hold",
            PatternFlag::StaticKneeValgus => "Knee collapses inward",
            PatternFlag::StaticPelvicTilt => "Pelvis tilts in the frontal plane",
            PatternFlag::StaticLateralShift => "Trunk shifts sideways over the base of support",
        }
    }

    /// Flags that can only be raised from frontal-view metrics
    pub fn requires_frontal_view(&self) -> bool {
        matches!(
            self,
            PatternFlag::StaticKneeValgus
                | PatternFlag::StaticPelvicTilt
                | PatternFlag::StaticLateralShift
        )
    }
}

impl fmt::Display for PatternFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
