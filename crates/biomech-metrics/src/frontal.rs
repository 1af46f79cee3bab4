//! Frontal-plane metrics for front-facing exercises.
//!
//! A [`FrontalAnalyzer`] is an optional collaborator: when present its output
//! is merged into the static metrics, when absent the frontal pattern flags are
//! simply not evaluated.

use biomech_core::{angle_between_points, available_midpoint, names, FrameSize, PoseFrame};
use serde::{Deserialize, Serialize};

/// Frontal-plane alignment measurements
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontalMetrics {
    /// Medial knee collapse, degrees (0 when aligned or varus)
    pub knee_valgus_left: Option<f64>,
    pub knee_valgus_right: Option<f64>,
    /// Hip line inclination from horizontal, degrees
    pub pelvic_tilt: Option<f64>,
    /// Horizontal offset of the shoulder midpoint from the base of support, normalized
    pub lateral_trunk_shift: Option<f64>,
}

impl FrontalMetrics {
    pub fn max_knee_valgus(&self) -> Option<f64> {
        match (self.knee_valgus_left, self.knee_valgus_right) {
            (Some(l), Some(r)) => Some(l.max(r)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.knee_valgus_left.is_none()
            && self.knee_valgus_right.is_none()
            && self.pelvic_tilt.is_none()
            && self.lateral_trunk_shift.is_none()
    }
}

/// Source of frontal metrics for the current exercise
pub trait FrontalAnalyzer: Send {
    /// Feed one frame; returns the current estimate, if any
    fn analyze(&mut self, frame: &PoseFrame, size: FrameSize) -> Option<FrontalMetrics>;

    /// Forget accumulated state (called on exercise change)
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Frontal analyzer working directly from 2D keypoints.
///
/// Keeps a running mean of each measurement since the last reset.
#[derive(Debug, Clone, Default)]
pub struct KeypointFrontalAnalyzer {
    min_confidence: f64,
    valgus_left: RunningMean,
    valgus_right: RunningMean,
    pelvic_tilt: RunningMean,
    lateral_shift: RunningMean,
}

impl KeypointFrontalAnalyzer {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            ..Default::default()
        }
    }

    /// Single-frame measurement without accumulation
    pub fn measure(&self, frame: &PoseFrame, size: FrameSize) -> FrontalMetrics {
        let point = |name: &str| {
            frame
                .confident(name, self.min_confidence)
                .map(|kp| kp.position())
        };

        let left_hip = point(names::LEFT_HIP);
        let right_hip = point(names::RIGHT_HIP);
        let hip_mid = available_midpoint(left_hip, right_hip);

        type Point = Option<(f64, f64)>;
        let knee_valgus = |hip: Point, knee: Point, ankle: Point| {
            let (hip, knee, ankle, mid) = (hip?, knee?, ankle?, hip_mid?);
            Some(valgus_angle(hip, knee, ankle, mid.0))
        };

        let pelvic_tilt = match (left_hip, right_hip) {
            (Some(l), Some(r)) => {
                let dx = (r.0 - l.0).abs();
                let dy = (r.1 - l.1).abs();
                Some(if dx == 0.0 { 90.0 } else { (dy / dx).atan().to_degrees() })
            }
            _ => None,
        };

        let shoulders =
            available_midpoint(point(names::LEFT_SHOULDER), point(names::RIGHT_SHOULDER));
        let base =
            base_of_support(point(names::LEFT_ANKLE), point(names::RIGHT_ANKLE), size.height);
        let lateral_trunk_shift = match (shoulders, base) {
            (Some(s), Some(a)) if size.width > 0.0 => Some((s.0 - a.0).abs() / size.width),
            _ => None,
        };

        FrontalMetrics {
            knee_valgus_left: knee_valgus(
                left_hip,
                point(names::LEFT_KNEE),
                point(names::LEFT_ANKLE),
            ),
            knee_valgus_right: knee_valgus(
                right_hip,
                point(names::RIGHT_KNEE),
                point(names::RIGHT_ANKLE),
            ),
            pelvic_tilt,
            lateral_trunk_shift,
        }
    }

    fn current(&self) -> FrontalMetrics {
        FrontalMetrics {
            knee_valgus_left: self.valgus_left.value(),
            knee_valgus_right: self.valgus_right.value(),
            pelvic_tilt: self.pelvic_tilt.value(),
            lateral_trunk_shift: self.lateral_shift.value(),
        }
    }
}

impl FrontalAnalyzer for KeypointFrontalAnalyzer {
    fn analyze(&mut self, frame: &PoseFrame, size: FrameSize) -> Option<FrontalMetrics> {
        if frame.is_valid {
            let m = self.measure(frame, size);
            self.valgus_left.push(m.knee_valgus_left);
            self.valgus_right.push(m.knee_valgus_right);
            self.pelvic_tilt.push(m.pelvic_tilt);
            self.lateral_shift.push(m.lateral_trunk_shift);
        }

        let current = self.current();
        (!current.is_empty()).then_some(current)
    }

    fn reset(&mut self) {
        *self = Self::new(self.min_confidence);
    }
}

/// An ankle this far above the other (share of frame height) is off the ground
const LIFTED_FOOT_SHARE: f64 = 0.05;

/// Ground contact point: both ankles, or only the lower one when a foot is lifted
fn base_of_support(
    left: Option<(f64, f64)>,
    right: Option<(f64, f64)>,
    frame_height: f64,
) -> Option<(f64, f64)> {
    match (left, right) {
        (Some(l), Some(r)) if (l.1 - r.1).abs() > LIFTED_FOOT_SHARE * frame_height => {
            Some(if l.1 > r.1 { l } else { r })
        }
        (l, r) => available_midpoint(l, r),
    }
}

/// Knee deviation from the hip–ankle line toward the body midline, in degrees.
///
/// Returns 0 when the knee sits on or lateral to the line.
fn valgus_angle(hip: (f64, f64), knee: (f64, f64), ankle: (f64, f64), midline_x: f64) -> f64 {
    let span = ankle.1 - hip.1;
    if span.abs() < f64::EPSILON {
        return 0.0;
    }

    let t = (knee.1 - hip.1) / span;
    let line_x = hip.0 + (ankle.0 - hip.0) * t;
    let medial = (knee.0 - midline_x).abs() < (line_x - midline_x).abs();

    if medial {
        (180.0 - angle_between_points(hip, knee, ankle)).max(0.0)
    } else {
        0.0
    }
}
