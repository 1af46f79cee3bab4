//! Per-frame joint angle extraction.

use biomech_core::{
    angle_between_points, angle_from_vertical, available_midpoint, names, AngleName, PoseFrame,
};
use serde::{Deserialize, Serialize};

/// Joint angles for a single frame, in degrees.
///
/// An angle is `None` when any keypoint it depends on is missing or below the
/// confidence threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAngles {
    pub left_knee: Option<f64>,
    pub right_knee: Option<f64>,
    pub left_hip: Option<f64>,
    pub right_hip: Option<f64>,
    pub left_ankle: Option<f64>,
    pub right_ankle: Option<f64>,
    pub trunk_lean: Option<f64>,
}

impl StaticAngles {
    pub fn get(&self, angle: AngleName) -> Option<f64> {
        match angle {
            AngleName::LeftKnee => self.left_knee,
            AngleName::RightKnee => self.right_knee,
            AngleName::LeftHip => self.left_hip,
            AngleName::RightHip => self.right_hip,
            AngleName::LeftAnkle => self.left_ankle,
            AngleName::RightAnkle => self.right_ankle,
            AngleName::TrunkLean => self.trunk_lean,
        }
    }

    /// Present angles only
    pub fn iter(&self) -> impl Iterator<Item = (AngleName, f64)> + '_ {
        AngleName::ALL
            .into_iter()
            .filter_map(move |name| self.get(name).map(|v| (name, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Computes [`StaticAngles`] from keypoints
#[derive(Debug, Clone)]
pub struct AngleComputer {
    min_confidence: f64,
}

impl AngleComputer {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn compute(&self, frame: &PoseFrame) -> StaticAngles {
        if !frame.is_valid {
            return StaticAngles::default();
        }

        let angle = |first, vertex, last| self.joint_angle(frame, first, vertex, last);
        StaticAngles {
            left_knee: angle(names::LEFT_HIP, names::LEFT_KNEE, names::LEFT_ANKLE),
            right_knee: angle(names::RIGHT_HIP, names::RIGHT_KNEE, names::RIGHT_ANKLE),
            left_hip: angle(names::LEFT_SHOULDER, names::LEFT_HIP, names::LEFT_KNEE),
            right_hip: angle(names::RIGHT_SHOULDER, names::RIGHT_HIP, names::RIGHT_KNEE),
            left_ankle: angle(names::LEFT_KNEE, names::LEFT_ANKLE, names::LEFT_FOOT_INDEX),
            right_ankle: angle(names::RIGHT_KNEE, names::RIGHT_ANKLE, names::RIGHT_FOOT_INDEX),
            trunk_lean: self.trunk_lean(frame),
        }
    }

    /// Angle at `vertex` between `first` and `last`
    fn joint_angle(&self, frame: &PoseFrame, first: &str, vertex: &str, last: &str) -> Option<f64> {
        let a = frame.confident(first, self.min_confidence)?;
        let b = frame.confident(vertex, self.min_confidence)?;
        let c = frame.confident(last, self.min_confidence)?;
        Some(angle_between_points(a.position(), b.position(), c.position()))
    }

    /// Lean of the hip-midpoint → shoulder-midpoint segment from vertical
    fn trunk_lean(&self, frame: &PoseFrame) -> Option<f64> {
        let point = |name: &str| frame.confident(name, self.min_confidence).map(|kp| kp.position());

        let shoulders =
            available_midpoint(point(names::LEFT_SHOULDER), point(names::RIGHT_SHOULDER))?;
        let hips = available_midpoint(point(names::LEFT_HIP), point(names::RIGHT_HIP))?;

        Some(angle_from_vertical(shoulders, hips))
    }
}

impl Default for AngleComputer {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use biomech_core::{Keypoint, Timestamp};

    /// Upright subject facing the camera, 640x720 frame
    pub(crate) fn standing_frame(t_ms: f64) -> PoseFrame {
        PoseFrame::new(
            Timestamp::from_millis(t_ms),
            vec![
                Keypoint::new(names::LEFT_SHOULDER, 380.0, 180.0, 0.95),
                Keypoint::new(names::RIGHT_SHOULDER, 260.0, 180.0, 0.95),
                Keypoint::new(names::LEFT_HIP, 360.0, 380.0, 0.94),
                Keypoint::new(names::RIGHT_HIP, 280.0, 380.0, 0.94),
                Keypoint::new(names::LEFT_KNEE, 360.0, 520.0, 0.93),
                Keypoint::new(names::RIGHT_KNEE, 280.0, 520.0, 0.93),
                Keypoint::new(names::LEFT_ANKLE, 360.0, 650.0, 0.91),
                Keypoint::new(names::RIGHT_ANKLE, 280.0, 650.0, 0.91),
                Keypoint::new(names::LEFT_FOOT_INDEX, 385.0, 680.0, 0.82),
                Keypoint::new(names::RIGHT_FOOT_INDEX, 255.0, 680.0, 0.82),
            ],
        )
    }

    #[test]
    fn test_straight_legs() {
        let angles = AngleComputer::default().compute(&standing_frame(0.0));
        assert!((angles.left_knee.unwrap() - 180.0).abs() < 1e-6);
        assert!((angles.right_knee.unwrap() - 180.0).abs() < 1e-6);
        assert!(angles.trunk_lean.unwrap().abs() < 1e-6);
        assert!(angles.left_ankle.unwrap() > 90.0);
    }

    #[test]
    fn test_low_confidence_yields_none() {
        let mut frame = standing_frame(0.0);
        for kp in frame.keypoints.iter_mut() {
            if kp.name == names::LEFT_ANKLE {
                kp.score = 0.1;
            }
        }

        let angles = AngleComputer::default().compute(&frame);
        assert_eq!(angles.left_knee, None);
        assert_eq!(angles.left_ankle, None);
        assert!(angles.right_knee.is_some());
        assert!(angles.left_hip.is_some());
    }

    #[test]
    fn test_trunk_lean_single_side() {
        let mut frame = standing_frame(0.0);
        frame
            .keypoints
            .retain(|kp| kp.name != names::RIGHT_SHOULDER && kp.name != names::RIGHT_HIP);
        // Shift the remaining shoulder forward to create a lean
        for kp in frame.keypoints.iter_mut() {
            if kp.name == names::LEFT_SHOULDER {
                kp.x = 560.0;
                kp.y = 180.0;
            }
        }

        let angles = AngleComputer::default().compute(&frame);
        // dx = 200, dy = 200
        assert!((angles.trunk_lean.unwrap() - 45.0).abs() < 1e-6);
        assert_eq!(angles.right_knee, None);
    }

    #[test]
    fn test_invalid_frame() {
        let mut frame = standing_frame(0.0);
        frame.is_valid = false;
        assert!(AngleComputer::default().compute(&frame).is_empty());
    }
}
