//! Static stability metrics and pattern detection.
//!
//! Reduces a [`RawMetricsHistory`] into:
//!
//! - **Sway**: standard deviation of the centre-of-mass proxy on each axis,
//!   combined as `sqrt(sway_x² + sway_y²)`
//! - **Asymmetry**: latest left/right differences of knee and hip angles and of
//!   hip and shoulder heights
//! - **Variability**: standard deviation of every angle history
//! - **Pattern flags**: independent booleans, each raised when one metric is
//!   strictly greater than its configured threshold

use biomech_core::{AngleName, CameraView, PatternFlag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::frontal::FrontalMetrics;
use crate::history::{RawMetricsHistory, Series};

/// Thresholds for pattern detection.
///
/// These are configuration values; the defaults are placeholders meant to be
/// overridden per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticThresholds {
    /// Total sway (normalized units)
    pub sway: f64,
    /// Hip height difference (normalized units)
    pub hip_drop: f64,
    /// Shoulder height difference (normalized units)
    pub shoulder_asymmetry: f64,
    /// Knee angle difference (degrees)
    pub knee_asymmetry: f64,
    /// Mean trunk lean from vertical (degrees)
    pub trunk_lean: f64,
    /// Largest per-angle standard deviation (degrees)
    pub angle_variability: f64,
    /// Largest knee valgus (degrees)
    pub knee_valgus: f64,
    /// Pelvic tilt (degrees)
    pub pelvic_tilt: f64,
    /// Lateral trunk shift (normalized units)
    pub lateral_shift: f64,
}

impl Default for StaticThresholds {
    fn default() -> Self {
        Self {
            sway: 0.02,
            hip_drop: 0.03,
            shoulder_asymmetry: 0.03,
            knee_asymmetry: 10.0,
            trunk_lean: 10.0,
            angle_variability: 5.0,
            knee_valgus: 10.0,
            pelvic_tilt: 5.0,
            lateral_shift: 0.05,
        }
    }
}

impl StaticThresholds {
    /// Thresholds with the selected exercise's limits applied
    pub fn with_limits(&self, limits: &ExerciseLimits) -> Self {
        let mut thresholds = *self;
        if let Some(angle) = limits.angle_asymmetry {
            thresholds.knee_asymmetry = angle;
        }
        thresholds
    }
}

/// Per-exercise overrides of the global thresholds.
///
/// A unilateral hold allows a left/right angle difference far wider than the
/// global knee asymmetry threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExerciseLimits {
    /// Left/right joint angle difference (degrees)
    pub angle_asymmetry: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwayMetrics {
    pub x: f64,
    pub y: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AsymmetryMetrics {
    /// |left knee − right knee|, degrees
    pub knee_angle: Option<f64>,
    /// |left hip − right hip|, degrees
    pub hip_angle: Option<f64>,
    /// |left hip y − right hip y|, normalized
    pub hip_height: Option<f64>,
    /// |left shoulder y − right shoulder y|, normalized
    pub shoulder_height: Option<f64>,
    /// Side whose hip sits lower in the image (larger y)
    pub lower_hip: Option<biomech_core::Side>,
    pub lower_shoulder: Option<biomech_core::Side>,
}

/// Snapshot of the static metrics at one recomputation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticMetrics {
    pub sample_count: usize,
    pub sway: SwayMetrics,
    pub asymmetry: AsymmetryMetrics,
    pub variability: BTreeMap<AngleName, f64>,
    pub mean_angles: BTreeMap<AngleName, f64>,
    pub frontal: Option<FrontalMetrics>,
    pub pattern_flags: BTreeSet<PatternFlag>,
}

impl StaticMetrics {
    pub fn has_flag(&self, flag: PatternFlag) -> bool {
        self.pattern_flags.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn max_variability(&self) -> Option<(AngleName, f64)> {
        self.variability
            .iter()
            .map(|(k, v)| (*k, *v))
            .fold(None, |best, (k, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((k, v)),
            })
    }
}

/// Computes [`StaticMetrics`] from raw history
#[derive(Debug, Clone)]
pub struct StaticMetricsCalculator {
    thresholds: StaticThresholds,
    min_samples: usize,
}

impl StaticMetricsCalculator {
    pub fn new(thresholds: StaticThresholds, min_samples: usize) -> Self {
        Self {
            thresholds,
            min_samples: min_samples.max(1),
        }
    }

    pub fn thresholds(&self) -> &StaticThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: StaticThresholds) {
        self.thresholds = thresholds;
    }

    /// Reduce `history` to metrics using the global thresholds
    pub fn calculate(
        &self,
        history: &RawMetricsHistory,
        frontal: Option<&FrontalMetrics>,
        view: CameraView,
    ) -> StaticMetrics {
        self.calculate_with_limits(history, frontal, view, &ExerciseLimits::default())
    }

    /// Reduce `history` to metrics.
    ///
    /// `frontal` is merged only when `view` uses frontal metrics. Histories
    /// with fewer than `min_samples` frames yield empty metrics.
    pub fn calculate_with_limits(
        &self,
        history: &RawMetricsHistory,
        frontal: Option<&FrontalMetrics>,
        view: CameraView,
        limits: &ExerciseLimits,
    ) -> StaticMetrics {
        if history.frame_count < self.min_samples {
            return StaticMetrics::default();
        }

        let sway_x = history.com_x.std_dev();
        let sway_y = history.com_y.std_dev();
        let sway = SwayMetrics {
            x: sway_x,
            y: sway_y,
            total: (sway_x * sway_x + sway_y * sway_y).sqrt(),
        };

        let angle_difference =
            |left, right| latest_difference(history.angle(left), history.angle(right));
        let asymmetry = AsymmetryMetrics {
            knee_angle: angle_difference(AngleName::LeftKnee, AngleName::RightKnee),
            hip_angle: angle_difference(AngleName::LeftHip, AngleName::RightHip),
            hip_height: latest_difference(Some(&history.left_hip_y), Some(&history.right_hip_y)),
            shoulder_height: latest_difference(
                Some(&history.left_shoulder_y),
                Some(&history.right_shoulder_y),
            ),
            lower_hip: lower_side(&history.left_hip_y, &history.right_hip_y),
            lower_shoulder: lower_side(&history.left_shoulder_y, &history.right_shoulder_y),
        };

        let mut variability = BTreeMap::new();
        let mut mean_angles = BTreeMap::new();
        for (name, series) in &history.angles {
            if let Some(mean) = series.mean() {
                mean_angles.insert(*name, mean);
                variability.insert(*name, series.std_dev());
            }
        }

        let frontal = if view.uses_frontal_metrics() {
            frontal.copied().filter(|f| !f.is_empty())
        } else {
            None
        };

        let mut metrics = StaticMetrics {
            sample_count: history.frame_count,
            sway,
            asymmetry,
            variability,
            mean_angles,
            frontal,
            pattern_flags: BTreeSet::new(),
        };
        metrics.pattern_flags = detect_patterns(&metrics, &self.thresholds.with_limits(limits));
        if !metrics.pattern_flags.is_empty() {
            tracing::debug!(
                "{} samples raised {:?} (sway {:.4})",
                metrics.sample_count,
                metrics.pattern_flags,
                metrics.sway.total
            );
        }
        metrics
    }

    /// Threshold every metric independently against the global thresholds
    pub fn detect_patterns(&self, metrics: &StaticMetrics) -> BTreeSet<PatternFlag> {
        detect_patterns(metrics, &self.thresholds)
    }
}

fn detect_patterns(metrics: &StaticMetrics, t: &StaticThresholds) -> BTreeSet<PatternFlag> {
    let exceeds = |value: Option<f64>, threshold: f64| value.is_some_and(|v| v > threshold);
    let a = &metrics.asymmetry;

    let mut checks = vec![
        (metrics.sway.total > t.sway, PatternFlag::StaticInstability),
        (exceeds(a.hip_height, t.hip_drop), PatternFlag::StaticHipDrop),
        (
            exceeds(a.shoulder_height, t.shoulder_asymmetry),
            PatternFlag::StaticShoulderAsymmetry,
        ),
        (exceeds(a.knee_angle, t.knee_asymmetry), PatternFlag::StaticKneeAsymmetry),
        (
            exceeds(metrics.mean_angles.get(&AngleName::TrunkLean).copied(), t.trunk_lean),
            PatternFlag::StaticTrunkLean,
        ),
        (
            exceeds(metrics.max_variability().map(|(_, v)| v), t.angle_variability),
            PatternFlag::StaticJointTremor,
        ),
    ];

    if let Some(frontal) = &metrics.frontal {
        checks.extend([
            (exceeds(frontal.max_knee_valgus(), t.knee_valgus), PatternFlag::StaticKneeValgus),
            (exceeds(frontal.pelvic_tilt, t.pelvic_tilt), PatternFlag::StaticPelvicTilt),
            (
                exceeds(frontal.lateral_trunk_shift, t.lateral_shift),
                PatternFlag::StaticLateralShift,
            ),
        ]);
    }

    checks
        .into_iter()
        .filter_map(|(raised, flag)| raised.then_some(flag))
        .collect()
}

impl Default for StaticMetricsCalculator {
    fn default() -> Self {
        Self::new(StaticThresholds::default(), 5)
    }
}

fn latest_difference(left: Option<&Series>, right: Option<&Series>) -> Option<f64> {
    Some((left?.latest()? - right?.latest()?).abs())
}

fn lower_side(left: &Series, right: &Series) -> Option<biomech_core::Side> {
    let (l, r) = (left.latest()?, right.latest()?);
    if l > r {
        Some(biomech_core::Side::Left)
    } else if r > l {
        Some(biomech_core::Side::Right)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::tests::standing_frame;
    use crate::angles::AngleComputer;
    use crate::history::RawMetricsAggregator;
    use biomech_core::{names, FrameSize, PoseFrame};

    fn fill(agg: &mut RawMetricsAggregator, frames: impl IntoIterator<Item = PoseFrame>) {
        let computer = AngleComputer::default();
        for frame in frames {
            let angles = computer.compute(&frame);
            agg.push_frame(&frame, FrameSize::new(640.0, 720.0), &angles).unwrap();
        }
    }

    fn shifted(t: f64, dx: f64) -> PoseFrame {
        let mut frame = standing_frame(t);
        for kp in frame.keypoints.iter_mut() {
            kp.x += dx;
        }
        frame
    }

    #[test]
    fn test_steady_stance_has_no_flags() {
        let mut agg = RawMetricsAggregator::default();
        fill(&mut agg, (0..20).map(|i| standing_frame(i as f64 * 50.0)));

        let metrics =
            StaticMetricsCalculator::default().calculate(agg.history(), None, CameraView::Side);
        assert_eq!(metrics.sample_count, 20);
        assert!(metrics.sway.total < 1e-12);
        assert!(metrics.pattern_flags.is_empty());
        assert!((metrics.mean_angles[&AngleName::LeftKnee] - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_sway_raises_instability() {
        let mut agg = RawMetricsAggregator::default();
        // Alternate ±40 px on a 640 px frame: sway_x = 40/640 = 0.0625
        fill(
            &mut agg,
            (0..20).map(|i| shifted(i as f64 * 50.0, if i % 2 == 0 { 40.0 } else { -40.0 })),
        );

        let metrics =
            StaticMetricsCalculator::default().calculate(agg.history(), None, CameraView::Side);
        assert!((metrics.sway.x - 0.0625).abs() < 1e-9);
        assert!(metrics.has_flag(PatternFlag::StaticInstability));
    }

    #[test]
    fn test_hip_drop_flag_and_side() {
        let mut agg = RawMetricsAggregator::default();
        let frames = (0..10).map(|i| {
            let mut f = standing_frame(i as f64 * 50.0);
            for kp in f.keypoints.iter_mut() {
                if kp.name == names::RIGHT_HIP {
                    kp.y += 36.0; // 0.05 of 720
                }
            }
            f
        });
        fill(&mut agg, frames);

        let metrics =
            StaticMetricsCalculator::default().calculate(agg.history(), None, CameraView::Side);
        assert!(metrics.has_flag(PatternFlag::StaticHipDrop));
        assert_eq!(metrics.asymmetry.lower_hip, Some(biomech_core::Side::Right));
        assert!(!metrics.has_flag(PatternFlag::StaticShoulderAsymmetry));
    }

    #[test]
    fn test_frontal_metrics_respect_view() {
        let mut agg = RawMetricsAggregator::default();
        fill(&mut agg, (0..10).map(|i| standing_frame(i as f64 * 50.0)));
        let frontal = FrontalMetrics {
            knee_valgus_left: Some(20.0),
            ..Default::default()
        };

        let calc = StaticMetricsCalculator::default();
        let side = calc.calculate(agg.history(), Some(&frontal), CameraView::Side);
        assert!(side.frontal.is_none());
        assert!(!side.has_flag(PatternFlag::StaticKneeValgus));

        let front = calc.calculate(agg.history(), Some(&frontal), CameraView::Front);
        assert!(front.has_flag(PatternFlag::StaticKneeValgus));

        let missing = calc.calculate(agg.history(), None, CameraView::Either);
        assert!(missing.frontal.is_none());
        assert_eq!(missing.sample_count, 10);
    }

    #[test]
    fn test_exercise_limits_override_knee_asymmetry() {
        let mut agg = RawMetricsAggregator::default();
        let frames = (0..10).map(|i| {
            let mut f = standing_frame(i as f64 * 50.0);
            for kp in f.keypoints.iter_mut() {
                // Right shin horizontal: right knee at 90°
                if kp.name == names::RIGHT_ANKLE {
                    kp.x = 150.0;
                    kp.y = 520.0;
                }
            }
            f
        });
        fill(&mut agg, frames);

        let calc = StaticMetricsCalculator::default();
        let global = calc.calculate(agg.history(), None, CameraView::Side);
        assert!((global.asymmetry.knee_angle.unwrap() - 90.0).abs() < 1e-6);
        assert!(global.has_flag(PatternFlag::StaticKneeAsymmetry));

        let limits = ExerciseLimits {
            angle_asymmetry: Some(200.0),
        };
        let unilateral = calc.calculate_with_limits(agg.history(), None, CameraView::Side, &limits);
        assert!(!unilateral.has_flag(PatternFlag::StaticKneeAsymmetry));
        assert_eq!(unilateral.asymmetry, global.asymmetry);
    }

    #[test]
    fn test_too_few_samples() {
        let mut agg = RawMetricsAggregator::default();
        fill(&mut agg, (0..3).map(|i| standing_frame(i as f64 * 50.0)));
        let metrics =
            StaticMetricsCalculator::default().calculate(agg.history(), None, CameraView::Side);
        assert!(metrics.is_empty());
    }
}
