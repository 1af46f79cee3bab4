//! Asymmetry and instability observations derived from static metrics.
//!
//! Observations grade a metric against its threshold by ratio:
//!
//! | ratio (value / threshold) | asymmetry   | instability |
//! |---------------------------|-------------|-------------|
//! | ≥ 2.0                     | significant | severe      |
//! | ≥ 1.5                     |             | moderate    |
//! | ≥ 1.0                     | moderate    | mild        |
//! | ≥ 0.5                     | minor       |             |
//!
//! Asymmetries are reported from half the threshold so that minor imbalances
//! are visible before they raise a pattern flag; instabilities only above it.

use biomech_core::{AngleName, CameraView, PatternFlag, Side};
use biomech_metrics::{StaticMetrics, StaticThresholds};
use serde::{Deserialize, Serialize};

use crate::deviation::AngleDeviation;
use crate::standards::{ExerciseCategory, ExerciseStandard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Minor,
    Moderate,
    Significant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsymmetryKind {
    KneeAngle,
    HipAngle,
    HipHeight,
    ShoulderHeight,
    KneeValgus,
}

impl AsymmetryKind {
    pub fn label(&self) -> &'static str {
        match self {
            AsymmetryKind::KneeAngle => "knee angle",
            AsymmetryKind::HipAngle => "hip angle",
            AsymmetryKind::HipHeight => "hip height",
            AsymmetryKind::ShoulderHeight => "shoulder height",
            AsymmetryKind::KneeValgus => "knee valgus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsymmetryObservation {
    pub kind: AsymmetryKind,
    pub magnitude: f64,
    pub threshold: f64,
    pub significance: Significance,
    /// Lower or weaker side when it can be told
    pub side: Option<Side>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum InstabilityKind {
    GlobalSway,
    MediolateralSway,
    AnteroposteriorSway,
    JointTremor { angle: AngleName },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstabilityObservation {
    pub kind: InstabilityKind,
    pub magnitude: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub description: String,
}

/// Everything the recommendation and pain rules look at for one exercise
#[derive(Debug, Clone, Default)]
pub struct Findings {
    pub flags: Vec<PatternFlag>,
    pub asymmetries: Vec<AsymmetryObservation>,
    pub instabilities: Vec<InstabilityObservation>,
    pub deviations: Vec<AngleDeviation>,
    pub category: Option<ExerciseCategory>,
}

impl Findings {
    pub fn has_flag(&self, flag: PatternFlag) -> bool {
        self.flags.contains(&flag)
    }
}

fn significance(ratio: f64) -> Option<Significance> {
    if ratio >= 2.0 {
        Some(Significance::Significant)
    } else if ratio >= 1.0 {
        Some(Significance::Moderate)
    } else if ratio >= 0.5 {
        Some(Significance::Minor)
    } else {
        None
    }
}

fn severity(ratio: f64) -> Option<Severity> {
    if ratio > 2.0 {
        Some(Severity::Severe)
    } else if ratio > 1.5 {
        Some(Severity::Moderate)
    } else if ratio > 1.0 {
        Some(Severity::Mild)
    } else {
        None
    }
}

/// Directional sway is reported once one axis exceeds this share of the threshold
const DIRECTIONAL_SHARE: f64 = 0.75;

#[derive(Debug, Clone, Default)]
pub struct ObservationAnalyzer {
    thresholds: StaticThresholds,
}

impl ObservationAnalyzer {
    pub fn new(thresholds: StaticThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StaticThresholds {
        &self.thresholds
    }

    pub fn asymmetries(
        &self,
        metrics: &StaticMetrics,
        standard: Option<&ExerciseStandard>,
    ) -> Vec<AsymmetryObservation> {
        let angle_threshold = standard
            .map(|s| s.asymmetry_threshold)
            .unwrap_or(self.thresholds.knee_asymmetry);
        let a = &metrics.asymmetry;

        let mut candidates = vec![
            (AsymmetryKind::KneeAngle, a.knee_angle, angle_threshold, None, "°"),
            (AsymmetryKind::HipAngle, a.hip_angle, angle_threshold, None, "°"),
            (AsymmetryKind::HipHeight, a.hip_height, self.thresholds.hip_drop, a.lower_hip, ""),
            (
                AsymmetryKind::ShoulderHeight,
                a.shoulder_height,
                self.thresholds.shoulder_asymmetry,
                a.lower_shoulder,
                "",
            ),
        ];

        if let Some(frontal) = &metrics.frontal {
            if let (Some(l), Some(r)) = (frontal.knee_valgus_left, frontal.knee_valgus_right) {
                let side = if l > r { Side::Left } else { Side::Right };
                candidates.push((
                    AsymmetryKind::KneeValgus,
                    Some((l - r).abs()),
                    self.thresholds.knee_valgus,
                    Some(side),
                    "°",
                ));
            }
        }

        candidates
            .into_iter()
            .filter_map(|(kind, magnitude, threshold, side, unit)| {
                let magnitude = magnitude?;
                if threshold <= 0.0 {
                    return None;
                }
                let significance = significance(magnitude / threshold)?;
                let description = match side {
                    Some(side) => format!(
                        "{:?} {} asymmetry ({:.3}{}), {} side lower",
                        significance,
                        kind.label(),
                        magnitude,
                        unit,
                        side.as_str()
                    ),
                    None => format!(
                        "{:?} {} asymmetry ({:.1}{})",
                        significance,
                        kind.label(),
                        magnitude,
                        unit
                    ),
                };
                Some(AsymmetryObservation {
                    kind,
                    magnitude,
                    threshold,
                    significance,
                    side,
                    description,
                })
            })
            .collect()
    }

    pub fn instabilities(
        &self,
        metrics: &StaticMetrics,
        standard: Option<&ExerciseStandard>,
        view: CameraView,
    ) -> Vec<InstabilityObservation> {
        if metrics.is_empty() {
            return Vec::new();
        }

        let sway_threshold = standard.map(|s| s.sway_threshold).unwrap_or(self.thresholds.sway);
        let mut observations = Vec::new();

        if sway_threshold > 0.0 {
            if let Some(severity) = severity(metrics.sway.total / sway_threshold) {
                observations.push(InstabilityObservation {
                    kind: InstabilityKind::GlobalSway,
                    magnitude: metrics.sway.total,
                    threshold: sway_threshold,
                    severity,
                    description: format!("{:?} overall sway ({:.4})", severity, metrics.sway.total),
                });
            }

            // The horizontal image axis is mediolateral when filmed from the front
            let (kind, label) = match view {
                CameraView::Side => (InstabilityKind::AnteroposteriorSway, "front-to-back"),
                CameraView::Front | CameraView::Either => {
                    (InstabilityKind::MediolateralSway, "side-to-side")
                }
            };
            let axis_threshold = sway_threshold * DIRECTIONAL_SHARE;
            if let Some(severity) = severity(metrics.sway.x / axis_threshold) {
                observations.push(InstabilityObservation {
                    kind,
                    magnitude: metrics.sway.x,
                    threshold: axis_threshold,
                    severity,
                    description: format!("{:?} {} sway ({:.4})", severity, label, metrics.sway.x),
                });
            }
        }

        let tremor = self.thresholds.angle_variability;
        if tremor > 0.0 {
            for (angle, &sd) in &metrics.variability {
                if let Some(severity) = severity(sd / tremor) {
                    observations.push(InstabilityObservation {
                        kind: InstabilityKind::JointTremor { angle: *angle },
                        magnitude: sd,
                        threshold: tremor,
                        severity,
                        description: format!(
                            "{:?} {} angle fluctuation ({:.1}°)",
                            severity, angle, sd
                        ),
                    });
                }
            }
        }

        observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomech_metrics::{AsymmetryMetrics, FrontalMetrics, SwayMetrics};

    fn metrics() -> StaticMetrics {
        StaticMetrics {
            sample_count: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_significance_ladder() {
        let analyzer = ObservationAnalyzer::default();
        let mut m = metrics();
        m.asymmetry = AsymmetryMetrics {
            knee_angle: Some(21.0),
            hip_angle: Some(12.0),
            hip_height: Some(0.016),
            shoulder_height: Some(0.01),
            lower_hip: Some(Side::Left),
            lower_shoulder: Some(Side::Right),
        };

        let obs = analyzer.asymmetries(&m, None);
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].kind, AsymmetryKind::KneeAngle);
        assert_eq!(obs[0].significance, Significance::Significant);
        assert_eq!(obs[1].significance, Significance::Moderate);
        assert_eq!(obs[2].significance, Significance::Minor);
        assert_eq!(obs[2].side, Some(Side::Left));
    }

    #[test]
    fn test_exercise_threshold_overrides_default() {
        let analyzer = ObservationAnalyzer::default();
        let mut m = metrics();
        m.asymmetry.knee_angle = Some(21.0);

        let standard = ExerciseStandard {
            exercise_id: "split".into(),
            angles: Default::default(),
            sway_threshold: 0.02,
            asymmetry_threshold: 90.0,
        };
        assert!(analyzer.asymmetries(&m, Some(&standard)).is_empty());
    }

    #[test]
    fn test_valgus_asymmetry_side() {
        let analyzer = ObservationAnalyzer::default();
        let mut m = metrics();
        m.frontal = Some(FrontalMetrics {
            knee_valgus_left: Some(14.0),
            knee_valgus_right: Some(2.0),
            ..Default::default()
        });
        let obs = analyzer.asymmetries(&m, None);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].kind, AsymmetryKind::KneeValgus);
        assert_eq!(obs[0].side, Some(Side::Left));
    }

    #[test]
    fn test_sway_instability() {
        let analyzer = ObservationAnalyzer::default();
        let mut m = metrics();
        m.sway = SwayMetrics {
            x: 0.035,
            y: 0.02,
            total: (0.035f64.powi(2) + 0.02f64.powi(2)).sqrt(),
        };
        m.variability.insert(AngleName::LeftKnee, 6.0);
        m.variability.insert(AngleName::RightKnee, 1.0);

        let obs = analyzer.instabilities(&m, None, CameraView::Front);
        let kinds: Vec<_> = obs.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InstabilityKind::GlobalSway,
                InstabilityKind::MediolateralSway,
                InstabilityKind::JointTremor {
                    angle: AngleName::LeftKnee
                },
            ]
        );
        // total ≈ 0.0403 → ratio 2.01
        assert_eq!(obs[0].severity, Severity::Severe);
        assert_eq!(obs[2].severity, Severity::Mild);

        let side = analyzer.instabilities(&m, None, CameraView::Side);
        assert_eq!(side[1].kind, InstabilityKind::AnteroposteriorSway);
    }

    #[test]
    fn test_empty_metrics_are_stable() {
        let analyzer = ObservationAnalyzer::default();
        let empty = StaticMetrics::default();
        assert!(analyzer.instabilities(&empty, None, CameraView::Side).is_empty());
        assert!(analyzer.asymmetries(&empty, None).is_empty());
    }
}
