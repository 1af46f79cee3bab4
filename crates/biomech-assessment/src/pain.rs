//! Probable-pain prediction.
//!
//! The predictor is an injected collaborator. [`RuleBasedPainPredictor`] maps
//! compensation patterns to the body regions they typically overload.

use biomech_core::{PatternFlag, Side};
use serde::{Deserialize, Serialize};

use crate::deviation::DeviationStatus;
use crate::observations::{AsymmetryKind, Findings, InstabilityKind, Severity, Significance};
use crate::standards::ExerciseCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainLikelihood {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedPain {
    pub location: String,
    pub likelihood: PainLikelihood,
    pub reason: String,
    pub related_patterns: Vec<PatternFlag>,
    pub prevention_tips: Vec<String>,
}

pub trait PainPredictor: Send + Sync {
    fn predict(&self, findings: &Findings) -> Vec<PredictedPain>;
}

/// Accumulates evidence per body region before grading it
struct Region {
    location: &'static str,
    tips: &'static [&'static str],
    evidence: Vec<String>,
    patterns: Vec<PatternFlag>,
    weight: u32,
}

impl Region {
    fn new(location: &'static str, tips: &'static [&'static str]) -> Self {
        Self {
            location,
            tips,
            evidence: Vec::new(),
            patterns: Vec::new(),
            weight: 0,
        }
    }

    fn flag(&mut self, flag: PatternFlag) {
        if !self.patterns.contains(&flag) {
            self.patterns.push(flag);
            self.evidence.push(flag.description().to_string());
            self.weight += 2;
        }
    }

    fn note(&mut self, reason: impl Into<String>, weight: u32) {
        self.evidence.push(reason.into());
        self.weight += weight;
    }

    fn into_prediction(self) -> Option<PredictedPain> {
        let likelihood = match self.weight {
            0 => return None,
            1..=2 => PainLikelihood::Low,
            3..=4 => PainLikelihood::Moderate,
            _ => PainLikelihood::High,
        };
        Some(PredictedPain {
            location: self.location.to_string(),
            likelihood,
            reason: self.evidence.join("; "),
            related_patterns: self.patterns,
            prevention_tips: self.tips.iter().map(|t| t.to_string()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPainPredictor;

impl PainPredictor for RuleBasedPainPredictor {
    fn predict(&self, f: &Findings) -> Vec<PredictedPain> {
        let mut knee = Region::new(
            "Anterior knee",
            &["Keep knees tracking over the toes", "Strengthen hip abductors before adding load"],
        );
        let mut hip = Region::new(
            "Lateral hip",
            &["Avoid hanging on one hip when standing", "Side-lying abduction three times a week"],
        );
        let mut back = Region::new(
            "Lower back",
            &["Brace lightly during holds", "Break up long periods of sitting"],
        );
        let mut neck = Region::new(
            "Neck and upper shoulders",
            &["Check desk and screen height", "Relax the shoulders away from the ears"],
        );
        let mut ankle = Region::new(
            "Ankle",
            &[
                "Practise balance on stable ground first",
                "Wear supportive footwear during training",
            ],
        );

        for &flag in &f.flags {
            match flag {
                PatternFlag::StaticKneeValgus | PatternFlag::StaticKneeAsymmetry => knee.flag(flag),
                PatternFlag::StaticHipDrop | PatternFlag::StaticPelvicTilt => hip.flag(flag),
                PatternFlag::StaticTrunkLean | PatternFlag::StaticLateralShift => back.flag(flag),
                PatternFlag::StaticShoulderAsymmetry => neck.flag(flag),
                PatternFlag::StaticInstability => ankle.flag(flag),
                PatternFlag::StaticJointTremor => {}
            }
        }

        for a in &f.asymmetries {
            let weight = match a.significance {
                Significance::Significant => 2,
                Significance::Moderate => 1,
                Significance::Minor => continue,
            };
            let region = match a.kind {
                AsymmetryKind::KneeAngle | AsymmetryKind::KneeValgus => &mut knee,
                AsymmetryKind::HipAngle | AsymmetryKind::HipHeight => &mut hip,
                AsymmetryKind::ShoulderHeight => &mut neck,
            };
            let reason = match a.side {
                Some(Side::Left) => format!("{} (left side)", a.description),
                Some(Side::Right) => format!("{} (right side)", a.description),
                None => a.description.clone(),
            };
            region.note(reason, weight);
        }

        for i in &f.instabilities {
            let weight = match i.severity {
                Severity::Severe => 2,
                Severity::Moderate => 1,
                Severity::Mild => continue,
            };
            match i.kind {
                InstabilityKind::JointTremor { angle } if angle.joint() == "knee" => {
                    knee.note(i.description.clone(), 1)
                }
                InstabilityKind::JointTremor { .. } => {}
                _ => ankle.note(i.description.clone(), weight),
            }
        }

        let trunk_out_of_range = f
            .deviations
            .iter()
            .any(|d| d.angle.joint() == "trunk" && d.status == DeviationStatus::OutOfRange);
        if trunk_out_of_range {
            back.note("Trunk angle outside the safe range", 2);
        }

        // Loaded positions amplify knee and back findings
        let knee_loaded = matches!(
            f.category,
            Some(ExerciseCategory::Squat | ExerciseCategory::Lunge)
        );
        if knee_loaded && knee.weight > 0 {
            knee.note("Held under knee-dominant load", 1);
        }
        if matches!(f.category, Some(ExerciseCategory::Hinge)) && back.weight > 0 {
            back.note("Held in a hip hinge", 1);
        }

        let mut predictions: Vec<PredictedPain> = [knee, hip, back, neck, ankle]
            .into_iter()
            .filter_map(Region::into_prediction)
            .collect();
        predictions.sort_by(|a, b| b.likelihood.cmp(&a.likelihood));
        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::AsymmetryObservation;

    #[test]
    fn test_no_findings_no_pain() {
        assert!(RuleBasedPainPredictor.predict(&Findings::default()).is_empty());
    }

    #[test]
    fn test_valgus_in_squat_is_moderate() {
        let findings = Findings {
            flags: vec![PatternFlag::StaticKneeValgus],
            asymmetries: vec![AsymmetryObservation {
                kind: AsymmetryKind::KneeValgus,
                magnitude: 12.0,
                threshold: 10.0,
                significance: Significance::Moderate,
                side: Some(Side::Left),
                description: "Moderate knee valgus asymmetry".to_string(),
            }],
            category: Some(ExerciseCategory::Squat),
            ..Default::default()
        };

        let pains = RuleBasedPainPredictor.predict(&findings);
        assert_eq!(pains.len(), 1);
        assert_eq!(pains[0].location, "Anterior knee");
        // 2 (flag) + 1 (moderate asymmetry) + 1 (squat)
        assert_eq!(pains[0].likelihood, PainLikelihood::Moderate);
        assert_eq!(pains[0].related_patterns, vec![PatternFlag::StaticKneeValgus]);
        assert!(pains[0].reason.contains("left side"));
    }

    #[test]
    fn test_sorted_by_likelihood() {
        let findings = Findings {
            flags: vec![
                PatternFlag::StaticShoulderAsymmetry,
                PatternFlag::StaticHipDrop,
                PatternFlag::StaticPelvicTilt,
                PatternFlag::StaticTrunkLean,
            ],
            ..Default::default()
        };
        let pains = RuleBasedPainPredictor.predict(&findings);
        assert_eq!(pains[0].location, "Lateral hip");
        assert_eq!(pains[0].likelihood, PainLikelihood::Moderate);
        assert!(pains.iter().skip(1).all(|p| p.likelihood == PainLikelihood::Low));
    }
}
