//! Measured angles compared against an exercise standard.

use biomech_core::AngleName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::standards::{AngleStandard, ExerciseStandard};

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    Optimal,
    Acceptable,
    NeedsImprovement,
    OutOfRange,
}

impl DeviationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationStatus::Optimal => "optimal",
            DeviationStatus::Acceptable => "acceptable",
            DeviationStatus::NeedsImprovement => "needs_improvement",
            DeviationStatus::OutOfRange => "out_of_range",
        }
    }

    /// Outside the tolerance band
    pub fn is_problem(&self) -> bool {
        matches!(self, DeviationStatus::NeedsImprovement | DeviationStatus::OutOfRange)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleDeviation {
    pub angle: AngleName,
    pub measured: f64,
    pub ideal: f64,
    /// measured − ideal
    pub deviation: f64,
    pub within_tolerance: bool,
    pub within_range: bool,
    pub status: DeviationStatus,
}

/// Status ladder for one measurement
pub fn classify(measured: f64, standard: &AngleStandard) -> DeviationStatus {
    let d = (measured - standard.ideal).abs();
    if d <= standard.tolerance / 2.0 {
        DeviationStatus::Optimal
    } else if d <= standard.tolerance {
        DeviationStatus::Acceptable
    } else if measured >= standard.min && measured <= standard.max {
        DeviationStatus::NeedsImprovement
    } else {
        DeviationStatus::OutOfRange
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviationCalculator;

impl DeviationCalculator {
    /// One deviation per angle present in both `measured` and `standard`.
    ///
    /// A missing standard (unknown exercise) yields no deviations.
    pub fn calculate(
        &self,
        measured: &BTreeMap<AngleName, f64>,
        standard: Option<&ExerciseStandard>,
    ) -> Vec<AngleDeviation> {
        let Some(standard) = standard else {
            return Vec::new();
        };

        measured
            .iter()
            .filter_map(|(name, &value)| {
                let band = standard.angle(*name)?;
                let deviation = value - band.ideal;
                Some(AngleDeviation {
                    angle: *name,
                    measured: value,
                    ideal: band.ideal,
                    deviation,
                    within_tolerance: deviation.abs() <= band.tolerance,
                    within_range: value >= band.min && value <= band.max,
                    status: classify(value, band),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standards::ExerciseStandardsRegistry;
    use biomech_core::ExerciseId;

    const BAND: AngleStandard = AngleStandard::new(90.0, 10.0, 70.0, 110.0);

    #[test]
    fn test_status_ladder() {
        assert_eq!(classify(90.0, &BAND), DeviationStatus::Optimal);
        assert_eq!(classify(95.0, &BAND), DeviationStatus::Optimal);
        assert_eq!(classify(84.0, &BAND), DeviationStatus::Acceptable);
        assert_eq!(classify(100.0, &BAND), DeviationStatus::Acceptable);
        assert_eq!(classify(105.0, &BAND), DeviationStatus::NeedsImprovement);
        assert_eq!(classify(70.0, &BAND), DeviationStatus::NeedsImprovement);
        assert_eq!(classify(69.9, &BAND), DeviationStatus::OutOfRange);
        assert_eq!(classify(140.0, &BAND), DeviationStatus::OutOfRange);
    }

    #[test]
    fn test_status_never_improves_with_distance() {
        let mut last = DeviationStatus::Optimal;
        for step in 0..200 {
            let status = classify(90.0 + step as f64 * 0.5, &BAND);
            assert!(status >= last);
            last = status;
        }
    }

    #[test]
    fn test_only_shared_angles() {
        let registry = ExerciseStandardsRegistry::builtin();
        let standard = registry.standard(&ExerciseId::new("glute_bridge_hold"));

        let mut measured = BTreeMap::new();
        measured.insert(AngleName::LeftKnee, 92.0);
        measured.insert(AngleName::TrunkLean, 80.0);

        let deviations = DeviationCalculator.calculate(&measured, standard);
        assert_eq!(deviations.len(), 1);
        assert_eq!(deviations[0].angle, AngleName::LeftKnee);
        assert!((deviations[0].deviation - 2.0).abs() < 1e-9);
        assert!(deviations[0].within_tolerance);
    }

    #[test]
    fn test_unknown_exercise_is_empty() {
        let mut measured = BTreeMap::new();
        measured.insert(AngleName::LeftKnee, 92.0);
        assert!(DeviationCalculator.calculate(&measured, None).is_empty());
    }
}
