//! Exercise score from weighted deductions.

use biomech_core::PatternFlag;
use serde::{Deserialize, Serialize};

use crate::deviation::{AngleDeviation, DeviationStatus};
use crate::observations::{AsymmetryObservation, Significance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Excellent,
    Good,
    Fair,
    NeedsWork,
}

impl AssessmentStatus {
    pub fn from_score(score: u8) -> Self {
        if score >= 85 {
            AssessmentStatus::Excellent
        } else if score >= 70 {
            AssessmentStatus::Good
        } else if score >= 50 {
            AssessmentStatus::Fair
        } else {
            AssessmentStatus::NeedsWork
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Excellent => "excellent",
            AssessmentStatus::Good => "good",
            AssessmentStatus::Fair => "fair",
            AssessmentStatus::NeedsWork => "needs_work",
        }
    }
}

/// Points taken off, per source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub deviations: u32,
    pub sway: u32,
    pub patterns: u32,
    pub asymmetries: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.deviations + self.sway + self.patterns + self.asymmetries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExerciseScore {
    pub score: u8,
    pub status: AssessmentStatus,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn score(
        &self,
        deviations: &[AngleDeviation],
        sway_total: f64,
        flags: &[PatternFlag],
        asymmetries: &[AsymmetryObservation],
    ) -> ExerciseScore {
        let breakdown = ScoreBreakdown {
            deviations: deviations.iter().map(|d| deviation_penalty(d.status)).sum(),
            sway: sway_penalty(sway_total),
            patterns: 5 * flags.len() as u32,
            asymmetries: asymmetries.iter().map(|a| asymmetry_penalty(a.significance)).sum(),
        };

        let score = 100u32.saturating_sub(breakdown.total()) as u8;
        ExerciseScore {
            score,
            status: AssessmentStatus::from_score(score),
            breakdown,
        }
    }
}

fn deviation_penalty(status: DeviationStatus) -> u32 {
    match status {
        DeviationStatus::OutOfRange => 10,
        DeviationStatus::NeedsImprovement => 5,
        DeviationStatus::Acceptable => 2,
        DeviationStatus::Optimal => 0,
    }
}

/// Only the highest matching bracket applies
fn sway_penalty(sway_total: f64) -> u32 {
    if sway_total > 0.03 {
        15
    } else if sway_total > 0.02 {
        8
    } else if sway_total > 0.015 {
        3
    } else {
        0
    }
}

fn asymmetry_penalty(significance: Significance) -> u32 {
    match significance {
        Significance::Significant => 8,
        Significance::Moderate => 4,
        Significance::Minor => 1,
    }
}
