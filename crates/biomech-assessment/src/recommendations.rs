//! Corrective recommendations from exercise findings.
//!
//! Three independent rule tables (exercises, muscles, movement patterns) turn
//! findings into candidates. Each list is then deduplicated by name, keeping
//! the highest priority, stably sorted by priority and capped.

use biomech_core::{AngleName, PatternFlag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::deviation::{AngleDeviation, DeviationStatus};
use crate::observations::{Findings, InstabilityKind, Severity, Significance};
use crate::standards::ExerciseCategory;

pub const MAX_EXERCISES: usize = 5;
pub const MAX_MUSCLES: usize = 4;
pub const MAX_PATTERNS: usize = 3;

pub const MAX_AGGREGATED_EXERCISES: usize = 6;
pub const MAX_AGGREGATED_MUSCLES: usize = 5;
pub const MAX_AGGREGATED_PATTERNS: usize = 4;

/// Sorts high first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecommendation {
    pub name: String,
    pub description: String,
    pub dosage: String,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuscleAction {
    Strengthen,
    Stretch,
    Activate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleRecommendation {
    pub muscle: String,
    pub action: MuscleAction,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecommendation {
    pub pattern: String,
    pub cue: String,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBundle {
    pub exercises: Vec<ExerciseRecommendation>,
    pub muscles: Vec<MuscleRecommendation>,
    pub patterns: Vec<PatternRecommendation>,
}

impl RecommendationBundle {
    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty() && self.muscles.is_empty() && self.patterns.is_empty()
    }
}

/// Identity and rank of a recommendation
pub trait Ranked {
    fn key(&self) -> &str;
    fn priority(&self) -> Priority;
}

impl Ranked for ExerciseRecommendation {
    fn key(&self) -> &str {
        &self.name
    }
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl Ranked for MuscleRecommendation {
    fn key(&self) -> &str {
        &self.muscle
    }
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl Ranked for PatternRecommendation {
    fn key(&self) -> &str {
        &self.pattern
    }
    fn priority(&self) -> Priority {
        self.priority
    }
}

/// Dedup by key (highest priority wins, first on ties), stable sort, truncate
pub fn prioritize<T: Ranked>(candidates: Vec<T>, cap: usize) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match kept.iter_mut().find(|k| k.key() == candidate.key()) {
            Some(existing) if candidate.priority() < existing.priority() => *existing = candidate,
            Some(_) => {}
            None => kept.push(candidate),
        }
    }
    kept.sort_by_key(|r| r.priority());
    kept.truncate(cap);
    kept
}

/// Merge per-exercise lists, ranking by (priority, occurrences desc, first appearance)
pub fn aggregate<'a, T, I>(lists: I, cap: usize) -> Vec<T>
where
    T: Ranked + Clone + 'a,
    I: IntoIterator<Item = &'a [T]>,
{
    // (entry, occurrences) in first-appearance order
    let mut merged: Vec<(T, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in lists.into_iter().flatten() {
        match index.get(item.key()) {
            Some(&i) => {
                let (existing, count) = &mut merged[i];
                *count += 1;
                if item.priority() < existing.priority() {
                    *existing = item.clone();
                }
            }
            None => {
                index.insert(item.key().to_string(), merged.len());
                merged.push((item.clone(), 1));
            }
        }
    }

    merged.sort_by(|(a, ca), (b, cb)| a.priority().cmp(&b.priority()).then(cb.cmp(ca)));
    merged.into_iter().take(cap).map(|(item, _)| item).collect()
}

/// Catalog entry for a corrective exercise
struct Drill {
    name: &'static str,
    description: &'static str,
    dosage: &'static str,
}

impl Drill {
    fn recommend(&self, priority: Priority, reason: &str) -> ExerciseRecommendation {
        ExerciseRecommendation {
            name: self.name.to_string(),
            description: self.description.to_string(),
            dosage: self.dosage.to_string(),
            priority,
            reason: reason.to_string(),
        }
    }
}

const fn drill(name: &'static str, description: &'static str, dosage: &'static str) -> Drill {
    Drill {
        name,
        description,
        dosage,
    }
}

const SINGLE_LEG_BALANCE: Drill = drill(
    "Single-leg balance progression",
    "Stand on one leg, progress from eyes open to eyes closed",
    "3 x 30 s per side",
);
const TANDEM_STANCE: Drill = drill(
    "Tandem stance hold",
    "Heel-to-toe stance with a steady gaze",
    "3 x 30 s",
);
const SUPPORTED_BALANCE: Drill = drill(
    "Supported balance drills",
    "Balance work next to a wall or rail",
    "3 x 30 s",
);
const HIP_ABDUCTION: Drill = drill(
    "Side-lying hip abduction",
    "Lift the top leg slightly behind the body, toes forward",
    "3 x 12 per side",
);
const SINGLE_LEG_BRIDGE: Drill = drill(
    "Single-leg bridge",
    "Bridge on one leg while keeping the pelvis level",
    "3 x 10 per side",
);
const WALL_ANGELS: Drill = drill(
    "Wall angels",
    "Back and arms against the wall, slide arms overhead",
    "2 x 10",
);
const SIDE_PLANK: Drill = drill(
    "Side plank",
    "Hold a straight line from head to feet on the forearm",
    "3 x 20 s per side",
);
const SPLIT_SQUAT: Drill = drill(
    "Split squat",
    "Start with the weaker side, control the lowering",
    "3 x 8 per side",
);
const UNILATERAL_STRENGTH: Drill = drill(
    "Unilateral strength work",
    "Single-leg work starting on the weaker side",
    "3 x 8 per side",
);
const DEAD_BUG: Drill = drill(
    "Dead bug",
    "Opposite arm and leg extend while the low back stays flat",
    "3 x 8 per side",
);
const HIP_FLEXOR_STRETCH: Drill = drill(
    "Half-kneeling hip flexor stretch",
    "Tuck the pelvis and shift forward gently",
    "2 x 30 s per side",
);
const ISOMETRIC_HOLDS: Drill = drill(
    "Progressive isometric holds",
    "Hold the position for short sets, adding time each week",
    "4 x 20 s",
);
const BANDED_SQUAT: Drill = drill(
    "Banded squat",
    "Mini band above the knees, push the knees out",
    "3 x 12",
);
const CLAMSHELLS: Drill = drill(
    "Clamshells",
    "Side-lying, heels together, open the top knee",
    "3 x 15 per side",
);
const GLUTE_BRIDGE: Drill = drill("Glute bridge", "Drive through the heels, ribs down", "3 x 12");
const LATERAL_SHIFTS: Drill = drill(
    "Lateral weight shifts",
    "Shift slowly side to side and pause at centre",
    "2 x 10",
);
const KNEE_MOBILITY: Drill = drill(
    "Knee mobility drills",
    "Heel slides and terminal knee extensions",
    "2 x 15",
);
const HIP_MOBILITY: Drill = drill(
    "Hip mobility flow",
    "90/90 transitions and hip circles",
    "2 x 8 per side",
);
const ANKLE_MOBILITY: Drill = drill(
    "Ankle dorsiflexion mobilization",
    "Knee-to-wall rocks",
    "2 x 15 per side",
);
const THORACIC_EXTENSION: Drill = drill(
    "Thoracic extension",
    "Foam roller extensions over the upper back",
    "2 x 10",
);
const GOBLET_SQUAT: Drill = drill(
    "Goblet squat hold",
    "Hold a weight at the chest at the bottom of the squat",
    "3 x 20 s",
);
const DOWEL_HINGE: Drill = drill(
    "Dowel hip hinge",
    "Keep the dowel on head, upper back and sacrum",
    "2 x 10",
);

/// Corrective exercises per pattern flag
fn flag_drills(flag: PatternFlag) -> &'static [(Drill, Priority)] {
    use Priority::*;
    match flag {
        PatternFlag::StaticInstability => &[(SINGLE_LEG_BALANCE, High), (TANDEM_STANCE, Medium)],
        PatternFlag::StaticHipDrop => &[(HIP_ABDUCTION, High), (SINGLE_LEG_BRIDGE, Medium)],
        PatternFlag::StaticShoulderAsymmetry => &[(WALL_ANGELS, Medium), (SIDE_PLANK, Medium)],
        PatternFlag::StaticKneeAsymmetry => &[(SPLIT_SQUAT, High)],
        PatternFlag::StaticTrunkLean => &[(DEAD_BUG, Medium), (HIP_FLEXOR_STRETCH, Medium)],
        PatternFlag::StaticJointTremor => &[(ISOMETRIC_HOLDS, Medium)],
        PatternFlag::StaticKneeValgus => &[(BANDED_SQUAT, High), (CLAMSHELLS, High)],
        PatternFlag::StaticPelvicTilt => &[(GLUTE_BRIDGE, Medium)],
        PatternFlag::StaticLateralShift => &[(LATERAL_SHIFTS, Medium)],
    }
}

/// Low-priority upkeep drill when nothing needs correcting
fn maintenance_drill(category: ExerciseCategory) -> &'static Drill {
    match category {
        ExerciseCategory::Posture => &WALL_ANGELS,
        ExerciseCategory::Balance => &SINGLE_LEG_BALANCE,
        ExerciseCategory::Squat => &GOBLET_SQUAT,
        ExerciseCategory::Lunge => &SPLIT_SQUAT,
        ExerciseCategory::Hinge => &DOWEL_HINGE,
        ExerciseCategory::Bridge => &GLUTE_BRIDGE,
        ExerciseCategory::Core => &DEAD_BUG,
    }
}

fn muscle(
    name: &str,
    action: MuscleAction,
    priority: Priority,
    reason: &str,
) -> MuscleRecommendation {
    MuscleRecommendation {
        muscle: name.to_string(),
        action,
        priority,
        reason: reason.to_string(),
    }
}

/// Movement pattern and the coaching cue that trains it
struct Cue {
    pattern: &'static str,
    cue: &'static str,
}

impl Cue {
    fn recommend(&self, priority: Priority, reason: &str) -> PatternRecommendation {
        pattern(self.pattern, self.cue, priority, reason)
    }
}

const ANKLE_STRATEGY: Cue = Cue {
    pattern: "Ankle strategy balance",
    cue: "Small corrections from the ankles, not the hips",
};
const LEVEL_PELVIS: Cue = Cue {
    pattern: "Level pelvis control",
    cue: "Keep both hip bones at the same height",
};
const SCAPULAR_SETTING: Cue = Cue {
    pattern: "Scapular setting",
    cue: "Shoulders down and back, evenly",
};
const SYMMETRIC_STANCE: Cue = Cue {
    pattern: "Symmetric weight bearing",
    cue: "Feel equal pressure under both feet",
};
const NEUTRAL_SPINE: Cue = Cue {
    pattern: "Neutral spine bracing",
    cue: "Ribs stacked over pelvis, brace lightly",
};
const BREATHING: Cue = Cue {
    pattern: "Breathing under load",
    cue: "Slow exhale while holding the position",
};
const KNEE_TRACKING: Cue = Cue {
    pattern: "Knee over toe alignment",
    cue: "Knees track over the second toe",
};
const CENTERED_BASE: Cue = Cue {
    pattern: "Centered base of support",
    cue: "Sternum over the midpoint of the feet",
};

fn flag_cue(flag: PatternFlag) -> (&'static Cue, Priority) {
    use Priority::*;
    match flag {
        PatternFlag::StaticInstability => (&ANKLE_STRATEGY, High),
        PatternFlag::StaticHipDrop | PatternFlag::StaticPelvicTilt => (&LEVEL_PELVIS, High),
        PatternFlag::StaticShoulderAsymmetry => (&SCAPULAR_SETTING, Medium),
        PatternFlag::StaticKneeAsymmetry => (&SYMMETRIC_STANCE, High),
        PatternFlag::StaticTrunkLean => (&NEUTRAL_SPINE, High),
        PatternFlag::StaticJointTremor => (&BREATHING, Medium),
        PatternFlag::StaticKneeValgus => (&KNEE_TRACKING, High),
        PatternFlag::StaticLateralShift => (&CENTERED_BASE, High),
    }
}

fn pattern(name: &str, cue: &str, priority: Priority, reason: &str) -> PatternRecommendation {
    PatternRecommendation {
        pattern: name.to_string(),
        cue: cue.to_string(),
        priority,
        reason: reason.to_string(),
    }
}

fn is_severe_or_moderate(severity: Severity) -> bool {
    severity >= Severity::Moderate
}

fn deviation_reason(d: &AngleDeviation) -> String {
    format!("{} angle {:.0}° vs ideal {:.0}°", d.angle, d.measured, d.ideal)
}

fn deviation_priority(d: &AngleDeviation) -> Priority {
    if d.status == DeviationStatus::OutOfRange {
        Priority::High
    } else {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationEngine;

impl RecommendationEngine {
    pub fn generate(&self, findings: &Findings) -> RecommendationBundle {
        RecommendationBundle {
            exercises: prioritize(self.exercise_candidates(findings), MAX_EXERCISES),
            muscles: prioritize(self.muscle_candidates(findings), MAX_MUSCLES),
            patterns: prioritize(self.pattern_candidates(findings), MAX_PATTERNS),
        }
    }

    /// Session-level bundle from every exercise's bundle
    pub fn aggregate<'a, I>(&self, bundles: I) -> RecommendationBundle
    where
        I: IntoIterator<Item = &'a RecommendationBundle> + Clone,
    {
        RecommendationBundle {
            exercises: aggregate(
                bundles.clone().into_iter().map(|b| b.exercises.as_slice()),
                MAX_AGGREGATED_EXERCISES,
            ),
            muscles: aggregate(
                bundles.clone().into_iter().map(|b| b.muscles.as_slice()),
                MAX_AGGREGATED_MUSCLES,
            ),
            patterns: aggregate(
                bundles.into_iter().map(|b| b.patterns.as_slice()),
                MAX_AGGREGATED_PATTERNS,
            ),
        }
    }

    fn exercise_candidates(&self, f: &Findings) -> Vec<ExerciseRecommendation> {
        use Priority::*;
        let mut out = Vec::new();

        for flag in &f.flags {
            let reason = flag.description();
            for (drill, priority) in flag_drills(*flag) {
                out.push(drill.recommend(*priority, reason));
            }
        }

        for a in &f.asymmetries {
            if a.significance >= Significance::Moderate {
                let priority = match a.significance {
                    Significance::Significant => High,
                    _ => Medium,
                };
                out.push(UNILATERAL_STRENGTH.recommend(priority, &a.description));
            }
        }

        for i in &f.instabilities {
            let reason = &i.description;
            match (i.kind, i.severity) {
                (InstabilityKind::JointTremor { .. }, s) if is_severe_or_moderate(s) => {
                    out.push(ISOMETRIC_HOLDS.recommend(Medium, reason));
                }
                (InstabilityKind::JointTremor { .. }, _) => {}
                (_, Severity::Severe) => out.push(SUPPORTED_BALANCE.recommend(High, reason)),
                (_, Severity::Moderate) => out.push(SINGLE_LEG_BALANCE.recommend(Medium, reason)),
                (_, Severity::Mild) => {}
            }
        }

        for d in f.deviations.iter().filter(|d| d.status.is_problem()) {
            let drill = match d.angle.joint() {
                "knee" => &KNEE_MOBILITY,
                "hip" => &HIP_MOBILITY,
                "ankle" => &ANKLE_MOBILITY,
                _ => &THORACIC_EXTENSION,
            };
            out.push(drill.recommend(deviation_priority(d), &deviation_reason(d)));
        }

        if out.is_empty() {
            if let Some(category) = f.category {
                out.push(maintenance_drill(category).recommend(Low, "Maintain current quality"));
            }
        }

        out
    }

    fn muscle_candidates(&self, f: &Findings) -> Vec<MuscleRecommendation> {
        use MuscleAction::*;
        use Priority::*;
        let mut out = Vec::new();

        for flag in &f.flags {
            let reason = flag.description();
            match flag {
                PatternFlag::StaticInstability => {
                    out.push(muscle("Gluteus medius", Strengthen, High, reason));
                    out.push(muscle("Peroneals", Strengthen, Medium, reason));
                }
                PatternFlag::StaticHipDrop => {
                    out.push(muscle("Gluteus medius", Strengthen, High, reason));
                    out.push(muscle("Quadratus lumborum", Stretch, Low, reason));
                }
                PatternFlag::StaticShoulderAsymmetry => {
                    out.push(muscle("Upper trapezius", Stretch, Medium, reason));
                    out.push(muscle("Lower trapezius", Strengthen, Medium, reason));
                }
                PatternFlag::StaticKneeAsymmetry => {
                    out.push(muscle("Quadriceps", Strengthen, Medium, reason));
                }
                PatternFlag::StaticTrunkLean => {
                    out.push(muscle("Transversus abdominis", Activate, High, reason));
                    out.push(muscle("Hip flexors", Stretch, Medium, reason));
                }
                PatternFlag::StaticJointTremor => {
                    out.push(muscle("Quadriceps", Strengthen, Low, reason));
                }
                PatternFlag::StaticKneeValgus => {
                    out.push(muscle("Gluteus medius", Strengthen, High, reason));
                    out.push(muscle("Hip adductors", Stretch, Medium, reason));
                }
                PatternFlag::StaticPelvicTilt => {
                    out.push(muscle("Gluteus maximus", Activate, Medium, reason));
                }
                PatternFlag::StaticLateralShift => {
                    out.push(muscle("Obliques", Strengthen, Medium, reason));
                }
            }
        }

        for d in f.deviations.iter().filter(|d| d.status.is_problem()) {
            let (name, action) = match d.angle {
                AngleName::LeftAnkle | AngleName::RightAnkle => ("Calves", Stretch),
                AngleName::LeftHip | AngleName::RightHip => ("Hamstrings", Stretch),
                AngleName::LeftKnee | AngleName::RightKnee => ("Quadriceps", Strengthen),
                AngleName::TrunkLean => ("Erector spinae", Strengthen),
            };
            out.push(muscle(name, action, deviation_priority(d), &deviation_reason(d)));
        }

        out
    }

    fn pattern_candidates(&self, f: &Findings) -> Vec<PatternRecommendation> {
        use Priority::*;
        let mut out = Vec::new();

        for flag in &f.flags {
            let (cue, priority) = flag_cue(*flag);
            out.push(cue.recommend(priority, flag.description()));
        }

        for a in &f.asymmetries {
            if a.significance >= Significance::Moderate {
                out.push(SYMMETRIC_STANCE.recommend(Medium, &a.description));
            }
        }

        for i in &f.instabilities {
            if let InstabilityKind::JointTremor { .. } = i.kind {
                out.push(BREATHING.recommend(Low, &i.description));
            } else if i.severity == Severity::Severe {
                out.push(ANKLE_STRATEGY.recommend(High, &i.description));
            }
        }

        out
    }
}
