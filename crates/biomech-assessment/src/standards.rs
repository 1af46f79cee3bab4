//! Exercise standards: ideal angle bands and thresholds per exercise.

use biomech_core::{AngleName, CameraView, ExerciseId, Result};
use biomech_metrics::ExerciseLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseCategory {
    Posture,
    Balance,
    Squat,
    Lunge,
    Hinge,
    Bridge,
    Core,
}

impl ExerciseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseCategory::Posture => "posture",
            ExerciseCategory::Balance => "balance",
            ExerciseCategory::Squat => "squat",
            ExerciseCategory::Lunge => "lunge",
            ExerciseCategory::Hinge => "hinge",
            ExerciseCategory::Bridge => "bridge",
            ExerciseCategory::Core => "core",
        }
    }
}

impl fmt::Display for ExerciseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceptable band for one angle, degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleStandard {
    pub ideal: f64,
    pub tolerance: f64,
    pub min: f64,
    pub max: f64,
}

impl AngleStandard {
    pub const fn new(ideal: f64, tolerance: f64, min: f64, max: f64) -> Self {
        Self {
            ideal,
            tolerance,
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseStandard {
    pub exercise_id: ExerciseId,
    pub angles: BTreeMap<AngleName, AngleStandard>,
    /// Total sway above which the hold counts as unstable (normalized units)
    pub sway_threshold: f64,
    /// Left/right knee or hip angle difference, degrees
    pub asymmetry_threshold: f64,
}

impl ExerciseStandard {
    pub fn angle(&self, name: AngleName) -> Option<&AngleStandard> {
        self.angles.get(&name)
    }

    /// Per-exercise overrides for pattern flag detection
    pub fn limits(&self) -> ExerciseLimits {
        ExerciseLimits {
            angle_asymmetry: Some(self.asymmetry_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub name: String,
    pub category: ExerciseCategory,
    pub camera_view: CameraView,
    #[serde(default)]
    pub instructions: String,
    pub standard: ExerciseStandard,
}

impl ExerciseDefinition {
    pub fn id(&self) -> &ExerciseId {
        &self.standard.exercise_id
    }
}

/// Lookup from exercise id to its definition and standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseStandardsRegistry {
    exercises: Vec<ExerciseDefinition>,
}

impl ExerciseStandardsRegistry {
    /// Later definitions replace earlier ones with the same id
    pub fn new(definitions: Vec<ExerciseDefinition>) -> Self {
        let mut registry = Self { exercises: Vec::new() };
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    pub fn builtin() -> Self {
        Self::new(builtin_definitions())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(json)?;
        Ok(Self::new(registry.exercises))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn insert(&mut self, definition: ExerciseDefinition) {
        match self.exercises.iter_mut().find(|d| d.id() == definition.id()) {
            Some(existing) => *existing = definition,
            None => self.exercises.push(definition),
        }
    }

    pub fn definition(&self, id: &ExerciseId) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|d| d.id() == id)
    }

    pub fn standard(&self, id: &ExerciseId) -> Option<&ExerciseStandard> {
        self.definition(id).map(|d| &d.standard)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ExerciseDefinition> {
        self.exercises.iter()
    }

    pub fn by_category(
        &self,
        category: ExerciseCategory,
    ) -> impl Iterator<Item = &ExerciseDefinition> {
        self.exercises.iter().filter(move |d| d.category == category)
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

impl Default for ExerciseStandardsRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

struct Builder {
    id: &'static str,
    name: &'static str,
    category: ExerciseCategory,
    view: CameraView,
    instructions: &'static str,
    angles: BTreeMap<AngleName, AngleStandard>,
    sway: f64,
    asymmetry: f64,
}

fn exercise(
    id: &'static str,
    name: &'static str,
    category: ExerciseCategory,
    view: CameraView,
    instructions: &'static str,
) -> Builder {
    Builder {
        id,
        name,
        category,
        view,
        instructions,
        angles: BTreeMap::new(),
        sway: 0.02,
        asymmetry: 10.0,
    }
}

impl Builder {
    fn knees(self, band: AngleStandard) -> Self {
        self.angle(AngleName::LeftKnee, band).angle(AngleName::RightKnee, band)
    }

    fn hips(self, band: AngleStandard) -> Self {
        self.angle(AngleName::LeftHip, band).angle(AngleName::RightHip, band)
    }

    fn ankles(self, band: AngleStandard) -> Self {
        self.angle(AngleName::LeftAnkle, band).angle(AngleName::RightAnkle, band)
    }

    fn trunk(self, band: AngleStandard) -> Self {
        self.angle(AngleName::TrunkLean, band)
    }

    fn angle(mut self, name: AngleName, band: AngleStandard) -> Self {
        self.angles.insert(name, band);
        self
    }

    fn thresholds(mut self, sway: f64, asymmetry: f64) -> Self {
        self.sway = sway;
        self.asymmetry = asymmetry;
        self
    }

    fn build(self) -> ExerciseDefinition {
        ExerciseDefinition {
            name: self.name.to_string(),
            category: self.category,
            camera_view: self.view,
            instructions: self.instructions.to_string(),
            standard: ExerciseStandard {
                exercise_id: ExerciseId::new(self.id),
                angles: self.angles,
                sway_threshold: self.sway,
                asymmetry_threshold: self.asymmetry,
            },
        }
    }
}

const STRAIGHT_KNEE: AngleStandard = AngleStandard::new(178.0, 5.0, 165.0, 180.0);
const NEUTRAL_HIP: AngleStandard = AngleStandard::new(178.0, 6.0, 160.0, 180.0);
const NEUTRAL_ANKLE: AngleStandard = AngleStandard::new(115.0, 10.0, 95.0, 140.0);
const UPRIGHT_TRUNK: AngleStandard = AngleStandard::new(0.0, 5.0, 0.0, 15.0);

/// One-sided holds put the legs up to ~90° apart; the asymmetry limit sits above that
const UNILATERAL_ASYMMETRY: f64 = 200.0;

/// The 20 built-in exercises
pub fn builtin_definitions() -> Vec<ExerciseDefinition> {
    use CameraView::{Either, Front, Side};
    use ExerciseCategory::*;

    vec![
        exercise(
            "standing_posture_side",
            "Standing Posture (Side)",
            Posture,
            Side,
            "Stand tall, arms relaxed, profile to the camera",
        )
        .knees(STRAIGHT_KNEE)
        .hips(NEUTRAL_HIP)
        .ankles(NEUTRAL_ANKLE)
        .trunk(UPRIGHT_TRUNK)
        .thresholds(0.015, 8.0)
        .build(),
        exercise(
            "standing_posture_front",
            "Standing Posture (Front)",
            Posture,
            Front,
            "Stand tall facing the camera, feet hip-width apart",
        )
        .knees(STRAIGHT_KNEE)
        .hips(NEUTRAL_HIP)
        .trunk(UPRIGHT_TRUNK)
        .thresholds(0.015, 8.0)
        .build(),
        exercise(
            "bilateral_stance",
            "Bilateral Stance",
            Balance,
            Either,
            "Feet together, eyes forward, hold still",
        )
        .knees(STRAIGHT_KNEE)
        .hips(NEUTRAL_HIP)
        .trunk(UPRIGHT_TRUNK)
        .thresholds(0.015, 8.0)
        .build(),
        exercise(
            "single_leg_stance_left",
            "Single-Leg Stance (Left)",
            Balance,
            Front,
            "Stand on the left leg, right knee lifted to hip height",
        )
        .angle(AngleName::LeftKnee, STRAIGHT_KNEE)
        .angle(AngleName::LeftHip, NEUTRAL_HIP)
        .angle(AngleName::RightHip, AngleStandard::new(90.0, 15.0, 60.0, 120.0))
        .trunk(AngleStandard::new(0.0, 6.0, 0.0, 15.0))
        .thresholds(0.025, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "single_leg_stance_right",
            "Single-Leg Stance (Right)",
            Balance,
            Front,
            "Stand on the right leg, left knee lifted to hip height",
        )
        .angle(AngleName::RightKnee, STRAIGHT_KNEE)
        .angle(AngleName::RightHip, NEUTRAL_HIP)
        .angle(AngleName::LeftHip, AngleStandard::new(90.0, 15.0, 60.0, 120.0))
        .trunk(AngleStandard::new(0.0, 6.0, 0.0, 15.0))
        .thresholds(0.025, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "tandem_stance",
            "Tandem Stance",
            Balance,
            Either,
            "Heel to toe, arms by your sides",
        )
        .knees(STRAIGHT_KNEE)
        .hips(NEUTRAL_HIP)
        .trunk(UPRIGHT_TRUNK)
        .thresholds(0.025, 10.0)
        .build(),
        exercise("squat_hold", "Squat Hold", Squat, Side, "Sit back to thighs parallel and hold")
            .knees(AngleStandard::new(90.0, 10.0, 70.0, 110.0))
            .hips(AngleStandard::new(85.0, 15.0, 60.0, 115.0))
            .ankles(AngleStandard::new(75.0, 10.0, 55.0, 95.0))
            .trunk(AngleStandard::new(35.0, 10.0, 15.0, 50.0))
            .thresholds(0.025, 10.0)
            .build(),
        exercise(
            "half_squat_hold",
            "Half Squat Hold",
            Squat,
            Side,
            "Bend the knees to about 45 degrees and hold",
        )
        .knees(AngleStandard::new(135.0, 10.0, 115.0, 155.0))
        .hips(AngleStandard::new(130.0, 15.0, 105.0, 160.0))
        .trunk(AngleStandard::new(20.0, 10.0, 5.0, 35.0))
        .thresholds(0.02, 10.0)
        .build(),
        exercise("wall_sit", "Wall Sit", Squat, Side, "Back against the wall, knees at 90 degrees")
            .knees(AngleStandard::new(90.0, 8.0, 75.0, 105.0))
            .hips(AngleStandard::new(90.0, 10.0, 75.0, 110.0))
            .trunk(AngleStandard::new(0.0, 6.0, 0.0, 15.0))
            .thresholds(0.015, 8.0)
            .build(),
        exercise(
            "sumo_squat_hold",
            "Sumo Squat Hold",
            Squat,
            Front,
            "Wide stance, toes out, knees tracking over toes",
        )
        .knees(AngleStandard::new(100.0, 12.0, 80.0, 125.0))
        .hips(AngleStandard::new(100.0, 15.0, 75.0, 130.0))
        .trunk(AngleStandard::new(10.0, 8.0, 0.0, 25.0))
        .thresholds(0.02, 10.0)
        .build(),
        exercise(
            "split_squat_left",
            "Split Squat Hold (Left Forward)",
            Lunge,
            Side,
            "Left foot forward, both knees at 90 degrees",
        )
        .knees(AngleStandard::new(90.0, 12.0, 70.0, 115.0))
        .angle(AngleName::LeftHip, AngleStandard::new(95.0, 15.0, 70.0, 125.0))
        .angle(AngleName::RightHip, AngleStandard::new(170.0, 10.0, 145.0, 180.0))
        .trunk(AngleStandard::new(5.0, 8.0, 0.0, 20.0))
        .thresholds(0.025, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "split_squat_right",
            "Split Squat Hold (Right Forward)",
            Lunge,
            Side,
            "Right foot forward, both knees at 90 degrees",
        )
        .knees(AngleStandard::new(90.0, 12.0, 70.0, 115.0))
        .angle(AngleName::RightHip, AngleStandard::new(95.0, 15.0, 70.0, 125.0))
        .angle(AngleName::LeftHip, AngleStandard::new(170.0, 10.0, 145.0, 180.0))
        .trunk(AngleStandard::new(5.0, 8.0, 0.0, 20.0))
        .thresholds(0.025, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "lateral_lunge_hold",
            "Lateral Lunge Hold",
            Lunge,
            Front,
            "Step wide, sit into one hip, other leg straight",
        )
        .trunk(AngleStandard::new(15.0, 10.0, 0.0, 35.0))
        .thresholds(0.025, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "hip_hinge_hold",
            "Hip Hinge Hold",
            Hinge,
            Side,
            "Soft knees, push the hips back, flat back",
        )
        .knees(AngleStandard::new(160.0, 10.0, 140.0, 180.0))
        .hips(AngleStandard::new(100.0, 15.0, 75.0, 130.0))
        .trunk(AngleStandard::new(60.0, 12.0, 35.0, 80.0))
        .thresholds(0.02, 10.0)
        .build(),
        exercise(
            "single_leg_rdl_left",
            "Single-Leg Deadlift Hold (Left)",
            Hinge,
            Side,
            "Balance on the left leg, hinge until the trunk is near horizontal",
        )
        .angle(AngleName::LeftKnee, AngleStandard::new(165.0, 10.0, 145.0, 180.0))
        .angle(AngleName::LeftHip, AngleStandard::new(95.0, 15.0, 70.0, 125.0))
        .trunk(AngleStandard::new(75.0, 12.0, 50.0, 90.0))
        .thresholds(0.03, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "single_leg_rdl_right",
            "Single-Leg Deadlift Hold (Right)",
            Hinge,
            Side,
            "Balance on the right leg, hinge until the trunk is near horizontal",
        )
        .angle(AngleName::RightKnee, AngleStandard::new(165.0, 10.0, 145.0, 180.0))
        .angle(AngleName::RightHip, AngleStandard::new(95.0, 15.0, 70.0, 125.0))
        .trunk(AngleStandard::new(75.0, 12.0, 50.0, 90.0))
        .thresholds(0.03, UNILATERAL_ASYMMETRY)
        .build(),
        exercise(
            "glute_bridge_hold",
            "Glute Bridge Hold",
            Bridge,
            Side,
            "Lie on your back, lift the hips in line with knees and shoulders",
        )
        .knees(AngleStandard::new(90.0, 12.0, 70.0, 115.0))
        .hips(AngleStandard::new(175.0, 8.0, 150.0, 180.0))
        .thresholds(0.015, 10.0)
        .build(),
        exercise(
            "single_leg_bridge_left",
            "Single-Leg Bridge (Left)",
            Bridge,
            Side,
            "Bridge on the left leg, right leg extended",
        )
        .angle(AngleName::LeftKnee, AngleStandard::new(90.0, 12.0, 70.0, 115.0))
        .angle(AngleName::LeftHip, AngleStandard::new(172.0, 10.0, 145.0, 180.0))
        .thresholds(0.02, UNILATERAL_ASYMMETRY)
        .build(),
        exercise("plank_hold", "Plank Hold", Core, Side, "Forearms down, body in one straight line")
            .knees(STRAIGHT_KNEE)
            .hips(AngleStandard::new(175.0, 8.0, 155.0, 180.0))
            .trunk(AngleStandard::new(85.0, 8.0, 70.0, 90.0))
            .thresholds(0.015, 10.0)
            .build(),
        exercise(
            "side_plank_left",
            "Side Plank (Left)",
            Core,
            Front,
            "On the left forearm, hips lifted, body straight",
        )
        .hips(AngleStandard::new(175.0, 8.0, 155.0, 180.0))
        .knees(STRAIGHT_KNEE)
        .thresholds(0.02, 10.0)
        .build(),
    ]
}
