//! # Biomech-Assessment
//!
//! Scores held exercises against reference standards and manages the
//! assessment session they belong to.
//!
//! ## Flow
//!
//! ```text
//! ExerciseRecording (angles + StaticMetrics)
//!     ↓
//! [Standards] → ideal angle, tolerance and acceptable range per joint
//!     ↓
//! [Deviation + Observations] → deviations, asymmetries, instabilities
//!     ↓
//! [Scoring] → 0..100 + status
//!     ↓
//! [Recommendations] [Pain prediction]
//!     ↓
//! ExerciseAssessmentResult → AssessmentSession → SessionStore / report
//! ```

pub mod deviation;
pub mod observations;
pub mod pain;
pub mod persistence;
pub mod recommendations;
pub mod report;
pub mod scoring;
pub mod session;
pub mod standards;

pub use deviation::*;
pub use observations::*;
pub use pain::*;
pub use persistence::*;
pub use recommendations::*;
pub use report::*;
pub use scoring::*;
pub use session::*;
pub use standards::*;
