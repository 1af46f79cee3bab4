//! # Biomech-Metrics
//!
//! Turns keypoint frames into the quantities a static assessment is judged on.
//!
//! ## Stages
//!
//! 1. **Angles** - knee, hip and ankle interior angles plus trunk lean, per frame
//! 2. **History** - unsmoothed normalized time series for the selected exercise
//! 3. **Static metrics** - sway, left/right asymmetry, angle variability
//! 4. **Pattern flags** - thresholded compensations (`static_instability`,
//!    `static_hip_drop`, `static_knee_valgus`, ...)
//!
//! Frontal-plane measurements come from an optional [`FrontalAnalyzer`] and are
//! merged only for exercises filmed from the front.

pub mod angles;
pub mod frontal;
pub mod history;
pub mod static_metrics;

pub use angles::*;
pub use frontal::*;
pub use history::*;
pub use static_metrics::*;
