//! # Biomech-Capture
//!
//! Turns a stream of pose frames into per-exercise measurements.
//!
//! ## Stages
//!
//! 1. **Gate**: cap the processing rate at `target_fps`, dropping early frames
//! 2. **Angles and history**: per-frame joint angles and raw normalized series
//! 3. **Metrics**: static metrics recomputed every `metrics_cadence` frames
//! 4. **Recording**: countdown, fixed-duration capture window, completion
//!
//! A finished recording is summarized into a [`CompletedExercise`] that the
//! assessment layer scores.

pub mod gate;
pub mod pipeline;
pub mod recording;

pub use gate::*;
pub use pipeline::*;
pub use recording::*;
