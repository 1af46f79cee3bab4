//! # Biomech-Core
//!
//! Core types and utilities shared by the BiomechCoach static assessment
//! engine: pose frames and keypoints, named joint angles, pattern flags,
//! planar geometry, and the clock/timer abstraction that drives recordings.

pub mod clock;
pub mod error;
pub mod geometry;
pub mod types;

pub use clock::*;
pub use error::{Error, Result};
pub use geometry::*;
pub use types::*;
