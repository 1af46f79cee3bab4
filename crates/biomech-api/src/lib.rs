//! # Biomech-API
//!
//! Configuration loading and the async [`AssessmentService`] that a UI or
//! transport layer drives.
//!
//! ## Usage
//!
//! ```text
//! EngineConfig::from_file("biomech.toml")
//!     ↓
//! AssessmentService::new(config)
//!     ↓
//! start_session → set_exercise → start_recording → process_frame …
//!     ↓
//! record_completed → end_session → export
//! ```

pub mod config;
pub mod service;

pub use config::*;
pub use service::*;
