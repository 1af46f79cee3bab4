//! Error types for the BiomechCoach engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid frame size: {width}x{height}")]
    FrameSize { width: f64, height: f64 },

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("No exercise selected")]
    NoExerciseSelected,

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("No active assessment session")]
    NoActiveSession,

    #[error("Assessment session {0} is already finalized")]
    SessionFinalized(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export unavailable: {0}")]
    ExportUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}
