//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;

use biomech_assessment::{
    ExerciseStandardsRegistry, InMemorySessionStore, JsonFileSessionStore, SessionStore,
    DEFAULT_STORE_CAPACITY,
};
use biomech_capture::{AssessmentConfig, CaptureConfig};
use biomech_core::{Error, Result};
use biomech_metrics::StaticThresholds;
use serde::{Deserialize, Serialize};

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recording duration and countdown
    pub assessment: AssessmentConfig,

    /// Frame rate cap, metric cadence, history size
    pub capture: CaptureConfig,

    /// Pattern flag thresholds
    pub thresholds: StaticThresholds,

    pub persistence: PersistenceConfig,

    /// JSON file replacing the built-in exercise standards
    pub standards_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Session file; sessions stay in memory when unset
    pub path: Option<PathBuf>,

    /// Number of recent sessions kept
    pub capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, with `BIOMECH__*` environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("BIOMECH").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.try_deserialize().map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("BIOMECH").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.try_deserialize().map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.assessment.duration_secs > 0.0) {
            return Err(Error::Config(format!(
                "assessment.duration_secs must be positive, got {}",
                self.assessment.duration_secs
            )));
        }
        if self.assessment.detection_delay_secs < 0.0 {
            return Err(Error::Config(
                "assessment.detection_delay_secs must not be negative".to_string(),
            ));
        }
        if !(self.capture.target_fps > 0.0) {
            return Err(Error::Config("capture.target_fps must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.capture.min_confidence) {
            return Err(Error::Config("capture.min_confidence must be within 0..=1".to_string()));
        }
        Ok(())
    }

    pub fn load_registry(&self) -> Result<ExerciseStandardsRegistry> {
        match &self.standards_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let registry = ExerciseStandardsRegistry::from_json(&raw)?;
                tracing::info!(
                    "Loaded {} exercise standards from {}",
                    registry.len(),
                    path.display()
                );
                Ok(registry)
            }
            None => Ok(ExerciseStandardsRegistry::builtin()),
        }
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        match &self.persistence.path {
            Some(path) => Arc::new(JsonFileSessionStore::new(path, self.persistence.capacity)),
            None => Arc::new(InMemorySessionStore::new(self.persistence.capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.assessment.duration_secs, 30.0);
        assert_eq!(config.capture.target_fps, 20.0);
        assert_eq!(config.persistence.capacity, 10);
        assert!(config.validate().is_ok());
        assert!(!config.load_registry().unwrap().is_empty());
    }

    #[test]
    fn test_from_file_partial() {
        let name = format!("biomech-config-{}.json", biomech_core::SessionId::new());
        let path = std::env::temp_dir().join(name);
        let json = r#"{
            "assessment": { "duration_secs": 45.0 },
            "capture": { "target_fps": 15.0 }
        }"#;
        std::fs::write(&path, json).unwrap();

        let config = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.assessment.duration_secs, 45.0);
        assert_eq!(config.assessment.detection_delay_secs, 3.0);
        assert_eq!(config.capture.target_fps, 15.0);
        assert_eq!(config.capture.metrics_cadence, 5);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = EngineConfig::default();
        config.assessment.duration_secs = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
