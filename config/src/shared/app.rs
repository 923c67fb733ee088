use serde::Deserialize;

use crate::Config;
use crate::shared::{PipelineConfig, ValidationError};

/// Complete configuration for the `squares` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Configuration for the stage pipeline.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Validates the complete application configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()
    }
}

impl Config for AppConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["pipeline.values"];
}
