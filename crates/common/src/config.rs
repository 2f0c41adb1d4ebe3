use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::types::SYSTEM_CALLER;

pub const DEFAULT_HOST_PACKAGE: &str = "io.guesthost";
pub const DEFAULT_PLACEHOLDER_SLOTS: usize = 50;
pub const CONFIG_ENV: &str = "GUESTHOST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Package the placeholders are registered under on the host.
    #[serde(default = "default_host_package")]
    pub host_package: String,
    /// Caller package reported when no guest screen originated a request.
    #[serde(default = "default_system_caller")]
    pub system_caller: String,
    #[serde(default)]
    pub placeholders: PlaceholderConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host_package: default_host_package(),
            system_caller: default_system_caller(),
            placeholders: PlaceholderConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_package.trim().is_empty() {
            return Err(ConfigError::Invalid("host_package cannot be empty".into()));
        }
        if self.placeholders.slots == 0 {
            return Err(ConfigError::Invalid(
                "placeholders.slots must be at least 1".into(),
            ));
        }
        if self.placeholders.normal_class == self.placeholders.dialog_class {
            return Err(ConfigError::Invalid(
                "normal and dialog placeholder classes must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Shape of the pre-registered placeholder pool: one normal and one dialog
/// placeholder per sandbox slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub slots: usize,
    pub normal_class: String,
    pub dialog_class: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_PLACEHOLDER_SLOTS,
            normal_class: "stub.Placeholder".into(),
            dialog_class: "stub.DialogPlaceholder".into(),
        }
    }
}

pub fn default_host_package() -> String {
    DEFAULT_HOST_PACKAGE.to_string()
}

pub fn default_system_caller() -> String {
    SYSTEM_CALLER.to_string()
}

/// Load and validate an orchestrator config from a TOML file.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: OrchestratorConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    debug!(
        "Loaded orchestrator config from {} ({} placeholder slots)",
        path.display(),
        config.placeholders.slots
    );
    Ok(config)
}
