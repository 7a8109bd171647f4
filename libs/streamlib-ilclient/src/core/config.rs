// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client configuration via `ilclient.yaml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{IlError, Result};
use crate::core::events::DEFAULT_EVENT_POOL_CAPACITY;

/// Name prefix the classic runtime expects on every component.
pub const DEFAULT_COMPONENT_PREFIX: &str = "OMX.broadcom.";

/// Logging settings applied by [`init_logging`](crate::core::logging::init_logging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlClientConfig {
    /// Number of event records shared by all components of the client.
    pub event_pool_capacity: usize,

    /// Prepended to component names before they reach the runtime.
    pub component_name_prefix: String,

    /// Alignment for client-allocated buffers when the port does not state one.
    pub default_buffer_alignment: usize,

    /// Send state-transition commands in random order.
    pub randomize_state_transitions: bool,

    pub logging: LoggingConfig,
}

impl Default for IlClientConfig {
    fn default() -> Self {
        Self {
            event_pool_capacity: DEFAULT_EVENT_POOL_CAPACITY,
            component_name_prefix: DEFAULT_COMPONENT_PREFIX.to_string(),
            default_buffer_alignment: 16,
            randomize_state_transitions: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl IlClientConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "ilclient.yaml";

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| IlError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory. Returns error if the file is
    /// missing, cannot be parsed, or holds invalid values.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            IlError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            IlError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        config.validate()?;

        tracing::info!("Loaded IL client config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file is
    /// missing or unusable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_pool_capacity == 0 {
            return Err(IlError::Configuration(
                "event_pool_capacity must be at least 1".to_string(),
            ));
        }
        if self.default_buffer_alignment == 0 || !self.default_buffer_alignment.is_power_of_two() {
            return Err(IlError::Configuration(format!(
                "default_buffer_alignment must be a power of two, got {}",
                self.default_buffer_alignment
            )));
        }
        Ok(())
    }
}
