// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::core::config::LoggingConfig;
use crate::core::error::{IlError, Result};

/// Install a stdout subscriber filtered by `RUST_LOG`, falling back to
/// `config.default_filter`.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter).map_err(|e| {
            IlError::Configuration(format!(
                "Invalid log filter '{}': {}",
                config.default_filter, e
            ))
        })?,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok();
    Ok(installed)
}
