// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod buffers;
pub mod client;
pub mod component;
pub mod config;
pub mod error;
pub mod error_code;
pub mod events;
pub mod logging;
pub mod runtime;
pub mod tunnel;
pub mod types;
pub mod waiter;
pub mod wake_signal;

pub use buffers::*;
pub use client::*;
pub use component::*;
pub use config::{IlClientConfig, LoggingConfig};
pub use error::*;
pub use error_code::*;
pub use events::*;
pub use logging::init_logging;
pub use runtime::*;
pub use tunnel::*;
pub use types::*;
pub use waiter::*;
pub use wake_signal::*;
