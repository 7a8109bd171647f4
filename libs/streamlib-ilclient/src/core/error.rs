// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use super::error_code::ErrorCode;
use super::types::{CommandKind, StateType};

#[derive(Error, Debug)]
pub enum IlError {
    #[error("Component creation failed for '{name}': {code}")]
    ComponentCreation { name: String, code: ErrorCode },

    #[error("{component}: {operation} rejected by runtime: {code}")]
    Runtime {
        component: String,
        operation: &'static str,
        code: ErrorCode,
    },

    #[error("{component}: {command:?}({data}) failed")]
    CommandFailed {
        component: String,
        command: CommandKind,
        data: u32,
    },

    #[error("{component}: {command:?}({data}) aborted by an error on related component {related}")]
    RelatedCommandFailed {
        component: String,
        related: String,
        command: CommandKind,
        data: u32,
    },

    #[error("{component}: {operation} not allowed in state {state}")]
    InvalidState {
        component: String,
        operation: &'static str,
        state: StateType,
    },

    #[error("{component}: port {port} cannot take client buffers: {reason}")]
    PortNotReady {
        component: String,
        port: u32,
        reason: &'static str,
    },

    #[error("Event pool exhausted (capacity {capacity}); events are not being consumed")]
    EventPoolExhausted { capacity: usize },

    #[error("{component}: port {port} registered {registered} of {required} buffers")]
    BufferAllocation {
        component: String,
        port: u32,
        registered: u32,
        required: u32,
    },

    #[error("{component}: buffer returned on a direction not enabled at creation")]
    UnexpectedBufferCallback { component: String },

    #[error("Component {0} is no longer alive")]
    ComponentGone(String),

    #[error("Wait failed: {0}")]
    Wait(#[from] WaitError),

    #[error("Tunnel setup failed: {0}")]
    TunnelSetup(#[from] TunnelSetupError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IlError>;

/// Failure of [`wait_for_event`](crate::core::waiter::wait_for_event).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out before the event arrived")]
    Timeout,

    #[error("an error event was received instead")]
    ErrorEvent,

    #[error("a config-changed event was received instead")]
    ConfigChanged,
}

impl WaitError {
    /// Negative status code for callers that log numerically.
    pub fn raw_code(self) -> i32 {
        match self {
            Self::Timeout => -1,
            Self::ErrorEvent => -2,
            Self::ConfigChanged => -3,
        }
    }
}

/// Failure of [`Tunnel::setup`](crate::core::tunnel::Tunnel::setup). The tunnel
/// is always left torn down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelSetupError {
    #[error("timed out waiting for port settings on the source port")]
    SettingsTimeout,

    #[error("a component reported an error")]
    ComponentError,

    #[error("no streams are available from the source port")]
    NoStreams,

    #[error("requested stream {requested} is not available ({available} advertised)")]
    StreamUnavailable { requested: u32, available: u32 },

    #[error("the data format was not acceptable to the sink")]
    FormatRejected,
}

impl TunnelSetupError {
    pub fn raw_code(self) -> i32 {
        match self {
            Self::SettingsTimeout => -1,
            Self::ComponentError => -2,
            Self::NoStreams => -3,
            Self::StreamUnavailable { .. } => -4,
            Self::FormatRejected => -5,
        }
    }
}

impl From<WaitError> for TunnelSetupError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout => Self::SettingsTimeout,
            WaitError::ErrorEvent | WaitError::ConfigChanged => Self::ComponentError,
        }
    }
}

/// Result of a command wait that also watches a second component.
///
/// When both parties fail concurrently the variant observed is whichever
/// failure the waiter finds first; no ordering between them is promised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualWaitOutcome {
    /// The command completed, or failed with same-state.
    Completed,
    /// A command-terminating error arrived on the waited component and was
    /// consumed.
    Failed,
    /// A command-terminating error is queued on the related component. It is
    /// left in place for that component's own waiter.
    RelatedFailed,
}

impl DualWaitOutcome {
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }

    pub fn raw_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Failed => -1,
            Self::RelatedFailed => -2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_setup_raw_codes() {
        assert_eq!(TunnelSetupError::SettingsTimeout.raw_code(), -1);
        assert_eq!(TunnelSetupError::ComponentError.raw_code(), -2);
        assert_eq!(TunnelSetupError::NoStreams.raw_code(), -3);
        assert_eq!(
            TunnelSetupError::StreamUnavailable {
                requested: 2,
                available: 1
            }
            .raw_code(),
            -4
        );
        assert_eq!(TunnelSetupError::FormatRejected.raw_code(), -5);
    }

    #[test]
    fn test_wait_error_maps_into_setup_outcome() {
        assert_eq!(
            TunnelSetupError::from(WaitError::Timeout),
            TunnelSetupError::SettingsTimeout
        );
        assert_eq!(
            TunnelSetupError::from(WaitError::ErrorEvent),
            TunnelSetupError::ComponentError
        );
    }

    #[test]
    fn test_error_display() {
        let err = IlError::EventPoolExhausted { capacity: 4 };
        assert!(err.to_string().contains("capacity 4"));
        let err = IlError::from(WaitError::Timeout);
        assert_eq!(err.to_string(), "Wait failed: timed out before the event arrived");
    }
}
