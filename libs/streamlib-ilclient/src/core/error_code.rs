// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Error codes reported by components, either as the result of a runtime call
//! or as `data1` of an error event.

use std::fmt;

const KHRONOS_BASE: u32 = 0x8000_1000;
const VENDOR_BASE: u32 = 0x9000_0000;

/// Component-reported error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InsufficientResources,
    Undefined,
    ComponentNotFound,
    BadParameter,
    NotImplemented,
    Underflow,
    Overflow,
    HardwareError,
    InvalidState,
    StreamCorrupt,
    PortsNotCompatible,
    NotReady,
    Timeout,
    SameState,
    IncorrectStateTransition,
    IncorrectStateOperation,
    UnsupportedSetting,
    UnsupportedIndex,
    BadPortIndex,
    PortUnpopulated,
    DiskFull,
    MaxFileSize,
    DrmUnauthorised,
    DrmExpired,
    DrmGeneral,
    Unclassified(u32),
}

impl ErrorCode {
    pub fn raw(self) -> u32 {
        match self {
            Self::InsufficientResources => KHRONOS_BASE,
            Self::Undefined => KHRONOS_BASE + 0x01,
            Self::ComponentNotFound => KHRONOS_BASE + 0x03,
            Self::BadParameter => KHRONOS_BASE + 0x05,
            Self::NotImplemented => KHRONOS_BASE + 0x06,
            Self::Underflow => KHRONOS_BASE + 0x07,
            Self::Overflow => KHRONOS_BASE + 0x08,
            Self::HardwareError => KHRONOS_BASE + 0x09,
            Self::InvalidState => KHRONOS_BASE + 0x0A,
            Self::StreamCorrupt => KHRONOS_BASE + 0x0B,
            Self::PortsNotCompatible => KHRONOS_BASE + 0x0C,
            Self::NotReady => KHRONOS_BASE + 0x10,
            Self::Timeout => KHRONOS_BASE + 0x11,
            Self::SameState => KHRONOS_BASE + 0x12,
            Self::IncorrectStateTransition => KHRONOS_BASE + 0x17,
            Self::IncorrectStateOperation => KHRONOS_BASE + 0x18,
            Self::UnsupportedSetting => KHRONOS_BASE + 0x19,
            Self::UnsupportedIndex => KHRONOS_BASE + 0x1A,
            Self::BadPortIndex => KHRONOS_BASE + 0x1B,
            Self::PortUnpopulated => KHRONOS_BASE + 0x1C,
            Self::DiskFull => VENDOR_BASE,
            Self::MaxFileSize => VENDOR_BASE + 1,
            Self::DrmUnauthorised => VENDOR_BASE + 2,
            Self::DrmExpired => VENDOR_BASE + 3,
            Self::DrmGeneral => VENDOR_BASE + 4,
            Self::Unclassified(raw) => raw,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            r if r == KHRONOS_BASE => Self::InsufficientResources,
            r if r == KHRONOS_BASE + 0x01 => Self::Undefined,
            r if r == KHRONOS_BASE + 0x03 => Self::ComponentNotFound,
            r if r == KHRONOS_BASE + 0x05 => Self::BadParameter,
            r if r == KHRONOS_BASE + 0x06 => Self::NotImplemented,
            r if r == KHRONOS_BASE + 0x07 => Self::Underflow,
            r if r == KHRONOS_BASE + 0x08 => Self::Overflow,
            r if r == KHRONOS_BASE + 0x09 => Self::HardwareError,
            r if r == KHRONOS_BASE + 0x0A => Self::InvalidState,
            r if r == KHRONOS_BASE + 0x0B => Self::StreamCorrupt,
            r if r == KHRONOS_BASE + 0x0C => Self::PortsNotCompatible,
            r if r == KHRONOS_BASE + 0x10 => Self::NotReady,
            r if r == KHRONOS_BASE + 0x11 => Self::Timeout,
            r if r == KHRONOS_BASE + 0x12 => Self::SameState,
            r if r == KHRONOS_BASE + 0x17 => Self::IncorrectStateTransition,
            r if r == KHRONOS_BASE + 0x18 => Self::IncorrectStateOperation,
            r if r == KHRONOS_BASE + 0x19 => Self::UnsupportedSetting,
            r if r == KHRONOS_BASE + 0x1A => Self::UnsupportedIndex,
            r if r == KHRONOS_BASE + 0x1B => Self::BadPortIndex,
            r if r == KHRONOS_BASE + 0x1C => Self::PortUnpopulated,
            r if r == VENDOR_BASE => Self::DiskFull,
            r if r == VENDOR_BASE + 1 => Self::MaxFileSize,
            r if r == VENDOR_BASE + 2 => Self::DrmUnauthorised,
            r if r == VENDOR_BASE + 3 => Self::DrmExpired,
            r if r == VENDOR_BASE + 4 => Self::DrmGeneral,
            other => Self::Unclassified(other),
        }
    }

    /// Storage-exhaustion errors are reported to callbacks but never wake an
    /// error waiter.
    pub fn is_storage_exhausted(self) -> bool {
        matches!(self, Self::DiskFull | Self::MaxFileSize)
    }

    /// Rights-management failures.
    pub fn is_drm(self) -> bool {
        matches!(
            self,
            Self::DrmUnauthorised | Self::DrmExpired | Self::DrmGeneral
        )
    }

    fn describe(self) -> &'static str {
        match self {
            Self::InsufficientResources => "insufficient resources",
            Self::Undefined => "undefined",
            Self::ComponentNotFound => "component not found",
            Self::BadParameter => "bad parameter",
            Self::NotImplemented => "not implemented",
            Self::Underflow => "underflow",
            Self::Overflow => "overflow",
            Self::HardwareError => "hardware error",
            Self::InvalidState => "invalid state",
            Self::StreamCorrupt => "stream corrupt",
            Self::PortsNotCompatible => "ports not compatible",
            Self::NotReady => "not ready",
            Self::Timeout => "timeout",
            Self::SameState => "same state",
            Self::IncorrectStateTransition => "incorrect state transition",
            Self::IncorrectStateOperation => "incorrect state operation",
            Self::UnsupportedSetting => "unsupported setting",
            Self::UnsupportedIndex => "unsupported index",
            Self::BadPortIndex => "bad port index",
            Self::PortUnpopulated => "port unpopulated",
            Self::DiskFull => "disk full",
            Self::MaxFileSize => "max file size",
            Self::DrmUnauthorised => "drm file is unauthorised",
            Self::DrmExpired => "drm file has expired",
            Self::DrmGeneral => "drm library error",
            Self::Unclassified(_) => "unexpected error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.describe(), self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_survive_raw_conversion() {
        let codes = [
            ErrorCode::InsufficientResources,
            ErrorCode::BadParameter,
            ErrorCode::SameState,
            ErrorCode::PortUnpopulated,
            ErrorCode::IncorrectStateTransition,
            ErrorCode::DiskFull,
            ErrorCode::DrmGeneral,
        ];
        for code in codes {
            assert_eq!(ErrorCode::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn test_unknown_raw_is_unclassified() {
        assert_eq!(ErrorCode::from_raw(0x1234), ErrorCode::Unclassified(0x1234));
        assert_eq!(ErrorCode::Unclassified(0x1234).raw(), 0x1234);
    }

    #[test]
    fn test_classification_helpers() {
        assert!(ErrorCode::DiskFull.is_storage_exhausted());
        assert!(ErrorCode::MaxFileSize.is_storage_exhausted());
        assert!(!ErrorCode::Overflow.is_storage_exhausted());
        assert!(ErrorCode::DrmExpired.is_drm());
    }

    #[test]
    fn test_display_includes_hex_code() {
        assert_eq!(
            ErrorCode::SameState.to_string(),
            "same state (0x80001012)"
        );
    }
}
