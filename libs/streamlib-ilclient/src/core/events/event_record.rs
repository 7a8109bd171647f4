// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{CommandKind, EventKind};

/// Opaque payload delivered with an event (mark data for mark events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventPayload(pub u64);

/// One received-but-unconsumed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub data1: u32,
    pub data2: u32,
    pub payload: Option<EventPayload>,
}

impl EventRecord {
    pub fn new(kind: EventKind, data1: u32, data2: u32) -> Self {
        Self {
            kind,
            data1,
            data2,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Same `(kind, data1, data2)` triple; the payload is not compared.
    pub fn same_triple(&self, other: &EventRecord) -> bool {
        self.kind == other.kind && self.data1 == other.data1 && self.data2 == other.data2
    }

    /// Matches `kind` and, where given, `data1` / `data2`. `None` is a wildcard.
    pub fn matches(&self, kind: EventKind, data1: Option<u32>, data2: Option<u32>) -> bool {
        self.kind == kind
            && data1.is_none_or(|d| d == self.data1)
            && data2.is_none_or(|d| d == self.data2)
    }

    pub fn is_command_complete(&self, command: CommandKind, data: u32) -> bool {
        self.kind == EventKind::CmdComplete && self.data1 == command.raw() && self.data2 == data
    }

    /// An error event whose `data2` flags it as having terminated a command.
    pub fn is_command_terminating_error(&self) -> bool {
        self.kind == EventKind::Error && self.data2 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_with_wildcards() {
        let record = EventRecord::new(EventKind::PortSettingsChanged, 131, 7);
        assert!(record.matches(EventKind::PortSettingsChanged, Some(131), None));
        assert!(record.matches(EventKind::PortSettingsChanged, None, None));
        assert!(!record.matches(EventKind::PortSettingsChanged, Some(130), None));
        assert!(!record.matches(EventKind::Error, None, None));
    }

    #[test]
    fn test_same_triple_ignores_payload() {
        let a = EventRecord::new(EventKind::Mark, 0, 0).with_payload(EventPayload(1));
        let b = EventRecord::new(EventKind::Mark, 0, 0).with_payload(EventPayload(2));
        assert!(a.same_triple(&b));
    }

    #[test]
    fn test_command_terminating_error() {
        assert!(EventRecord::new(EventKind::Error, 0x8000_1005, 1).is_command_terminating_error());
        assert!(!EventRecord::new(EventKind::Error, 0x8000_1005, 0).is_command_terminating_error());
    }
}
