// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Vocabulary of the command/event protocol spoken with the component runtime.

use std::fmt;

/// Component state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    Invalid,
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitingForResources,
}

impl StateType {
    pub fn raw(self) -> u32 {
        match self {
            Self::Invalid => 0,
            Self::Loaded => 1,
            Self::Idle => 2,
            Self::Executing => 3,
            Self::Pause => 4,
            Self::WaitingForResources => 5,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Invalid),
            1 => Some(Self::Loaded),
            2 => Some(Self::Idle),
            3 => Some(Self::Executing),
            4 => Some(Self::Pause),
            5 => Some(Self::WaitingForResources),
            _ => None,
        }
    }

    /// States in which a port accepts client-supplied buffers.
    pub fn accepts_buffers(self) -> bool {
        matches!(self, Self::Idle | Self::Executing | Self::Pause)
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "Invalid",
            Self::Loaded => "Loaded",
            Self::Idle => "Idle",
            Self::Executing => "Executing",
            Self::Pause => "Pause",
            Self::WaitingForResources => "WaitingForResources",
        };
        f.write_str(name)
    }
}

/// Command discriminant, used as `data1` of a command-complete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StateSet,
    Flush,
    PortDisable,
    PortEnable,
    MarkBuffer,
}

impl CommandKind {
    pub fn raw(self) -> u32 {
        match self {
            Self::StateSet => 0,
            Self::Flush => 1,
            Self::PortDisable => 2,
            Self::PortEnable => 3,
            Self::MarkBuffer => 4,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::StateSet),
            1 => Some(Self::Flush),
            2 => Some(Self::PortDisable),
            3 => Some(Self::PortEnable),
            4 => Some(Self::MarkBuffer),
            _ => None,
        }
    }
}

/// A command sent to a component. Completion is reported asynchronously as a
/// command-complete event carrying `(kind, data)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StateSet(StateType),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
    MarkBuffer { port: u32, mark: u64 },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StateSet(_) => CommandKind::StateSet,
            Self::Flush(_) => CommandKind::Flush,
            Self::PortDisable(_) => CommandKind::PortDisable,
            Self::PortEnable(_) => CommandKind::PortEnable,
            Self::MarkBuffer { .. } => CommandKind::MarkBuffer,
        }
    }

    /// The `data2` value the matching command-complete event carries.
    pub fn data(&self) -> u32 {
        match *self {
            Self::StateSet(state) => state.raw(),
            Self::Flush(port) | Self::PortDisable(port) | Self::PortEnable(port) => port,
            Self::MarkBuffer { port, .. } => port,
        }
    }
}

/// Kind of an event delivered by the runtime to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `data1` = command kind, `data2` = command data.
    CmdComplete,
    /// `data1` = raw error code, `data2` = 1 if the error terminated a command.
    Error,
    /// Payload carries the mark data.
    Mark,
    /// `data1` = port index.
    PortSettingsChanged,
    /// `data1` = port index, `data2` = buffer flags.
    BufferFlag,
    /// `data1` = port index, `data2` = parameter/config index.
    ParamOrConfigChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CmdComplete => "cmd-complete",
            Self::Error => "error",
            Self::Mark => "mark",
            Self::PortSettingsChanged => "port-settings-changed",
            Self::BufferFlag => "buffer-flag",
            Self::ParamOrConfigChanged => "param-or-config-changed",
        };
        f.write_str(name)
    }
}

/// Direction of a port relative to its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Media domain a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDomain {
    Audio,
    Video,
    Image,
    Other,
}

impl PortDomain {
    /// Search order used when enumerating ports across every domain.
    pub const ALL: [PortDomain; 4] = [Self::Video, Self::Audio, Self::Image, Self::Other];
}

/// Contiguous range of port indices of one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortRange {
    pub start: u32,
    pub count: u32,
}

impl PortRange {
    pub fn ports(&self) -> impl Iterator<Item = u32> {
        self.start..self.start + self.count
    }
}

/// Port-domain metadata read from (and occasionally written to) a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    pub index: u32,
    pub direction: Direction,
    pub domain: PortDomain,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: usize,
    pub buffer_alignment: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_raw_roundtrip_covers_all_states() {
        for state in [
            StateType::Invalid,
            StateType::Loaded,
            StateType::Idle,
            StateType::Executing,
            StateType::Pause,
            StateType::WaitingForResources,
        ] {
            assert_eq!(StateType::from_raw(state.raw()), Some(state));
        }
        assert_eq!(StateType::from_raw(42), None);
    }

    #[test]
    fn test_command_data_matches_completion_data2() {
        assert_eq!(Command::StateSet(StateType::Idle).data(), 2);
        assert_eq!(Command::PortEnable(201).data(), 201);
        assert_eq!(Command::MarkBuffer { port: 3, mark: 9 }.data(), 3);
        assert_eq!(Command::Flush(7).kind(), CommandKind::Flush);
    }

    #[test]
    fn test_accepts_buffers() {
        assert!(!StateType::Loaded.accepts_buffers());
        assert!(StateType::Idle.accepts_buffers());
        assert!(StateType::Executing.accepts_buffers());
        assert!(StateType::Pause.accepts_buffers());
    }

    #[test]
    fn test_port_range_iterates_indices() {
        let range = PortRange { start: 130, count: 2 };
        assert_eq!(range.ports().collect::<Vec<_>>(), vec![130, 131]);
    }
}
