// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client-managed buffers: registering a port's buffers, releasing them, and
//! the exchange of individual buffers with the component.

use tracing::{debug, warn};

use super::allocator::{AllocatorStrategy, DefaultAllocator};
use super::buffer_header::{BufferHeader, BufferOwner};
use crate::core::component::Component;
use crate::core::error::{IlError, Result};
use crate::core::types::{Command, CommandKind, Direction, EventKind};
use crate::core::wake_signal::{WaitMode, WakeBits};

fn returned_bit(direction: Direction) -> WakeBits {
    match direction {
        Direction::Input => WakeBits::EMPTY_BUFFER_DONE,
        Direction::Output => WakeBits::FILL_BUFFER_DONE,
    }
}

impl Component {
    /// Enable a disabled port and register its full complement of buffers,
    /// allocated from `allocator` (the heap when `None`).
    ///
    /// The registered buffers start out in the returned-buffer queue. If fewer
    /// than the required count can be registered, or the enable fails, every
    /// registered buffer is freed, the port is disabled again and the error
    /// event is consumed.
    pub fn enable_port_buffers(&self, port: u32, allocator: Option<&dyn AllocatorStrategy>) -> Result<()> {
        let allocator = allocator.unwrap_or(&DefaultAllocator);
        let definition = self.port_definition(port)?;

        let not_ready = |reason| IlError::PortNotReady {
            component: self.name(),
            port,
            reason,
        };
        if definition.enabled {
            return Err(not_ready("port is already enabled"));
        }
        if definition.buffer_count_actual == 0 || definition.buffer_size == 0 {
            return Err(not_ready("port has no buffer requirement"));
        }

        let state = self.state()?;
        if !state.accepts_buffers() {
            return Err(IlError::InvalidState {
                component: self.name(),
                operation: "enable port buffers",
                state,
            });
        }

        self.send_command(Command::PortEnable(port))?;

        let alignment = if definition.buffer_alignment == 0 {
            self.client().config.default_buffer_alignment
        } else {
            definition.buffer_alignment
        };
        let description = self.buffer_name();
        let required = definition.buffer_count_actual;
        let mut registered = 0u32;

        while registered < required {
            let Some(memory) = allocator.allocate(definition.buffer_size, alignment, &description) else {
                warn!("{}: allocation failed for buffer {} of port {}", self.name(), registered, port);
                break;
            };
            match self.handle().use_buffer(port, memory) {
                Ok(header) => {
                    self.buffers().push_returned(header);
                    registered += 1;
                }
                Err((code, memory)) => {
                    warn!("{}: port {} refused buffer {}: {}", self.name(), port, registered, code);
                    allocator.free(memory);
                    break;
                }
            }
        }

        let outcome = if registered == required {
            self.wait_for_command(CommandKind::PortEnable, port)
        } else {
            Err(IlError::BufferAllocation {
                component: self.name(),
                port,
                registered,
                required,
            })
        };

        if outcome.is_err() {
            if let Err(err) = self.disable_port_buffers(port, Vec::new(), Some(allocator)) {
                debug!("{}: rollback of port {}: {}", self.name(), port, err);
            }
            self.remove_event(EventKind::Error, None, Some(1));
        }
        outcome
    }

    /// Disable a port and free its buffers.
    ///
    /// `pending` holds buffers the caller took from the queue and still owns;
    /// buffers still in the queue are collected automatically. Buffers held by
    /// the component are freed as it returns them. Does nothing if the port is
    /// not enabled or has no buffer requirement.
    pub fn disable_port_buffers(
        &self,
        port: u32,
        pending: Vec<BufferHeader>,
        allocator: Option<&dyn AllocatorStrategy>,
    ) -> Result<()> {
        let allocator = allocator.unwrap_or(&DefaultAllocator);
        let definition = self.port_definition(port)?;
        if !definition.enabled || definition.buffer_count_actual == 0 || definition.buffer_size == 0 {
            return Ok(());
        }

        let mut expected = self.registered_buffers(port);
        self.send_command(Command::PortDisable(port))?;

        let mut list = pending;
        while expected > 0 {
            if list.is_empty() {
                list = self.buffers().take_all(definition.direction, port);
            }

            for header in list.drain(..) {
                let id = header.id();
                let memory = match self.handle().free_buffer(port, header) {
                    Ok(memory) => memory,
                    Err((code, header)) => {
                        warn!("{}: free of {} on port {} failed: {}", self.name(), id, port, code);
                        header.into_memory()
                    }
                };
                self.buffers().forget(id);
                allocator.free(memory);
                expected = expected.saturating_sub(1);
            }

            if expected > 0 {
                let mask = WakeBits::PORT_DISABLED | WakeBits::EVENT_ERROR | returned_bit(definition.direction);
                let hit = self.wake().wait(mask, WaitMode::Forever).unwrap_or_default();

                if hit.contains(WakeBits::EVENT_ERROR) && self.remove_event(EventKind::Error, None, Some(1)) {
                    warn!("{}: port {} reported an error while disabling", self.name(), port);
                    return Ok(());
                }
                if hit.contains(WakeBits::PORT_DISABLED)
                    && self.remove_event(
                        EventKind::CmdComplete,
                        Some(CommandKind::PortDisable.raw()),
                        Some(port),
                    )
                {
                    return Ok(());
                }
            }
        }

        self.wait_for_command(CommandKind::PortDisable, port)
    }

    /// Take the oldest returned input buffer of `port`, optionally blocking
    /// until one is returned.
    pub fn get_input_buffer(&self, port: u32, block: bool) -> Option<BufferHeader> {
        self.take_returned(Direction::Input, port, block)
    }

    /// Take the oldest returned output buffer of `port`, optionally blocking
    /// until one is returned.
    pub fn get_output_buffer(&self, port: u32, block: bool) -> Option<BufferHeader> {
        self.take_returned(Direction::Output, port, block)
    }

    fn take_returned(&self, direction: Direction, port: u32, block: bool) -> Option<BufferHeader> {
        loop {
            if let Some(header) = self.buffers().take(direction, port) {
                return Some(header);
            }
            if !block {
                return None;
            }
            self.wake().wait(returned_bit(direction), WaitMode::Forever);
        }
    }

    /// Hand a filled input buffer to the component. If the component refuses
    /// it, the buffer goes back on the returned-buffer queue.
    pub fn empty_buffer(&self, header: BufferHeader) -> Result<()> {
        let id = header.id();
        self.buffers().set_owner(id, BufferOwner::Runtime);
        self.handle().empty_this_buffer(header).map_err(|(code, header)| {
            self.buffers().push_returned(header);
            self.runtime_error("empty buffer", code)
        })
    }

    /// Hand an empty output buffer to the component. If the component refuses
    /// it, the buffer goes back on the returned-buffer queue.
    pub fn fill_buffer(&self, header: BufferHeader) -> Result<()> {
        let id = header.id();
        self.buffers().set_owner(id, BufferOwner::Runtime);
        self.handle().fill_this_buffer(header).map_err(|(code, header)| {
            self.buffers().push_returned(header);
            self.runtime_error("fill buffer", code)
        })
    }
}
