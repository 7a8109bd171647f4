// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Contract between the client and the component runtime.
//!
//! Calls return synchronously; command completion, errors and returned buffers
//! arrive later through the [`EventSink`] handed over at creation, usually from
//! a runtime-owned thread.

use std::any::Any;

use super::event_sink::EventSink;
use crate::core::buffers::{BufferHeader, BufferMemory};
use crate::core::error_code::ErrorCode;
use crate::core::types::{Command, PortDefinition, PortDomain, PortRange, StateType};

/// Other end of a tunnel, passed to [`IlComponentHandle::setup_tunnel`].
#[derive(Clone, Copy)]
pub struct TunnelPeer<'a> {
    pub component: &'a dyn IlComponentHandle,
    pub port: u32,
}

/// Factory for component handles.
pub trait IlCore: Send + Sync {
    /// Instantiate the component called `name`. Events for it must be delivered
    /// to `sink`.
    fn get_handle(
        &self,
        name: &str,
        sink: EventSink,
    ) -> Result<Box<dyn IlComponentHandle>, ErrorCode>;
}

/// Runtime side of one component. Dropping the handle frees the component.
#[allow(clippy::result_large_err)]
pub trait IlComponentHandle: Send + Sync {
    /// Name the runtime reports for the component, if it reports one.
    fn component_name(&self) -> Option<String> {
        None
    }

    fn send_command(&self, command: Command) -> Result<(), ErrorCode>;

    fn state(&self) -> Result<StateType, ErrorCode>;

    fn port_range(&self, domain: PortDomain) -> Result<PortRange, ErrorCode>;

    fn port_definition(&self, port: u32) -> Result<PortDefinition, ErrorCode>;

    fn set_port_definition(&self, definition: &PortDefinition) -> Result<(), ErrorCode>;

    /// Streams the source port can currently deliver.
    fn num_available_streams(&self, port: u32) -> Result<u32, ErrorCode>;

    fn set_active_stream(&self, port: u32, stream: u32) -> Result<(), ErrorCode>;

    fn suggest_buffer_size(&self, _size: usize) -> Result<(), ErrorCode> {
        Err(ErrorCode::UnsupportedIndex)
    }

    /// Bind `port` to `peer`, or unbind it with `None`. Called on the source
    /// component; binding covers both ends.
    fn setup_tunnel(&self, port: u32, peer: Option<TunnelPeer<'_>>) -> Result<(), ErrorCode>;

    /// Register caller-owned memory as a buffer on `port`. The memory comes
    /// back with the error if it is refused.
    fn use_buffer(
        &self,
        port: u32,
        memory: BufferMemory,
    ) -> Result<BufferHeader, (ErrorCode, BufferMemory)>;

    /// Unregister a buffer, handing its memory back.
    fn free_buffer(
        &self,
        port: u32,
        header: BufferHeader,
    ) -> Result<BufferMemory, (ErrorCode, BufferHeader)>;

    /// Hand a filled input buffer to the component. It comes back through
    /// [`EventSink::empty_buffer_done`].
    fn empty_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)>;

    /// Hand an empty output buffer to the component. It comes back through
    /// [`EventSink::fill_buffer_done`].
    fn fill_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)>;

    fn as_any(&self) -> &dyn Any;
}
