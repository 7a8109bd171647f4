// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::component_id::ComponentId;
use super::create_flags::CreateFlags;
use super::error_mask::{AtomicErrorMask, ErrorMask, ErrorMaskGuard};
use crate::core::buffers::{BufferId, BufferOwner, BufferQueues};
use crate::core::client::ClientShared;
use crate::core::error::{IlError, Result, WaitError};
use crate::core::error_code::ErrorCode;
use crate::core::events::EventRecord;
use crate::core::runtime::IlComponentHandle;
use crate::core::types::{
    Command, CommandKind, Direction, EventKind, PortDefinition, PortDomain, StateType,
};
use crate::core::waiter;
use crate::core::wake_signal::{WaitMode, WakeBits, WakeSignal};

/// State of a component shared between its owner and the runtime threads that
/// deliver its events.
///
/// Callbacks receive a `&ComponentShared`, and every [`Component`] derefs to
/// one, so the event-list and buffer-queue queries below are available from
/// both sides.
pub struct ComponentShared {
    id: ComponentId,
    name: RwLock<String>,
    buffer_name: RwLock<String>,
    flags: CreateFlags,
    wake: Arc<WakeSignal>,
    error_mask: AtomicErrorMask,
    /// Wake signal of a waiter that watches this component's failures.
    related: Mutex<Option<Arc<WakeSignal>>>,
    buffers: Mutex<BufferQueues>,
    closed: AtomicBool,
    client: Arc<ClientShared>,
}

impl ComponentShared {
    pub(crate) fn new(
        id: ComponentId,
        short_name: &str,
        flags: CreateFlags,
        client: Arc<ClientShared>,
    ) -> Self {
        Self {
            id,
            name: RwLock::new(format!("cl:{short_name}")),
            buffer_name: RwLock::new(format!("cl:{short_name} buffer")),
            flags,
            wake: Arc::new(WakeSignal::new()),
            error_mask: AtomicErrorMask::default(),
            related: Mutex::new(None),
            buffers: Mutex::new(BufferQueues::default()),
            closed: AtomicBool::new(false),
            client,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Diagnostic name, `cl:<name>`.
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Description handed to buffer allocators, `cl:<name> buffer`.
    pub fn buffer_name(&self) -> String {
        self.buffer_name.read().clone()
    }

    pub(crate) fn rename(&self, short_name: &str) {
        *self.name.write() = format!("cl:{short_name}");
        *self.buffer_name.write() = format!("cl:{short_name} buffer");
    }

    pub fn flags(&self) -> CreateFlags {
        self.flags
    }

    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    pub(crate) fn wake_handle(&self) -> Arc<WakeSignal> {
        Arc::clone(&self.wake)
    }

    pub fn mask_errors(&self, mask: ErrorMask) {
        self.error_mask.insert(mask);
    }

    pub fn unmask_errors(&self, mask: ErrorMask) {
        self.error_mask.remove(mask);
    }

    pub fn error_mask(&self) -> ErrorMask {
        self.error_mask.load()
    }

    pub(crate) fn related_signal(&self) -> Option<Arc<WakeSignal>> {
        self.related.lock().clone()
    }

    pub(crate) fn set_related_signal(&self, signal: Option<Arc<WakeSignal>>) {
        *self.related.lock() = signal;
    }

    pub(crate) fn buffers(&self) -> MutexGuard<'_, BufferQueues> {
        self.buffers.lock()
    }

    pub(crate) fn client(&self) -> &ClientShared {
        &self.client
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove the newest queued event matching `kind` and, where given,
    /// `data1` / `data2`. Removing an error or config-changed event also
    /// clears the corresponding wake bit.
    pub fn remove_event(&self, kind: EventKind, data1: Option<u32>, data2: Option<u32>) -> bool {
        let mut pool = self.client.pool.lock();
        let removed = pool
            .remove_first(self.id, |record| record.matches(kind, data1, data2))
            .is_some();

        if removed {
            match kind {
                EventKind::Error => {
                    self.wake.clear(WakeBits::EVENT_ERROR);
                }
                EventKind::ParamOrConfigChanged => {
                    self.wake.clear(WakeBits::CONFIG_CHANGED);
                }
                _ => {}
            }
        }
        removed
    }

    pub fn has_event(&self, kind: EventKind, data1: Option<u32>, data2: Option<u32>) -> bool {
        self.client
            .pool
            .lock()
            .contains(self.id, |record| record.matches(kind, data1, data2))
    }

    /// Snapshot of the received-event list, newest first.
    pub fn queued_events(&self) -> Vec<EventRecord> {
        self.client.pool.lock().iter(self.id).copied().collect()
    }

    pub fn queued_event_count(&self) -> usize {
        self.client.pool.lock().len(self.id)
    }

    /// Return every queued event to the pool. Returns how many were released.
    pub fn return_events(&self) -> usize {
        self.client.pool.lock().drain(self.id)
    }

    /// Who currently holds a buffer registered on this component.
    pub fn buffer_owner(&self, id: BufferId) -> Option<BufferOwner> {
        self.buffers.lock().owner(id)
    }

    /// Buffers currently registered on `port`, whoever holds them.
    pub fn registered_buffers(&self, port: u32) -> usize {
        self.buffers.lock().registered_on(port)
    }

    /// Returned buffers waiting in the queue of one direction.
    pub fn queued_buffers(&self, direction: Direction) -> usize {
        self.buffers.lock().queued_len(direction)
    }

    fn close(&self) -> usize {
        let mut pool = self.client.pool.lock();
        self.closed.store(true, Ordering::Release);
        pool.unregister(self.id)
    }
}

impl std::fmt::Debug for ComponentShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentShared")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .field("flags", &self.flags)
            .field("wake", &self.wake)
            .finish()
    }
}

/// A component created through an [`IlClient`](crate::core::client::IlClient).
///
/// Dropping it releases its queued events and its runtime handle.
pub struct Component {
    shared: Arc<ComponentShared>,
    handle: Box<dyn IlComponentHandle>,
}

impl Component {
    pub(crate) fn new(shared: Arc<ComponentShared>, handle: Box<dyn IlComponentHandle>) -> Self {
        Self { shared, handle }
    }

    pub fn shared(&self) -> &Arc<ComponentShared> {
        &self.shared
    }

    /// The runtime handle, for runtime-specific calls this crate does not wrap.
    pub fn handle(&self) -> &dyn IlComponentHandle {
        self.handle.as_ref()
    }

    /// Mask `mask` until the returned guard is dropped.
    pub fn mask_errors_scoped(&self, mask: ErrorMask) -> ErrorMaskGuard {
        ErrorMaskGuard::new(Arc::clone(&self.shared), mask)
    }

    pub(crate) fn runtime_error(&self, operation: &'static str, code: ErrorCode) -> IlError {
        IlError::Runtime {
            component: self.name(),
            operation,
            code,
        }
    }

    pub fn state(&self) -> Result<StateType> {
        self.handle
            .state()
            .map_err(|code| self.runtime_error("get state", code))
    }

    pub fn send_command(&self, command: Command) -> Result<()> {
        tracing::trace!("{}: send {:?}", self.name(), command);
        self.handle
            .send_command(command)
            .map_err(|code| self.runtime_error("send command", code))
    }

    pub fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.handle
            .port_definition(port)
            .map_err(|code| self.runtime_error("get port definition", code))
    }

    pub fn set_port_definition(&self, definition: &PortDefinition) -> Result<()> {
        self.handle
            .set_port_definition(definition)
            .map_err(|code| self.runtime_error("set port definition", code))
    }

    /// Block until `(command, data)` completes on this component.
    pub fn wait_for_command(&self, command: CommandKind, data: u32) -> Result<()> {
        if waiter::wait_for_command_complete(&self.shared, command, data).is_completed() {
            Ok(())
        } else {
            Err(IlError::CommandFailed {
                component: self.name(),
                command,
                data,
            })
        }
    }

    /// Block until an event matching `kind` / `data1` / `data2` is queued,
    /// see [`waiter::wait_for_event`].
    pub fn wait_for_event(
        &self,
        kind: EventKind,
        data1: Option<u32>,
        data2: Option<u32>,
        wake_mask: WakeBits,
        mode: WaitMode,
    ) -> std::result::Result<(), WaitError> {
        waiter::wait_for_event(&self.shared, kind, data1, data2, wake_mask, mode)
    }

    /// Send a state change and wait for it. A failure consumes the error event
    /// that reported it.
    pub fn change_state(&self, state: StateType) -> Result<()> {
        self.send_command(Command::StateSet(state))?;
        let outcome = waiter::wait_for_command_complete(&self.shared, CommandKind::StateSet, state.raw());
        if outcome.is_completed() {
            tracing::debug!("{}: now in state {}", self.name(), state);
            return Ok(());
        }

        self.remove_event(EventKind::Error, None, None);
        Err(IlError::CommandFailed {
            component: self.name(),
            command: CommandKind::StateSet,
            data: state.raw(),
        })
    }

    pub fn enable_port(&self, port: u32) -> Result<()> {
        self.send_command(Command::PortEnable(port))?;
        self.wait_for_command(CommandKind::PortEnable, port)
    }

    pub fn disable_port(&self, port: u32) -> Result<()> {
        self.send_command(Command::PortDisable(port))?;
        self.wait_for_command(CommandKind::PortDisable, port)
    }

    /// Index of the `nth` port (zero-based) with the given direction, searching
    /// one domain or, with `None`, every domain in [`PortDomain::ALL`] order.
    pub fn port_index(&self, direction: Direction, domain: Option<PortDomain>, nth: usize) -> Option<u32> {
        let mut remaining = nth;
        for candidate in PortDomain::ALL {
            if domain.is_some_and(|d| d != candidate) {
                continue;
            }
            let Ok(range) = self.handle.port_range(candidate) else {
                continue;
            };
            for port in range.ports() {
                let Ok(definition) = self.handle.port_definition(port) else {
                    continue;
                };
                if definition.direction != direction {
                    continue;
                }
                if remaining == 0 {
                    return Some(port);
                }
                remaining -= 1;
            }
        }
        None
    }

    /// Hint the preferred output buffer size to the component.
    pub fn suggest_buffer_size(&self, size: usize) -> Result<()> {
        self.handle
            .suggest_buffer_size(size)
            .map_err(|code| self.runtime_error("suggest buffer size", code))
    }

    /// Disable every port, or zero the buffer count of every output port, as
    /// requested by `flags` at creation.
    pub(crate) fn apply_creation_flags(&self) -> Result<()> {
        let flags = self.flags();
        if !flags.intersects(CreateFlags::DISABLE_ALL_PORTS | CreateFlags::OUTPUT_ZERO_BUFFERS) {
            return Ok(());
        }

        for domain in [PortDomain::Audio, PortDomain::Video, PortDomain::Image, PortDomain::Other] {
            let Ok(range) = self.handle.port_range(domain) else {
                continue;
            };
            for port in range.ports() {
                if flags.contains(CreateFlags::DISABLE_ALL_PORTS) {
                    self.disable_port(port)?;
                }

                if flags.contains(CreateFlags::OUTPUT_ZERO_BUFFERS) {
                    let Ok(mut definition) = self.handle.port_definition(port) else {
                        continue;
                    };
                    if definition.direction == Direction::Output && definition.buffer_count_actual > 0 {
                        definition.buffer_count_actual = 0;
                        if let Err(code) = self.handle.set_port_definition(&definition) {
                            tracing::warn!("{}: cannot zero buffers on port {}: {}", self.name(), port, code);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Deref for Component {
    type Target = ComponentShared;

    fn deref(&self) -> &Self::Target {
        &self.shared
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        let returned = self.shared.close();
        tracing::debug!("{}: released ({} queued events returned)", self.name(), returned);
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Component").field(&self.shared).finish()
    }
}
