// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard};

use super::spec::LoopbackSpec;
use super::worker;
use crate::core::buffers::{BufferFlags, BufferHeader, BufferId, BufferMemory};
use crate::core::error_code::ErrorCode;
use crate::core::events::EventPayload;
use crate::core::runtime::{EventSink, IlComponentHandle, TunnelPeer};
use crate::core::types::{
    Command, CommandKind, Direction, EventKind, PortDefinition, PortDomain, PortRange, StateType,
};

/// Work queued for a component's worker thread.
pub(crate) enum Job {
    Command(Command),
    Empty(BufferHeader),
    Fill(BufferHeader),
    /// Buffers were registered or freed; pending commands may now complete.
    Reevaluate,
    Emit {
        kind: EventKind,
        data1: u32,
        data2: u32,
    },
    Produce {
        port: u32,
        data: Vec<u8>,
        flags: BufferFlags,
    },
    /// The other end of the tunnel on `port` was disabled.
    PeerDisabled { port: u32 },
}

/// Something to deliver through the sink once the state lock is released.
pub(crate) enum Outgoing {
    Event(EventKind, u32, u32, Option<EventPayload>),
    EmptyDone(BufferHeader),
    FillDone(BufferHeader),
    /// Tell the tunnel peer that its port lost its supplier.
    PeerDisabled(TunnelEnd),
}

impl Outgoing {
    pub(crate) fn complete(command: CommandKind, data: u32) -> Self {
        Self::Event(EventKind::CmdComplete, command.raw(), data, None)
    }

    /// An error that terminated a command.
    pub(crate) fn failure(code: ErrorCode) -> Self {
        Self::Event(EventKind::Error, code.raw(), 1, None)
    }

    pub(crate) fn returned(header: BufferHeader) -> Self {
        match header.direction() {
            Direction::Input => Self::EmptyDone(header),
            Direction::Output => Self::FillDone(header),
        }
    }
}

/// A command accepted but waiting on buffer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    StateSet(StateType),
    PortEnable(u32),
    PortDisable(u32),
}

#[derive(Clone)]
pub(crate) struct TunnelEnd {
    pub(crate) peer: Weak<LoopbackComponent>,
    pub(crate) port: u32,
}

pub(crate) struct PortState {
    pub(crate) definition: PortDefinition,
    pub(crate) tunnel: Option<TunnelEnd>,
    pub(crate) buffers: HashSet<BufferId>,
    pub(crate) available_streams: Option<u32>,
    pub(crate) active_stream: u32,
}

impl PortState {
    /// Every required buffer is present, or the port needs none.
    pub(crate) fn is_populated(&self) -> bool {
        self.tunnel.is_some()
            || self.definition.buffer_count_actual == 0
            || self.buffers.len() >= self.definition.buffer_count_actual as usize
    }

    fn snapshot(&self) -> PortDefinition {
        let mut definition = self.definition.clone();
        definition.populated = self.is_populated();
        definition
    }
}

#[derive(Default)]
pub(crate) struct Faults {
    commands: Vec<(CommandKind, u32, ErrorCode)>,
    refusals: Vec<(CommandKind, u32, ErrorCode)>,
    use_buffer: Option<(u32, usize, ErrorCode)>,
    use_buffer_calls: HashMap<u32, usize>,
    tunnel: Option<ErrorCode>,
}

impl Faults {
    /// One-shot failure armed for `command`, if any.
    pub(crate) fn take_command_failure(&mut self, command: Command) -> Option<ErrorCode> {
        let position = self
            .commands
            .iter()
            .position(|&(kind, data, _)| kind == command.kind() && data == command.data())?;
        Some(self.commands.remove(position).2)
    }

    fn take_refusal(&mut self, command: Command) -> Option<ErrorCode> {
        let position = self
            .refusals
            .iter()
            .position(|&(kind, data, _)| kind == command.kind() && data == command.data())?;
        Some(self.refusals.remove(position).2)
    }

    fn take_use_buffer_failure(&mut self, port: u32) -> Option<ErrorCode> {
        let calls = self.use_buffer_calls.entry(port).or_default();
        *calls += 1;
        match self.use_buffer {
            Some((fault_port, nth, code)) if fault_port == port && nth == *calls => {
                self.use_buffer = None;
                Some(code)
            }
            _ => None,
        }
    }
}

pub(crate) struct LoopbackState {
    pub(crate) state: StateType,
    pub(crate) ports: BTreeMap<u32, PortState>,
    pub(crate) pending: Vec<Pending>,
    pub(crate) held_inputs: VecDeque<BufferHeader>,
    pub(crate) held_outputs: VecDeque<BufferHeader>,
    pub(crate) faults: Faults,
}

/// Runtime side of one loopback component, shared by its handle and its
/// worker thread.
pub struct LoopbackComponent {
    name: String,
    reports_name: bool,
    sink: EventSink,
    state: Mutex<LoopbackState>,
    jobs: Sender<Job>,
    buffer_ids: Arc<AtomicU64>,
}

impl LoopbackComponent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock()
    }

    pub(crate) fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub(crate) fn submit(&self, job: Job) -> bool {
        self.jobs.send(job).is_ok()
    }

    /// Current state as the component sees it.
    pub fn state(&self) -> StateType {
        self.state.lock().state
    }

    pub fn port_enabled(&self, port: u32) -> bool {
        self.state
            .lock()
            .ports
            .get(&port)
            .is_some_and(|p| p.definition.enabled)
    }

    pub fn is_tunneled(&self, port: u32) -> bool {
        self.state
            .lock()
            .ports
            .get(&port)
            .is_some_and(|p| p.tunnel.is_some())
    }

    pub fn registered_buffers(&self, port: u32) -> usize {
        self.state.lock().ports.get(&port).map_or(0, |p| p.buffers.len())
    }

    /// Buffers currently held by the component, across all ports.
    pub fn held_buffers(&self) -> usize {
        let state = self.state.lock();
        state.held_inputs.len() + state.held_outputs.len()
    }

    /// Fail the next matching command with a command-terminating error.
    pub fn fail_command(&self, command: Command, code: ErrorCode) {
        self.state
            .lock()
            .faults
            .commands
            .push((command.kind(), command.data(), code));
    }

    /// Reject the next matching command at submission, before the worker
    /// sees it.
    pub fn refuse_command(&self, command: Command, code: ErrorCode) {
        self.state
            .lock()
            .faults
            .refusals
            .push((command.kind(), command.data(), code));
    }

    /// Refuse the `nth` (1-based) buffer registration on `port`.
    pub fn fail_use_buffer(&self, port: u32, nth: usize, code: ErrorCode) {
        let mut state = self.state.lock();
        state.faults.use_buffer_calls.remove(&port);
        state.faults.use_buffer = Some((port, nth, code));
    }

    /// Refuse every tunnel binding involving this component.
    pub fn reject_tunnels(&self, code: ErrorCode) {
        self.state.lock().faults.tunnel = Some(code);
    }

    pub fn set_available_streams(&self, port: u32, available: Option<u32>) {
        if let Some(p) = self.state.lock().ports.get_mut(&port) {
            p.available_streams = available;
        }
    }

    pub fn active_stream(&self, port: u32) -> Option<u32> {
        self.state.lock().ports.get(&port).map(|p| p.active_stream)
    }

    /// Deliver an arbitrary event from the worker thread.
    pub fn inject_event(&self, kind: EventKind, data1: u32, data2: u32) {
        self.submit(Job::Emit { kind, data1, data2 });
    }

    /// Fill one held output buffer of `port` with `data` and return it, as a
    /// source component would.
    pub fn produce(&self, port: u32, data: &[u8], flags: BufferFlags) {
        self.submit(Job::Produce {
            port,
            data: data.to_vec(),
            flags,
        });
    }
}

impl std::fmt::Debug for LoopbackComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackComponent")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle given to the client. Dropping it stops the worker thread.
pub struct LoopbackHandle {
    component: Arc<LoopbackComponent>,
    shutdown: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl LoopbackHandle {
    pub(crate) fn spawn(
        name: &str,
        spec: &LoopbackSpec,
        sink: EventSink,
        buffer_ids: Arc<AtomicU64>,
    ) -> Result<Self, ErrorCode> {
        let ports = spec
            .ports
            .iter()
            .map(|port| {
                let state = PortState {
                    definition: PortDefinition {
                        index: port.index,
                        direction: port.direction,
                        domain: port.domain,
                        enabled: true,
                        populated: false,
                        buffer_count_actual: port.buffer_count,
                        buffer_count_min: port.buffer_count,
                        buffer_size: port.buffer_size,
                        buffer_alignment: port.buffer_alignment,
                    },
                    tunnel: None,
                    buffers: HashSet::new(),
                    available_streams: port.available_streams,
                    active_stream: 0,
                };
                (port.index, state)
            })
            .collect();

        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let component = Arc::new(LoopbackComponent {
            name: name.to_string(),
            reports_name: spec.reports_name,
            sink,
            state: Mutex::new(LoopbackState {
                state: StateType::Loaded,
                ports,
                pending: Vec::new(),
                held_inputs: VecDeque::new(),
                held_outputs: VecDeque::new(),
                faults: Faults::default(),
            }),
            jobs: job_tx,
            buffer_ids,
        });

        let worker_component = Arc::clone(&component);
        let worker = std::thread::Builder::new()
            .name(format!("loopback-{}", name))
            .spawn(move || worker::run(worker_component, job_rx, shutdown_rx))
            .map_err(|e| {
                tracing::error!("{}: failed to spawn worker: {}", name, e);
                ErrorCode::InsufficientResources
            })?;

        tracing::debug!("{}: loopback component started", name);
        Ok(Self {
            component,
            shutdown: shutdown_tx,
            worker: Some(worker),
        })
    }

    pub fn component(&self) -> &Arc<LoopbackComponent> {
        &self.component
    }

    fn submit(&self, job: Job) -> Result<(), ErrorCode> {
        if self.component.submit(job) {
            Ok(())
        } else {
            Err(ErrorCode::InvalidState)
        }
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("{}: worker thread panicked", self.component.name);
            }
        }
        tracing::debug!("{}: loopback component stopped", self.component.name);
    }
}

impl IlComponentHandle for LoopbackHandle {
    fn component_name(&self) -> Option<String> {
        self.component.reports_name.then(|| self.component.name.clone())
    }

    fn send_command(&self, command: Command) -> Result<(), ErrorCode> {
        let mut state = self.component.lock();
        if let Some(code) = state.faults.take_refusal(command) {
            tracing::debug!("{}: refusing {:?}: {}", self.component.name(), command, code);
            return Err(code);
        }
        // The enabled flag changes when the command is accepted, completion
        // follows from the worker.
        if let Command::PortEnable(port) | Command::PortDisable(port) = command {
            let p = state.ports.get_mut(&port).ok_or(ErrorCode::BadPortIndex)?;
            p.definition.enabled = matches!(command, Command::PortEnable(_));
        }
        drop(state);
        self.submit(Job::Command(command))
    }

    fn state(&self) -> Result<StateType, ErrorCode> {
        Ok(self.component.state())
    }

    fn port_range(&self, domain: PortDomain) -> Result<PortRange, ErrorCode> {
        let state = self.component.lock();
        let mut indices = state
            .ports
            .values()
            .filter(|p| p.definition.domain == domain)
            .map(|p| p.definition.index);
        let Some(start) = indices.next() else {
            return Ok(PortRange::default());
        };
        Ok(PortRange {
            start,
            count: 1 + indices.count() as u32,
        })
    }

    fn port_definition(&self, port: u32) -> Result<PortDefinition, ErrorCode> {
        self.component
            .lock()
            .ports
            .get(&port)
            .map(PortState::snapshot)
            .ok_or(ErrorCode::BadPortIndex)
    }

    fn set_port_definition(&self, definition: &PortDefinition) -> Result<(), ErrorCode> {
        let mut state = self.component.lock();
        let loaded = state.state == StateType::Loaded;
        let port = state
            .ports
            .get_mut(&definition.index)
            .ok_or(ErrorCode::BadPortIndex)?;
        if port.definition.enabled && !loaded {
            return Err(ErrorCode::IncorrectStateOperation);
        }
        if definition.buffer_count_actual != 0
            && definition.buffer_count_actual < port.definition.buffer_count_min
        {
            return Err(ErrorCode::BadParameter);
        }
        port.definition.buffer_count_actual = definition.buffer_count_actual;
        port.definition.buffer_size = definition.buffer_size;
        Ok(())
    }

    fn num_available_streams(&self, port: u32) -> Result<u32, ErrorCode> {
        self.component
            .lock()
            .ports
            .get(&port)
            .ok_or(ErrorCode::BadPortIndex)?
            .available_streams
            .ok_or(ErrorCode::UnsupportedIndex)
    }

    fn set_active_stream(&self, port: u32, stream: u32) -> Result<(), ErrorCode> {
        let mut state = self.component.lock();
        let port = state.ports.get_mut(&port).ok_or(ErrorCode::BadPortIndex)?;
        match port.available_streams {
            Some(available) if stream < available => {
                port.active_stream = stream;
                Ok(())
            }
            _ => Err(ErrorCode::BadParameter),
        }
    }

    fn suggest_buffer_size(&self, size: usize) -> Result<(), ErrorCode> {
        let mut state = self.component.lock();
        for port in state.ports.values_mut() {
            if port.definition.direction == Direction::Output {
                port.definition.buffer_size = size;
            }
        }
        Ok(())
    }

    fn setup_tunnel(&self, port: u32, peer: Option<TunnelPeer<'_>>) -> Result<(), ErrorCode> {
        let Some(peer) = peer else {
            let mut state = self.component.lock();
            let port = state.ports.get_mut(&port).ok_or(ErrorCode::BadPortIndex)?;
            port.tunnel = None;
            return Ok(());
        };

        let peer_component = peer
            .component
            .as_any()
            .downcast_ref::<LoopbackHandle>()
            .map(|handle| Arc::clone(&handle.component))
            .ok_or(ErrorCode::PortsNotCompatible)?;

        {
            let state = self.component.lock();
            if let Some(code) = state.faults.tunnel {
                return Err(code);
            }
            let source = state.ports.get(&port).ok_or(ErrorCode::BadPortIndex)?;
            if source.definition.direction != Direction::Output {
                return Err(ErrorCode::PortsNotCompatible);
            }
            if source.definition.enabled && state.state != StateType::Loaded {
                return Err(ErrorCode::IncorrectStateOperation);
            }
        }

        {
            let mut state = peer_component.lock();
            if let Some(code) = state.faults.tunnel {
                return Err(code);
            }
            let loaded = state.state == StateType::Loaded;
            let sink = state.ports.get_mut(&peer.port).ok_or(ErrorCode::BadPortIndex)?;
            if sink.definition.direction != Direction::Input {
                return Err(ErrorCode::PortsNotCompatible);
            }
            if sink.definition.enabled && !loaded {
                return Err(ErrorCode::IncorrectStateOperation);
            }
            sink.tunnel = Some(TunnelEnd {
                peer: Arc::downgrade(&self.component),
                port,
            });
        }

        let mut state = self.component.lock();
        if let Some(source) = state.ports.get_mut(&port) {
            source.tunnel = Some(TunnelEnd {
                peer: Arc::downgrade(&peer_component),
                port: peer.port,
            });
        }
        tracing::debug!(
            "{}: port {} tunneled to {}:{}",
            self.component.name,
            port,
            peer_component.name,
            peer.port
        );
        Ok(())
    }

    fn use_buffer(
        &self,
        port: u32,
        memory: BufferMemory,
    ) -> Result<BufferHeader, (ErrorCode, BufferMemory)> {
        let header = {
            let mut state = self.component.lock();
            if let Some(code) = state.faults.take_use_buffer_failure(port) {
                return Err((code, memory));
            }
            let Some(p) = state.ports.get_mut(&port) else {
                return Err((ErrorCode::BadPortIndex, memory));
            };
            if p.buffers.len() >= p.definition.buffer_count_actual as usize {
                return Err((ErrorCode::IncorrectStateOperation, memory));
            }
            if memory.len() < p.definition.buffer_size {
                return Err((ErrorCode::BadParameter, memory));
            }

            let id = BufferId::from_raw(self.component.buffer_ids.fetch_add(1, Ordering::Relaxed));
            p.buffers.insert(id);
            BufferHeader::new(id, port, p.definition.direction, memory)
        };

        self.component.submit(Job::Reevaluate);
        Ok(header)
    }

    fn free_buffer(
        &self,
        port: u32,
        header: BufferHeader,
    ) -> Result<BufferMemory, (ErrorCode, BufferHeader)> {
        {
            let mut state = self.component.lock();
            let known = state
                .ports
                .get_mut(&port)
                .is_some_and(|p| p.buffers.remove(&header.id()));
            if !known {
                return Err((ErrorCode::BadParameter, header));
            }
        }

        self.component.submit(Job::Reevaluate);
        Ok(header.into_memory())
    }

    fn empty_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)> {
        self.submit_buffer(header, Direction::Input)
    }

    fn fill_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)> {
        self.submit_buffer(header, Direction::Output)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl LoopbackHandle {
    fn submit_buffer(
        &self,
        header: BufferHeader,
        direction: Direction,
    ) -> Result<(), (ErrorCode, BufferHeader)> {
        {
            let state = self.component.lock();
            let accepted = state.state.accepts_buffers()
                && state.ports.get(&header.port()).is_some_and(|p| {
                    p.definition.direction == direction
                        && p.definition.enabled
                        && p.buffers.contains(&header.id())
                });
            if !accepted {
                return Err((ErrorCode::IncorrectStateOperation, header));
            }
        }

        let job = match direction {
            Direction::Input => Job::Empty(header),
            Direction::Output => Job::Fill(header),
        };
        // The worker lives as long as this handle, so the send only fails
        // while the handle is being dropped.
        if !self.component.submit(job) {
            tracing::error!("{}: worker stopped, buffer dropped", self.component.name);
        }
        Ok(())
    }
}
