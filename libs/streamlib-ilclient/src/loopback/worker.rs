// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Worker loop of a loopback component.
//!
//! Jobs are applied under the component's state lock; the resulting events and
//! buffers are delivered through the sink only after the lock is released, so
//! callbacks may call back into the component.

use std::sync::Arc;

use crossbeam_channel::{Receiver, select};

use super::component::{Job, LoopbackComponent, LoopbackState, Outgoing, Pending};
use crate::core::buffers::BufferFlags;
use crate::core::error_code::ErrorCode;
use crate::core::events::EventPayload;
use crate::core::types::{Command, CommandKind, Direction, EventKind, StateType};

pub(crate) fn run(component: Arc<LoopbackComponent>, jobs: Receiver<Job>, shutdown: Receiver<()>) {
    tracing::trace!("{}: worker started", component.name());
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(jobs) -> job => match job {
                Ok(job) => process(&component, job),
                Err(_) => break,
            },
        }
    }
    tracing::trace!("{}: worker stopped", component.name());
}

fn process(component: &LoopbackComponent, job: Job) {
    let mut out = Vec::new();
    {
        let mut state = component.lock();
        match job {
            Job::Command(command) => on_command(&mut state, command, &mut out),
            Job::Empty(header) => state.held_inputs.push_back(header),
            Job::Fill(header) => state.held_outputs.push_back(header),
            Job::Reevaluate => {}
            Job::Emit { kind, data1, data2 } => out.push(Outgoing::Event(kind, data1, data2, None)),
            Job::Produce { port, data, flags } => produce(&mut state, port, &data, flags, &mut out),
            Job::PeerDisabled { port } => on_peer_disabled(&state, port, &mut out),
        }
        reevaluate(&mut state, &mut out);
        pump(&mut state, &mut out);
    }
    deliver(component, out);
}

fn deliver(component: &LoopbackComponent, out: Vec<Outgoing>) {
    for item in out {
        let result = match item {
            Outgoing::Event(kind, data1, data2, None) => component.sink().event(kind, data1, data2),
            Outgoing::Event(kind, data1, data2, Some(payload)) => {
                component.sink().event_with_payload(kind, data1, data2, payload)
            }
            Outgoing::EmptyDone(header) => component.sink().empty_buffer_done(header),
            Outgoing::FillDone(header) => component.sink().fill_buffer_done(header),
            Outgoing::PeerDisabled(end) => {
                if let Some(peer) = end.peer.upgrade() {
                    peer.submit(Job::PeerDisabled { port: end.port });
                }
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::warn!("{}: delivery failed: {}", component.name(), err);
        }
    }
}

fn on_command(state: &mut LoopbackState, command: Command, out: &mut Vec<Outgoing>) {
    if let Some(code) = state.faults.take_command_failure(command) {
        tracing::debug!("injected failure of {:?}: {}", command, code);
        if let Command::PortEnable(port) = command {
            if let Some(p) = state.ports.get_mut(&port) {
                p.definition.enabled = false;
            }
        }
        out.push(Outgoing::failure(code));
        return;
    }

    match command {
        Command::StateSet(target) => on_state_set(state, target, out),
        Command::PortEnable(port) => {
            let loaded = state.state == StateType::Loaded;
            let Some(p) = state.ports.get(&port) else {
                out.push(Outgoing::failure(ErrorCode::BadPortIndex));
                return;
            };
            if loaded || p.is_populated() {
                out.push(Outgoing::complete(CommandKind::PortEnable, port));
            } else {
                state.pending.push(Pending::PortEnable(port));
            }
        }
        Command::PortDisable(port) => {
            let Some(p) = state.ports.get(&port) else {
                out.push(Outgoing::failure(ErrorCode::BadPortIndex));
                return;
            };
            let drained = p.buffers.is_empty() || p.tunnel.is_some();
            if let Some(end) = p.tunnel.clone() {
                out.push(Outgoing::PeerDisabled(end));
            }
            state.pending.retain(|pending| *pending != Pending::PortEnable(port));
            return_held(state, Some(port), out);
            if drained {
                out.push(Outgoing::complete(CommandKind::PortDisable, port));
            } else {
                state.pending.push(Pending::PortDisable(port));
            }
        }
        Command::Flush(port) => {
            if !state.ports.contains_key(&port) {
                out.push(Outgoing::failure(ErrorCode::BadPortIndex));
                return;
            }
            return_held(state, Some(port), out);
            out.push(Outgoing::complete(CommandKind::Flush, port));
        }
        Command::MarkBuffer { port, mark } => {
            out.push(Outgoing::complete(CommandKind::MarkBuffer, port));
            out.push(Outgoing::Event(EventKind::Mark, port, 0, Some(EventPayload(mark))));
        }
    }
}

/// A tunneled port whose supplier went away while the component is past
/// Loaded reports itself unpopulated.
fn on_peer_disabled(state: &LoopbackState, port: u32, out: &mut Vec<Outgoing>) {
    let enabled = state.ports.get(&port).is_some_and(|p| p.definition.enabled);
    if enabled && state.state != StateType::Loaded {
        tracing::debug!("port {} unpopulated by its peer", port);
        out.push(Outgoing::Event(EventKind::Error, ErrorCode::PortUnpopulated.raw(), 0, None));
    }
}

fn on_state_set(state: &mut LoopbackState, target: StateType, out: &mut Vec<Outgoing>) {
    let current = state.state;
    if target == current {
        out.push(Outgoing::failure(ErrorCode::SameState));
        return;
    }

    let allowed = matches!(
        (current, target),
        (_, StateType::Invalid)
            | (StateType::Loaded, StateType::Idle | StateType::WaitingForResources)
            | (StateType::WaitingForResources, StateType::Loaded | StateType::Idle)
            | (StateType::Idle, StateType::Loaded | StateType::Executing | StateType::Pause)
            | (StateType::Executing, StateType::Idle | StateType::Pause)
            | (StateType::Pause, StateType::Idle | StateType::Executing)
    );
    if !allowed {
        out.push(Outgoing::failure(ErrorCode::IncorrectStateTransition));
        return;
    }

    match (current, target) {
        (StateType::Loaded, StateType::Idle) | (StateType::Idle, StateType::Loaded) => {
            if transition_ready(state, target) {
                enter(state, target, out);
            } else {
                state.pending.push(Pending::StateSet(target));
            }
        }
        (StateType::Executing | StateType::Pause, StateType::Idle) => {
            return_held(state, None, out);
            enter(state, target, out);
        }
        _ => enter(state, target, out),
    }
}

/// Loaded to Idle needs every enabled port populated; Idle to Loaded needs
/// every client buffer freed.
fn transition_ready(state: &LoopbackState, target: StateType) -> bool {
    match target {
        StateType::Idle => state
            .ports
            .values()
            .filter(|p| p.definition.enabled)
            .all(|p| p.is_populated()),
        _ => state.ports.values().all(|p| p.buffers.is_empty()),
    }
}

fn enter(state: &mut LoopbackState, target: StateType, out: &mut Vec<Outgoing>) {
    state.state = target;
    out.push(Outgoing::complete(CommandKind::StateSet, target.raw()));
}

fn reevaluate(state: &mut LoopbackState, out: &mut Vec<Outgoing>) {
    let pending = std::mem::take(&mut state.pending);
    for item in pending {
        let ready = match item {
            Pending::StateSet(target) => transition_ready(state, target),
            Pending::PortEnable(port) => state
                .ports
                .get(&port)
                .is_some_and(|p| p.definition.enabled && p.is_populated()),
            Pending::PortDisable(port) => state.ports.get(&port).is_none_or(|p| p.buffers.is_empty()),
        };

        if !ready {
            state.pending.push(item);
            continue;
        }
        match item {
            Pending::StateSet(target) => enter(state, target, out),
            Pending::PortEnable(port) => out.push(Outgoing::complete(CommandKind::PortEnable, port)),
            Pending::PortDisable(port) => out.push(Outgoing::complete(CommandKind::PortDisable, port)),
        }
    }
}

/// Hand back held buffers of one port, or of every port.
fn return_held(state: &mut LoopbackState, port: Option<u32>, out: &mut Vec<Outgoing>) {
    let matches = |p: u32| port.is_none_or(|wanted| wanted == p);

    let inputs = std::mem::take(&mut state.held_inputs);
    for mut header in inputs {
        if matches(header.port()) {
            header.reset();
            out.push(Outgoing::returned(header));
        } else {
            state.held_inputs.push_back(header);
        }
    }

    let outputs = std::mem::take(&mut state.held_outputs);
    for mut header in outputs {
        if matches(header.port()) {
            header.reset();
            out.push(Outgoing::returned(header));
        } else {
            state.held_outputs.push_back(header);
        }
    }
}

/// Move data from held input buffers to held output buffers while Executing.
fn pump(state: &mut LoopbackState, out: &mut Vec<Outgoing>) {
    if state.state != StateType::Executing {
        return;
    }

    // Buffers submitted to a port disabled meanwhile go straight back.
    let disabled: Vec<u32> = state
        .ports
        .values()
        .filter(|p| !p.definition.enabled)
        .map(|p| p.definition.index)
        .collect();
    for port in disabled {
        return_held(state, Some(port), out);
    }

    let output = state
        .ports
        .values()
        .find(|p| p.definition.direction == Direction::Output && p.definition.enabled)
        .map(|p| (p.definition.index, p.tunnel.is_some()));

    while let Some(input_port) = state.held_inputs.front().map(|h| h.port()) {
        match output {
            Some((port, false)) => {
                let Some(position) = state.held_outputs.iter().position(|h| h.port() == port) else {
                    break;
                };
                let (Some(mut input), Some(mut filled)) =
                    (state.held_inputs.pop_front(), state.held_outputs.remove(position))
                else {
                    break;
                };
                filled.fill_from(input.data());
                filled.flags = input.flags;
                filled.timestamp = input.timestamp;
                filled.mark = input.mark;
                let eos = input.flags.contains(BufferFlags::EOS);

                input.reset();
                out.push(Outgoing::EmptyDone(input));
                out.push(Outgoing::FillDone(filled));
                if eos {
                    out.push(Outgoing::Event(EventKind::BufferFlag, port, BufferFlags::EOS.bits(), None));
                }
            }
            // No client-visible output: the data is consumed here.
            _ => {
                let Some(mut input) = state.held_inputs.pop_front() else {
                    break;
                };
                let eos = input.flags.contains(BufferFlags::EOS);
                input.reset();
                out.push(Outgoing::EmptyDone(input));
                if eos {
                    out.push(Outgoing::Event(
                        EventKind::BufferFlag,
                        input_port,
                        BufferFlags::EOS.bits(),
                        None,
                    ));
                }
            }
        }
    }
}

fn produce(state: &mut LoopbackState, port: u32, data: &[u8], flags: BufferFlags, out: &mut Vec<Outgoing>) {
    let Some(position) = state.held_outputs.iter().position(|h| h.port() == port) else {
        tracing::warn!("produce on port {} without a held output buffer", port);
        return;
    };
    let Some(mut header) = state.held_outputs.remove(position) else {
        return;
    };
    header.fill_from(data);
    header.flags = flags;
    out.push(Outgoing::FillDone(header));
    if flags.contains(BufferFlags::EOS) {
        out.push(Outgoing::Event(EventKind::BufferFlag, port, BufferFlags::EOS.bits(), None));
    }
}
