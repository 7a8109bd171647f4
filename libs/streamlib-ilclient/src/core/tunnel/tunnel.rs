// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tunnels: a direct binding of a source output port to a sink input port.
//!
//! A tunnel moves between torn down (unbound), disabled (bound, both ports
//! disabled) and enabled (bound, both ports enabled). Every operation leaves
//! both ports in the same enablement.

use std::time::Duration;

use tracing::{debug, warn};

use crate::core::component::{Component, ErrorMask};
use crate::core::error::{DualWaitOutcome, IlError, Result, TunnelSetupError};
use crate::core::runtime::TunnelPeer;
use crate::core::types::{Command, CommandKind, EventKind, StateType};
use crate::core::waiter;
use crate::core::wake_signal::{WaitMode, WakeBits};

#[derive(Clone, Copy)]
pub struct Tunnel<'a> {
    pub source: &'a Component,
    pub source_port: u32,
    pub sink: &'a Component,
    pub sink_port: u32,
}

impl<'a> Tunnel<'a> {
    pub fn new(source: &'a Component, source_port: u32, sink: &'a Component, sink_port: u32) -> Self {
        Self {
            source,
            source_port,
            sink,
            sink_port,
        }
    }

    /// Bind the ports and enable them.
    ///
    /// A Loaded source is first moved to Idle. With `settings_timeout`, the
    /// source port must report port-settings-changed within that time. When
    /// the source advertises streams, `port_stream` selects one. On any
    /// failure the tunnel is left torn down.
    pub fn setup(
        &self,
        port_stream: u32,
        settings_timeout: Option<Duration>,
    ) -> std::result::Result<(), TunnelSetupError> {
        let state = self
            .source
            .state()
            .map_err(|_| TunnelSetupError::ComponentError)?;
        if state == StateType::Loaded && self.source.change_state(StateType::Idle).is_err() {
            return Err(TunnelSetupError::ComponentError);
        }

        if let Some(timeout) = settings_timeout {
            self.source.wait_for_event(
                EventKind::PortSettingsChanged,
                Some(self.source_port),
                None,
                WakeBits::PARAMETER_CHANGED | WakeBits::EVENT_ERROR,
                WaitMode::Timeout(timeout),
            )?;
        }

        self.disable();

        match self.source.handle().num_available_streams(self.source_port) {
            Ok(0) => {
                self.teardown();
                return Err(TunnelSetupError::NoStreams);
            }
            Ok(available) if port_stream >= available => {
                self.teardown();
                return Err(TunnelSetupError::StreamUnavailable {
                    requested: port_stream,
                    available,
                });
            }
            Ok(_) => {
                if let Err(code) = self.source.handle().set_active_stream(self.source_port, port_stream) {
                    warn!("{}: cannot select stream {}: {}", self.source.name(), port_stream, code);
                    self.teardown();
                    return Err(TunnelSetupError::ComponentError);
                }
            }
            // The port does not multiplex streams.
            Err(_) => {}
        }

        let peer = TunnelPeer {
            component: self.sink.handle(),
            port: self.sink_port,
        };
        let bound = match self.source.handle().setup_tunnel(self.source_port, Some(peer)) {
            Ok(()) => self.enable(),
            Err(code) => Err(self.source.runtime_error("setup tunnel", code)),
        };

        if let Err(err) = bound {
            debug!("{}: tunnel to {} rejected: {}", self.source.name(), self.sink.name(), err);
            self.teardown();
            self.sink.remove_event(EventKind::Error, None, None);
            self.source.remove_event(EventKind::Error, None, None);
            return Err(TunnelSetupError::FormatRejected);
        }
        Ok(())
    }

    /// Enable both ports of a bound tunnel.
    ///
    /// A Loaded sink is moved to Idle once its port is enabled. If either side
    /// fails, both ports are disabled again.
    pub fn enable(&self) -> Result<()> {
        let (source, sink) = (self.source, self.sink);

        source.send_command(Command::PortEnable(self.source_port))?;
        if let Err(err) = sink.send_command(Command::PortEnable(self.sink_port)) {
            self.abandon_source_enable();
            return Err(err);
        }

        if matches!(sink.state(), Ok(StateType::Loaded)) {
            if let Err(err) = sink.wait_for_command(CommandKind::PortEnable, self.sink_port) {
                self.abandon_source_enable();
                return Err(err);
            }

            if let Err(err) = sink.send_command(Command::StateSet(StateType::Idle)) {
                self.disable_quietly(sink, self.sink_port);
                self.abandon_source_enable();
                return Err(err);
            }

            let outcome = waiter::wait_for_command_complete_dual(
                sink,
                CommandKind::StateSet,
                StateType::Idle.raw(),
                Some(source.shared().as_ref()),
            );
            match outcome {
                DualWaitOutcome::Completed => {}
                DualWaitOutcome::Failed => {
                    sink.remove_event(EventKind::Error, None, None);
                    self.disable_quietly(sink, self.sink_port);
                    self.disable_quietly(source, self.source_port);
                    return Err(IlError::CommandFailed {
                        component: sink.name(),
                        command: CommandKind::StateSet,
                        data: StateType::Idle.raw(),
                    });
                }
                DualWaitOutcome::RelatedFailed => {
                    // The source's enable failed; consume that failure and
                    // put the sink port back.
                    let _ = source.wait_for_command(CommandKind::PortEnable, self.source_port);
                    self.disable_quietly(sink, self.sink_port);
                    self.disable_quietly(source, self.source_port);
                    return Err(IlError::RelatedCommandFailed {
                        component: sink.name(),
                        related: source.name(),
                        command: CommandKind::StateSet,
                        data: StateType::Idle.raw(),
                    });
                }
            }
        } else if let Err(err) = sink.wait_for_command(CommandKind::PortEnable, self.sink_port) {
            self.abandon_source_enable();
            return Err(err);
        }

        if let Err(err) = source.wait_for_command(CommandKind::PortEnable, self.source_port) {
            self.disable_quietly(sink, self.sink_port);
            return Err(err);
        }
        Ok(())
    }

    /// Disable both ports. Port-unpopulated errors are masked on both sides
    /// for the duration. Failures are logged, never returned, and disabling an
    /// already-disabled tunnel is harmless.
    pub fn disable(&self) {
        let _source_mask = self.source.mask_errors_scoped(ErrorMask::UNPOPULATED);
        let _sink_mask = self.sink.mask_errors_scoped(ErrorMask::UNPOPULATED);

        let source_sent = self.send_logged(self.source, Command::PortDisable(self.source_port));
        let sink_sent = self.send_logged(self.sink, Command::PortDisable(self.sink_port));

        if source_sent {
            if let Err(err) = self.source.wait_for_command(CommandKind::PortDisable, self.source_port) {
                warn!("{}: disable of port {} failed: {}", self.source.name(), self.source_port, err);
            }
        }
        if sink_sent {
            if let Err(err) = self.sink.wait_for_command(CommandKind::PortDisable, self.sink_port) {
                warn!("{}: disable of port {} failed: {}", self.sink.name(), self.sink_port, err);
            }
        }
    }

    /// Unbind both ports.
    pub fn teardown(&self) {
        if let Err(code) = self.source.handle().setup_tunnel(self.source_port, None) {
            warn!("{}: unbind of port {} failed: {}", self.source.name(), self.source_port, code);
        }
        if let Err(code) = self.sink.handle().setup_tunnel(self.sink_port, None) {
            warn!("{}: unbind of port {} failed: {}", self.sink.name(), self.sink_port, code);
        }
    }

    /// Flush both ports and wait for both flushes to complete.
    pub fn flush(&self) -> Result<()> {
        self.source.send_command(Command::Flush(self.source_port))?;
        self.sink.send_command(Command::Flush(self.sink_port))?;

        for (component, port) in [(self.source, self.source_port), (self.sink, self.sink_port)] {
            if let Err(err) = component.wait_for_event(
                EventKind::CmdComplete,
                Some(CommandKind::Flush.raw()),
                Some(port),
                WakeBits::PORT_FLUSH,
                WaitMode::Forever,
            ) {
                warn!("{}: flush of port {} failed: {}", component.name(), port, err);
            }
        }
        Ok(())
    }

    fn send_logged(&self, component: &Component, command: Command) -> bool {
        match component.send_command(command) {
            Ok(()) => true,
            Err(err) => {
                warn!("{}", err);
                false
            }
        }
    }

    fn disable_quietly(&self, component: &Component, port: u32) {
        if let Err(err) = component.disable_port(port) {
            debug!("{}: disable of port {} during rollback: {}", component.name(), port, err);
        }
    }

    /// Undo a source port-enable that was sent but whose sink side failed.
    fn abandon_source_enable(&self) {
        self.disable_quietly(self.source, self.source_port);
        let _ = self.source.wait_for_event(
            EventKind::CmdComplete,
            Some(CommandKind::PortEnable.raw()),
            Some(self.source_port),
            WakeBits::PORT_ENABLED | WakeBits::EVENT_ERROR,
            WaitMode::Poll,
        );
    }
}

impl std::fmt::Debug for Tunnel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("source", &self.source.name())
            .field("source_port", &self.source_port)
            .field("sink", &self.sink.name())
            .field("sink_port", &self.sink_port)
            .finish()
    }
}

/// Flush the first `max` tunnels (all of them when `max` is zero).
pub fn flush_tunnels(tunnels: &[Tunnel<'_>], max: usize) -> Result<()> {
    let count = if max == 0 { tunnels.len() } else { max.min(tunnels.len()) };
    for tunnel in &tunnels[..count] {
        tunnel.flush()?;
    }
    Ok(())
}

/// Unbind every tunnel.
pub fn teardown_tunnels(tunnels: &[Tunnel<'_>]) {
    for tunnel in tunnels {
        tunnel.teardown();
    }
}
