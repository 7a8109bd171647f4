// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime-side entry points: record an event or a returned buffer, set the
//! component's wake bits, then run the user callback.
//!
//! The pool lock and the buffer-queue lock are always released before a wake
//! bit is set or a callback runs.

use tracing::{debug, error, trace, warn};

use super::event_record::{EventPayload, EventRecord};
use crate::core::buffers::{BufferFlags, BufferHeader};
use crate::core::component::{ComponentShared, CreateFlags, ErrorMask};
use crate::core::error::{IlError, Result};
use crate::core::error_code::ErrorCode;
use crate::core::types::{CommandKind, Direction, EventKind, StateType};
use crate::core::wake_signal::WakeBits;

/// Callback to run once the event is recorded.
enum Notify {
    None,
    Error(u32),
    Eos(u32),
    PortSettings(u32),
    ConfigChanged(u32),
}

pub(crate) fn dispatch_event(
    component: &ComponentShared,
    kind: EventKind,
    data1: u32,
    data2: u32,
    payload: Option<EventPayload>,
) -> Result<()> {
    let name = component.name();
    let mut data2 = data2;
    let mut wake = WakeBits::empty();
    let mut queue = true;
    let mut notify = Notify::None;

    match kind {
        EventKind::CmdComplete => match CommandKind::from_raw(data1) {
            Some(CommandKind::StateSet) => {
                match StateType::from_raw(data2) {
                    Some(state) => debug!("{}: state changed ({})", name, state),
                    None => debug!("{}: state changed ({})", name, data2),
                }
                wake = WakeBits::STATE_CHANGED;
            }
            Some(CommandKind::PortDisable) => {
                debug!("{}: port {} disabled", name, data2);
                wake = WakeBits::PORT_DISABLED;
            }
            Some(CommandKind::PortEnable) => {
                debug!("{}: port {} enabled", name, data2);
                wake = WakeBits::PORT_ENABLED;
            }
            Some(CommandKind::Flush) => {
                debug!("{}: port {} flushed", name, data2);
                wake = WakeBits::PORT_FLUSH;
            }
            Some(CommandKind::MarkBuffer) => {
                debug!("{}: buffer marked on port {}", name, data2);
                wake = WakeBits::MARKED_BUFFER;
            }
            None => warn!("{}: completion of unknown command {:#x}", name, data1),
        },
        EventKind::Error => {
            let code = ErrorCode::from_raw(data1);
            let mask = component.error_mask();
            let masked = match code {
                ErrorCode::PortUnpopulated => mask.contains(ErrorMask::UNPOPULATED),
                ErrorCode::SameState => mask.contains(ErrorMask::SAME_STATE),
                ErrorCode::BadParameter => mask.contains(ErrorMask::BAD_PARAMETER),
                _ => false,
            };

            if masked {
                debug!("{}: ignoring masked error {} ({})", name, code, data2);
                queue = false;
            } else {
                match code {
                    ErrorCode::Unclassified(raw) => {
                        error!("{}: unexpected error {:#x} ({})", name, raw, data2);
                        wake = WakeBits::EVENT_ERROR;
                    }
                    code if code.is_storage_exhausted() => {
                        warn!("{}: error {} ({})", name, code, data2);
                    }
                    code => {
                        debug!("{}: error {} ({})", name, code, data2);
                        wake = WakeBits::EVENT_ERROR;
                    }
                }
                notify = Notify::Error(data1);
            }
        }
        EventKind::Mark => {
            debug!("{}: buffer mark {:?}", name, payload);
            wake = WakeBits::BUFFER_MARK;
        }
        EventKind::PortSettingsChanged => {
            debug!("{}: port settings changed on port {}", name, data1);
            wake = WakeBits::PARAMETER_CHANGED;
            notify = Notify::PortSettings(data1);
        }
        EventKind::BufferFlag => {
            let flags = BufferFlags::from_bits_truncate(data2);
            if flags.contains(BufferFlags::EOS) {
                debug!("{}: end of stream on port {}", name, data1);
                wake = WakeBits::BUFFER_FLAG_EOS;
                data2 = BufferFlags::EOS.bits();
                notify = Notify::Eos(data1);
            } else {
                warn!("{}: unexpected buffer flags {:#x} on port {}", name, data2, data1);
            }
        }
        EventKind::ParamOrConfigChanged => {
            debug!("{}: parameter/config {:#x} changed on port {}", name, data2, data1);
            wake = WakeBits::CONFIG_CHANGED;
            notify = Notify::ConfigChanged(data2);
        }
    }

    if queue {
        let mut record = EventRecord::new(kind, data1, data2);
        record.payload = payload;

        let mut pool = component.client().pool.lock();
        if component.is_closed() {
            trace!("{}: dropping {} for released component", name, kind);
            return Ok(());
        }
        // The incoming event supersedes any older record with the same triple.
        pool.remove_all(component.id(), |queued| queued.same_triple(&record));
        if let Err(err) = pool.push_front(component.id(), record) {
            drop(pool);
            error!("{}: cannot record {} ({:#x}, {:#x}): {}", name, kind, data1, data2, err);
            return Err(err);
        }
    }

    if !wake.is_empty() {
        component.wake().set(wake);
    }
    // A dual waiter looks at this component's list once woken, so the record
    // must already be queued.
    if queue && kind == EventKind::Error && data2 == 1 {
        if let Some(related) = component.related_signal() {
            related.set(WakeBits::EVENT_ERROR);
        }
    }

    let callbacks = component.client().callbacks.read().clone();
    match notify {
        Notify::None => {}
        Notify::Error(code) => {
            if let Some(callback) = callbacks.error {
                callback(component, code);
            }
        }
        Notify::Eos(port) => {
            if let Some(callback) = callbacks.eos {
                callback(component, port);
            }
        }
        Notify::PortSettings(port) => {
            if let Some(callback) = callbacks.port_settings {
                callback(component, port);
            }
        }
        Notify::ConfigChanged(index) => {
            if let Some(callback) = callbacks.config_changed {
                callback(component, index);
            }
        }
    }

    Ok(())
}

/// Queue a buffer the runtime has finished with. `direction` is the direction
/// of the port the buffer belongs to.
pub(crate) fn dispatch_buffer_done(
    component: &ComponentShared,
    header: BufferHeader,
    direction: Direction,
) -> Result<()> {
    let (required, wake) = match direction {
        Direction::Input => (CreateFlags::ENABLE_INPUT_BUFFERS, WakeBits::EMPTY_BUFFER_DONE),
        Direction::Output => (CreateFlags::ENABLE_OUTPUT_BUFFERS, WakeBits::FILL_BUFFER_DONE),
    };

    if !component.flags().contains(required) {
        error!(
            "{}: {:?} buffer {} returned but {:?} was not requested at creation",
            component.name(),
            direction,
            header.id(),
            required
        );
        return Err(IlError::UnexpectedBufferCallback {
            component: component.name(),
        });
    }

    trace!("{}: buffer {} returned on port {}", component.name(), header.id(), header.port());
    component.buffers().push_returned(header);
    component.wake().set(wake);

    let callbacks = component.client().callbacks.read().clone();
    let callback = match direction {
        Direction::Input => callbacks.empty_buffer_done,
        Direction::Output => callbacks.fill_buffer_done,
    };
    if let Some(callback) = callback {
        callback(component);
    }
    Ok(())
}
