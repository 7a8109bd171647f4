// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Blocking waits on a component's received-event list.
//!
//! Every wait checks the list under the pool lock first and only then blocks
//! on the component's wake signal, so an event recorded before the wait began
//! is never missed.

use std::time::Instant;

use crate::core::component::ComponentShared;
use crate::core::error::{DualWaitOutcome, WaitError};
use crate::core::error_code::ErrorCode;
use crate::core::types::{CommandKind, EventKind};
use crate::core::wake_signal::{WaitMode, WakeBits};

/// Installs a waiter's wake signal on a related component for the duration of
/// a dual wait.
struct RelatedLink<'a> {
    related: &'a ComponentShared,
}

impl<'a> RelatedLink<'a> {
    fn install(related: &'a ComponentShared, waiter: &ComponentShared) -> Self {
        related.set_related_signal(Some(waiter.wake_handle()));
        Self { related }
    }
}

impl Drop for RelatedLink<'_> {
    fn drop(&mut self) {
        self.related.set_related_signal(None);
    }
}

fn completion_bit(command: CommandKind) -> WakeBits {
    match command {
        CommandKind::StateSet => WakeBits::STATE_CHANGED,
        CommandKind::PortDisable => WakeBits::PORT_DISABLED,
        CommandKind::PortEnable => WakeBits::PORT_ENABLED,
        CommandKind::Flush => WakeBits::PORT_FLUSH,
        CommandKind::MarkBuffer => WakeBits::MARKED_BUFFER,
    }
}

/// Wait for `(command, data)` to complete on `component`.
pub fn wait_for_command_complete(
    component: &ComponentShared,
    command: CommandKind,
    data: u32,
) -> DualWaitOutcome {
    wait_for_command_complete_dual(component, command, data, None)
}

/// Wait for `(command, data)` to complete on `component`, giving up early if
/// `related` reports a command-terminating error.
///
/// A completion, or an error that terminated the command, is consumed from
/// `component`'s list. A same-state error counts as completion. A failure on
/// `related` is left queued for its own waiter and reported as
/// [`DualWaitOutcome::RelatedFailed`].
pub fn wait_for_command_complete_dual(
    component: &ComponentShared,
    command: CommandKind,
    data: u32,
    related: Option<&ComponentShared>,
) -> DualWaitOutcome {
    let _link = related.map(|related| RelatedLink::install(related, component));
    let mask = WakeBits::EVENT_ERROR | completion_bit(command);
    let pool = &component.client().pool;

    loop {
        {
            let mut state = pool.lock();
            let found = state.remove_first(component.id(), |record| {
                record.is_command_complete(command, data) || record.is_command_terminating_error()
            });

            if let Some(record) = found {
                if record.kind == EventKind::CmdComplete {
                    return DualWaitOutcome::Completed;
                }
                component.wake().clear(WakeBits::EVENT_ERROR);
                if ErrorCode::from_raw(record.data1) == ErrorCode::SameState {
                    return DualWaitOutcome::Completed;
                }
                tracing::debug!(
                    "{}: {:?}({}) failed: {}",
                    component.name(),
                    command,
                    data,
                    ErrorCode::from_raw(record.data1)
                );
                return DualWaitOutcome::Failed;
            }

            if let Some(related) = related {
                if state.contains(related.id(), |record| record.is_command_terminating_error()) {
                    tracing::debug!(
                        "{}: {:?}({}) abandoned, {} failed",
                        component.name(),
                        command,
                        data,
                        related.name()
                    );
                    return DualWaitOutcome::RelatedFailed;
                }
            }
        }

        component.wake().wait(mask, WaitMode::Forever);
    }
}

/// Wait for an event matching `kind` and, where given, `data1` / `data2`,
/// waking on the bits of `wake_mask`.
///
/// With [`WakeBits::EVENT_ERROR`] in the mask, any queued error event aborts
/// the wait with [`WaitError::ErrorEvent`]. With [`WakeBits::CONFIG_CHANGED`]
/// in the mask, a config-changed event causes one more search for the target
/// before failing with [`WaitError::ConfigChanged`].
pub fn wait_for_event(
    component: &ComponentShared,
    kind: EventKind,
    data1: Option<u32>,
    data2: Option<u32>,
    wake_mask: WakeBits,
    mode: WaitMode,
) -> Result<(), WaitError> {
    let deadline = match mode {
        WaitMode::Timeout(timeout) => Some(Instant::now() + timeout),
        _ => None,
    };

    loop {
        if component.remove_event(kind, data1, data2) {
            return Ok(());
        }

        {
            let pool = component.client().pool.lock();
            if wake_mask.contains(WakeBits::EVENT_ERROR)
                && pool.contains(component.id(), |record| record.kind == EventKind::Error)
            {
                component.wake().clear(WakeBits::EVENT_ERROR);
                return Err(WaitError::ErrorEvent);
            }
            if wake_mask.contains(WakeBits::CONFIG_CHANGED)
                && pool.contains(component.id(), |record| record.kind == EventKind::ParamOrConfigChanged)
            {
                drop(pool);
                return retry_after_config_change(component, kind, data1, data2);
            }
        }

        let wait_mode = match deadline {
            Some(deadline) => WaitMode::Timeout(deadline.saturating_duration_since(Instant::now())),
            None => mode,
        };
        let Some(hit) = component.wake().wait(wake_mask, wait_mode) else {
            return Err(WaitError::Timeout);
        };

        if hit.contains(WakeBits::EVENT_ERROR) {
            return Err(WaitError::ErrorEvent);
        }
        if hit.contains(WakeBits::CONFIG_CHANGED) {
            return retry_after_config_change(component, kind, data1, data2);
        }
    }
}

fn retry_after_config_change(
    component: &ComponentShared,
    kind: EventKind,
    data1: Option<u32>,
    data2: Option<u32>,
) -> Result<(), WaitError> {
    if component.remove_event(kind, data1, data2) {
        Ok(())
    } else {
        Err(WaitError::ConfigChanged)
    }
}
