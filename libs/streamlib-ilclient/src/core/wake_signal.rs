// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-component wake signal: a group of named condition bits that callers
//! block on and consume.
//!
//! The dispatcher sets bits from the runtime's context; a waiter consumes
//! exactly the bits of its mask that were set, leaving the others for other
//! waiters.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

bitflags! {
    /// Condition bits of a [`WakeSignal`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WakeBits: u32 {
        const EMPTY_BUFFER_DONE = 0x1;
        const FILL_BUFFER_DONE = 0x2;
        const PORT_DISABLED = 0x4;
        const PORT_ENABLED = 0x8;
        const STATE_CHANGED = 0x10;
        const BUFFER_FLAG_EOS = 0x20;
        const PARAMETER_CHANGED = 0x40;
        const EVENT_ERROR = 0x80;
        const PORT_FLUSH = 0x100;
        const MARKED_BUFFER = 0x200;
        const BUFFER_MARK = 0x400;
        const CONFIG_CHANGED = 0x800;
    }
}

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Return immediately if nothing is set.
    Poll,
    /// Block until a bit of the mask is set.
    Forever,
    /// Block for at most the given duration.
    Timeout(Duration),
}

impl WaitMode {
    /// Build a mode from a millisecond count, where zero means poll.
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::Poll
        } else {
            Self::Timeout(Duration::from_millis(ms))
        }
    }
}

#[derive(Default)]
pub struct WakeSignal {
    bits: Mutex<WakeBits>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// OR `bits` into the group and wake every waiter.
    pub fn set(&self, bits: WakeBits) {
        let mut current = self.bits.lock();
        current.insert(bits);
        self.cond.notify_all();
    }

    /// Consume any bits of `mask` that are set, blocking according to `mode`
    /// while none are. Returns the consumed bits, or `None` on poll miss or
    /// timeout.
    pub fn wait(&self, mask: WakeBits, mode: WaitMode) -> Option<WakeBits> {
        let deadline = match mode {
            WaitMode::Timeout(timeout) => Some(Instant::now() + timeout),
            _ => None,
        };

        let mut current = self.bits.lock();
        loop {
            let hit = *current & mask;
            if !hit.is_empty() {
                current.remove(hit);
                return Some(hit);
            }

            match mode {
                WaitMode::Poll => return None,
                WaitMode::Forever => self.cond.wait(&mut current),
                WaitMode::Timeout(_) => {
                    let deadline = deadline?;
                    if self.cond.wait_until(&mut current, deadline).timed_out() {
                        let hit = *current & mask;
                        if hit.is_empty() {
                            return None;
                        }
                        current.remove(hit);
                        return Some(hit);
                    }
                }
            }
        }
    }

    /// Clear bits without waiting.
    pub fn clear(&self, mask: WakeBits) -> WakeBits {
        self.wait(mask, WaitMode::Poll).unwrap_or_default()
    }

    /// Currently set bits, for diagnostics.
    pub fn peek(&self) -> WakeBits {
        *self.bits.lock()
    }
}

impl std::fmt::Debug for WakeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeSignal")
            .field("bits", &self.peek())
            .finish()
    }
}
