// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use bitflags::bitflags;

use crate::core::events::EventPayload;
use crate::core::types::Direction;

bitflags! {
    /// Per-buffer flags carried alongside the data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const EOS = 0x1;
        const START_TIME = 0x2;
        const DECODE_ONLY = 0x4;
        const DATA_CORRUPT = 0x8;
        const END_OF_FRAME = 0x10;
        const SYNC_FRAME = 0x20;
        const EXTRA_DATA = 0x40;
        const CODEC_CONFIG = 0x80;
    }
}

/// Identity of a registered buffer, assigned by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Who holds a registered buffer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOwner {
    /// Handed to the component and not yet returned.
    Runtime,
    /// Returned by the component, waiting in the client's queue.
    Queued,
    /// Taken from the queue by the caller.
    Caller,
}

/// Payload memory of a buffer, aligned to the port's requirement.
pub struct BufferMemory {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
    alignment: usize,
}

impl BufferMemory {
    /// Zero-filled memory of `len` bytes whose start is a multiple of
    /// `alignment` (treated as 1 when zero).
    pub fn zeroed(len: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1);
        let storage = vec![0u8; len + alignment - 1];
        let offset = storage.as_ptr().align_offset(alignment);
        Self {
            storage,
            offset,
            len,
            alignment,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

impl fmt::Debug for BufferMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferMemory")
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

/// A registered buffer. Ownership of the header is ownership of the buffer:
/// it moves into the runtime on empty/fill and back through the dispatcher.
#[derive(Debug)]
pub struct BufferHeader {
    id: BufferId,
    port: u32,
    direction: Direction,
    memory: BufferMemory,
    pub filled_len: usize,
    pub offset: usize,
    pub flags: BufferFlags,
    pub timestamp: i64,
    pub mark: Option<EventPayload>,
}

impl BufferHeader {
    /// Called by runtimes when registering memory.
    pub fn new(id: BufferId, port: u32, direction: Direction, memory: BufferMemory) -> Self {
        Self {
            id,
            port,
            direction,
            memory,
            filled_len: 0,
            offset: 0,
            flags: BufferFlags::empty(),
            timestamp: 0,
            mark: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn data(&self) -> &[u8] {
        let end = (self.offset + self.filled_len).min(self.capacity());
        &self.memory.as_slice()[self.offset.min(end)..end]
    }

    pub fn memory(&self) -> &BufferMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut BufferMemory {
        &mut self.memory
    }

    /// Copy `bytes` into the buffer from offset zero, truncating to capacity.
    /// Returns how many bytes were written.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let written = bytes.len().min(self.capacity());
        self.memory.as_mut_slice()[..written].copy_from_slice(&bytes[..written]);
        self.offset = 0;
        self.filled_len = written;
        written
    }

    /// Clear payload metadata before the buffer is reused.
    pub fn reset(&mut self) {
        self.filled_len = 0;
        self.offset = 0;
        self.flags = BufferFlags::empty();
        self.timestamp = 0;
        self.mark = None;
    }

    pub fn into_memory(self) -> BufferMemory {
        self.memory
    }
}
