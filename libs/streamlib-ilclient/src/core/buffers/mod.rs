// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod allocator;
mod buffer_header;
mod buffer_queues;
mod port_buffers;

pub use allocator::{AllocatorStrategy, DefaultAllocator};
pub use buffer_header::{BufferFlags, BufferHeader, BufferId, BufferMemory, BufferOwner};
pub(crate) use buffer_queues::BufferQueues;
