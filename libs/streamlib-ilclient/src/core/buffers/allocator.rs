// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::buffer_header::BufferMemory;

/// Supplies the memory registered by
/// [`Component::enable_port_buffers`](crate::core::component::Component::enable_port_buffers).
///
/// The allocator's own state plays the role of the caller context.
pub trait AllocatorStrategy: Send + Sync {
    /// Allocate `size` bytes aligned to `alignment`. `description` names the
    /// owning component. `None` stops allocation for the port.
    fn allocate(&self, size: usize, alignment: usize, description: &str) -> Option<BufferMemory>;

    fn free(&self, memory: BufferMemory);
}

/// Heap allocator used when the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl AllocatorStrategy for DefaultAllocator {
    fn allocate(&self, size: usize, alignment: usize, description: &str) -> Option<BufferMemory> {
        tracing::trace!("{}: allocating {} bytes aligned to {}", description, size, alignment);
        Some(BufferMemory::zeroed(size, alignment))
    }

    fn free(&self, memory: BufferMemory) {
        drop(memory);
    }
}
