// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Returned-buffer queues of one component, and the ledger of every buffer
//! registered on it.

use std::collections::{HashMap, VecDeque};

use super::buffer_header::{BufferHeader, BufferId, BufferOwner};
use crate::core::types::Direction;

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    port: u32,
    owner: BufferOwner,
}

#[derive(Debug, Default)]
pub(crate) struct BufferQueues {
    input: VecDeque<BufferHeader>,
    output: VecDeque<BufferHeader>,
    ledger: HashMap<BufferId, LedgerEntry>,
}

impl BufferQueues {
    fn queue_mut(&mut self, direction: Direction) -> &mut VecDeque<BufferHeader> {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    pub(crate) fn queued_len(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.input.len(),
            Direction::Output => self.output.len(),
        }
    }

    pub(crate) fn track(&mut self, header: &BufferHeader, owner: BufferOwner) {
        self.ledger.insert(
            header.id(),
            LedgerEntry {
                port: header.port(),
                owner,
            },
        );
    }

    pub(crate) fn set_owner(&mut self, id: BufferId, owner: BufferOwner) {
        if let Some(entry) = self.ledger.get_mut(&id) {
            entry.owner = owner;
        }
    }

    pub(crate) fn forget(&mut self, id: BufferId) {
        self.ledger.remove(&id);
    }

    pub(crate) fn owner(&self, id: BufferId) -> Option<BufferOwner> {
        self.ledger.get(&id).map(|entry| entry.owner)
    }

    pub(crate) fn registered_on(&self, port: u32) -> usize {
        self.ledger.values().filter(|entry| entry.port == port).count()
    }

    /// Append a buffer handed back by the runtime or by a failed submission.
    pub(crate) fn push_returned(&mut self, header: BufferHeader) {
        self.track(&header, BufferOwner::Queued);
        self.queue_mut(header.direction()).push_back(header);
    }

    /// Take the oldest queued buffer of `port`. The caller owns it afterwards.
    pub(crate) fn take(&mut self, direction: Direction, port: u32) -> Option<BufferHeader> {
        let queue = self.queue_mut(direction);
        let position = queue.iter().position(|header| header.port() == port)?;
        let header = queue.remove(position)?;
        self.set_owner(header.id(), BufferOwner::Caller);
        Some(header)
    }

    /// Take every queued buffer of `port`, oldest first.
    pub(crate) fn take_all(&mut self, direction: Direction, port: u32) -> Vec<BufferHeader> {
        let queue = self.queue_mut(direction);
        let (taken, kept): (Vec<_>, Vec<_>) =
            queue.drain(..).partition(|header| header.port() == port);
        queue.extend(kept);
        for header in &taken {
            self.set_owner(header.id(), BufferOwner::Caller);
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffers::BufferMemory;

    fn header(id: u64, port: u32, direction: Direction) -> BufferHeader {
        BufferHeader::new(BufferId::from_raw(id), port, direction, BufferMemory::zeroed(8, 1))
    }

    #[test]
    fn test_take_filters_by_port_in_fifo_order() {
        let mut queues = BufferQueues::default();
        queues.push_returned(header(1, 10, Direction::Input));
        queues.push_returned(header(2, 11, Direction::Input));
        queues.push_returned(header(3, 10, Direction::Input));

        assert_eq!(queues.take(Direction::Input, 10).map(|h| h.id().raw()), Some(1));
        assert_eq!(queues.take(Direction::Input, 10).map(|h| h.id().raw()), Some(3));
        assert!(queues.take(Direction::Input, 10).is_none());
        assert_eq!(queues.queued_len(Direction::Input), 1);
    }

    #[test]
    fn test_ledger_follows_ownership() {
        let mut queues = BufferQueues::default();
        let h = header(7, 20, Direction::Output);
        queues.track(&h, BufferOwner::Runtime);
        assert_eq!(queues.owner(BufferId::from_raw(7)), Some(BufferOwner::Runtime));

        queues.push_returned(h);
        assert_eq!(queues.owner(BufferId::from_raw(7)), Some(BufferOwner::Queued));

        let taken = queues.take(Direction::Output, 20).unwrap();
        assert_eq!(queues.owner(taken.id()), Some(BufferOwner::Caller));
        assert_eq!(queues.registered_on(20), 1);

        queues.forget(taken.id());
        assert_eq!(queues.registered_on(20), 0);
    }

    #[test]
    fn test_take_all_keeps_other_ports() {
        let mut queues = BufferQueues::default();
        queues.push_returned(header(1, 10, Direction::Output));
        queues.push_returned(header(2, 11, Direction::Output));
        queues.push_returned(header(3, 10, Direction::Output));

        let taken = queues.take_all(Direction::Output, 10);
        assert_eq!(taken.len(), 2);
        assert_eq!(queues.queued_len(Direction::Output), 1);
    }
}
