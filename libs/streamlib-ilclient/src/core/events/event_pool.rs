// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Fixed-capacity pool of event records shared by every component of a client.
//!
//! Records live in an arena and are linked by index, either on the free list
//! or on exactly one component's received-event list. The pool lock guards the
//! free list and all component lists together, so every event-list mutation in
//! the client is serialized here. Critical sections are bounded by list length
//! and never span a blocking wait.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};

use super::event_record::EventRecord;
use crate::core::component::ComponentId;
use crate::core::error::{IlError, Result};

/// Default number of records, matching the classic IL client.
pub const DEFAULT_EVENT_POOL_CAPACITY: usize = 100;

type SlotIndex = usize;

struct Slot {
    record: Option<EventRecord>,
    next: Option<SlotIndex>,
}

/// Head of one component's received-event list. Newest record first.
#[derive(Debug, Default, Clone, Copy)]
struct EventList {
    head: Option<SlotIndex>,
    len: usize,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPoolStats {
    pub capacity: usize,
    pub free: usize,
    pub queued: usize,
}

impl EventPoolStats {
    /// Every record is either free or queued on some component.
    pub fn is_conserved(&self) -> bool {
        self.free + self.queued == self.capacity
    }
}

pub struct EventPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

impl EventPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(PoolState::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the pool lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock()
    }

    pub fn stats(&self) -> EventPoolStats {
        let state = self.state.lock();
        EventPoolStats {
            capacity: self.capacity,
            free: state.free_len,
            queued: state.lists.values().map(|list| list.len).sum(),
        }
    }

    /// Number of records queued on one component.
    pub fn queued_for(&self, component: ComponentId) -> usize {
        self.state.lock().len(component)
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_POOL_CAPACITY)
    }
}

impl std::fmt::Debug for EventPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Pool contents, reachable only through [`EventPool::lock`].
pub(crate) struct PoolState {
    slots: Vec<Slot>,
    free_head: Option<SlotIndex>,
    free_len: usize,
    lists: HashMap<ComponentId, EventList>,
}

impl PoolState {
    fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| Slot {
                record: None,
                next: if i + 1 < capacity { Some(i + 1) } else { None },
            })
            .collect();

        Self {
            slots,
            free_head: if capacity > 0 { Some(0) } else { None },
            free_len: capacity,
            lists: HashMap::new(),
        }
    }

    /// Take a slot off the free list and fill it.
    pub(crate) fn acquire(&mut self, record: EventRecord) -> Result<SlotIndex> {
        let index = self.free_head.ok_or(IlError::EventPoolExhausted {
            capacity: self.slots.len(),
        })?;
        let slot = &mut self.slots[index];
        self.free_head = slot.next.take();
        slot.record = Some(record);
        self.free_len -= 1;
        Ok(index)
    }

    /// Return a slot to the free list, handing back its record.
    pub(crate) fn release(&mut self, index: SlotIndex) -> Option<EventRecord> {
        let slot = &mut self.slots[index];
        let record = slot.record.take();
        slot.next = self.free_head;
        self.free_head = Some(index);
        self.free_len += 1;
        record
    }

    pub(crate) fn register(&mut self, component: ComponentId) {
        self.lists.entry(component).or_default();
    }

    /// Drop a component's list, returning all of its records to the pool.
    pub(crate) fn unregister(&mut self, component: ComponentId) -> usize {
        let returned = self.drain(component);
        self.lists.remove(&component);
        returned
    }

    pub(crate) fn len(&self, component: ComponentId) -> usize {
        self.lists.get(&component).map_or(0, |list| list.len)
    }

    /// Acquire a slot for `record` and push it at the head of the list.
    pub(crate) fn push_front(&mut self, component: ComponentId, record: EventRecord) -> Result<()> {
        let index = self.acquire(record)?;
        let list = self.lists.entry(component).or_default();
        self.slots[index].next = list.head;
        list.head = Some(index);
        list.len += 1;
        Ok(())
    }

    /// Records of a component, newest first.
    pub(crate) fn iter(&self, component: ComponentId) -> impl Iterator<Item = &EventRecord> + '_ {
        let mut cursor = self.lists.get(&component).and_then(|list| list.head);
        std::iter::from_fn(move || {
            let index = cursor?;
            let slot = &self.slots[index];
            cursor = slot.next;
            slot.record.as_ref()
        })
    }

    pub(crate) fn contains(
        &self,
        component: ComponentId,
        mut predicate: impl FnMut(&EventRecord) -> bool,
    ) -> bool {
        self.iter(component).any(|record| predicate(record))
    }

    /// Unlink the first (newest) record matching `predicate` and return it
    /// to the pool.
    pub(crate) fn remove_first(
        &mut self,
        component: ComponentId,
        mut predicate: impl FnMut(&EventRecord) -> bool,
    ) -> Option<EventRecord> {
        let mut removed = None;
        self.unlink_where(component, |record| {
            if removed.is_none() && predicate(record) {
                removed = Some(*record);
                true
            } else {
                false
            }
        });
        removed
    }

    /// Unlink every record matching `predicate`. Returns how many were removed.
    pub(crate) fn remove_all(
        &mut self,
        component: ComponentId,
        predicate: impl FnMut(&EventRecord) -> bool,
    ) -> usize {
        self.unlink_where(component, predicate)
    }

    /// Return every record of a component to the pool.
    pub(crate) fn drain(&mut self, component: ComponentId) -> usize {
        self.unlink_where(component, |_| true)
    }

    fn unlink_where(
        &mut self,
        component: ComponentId,
        mut predicate: impl FnMut(&EventRecord) -> bool,
    ) -> usize {
        let Some(mut list) = self.lists.get(&component).copied() else {
            return 0;
        };

        let mut removed = 0;
        let mut prev: Option<SlotIndex> = None;
        let mut cursor = list.head;

        while let Some(index) = cursor {
            let next = self.slots[index].next;
            let hit = self.slots[index]
                .record
                .as_ref()
                .is_some_and(&mut predicate);

            if hit {
                match prev {
                    None => list.head = next,
                    Some(p) => self.slots[p].next = next,
                }
                self.release(index);
                list.len -= 1;
                removed += 1;
            } else {
                prev = Some(index);
            }
            cursor = next;
        }

        self.lists.insert(component, list);
        removed
    }
}
