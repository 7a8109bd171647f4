// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::{Arc, Weak};

use crate::core::buffers::BufferHeader;
use crate::core::component::{ComponentId, ComponentShared};
use crate::core::error::{IlError, Result};
use crate::core::events::{EventPayload, dispatch_buffer_done, dispatch_event};
use crate::core::types::{Direction, EventKind};

/// Entry point through which a runtime reports events for one component.
///
/// Holds the component weakly; once the component is released every call
/// fails with [`IlError::ComponentGone`].
#[derive(Clone)]
pub struct EventSink {
    id: ComponentId,
    component: Weak<ComponentShared>,
}

impl EventSink {
    pub(crate) fn new(component: &Arc<ComponentShared>) -> Self {
        Self {
            id: component.id(),
            component: Arc::downgrade(component),
        }
    }

    pub fn component_id(&self) -> ComponentId {
        self.id
    }

    fn upgrade(&self) -> Result<Arc<ComponentShared>> {
        self.component
            .upgrade()
            .ok_or_else(|| IlError::ComponentGone(self.id.to_string()))
    }

    pub fn event(&self, kind: EventKind, data1: u32, data2: u32) -> Result<()> {
        let component = self.upgrade()?;
        dispatch_event(&component, kind, data1, data2, None)
    }

    pub fn event_with_payload(
        &self,
        kind: EventKind,
        data1: u32,
        data2: u32,
        payload: EventPayload,
    ) -> Result<()> {
        let component = self.upgrade()?;
        dispatch_event(&component, kind, data1, data2, Some(payload))
    }

    /// An input buffer has been consumed and is returned to the client.
    pub fn empty_buffer_done(&self, header: BufferHeader) -> Result<()> {
        let component = self.upgrade()?;
        dispatch_buffer_done(&component, header, Direction::Input)
    }

    /// An output buffer has been filled and is returned to the client.
    pub fn fill_buffer_done(&self, header: BufferHeader) -> Result<()> {
        let component = self.upgrade()?;
        dispatch_buffer_done(&component, header, Direction::Output)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").field("component", &self.id).finish()
    }
}
