// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::component::{LoopbackComponent, LoopbackHandle};
use super::spec::LoopbackSpec;
use crate::core::config::DEFAULT_COMPONENT_PREFIX;
use crate::core::error_code::ErrorCode;
use crate::core::runtime::{EventSink, IlComponentHandle, IlCore};

/// Factory of loopback components, keyed by name without the runtime prefix.
pub struct LoopbackCore {
    prefix: String,
    specs: Mutex<HashMap<String, LoopbackSpec>>,
    instances: Mutex<HashMap<String, Weak<LoopbackComponent>>>,
    buffer_ids: Arc<AtomicU64>,
}

impl LoopbackCore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_COMPONENT_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            specs: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            buffer_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Make `name` available to [`IlCore::get_handle`].
    pub fn register(&self, name: &str, spec: LoopbackSpec) {
        self.specs.lock().insert(name.to_string(), spec);
    }

    /// Most recently created live instance of `name`.
    pub fn component(&self, name: &str) -> Option<Arc<LoopbackComponent>> {
        self.instances.lock().get(name).and_then(Weak::upgrade)
    }
}

impl Default for LoopbackCore {
    fn default() -> Self {
        Self::new()
    }
}

impl IlCore for LoopbackCore {
    fn get_handle(&self, name: &str, sink: EventSink) -> Result<Box<dyn IlComponentHandle>, ErrorCode> {
        let short = name.strip_prefix(self.prefix.as_str()).unwrap_or(name);
        let spec = self
            .specs
            .lock()
            .get(short)
            .cloned()
            .ok_or(ErrorCode::ComponentNotFound)?;

        let handle = LoopbackHandle::spawn(name, &spec, sink, Arc::clone(&self.buffer_ids))?;
        self.instances
            .lock()
            .insert(short.to_string(), Arc::downgrade(handle.component()));
        Ok(Box::new(handle))
    }
}

impl std::fmt::Debug for LoopbackCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackCore")
            .field("prefix", &self.prefix)
            .field("registered", &self.specs.lock().len())
            .finish()
    }
}
