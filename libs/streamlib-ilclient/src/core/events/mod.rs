// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod dispatcher;
mod event_pool;
mod event_record;

pub(crate) use dispatcher::{dispatch_buffer_done, dispatch_event};
pub use event_pool::{DEFAULT_EVENT_POOL_CAPACITY, EventPool, EventPoolStats};
pub use event_record::{EventPayload, EventRecord};
