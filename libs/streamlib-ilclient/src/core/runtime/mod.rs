// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod event_sink;
mod il_core;

pub use event_sink::EventSink;
pub use il_core::{IlComponentHandle, IlCore, TunnelPeer};
