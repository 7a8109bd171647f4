// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process software runtime.
//!
//! Each component runs a worker thread that executes commands and moves
//! buffers, replying through its [`EventSink`](crate::core::runtime::EventSink)
//! exactly as a hardware runtime would: asynchronously and from a thread the
//! caller does not own. Input buffers are copied to the first enabled output
//! port while Executing. Faults and arbitrary events can be injected through
//! [`LoopbackComponent`].

mod component;
mod loopback_core;
mod spec;
mod worker;

pub use component::{LoopbackComponent, LoopbackHandle};
pub use loopback_core::LoopbackCore;
pub use spec::{LoopbackPortSpec, LoopbackSpec};
