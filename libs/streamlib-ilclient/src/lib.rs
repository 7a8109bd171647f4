// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Client-side orchestration for asynchronous IL components.
//!
//! A caller creates [`Component`]s through an [`IlClient`], links their ports
//! into [`Tunnel`]s, drives state transitions, and exchanges buffers with each
//! component. The component runtime executes on its own threads and replies
//! through the event dispatcher; every blocking call in this crate parks the
//! caller on a per-component [`WakeSignal`] until the matching reply arrives.
//!
//! The [`loopback`] module provides a software runtime that implements the
//! same command/event contract in-process.

#![allow(clippy::type_complexity)] // Callback slots are clear in context

pub mod core;
pub mod loopback;

pub use core::{
    // Buffers
    AllocatorStrategy,
    BufferHeader,
    BufferId,
    BufferMemory,
    BufferOwner,
    BufferFlags,
    DefaultAllocator,
    // Client + components
    Component,
    ComponentId,
    ComponentShared,
    CreateFlags,
    ErrorMask,
    IlClient,
    // Config + logging
    IlClientConfig,
    LoggingConfig,
    init_logging,
    // Errors
    DualWaitOutcome,
    ErrorCode,
    IlError,
    Result,
    TunnelSetupError,
    WaitError,
    // Events
    EventKind,
    EventPayload,
    EventPoolStats,
    EventRecord,
    // Runtime contract
    Command,
    CommandKind,
    Direction,
    EventSink,
    IlComponentHandle,
    IlCore,
    PortDefinition,
    PortDomain,
    PortRange,
    StateType,
    // Tunnels + waits
    Tunnel,
    flush_tunnels,
    teardown_tunnels,
    wait_for_command_complete,
    wait_for_command_complete_dual,
    wait_for_event,
    WaitMode,
    WakeBits,
    WakeSignal,
};
