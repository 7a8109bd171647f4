// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// Integration tests for client-managed buffers: registration and rollback,
// exchange with the component, and release.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{DECODER_IN, DECODER_OUT, loopback_client, wait_until};
use streamlib_ilclient::loopback::LoopbackComponent;
use streamlib_ilclient::{
    AllocatorStrategy, BufferFlags, BufferMemory, BufferOwner, Component, CreateFlags,
    Direction, ErrorCode, IlClient, IlError, StateType,
};

/// Allocator that counts its traffic and can refuse the nth allocation.
#[derive(Default)]
struct CountingAllocator {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    fail_on: Option<usize>,
}

impl AllocatorStrategy for CountingAllocator {
    fn allocate(&self, size: usize, alignment: usize, _description: &str) -> Option<BufferMemory> {
        let attempt = self.allocated.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            self.allocated.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(BufferMemory::zeroed(size, alignment))
    }

    fn free(&self, _memory: BufferMemory) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

const BUFFERED: CreateFlags = CreateFlags::ENABLE_INPUT_BUFFERS
    .union(CreateFlags::ENABLE_OUTPUT_BUFFERS)
    .union(CreateFlags::DISABLE_ALL_PORTS);

fn idle_decoder(client: &IlClient) -> Component {
    let decoder = client.create_component("video_decode", BUFFERED).unwrap();
    decoder.change_state(StateType::Idle).unwrap();
    decoder
}

/// Every registered buffer is in exactly one place.
fn assert_conserved(decoder: &Component, runtime: &LoopbackComponent, held_by_caller: usize) {
    let registered = decoder.registered_buffers(DECODER_IN) + decoder.registered_buffers(DECODER_OUT);
    let queued = decoder.queued_buffers(Direction::Input) + decoder.queued_buffers(Direction::Output);
    assert_eq!(registered, queued + runtime.held_buffers() + held_by_caller);
}

#[test]
fn test_enable_port_buffers_registers_full_count() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();

    decoder.enable_port_buffers(DECODER_IN, None).unwrap();

    assert!(runtime.port_enabled(DECODER_IN));
    assert_eq!(runtime.registered_buffers(DECODER_IN), 2);
    assert_eq!(decoder.registered_buffers(DECODER_IN), 2);
    assert_eq!(decoder.queued_buffers(Direction::Input), 2);

    let header = decoder.get_input_buffer(DECODER_IN, false).unwrap();
    assert_eq!(header.capacity(), 4096);
    assert_eq!(header.memory().alignment(), 16);
    assert_eq!(header.memory().as_slice().as_ptr() as usize % 16, 0);
    assert_eq!(decoder.buffer_owner(header.id()), Some(BufferOwner::Caller));
}

#[test]
fn test_enable_port_buffers_rolls_back_on_allocation_failure() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();
    let allocator = CountingAllocator {
        fail_on: Some(2),
        ..Default::default()
    };

    let result = decoder.enable_port_buffers(DECODER_IN, Some(&allocator));

    assert!(matches!(
        result,
        Err(IlError::BufferAllocation {
            registered: 1,
            required: 2,
            ..
        })
    ));
    assert_eq!(decoder.queued_buffers(Direction::Input), 0);
    assert_eq!(decoder.registered_buffers(DECODER_IN), 0);
    assert_eq!(runtime.registered_buffers(DECODER_IN), 0);
    assert!(!runtime.port_enabled(DECODER_IN));
    assert_eq!(allocator.allocated.load(Ordering::SeqCst), 1);
    assert_eq!(allocator.freed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enable_port_buffers_rolls_back_on_refused_buffer() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();
    runtime.fail_use_buffer(DECODER_IN, 2, ErrorCode::InsufficientResources);
    let allocator = CountingAllocator::default();

    let result = decoder.enable_port_buffers(DECODER_IN, Some(&allocator));

    assert!(matches!(result, Err(IlError::BufferAllocation { registered: 1, .. })));
    assert_eq!(runtime.registered_buffers(DECODER_IN), 0);
    assert!(!runtime.port_enabled(DECODER_IN));
    // The refused buffer and the rolled-back one both go back to the allocator.
    assert_eq!(allocator.allocated.load(Ordering::SeqCst), 2);
    assert_eq!(allocator.freed.load(Ordering::SeqCst), 2);

    // The port can be populated once the fault has passed.
    decoder.enable_port_buffers(DECODER_IN, None).unwrap();
    assert_eq!(runtime.registered_buffers(DECODER_IN), 2);
}

#[test]
fn test_enable_port_buffers_checks_port_and_state() {
    let (_core, client) = loopback_client();

    let loaded = client.create_component("video_decode", BUFFERED).unwrap();
    assert!(matches!(
        loaded.enable_port_buffers(DECODER_IN, None),
        Err(IlError::InvalidState {
            state: StateType::Loaded,
            ..
        })
    ));
    drop(loaded);

    let enabled = client
        .create_component("video_decode", CreateFlags::ENABLE_INPUT_BUFFERS)
        .unwrap();
    assert!(matches!(
        enabled.enable_port_buffers(DECODER_IN, None),
        Err(IlError::PortNotReady { port: DECODER_IN, .. })
    ));
}

#[test]
fn test_enable_port_buffers_rejects_port_without_requirement() {
    let (_core, client) = loopback_client();
    let decoder = client
        .create_component("video_decode", BUFFERED | CreateFlags::OUTPUT_ZERO_BUFFERS)
        .unwrap();
    decoder.change_state(StateType::Idle).unwrap();

    assert!(matches!(
        decoder.enable_port_buffers(DECODER_OUT, None),
        Err(IlError::PortNotReady { port: DECODER_OUT, .. })
    ));
}

#[test]
fn test_buffers_flow_through_executing_component() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();

    let eos_ports = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&eos_ports);
    client.set_eos_callback(move |_, port| recorded.lock().push(port));
    let filled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&filled);
    client.set_fill_buffer_done_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    decoder.enable_port_buffers(DECODER_IN, None).unwrap();
    decoder.enable_port_buffers(DECODER_OUT, None).unwrap();
    decoder.change_state(StateType::Executing).unwrap();

    while let Some(header) = decoder.get_output_buffer(DECODER_OUT, false) {
        assert_eq!(decoder.buffer_owner(header.id()), Some(BufferOwner::Caller));
        decoder.fill_buffer(header).unwrap();
    }
    assert_eq!(decoder.queued_buffers(Direction::Output), 0);

    let mut input = decoder.get_input_buffer(DECODER_IN, false).unwrap();
    input.fill_from(b"frame-0");
    input.flags = BufferFlags::EOS;
    input.timestamp = 40_000;
    let input_id = input.id();
    decoder.empty_buffer(input).unwrap();

    let output = decoder.get_output_buffer(DECODER_OUT, true).unwrap();
    assert_eq!(output.data(), b"frame-0");
    assert!(output.flags.contains(BufferFlags::EOS));
    assert_eq!(output.timestamp, 40_000);

    assert!(wait_until(|| decoder.buffer_owner(input_id) == Some(BufferOwner::Queued)));
    assert!(wait_until(|| eos_ports.lock().as_slice() == [DECODER_OUT]));
    assert_eq!(filled.load(Ordering::SeqCst), 1);
    assert_conserved(&decoder, &runtime, 1);

    decoder.change_state(StateType::Idle).unwrap();
    assert!(wait_until(|| runtime.held_buffers() == 0));
    assert!(wait_until(|| decoder.queued_buffers(Direction::Output) == 1));
    assert_conserved(&decoder, &runtime, 1);

    decoder.disable_port_buffers(DECODER_OUT, vec![output], None).unwrap();
    decoder.disable_port_buffers(DECODER_IN, Vec::new(), None).unwrap();
    assert_eq!(runtime.registered_buffers(DECODER_IN), 0);
    assert_eq!(runtime.registered_buffers(DECODER_OUT), 0);
    assert!(!runtime.port_enabled(DECODER_OUT));

    decoder.change_state(StateType::Loaded).unwrap();
}

#[test]
fn test_disable_port_buffers_collects_held_buffers() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();

    decoder.enable_port_buffers(DECODER_OUT, None).unwrap();
    decoder.change_state(StateType::Executing).unwrap();
    while let Some(header) = decoder.get_output_buffer(DECODER_OUT, false) {
        decoder.fill_buffer(header).unwrap();
    }
    assert!(wait_until(|| runtime.held_buffers() == 2));

    decoder.disable_port_buffers(DECODER_OUT, Vec::new(), None).unwrap();

    assert_eq!(runtime.registered_buffers(DECODER_OUT), 0);
    assert_eq!(decoder.registered_buffers(DECODER_OUT), 0);
    assert_eq!(decoder.queued_buffers(Direction::Output), 0);
    assert!(!runtime.port_enabled(DECODER_OUT));
}

#[test]
fn test_disable_port_buffers_on_disabled_port_is_noop() {
    let (_core, client) = loopback_client();
    let decoder = idle_decoder(&client);

    decoder.disable_port_buffers(DECODER_IN, Vec::new(), None).unwrap();
    assert_eq!(decoder.queued_event_count(), 0);
}

#[test]
fn test_refused_buffer_returns_to_queue() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();
    decoder.enable_port_buffers(DECODER_IN, None).unwrap();

    // An input buffer cannot be filled.
    let header = decoder.get_input_buffer(DECODER_IN, false).unwrap();
    let id = header.id();
    assert!(matches!(
        decoder.fill_buffer(header),
        Err(IlError::Runtime {
            code: ErrorCode::IncorrectStateOperation,
            ..
        })
    ));

    assert_eq!(decoder.buffer_owner(id), Some(BufferOwner::Queued));
    assert_eq!(decoder.queued_buffers(Direction::Input), 2);
    assert_conserved(&decoder, &runtime, 0);
}

#[test]
fn test_produced_output_reaches_caller() {
    let (core, client) = loopback_client();
    let decoder = idle_decoder(&client);
    let runtime = core.component("video_decode").unwrap();
    decoder.enable_port_buffers(DECODER_OUT, None).unwrap();
    decoder.change_state(StateType::Executing).unwrap();

    let header = decoder.get_output_buffer(DECODER_OUT, false).unwrap();
    decoder.fill_buffer(header).unwrap();
    runtime.produce(DECODER_OUT, &[1, 2, 3], BufferFlags::END_OF_FRAME);

    let output = decoder.get_output_buffer(DECODER_OUT, true).unwrap();
    assert_eq!(output.data(), &[1, 2, 3]);
    assert_eq!(output.flags, BufferFlags::END_OF_FRAME);
}
