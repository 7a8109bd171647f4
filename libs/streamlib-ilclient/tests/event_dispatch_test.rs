// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// Integration tests for event recording: pool accounting, deduplication,
// error masking, wake bits and callbacks.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use common::stub_client;
use parking_lot::Mutex;
use streamlib_ilclient::{
    BufferFlags, BufferHeader, BufferId, BufferMemory, CreateFlags, Direction, ErrorCode,
    ErrorMask, EventKind, EventPayload, IlError, WakeBits,
};

fn input_header(id: u64) -> BufferHeader {
    BufferHeader::new(BufferId::from_raw(id), 0, Direction::Input, BufferMemory::zeroed(64, 16))
}

#[test]
fn test_event_is_queued_and_pool_conserved() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();

    assert!(component.has_event(EventKind::PortSettingsChanged, Some(131), None));
    assert!(component.wake().peek().contains(WakeBits::PARAMETER_CHANGED));
    let stats = client.event_pool_stats();
    assert_eq!(stats.queued, 1);
    assert!(stats.is_conserved());
}

#[test]
fn test_duplicate_event_keeps_one_record() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();
    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();
    sink.event(EventKind::PortSettingsChanged, 130, 0).unwrap();

    assert_eq!(component.queued_event_count(), 2);
    assert_eq!(client.event_pool_stats().queued, 2);
}

#[test]
fn test_newest_event_is_at_head() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::PortSettingsChanged, 130, 0).unwrap();
    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();

    let queued = component.queued_events();
    assert_eq!(queued[0].data1, 131);
    assert_eq!(queued[1].data1, 130);
}

#[test]
fn test_pool_exhaustion_reports_error() {
    let (core, client) = stub_client(2);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::PortSettingsChanged, 1, 0).unwrap();
    sink.event(EventKind::PortSettingsChanged, 2, 0).unwrap();
    let result = sink.event(EventKind::PortSettingsChanged, 3, 0);

    assert!(matches!(result, Err(IlError::EventPoolExhausted { capacity: 2 })));
    assert_eq!(component.queued_event_count(), 2);
    let stats = client.event_pool_stats();
    assert_eq!(stats.free, 0);
    assert!(stats.is_conserved());
}

#[test]
fn test_masked_error_is_dropped() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    client.set_error_callback(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    {
        let _mask = component.mask_errors_scoped(ErrorMask::UNPOPULATED);
        sink.event(EventKind::Error, ErrorCode::PortUnpopulated.raw(), 0).unwrap();
        assert_eq!(component.queued_event_count(), 0);
        assert!(!component.wake().peek().contains(WakeBits::EVENT_ERROR));
    }
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    // Mask released with the guard.
    sink.event(EventKind::Error, ErrorCode::PortUnpopulated.raw(), 0).unwrap();
    assert!(component.has_event(EventKind::Error, Some(ErrorCode::PortUnpopulated.raw()), None));
    assert!(component.wake().peek().contains(WakeBits::EVENT_ERROR));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn test_same_state_and_bad_parameter_masks() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    component.mask_errors(ErrorMask::SAME_STATE | ErrorMask::BAD_PARAMETER);
    sink.event(EventKind::Error, ErrorCode::SameState.raw(), 1).unwrap();
    sink.event(EventKind::Error, ErrorCode::BadParameter.raw(), 0).unwrap();
    assert_eq!(component.queued_event_count(), 0);

    // Unmaskable codes are always recorded.
    sink.event(EventKind::Error, ErrorCode::InsufficientResources.raw(), 0).unwrap();
    assert_eq!(component.queued_event_count(), 1);

    component.unmask_errors(ErrorMask::SAME_STATE | ErrorMask::BAD_PARAMETER);
    assert!(component.error_mask().is_empty());
}

#[test]
fn test_storage_exhaustion_is_queued_without_wake() {
    let (core, client) = stub_client(8);
    let component = client.create_component("image_write", CreateFlags::empty()).unwrap();
    let sink = core.sink("image_write");

    let seen = Arc::new(AtomicU32::new(0));
    let code = Arc::clone(&seen);
    client.set_error_callback(move |_, raw| code.store(raw, Ordering::SeqCst));

    sink.event(EventKind::Error, ErrorCode::DiskFull.raw(), 0).unwrap();

    assert!(component.has_event(EventKind::Error, Some(ErrorCode::DiskFull.raw()), None));
    assert!(!component.wake().peek().contains(WakeBits::EVENT_ERROR));
    assert_eq!(seen.load(Ordering::SeqCst), ErrorCode::DiskFull.raw());
}

#[test]
fn test_unclassified_error_sets_error_bit() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::Error, 0x1234, 0).unwrap();

    assert!(component.wake().peek().contains(WakeBits::EVENT_ERROR));
    assert!(component.has_event(EventKind::Error, Some(0x1234), None));
}

#[test]
fn test_eos_normalizes_flags_and_notifies() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_render", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_render");

    let ports = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&ports);
    client.set_eos_callback(move |component, port| {
        recorded.lock().push((component.name(), port));
    });

    let flags = BufferFlags::EOS | BufferFlags::END_OF_FRAME;
    sink.event(EventKind::BufferFlag, 90, flags.bits()).unwrap();

    assert!(component.has_event(EventKind::BufferFlag, Some(90), Some(BufferFlags::EOS.bits())));
    assert!(component.wake().peek().contains(WakeBits::BUFFER_FLAG_EOS));
    assert_eq!(*ports.lock(), vec![("cl:video_render".to_string(), 90)]);
}

#[test]
fn test_port_settings_and_config_callbacks() {
    let (core, client) = stub_client(8);
    let component = client.create_component("camera", CreateFlags::empty()).unwrap();
    let sink = core.sink("camera");

    let port_settings = Arc::new(AtomicU32::new(0));
    let config_index = Arc::new(AtomicU32::new(0));
    let (p, c) = (Arc::clone(&port_settings), Arc::clone(&config_index));
    client.set_port_settings_callback(move |_, port| p.store(port, Ordering::SeqCst));
    client.set_config_changed_callback(move |_, index| c.store(index, Ordering::SeqCst));

    sink.event(EventKind::PortSettingsChanged, 71, 0).unwrap();
    sink.event(EventKind::ParamOrConfigChanged, 71, 0x7f00_0001).unwrap();

    assert_eq!(port_settings.load(Ordering::SeqCst), 71);
    assert_eq!(config_index.load(Ordering::SeqCst), 0x7f00_0001);
    assert!(component.wake().peek().contains(WakeBits::CONFIG_CHANGED));
}

#[test]
fn test_mark_event_carries_payload() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event_with_payload(EventKind::Mark, 130, 0, EventPayload(0xfeed)).unwrap();

    let queued = component.queued_events();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload, Some(EventPayload(0xfeed)));
    assert!(component.wake().peek().contains(WakeBits::BUFFER_MARK));
}

#[test]
fn test_remove_event_clears_error_bit() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::Error, ErrorCode::HardwareError.raw(), 0).unwrap();
    assert!(component.remove_event(EventKind::Error, None, None));

    assert!(!component.wake().peek().contains(WakeBits::EVENT_ERROR));
    assert!(!component.remove_event(EventKind::Error, None, None));
    assert_eq!(client.event_pool_stats().queued, 0);
}

#[test]
fn test_buffer_done_requires_creation_flag() {
    let (core, client) = stub_client(8);
    let _plain = client.create_component("video_render", CreateFlags::empty()).unwrap();
    let result = core.sink("video_render").empty_buffer_done(input_header(1));
    assert!(matches!(result, Err(IlError::UnexpectedBufferCallback { .. })));

    let component = client
        .create_component("video_decode", CreateFlags::ENABLE_INPUT_BUFFERS)
        .unwrap();
    let returned = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&returned);
    client.set_empty_buffer_done_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    core.sink("video_decode").empty_buffer_done(input_header(2)).unwrap();

    assert_eq!(component.queued_buffers(Direction::Input), 1);
    assert!(component.wake().peek().contains(WakeBits::EMPTY_BUFFER_DONE));
    assert_eq!(returned.load(Ordering::SeqCst), 1);
    let header = component.get_input_buffer(0, false).unwrap();
    assert_eq!(header.id(), BufferId::from_raw(2));
}

#[test]
fn test_callback_may_reenter_component() {
    let (core, client) = stub_client(8);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    // The pool lock is released before callbacks run.
    client.set_port_settings_callback(|component, port| {
        assert!(component.remove_event(EventKind::PortSettingsChanged, Some(port), None));
    });
    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();

    assert_eq!(component.queued_event_count(), 0);
}

#[test]
fn test_release_returns_events_and_closes_sink() {
    let (core, client) = stub_client(4);
    let component = client.create_component("video_decode", CreateFlags::empty()).unwrap();
    let sink = core.sink("video_decode");

    sink.event(EventKind::PortSettingsChanged, 130, 0).unwrap();
    sink.event(EventKind::PortSettingsChanged, 131, 0).unwrap();
    client.cleanup_components(vec![component]);

    let stats = client.event_pool_stats();
    assert_eq!(stats.free, 4);
    assert!(stats.is_conserved());
    assert!(matches!(
        sink.event(EventKind::PortSettingsChanged, 130, 0),
        Err(IlError::ComponentGone(_))
    ));
}
