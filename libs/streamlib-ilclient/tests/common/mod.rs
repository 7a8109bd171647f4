// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use streamlib_ilclient::core::runtime::TunnelPeer;
use streamlib_ilclient::loopback::{LoopbackCore, LoopbackSpec};
use streamlib_ilclient::{
    BufferHeader, BufferMemory, Command, ErrorCode, EventSink, IlClient, IlClientConfig,
    IlComponentHandle, IlCore, PortDefinition, PortDomain, PortRange, StateType,
};

pub const DECODER_IN: u32 = 130;
pub const DECODER_OUT: u32 = 131;
pub const CAMERA_OUT: u32 = 71;
pub const RENDER_IN: u32 = 90;

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Loopback runtime with a decoder, a camera source and a renderer sink.
pub fn loopback_core() -> Arc<LoopbackCore> {
    let core = Arc::new(LoopbackCore::new());
    core.register(
        "video_decode",
        LoopbackSpec::new()
            .input(DECODER_IN, PortDomain::Video)
            .with_buffers(2, 4096, 16)
            .output(DECODER_OUT, PortDomain::Video)
            .with_buffers(2, 8192, 16),
    );
    core.register(
        "camera",
        LoopbackSpec::new()
            .output(CAMERA_OUT, PortDomain::Video)
            .with_streams(1)
            .reporting_name(),
    );
    core.register("video_render", LoopbackSpec::new().input(RENDER_IN, PortDomain::Video));
    core
}

pub fn ordered_config() -> IlClientConfig {
    IlClientConfig {
        randomize_state_transitions: false,
        ..IlClientConfig::default()
    }
}

pub fn loopback_client() -> (Arc<LoopbackCore>, IlClient) {
    let core = loopback_core();
    let client = IlClient::new(core.clone());
    (core, client)
}

/// Runtime double that records each component's sink so tests can deliver
/// events synchronously from the test thread.
#[derive(Default)]
pub struct StubCore {
    sinks: Mutex<HashMap<String, EventSink>>,
}

impl StubCore {
    pub fn sink(&self, name: &str) -> EventSink {
        self.sinks
            .lock()
            .get(&format!("OMX.broadcom.{name}"))
            .cloned()
            .expect("component was not created")
    }
}

impl IlCore for StubCore {
    fn get_handle(&self, name: &str, sink: EventSink) -> Result<Box<dyn IlComponentHandle>, ErrorCode> {
        self.sinks.lock().insert(name.to_string(), sink);
        Ok(Box::new(StubHandle))
    }
}

pub struct StubHandle;

impl IlComponentHandle for StubHandle {
    fn send_command(&self, _command: Command) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn state(&self) -> Result<StateType, ErrorCode> {
        Ok(StateType::Loaded)
    }

    fn port_range(&self, _domain: PortDomain) -> Result<PortRange, ErrorCode> {
        Ok(PortRange::default())
    }

    fn port_definition(&self, _port: u32) -> Result<PortDefinition, ErrorCode> {
        Err(ErrorCode::BadPortIndex)
    }

    fn set_port_definition(&self, _definition: &PortDefinition) -> Result<(), ErrorCode> {
        Err(ErrorCode::BadPortIndex)
    }

    fn num_available_streams(&self, _port: u32) -> Result<u32, ErrorCode> {
        Err(ErrorCode::UnsupportedIndex)
    }

    fn set_active_stream(&self, _port: u32, _stream: u32) -> Result<(), ErrorCode> {
        Err(ErrorCode::BadParameter)
    }

    fn setup_tunnel(&self, _port: u32, _peer: Option<TunnelPeer<'_>>) -> Result<(), ErrorCode> {
        Ok(())
    }

    fn use_buffer(
        &self,
        _port: u32,
        memory: BufferMemory,
    ) -> Result<BufferHeader, (ErrorCode, BufferMemory)> {
        Err((ErrorCode::NotImplemented, memory))
    }

    fn free_buffer(
        &self,
        _port: u32,
        header: BufferHeader,
    ) -> Result<BufferMemory, (ErrorCode, BufferHeader)> {
        Ok(header.into_memory())
    }

    fn empty_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)> {
        Err((ErrorCode::NotImplemented, header))
    }

    fn fill_this_buffer(&self, header: BufferHeader) -> Result<(), (ErrorCode, BufferHeader)> {
        Err((ErrorCode::NotImplemented, header))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn stub_client(capacity: usize) -> (Arc<StubCore>, IlClient) {
    let core = Arc::new(StubCore::default());
    let config = IlClientConfig {
        event_pool_capacity: capacity,
        ..ordered_config()
    };
    let client = IlClient::with_config(core.clone(), config).expect("valid config");
    (core, client)
}
