// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{Direction, PortDomain};

/// Static description of one loopback port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackPortSpec {
    pub index: u32,
    pub direction: Direction,
    pub domain: PortDomain,
    pub buffer_count: u32,
    pub buffer_size: usize,
    pub buffer_alignment: usize,
    /// Streams the port advertises. `None` means the port does not multiplex.
    pub available_streams: Option<u32>,
}

/// Blueprint for a loopback component type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackSpec {
    pub ports: Vec<LoopbackPortSpec>,
    /// Whether the component reports its name back to the client.
    pub reports_name: bool,
}

impl LoopbackSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(self, index: u32, domain: PortDomain) -> Self {
        self.port(index, Direction::Input, domain)
    }

    pub fn output(self, index: u32, domain: PortDomain) -> Self {
        self.port(index, Direction::Output, domain)
    }

    fn port(mut self, index: u32, direction: Direction, domain: PortDomain) -> Self {
        self.ports.push(LoopbackPortSpec {
            index,
            direction,
            domain,
            buffer_count: 0,
            buffer_size: 0,
            buffer_alignment: 0,
            available_streams: None,
        });
        self
    }

    /// Buffer requirement of the most recently added port.
    pub fn with_buffers(mut self, count: u32, size: usize, alignment: usize) -> Self {
        if let Some(port) = self.ports.last_mut() {
            port.buffer_count = count;
            port.buffer_size = size;
            port.buffer_alignment = alignment;
        }
        self
    }

    /// Advertised stream count of the most recently added port.
    pub fn with_streams(mut self, available: u32) -> Self {
        if let Some(port) = self.ports.last_mut() {
            port.available_streams = Some(available);
        }
        self
    }

    pub fn reporting_name(mut self) -> Self {
        self.reports_name = true;
        self
    }
}
