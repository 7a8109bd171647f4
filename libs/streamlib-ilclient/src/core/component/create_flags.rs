// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use bitflags::bitflags;

bitflags! {
    /// Options fixed when a component is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreateFlags: u32 {
        /// Input buffers are exchanged with the client. Required for
        /// empty-buffer-done delivery.
        const ENABLE_INPUT_BUFFERS = 0x1;
        /// Output buffers are exchanged with the client. Required for
        /// fill-buffer-done delivery.
        const ENABLE_OUTPUT_BUFFERS = 0x2;
        /// Disable every port right after creation.
        const DISABLE_ALL_PORTS = 0x4;
        /// Set the actual buffer count of every output port to zero.
        const OUTPUT_ZERO_BUFFERS = 0x10;
    }
}
