// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#[allow(clippy::module_inception)]
mod tunnel;

pub use tunnel::{Tunnel, flush_tunnels, teardown_tunnels};
