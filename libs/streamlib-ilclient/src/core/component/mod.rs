// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#[allow(clippy::module_inception)]
mod component;
mod component_id;
mod create_flags;
mod error_mask;

pub use component::{Component, ComponentShared};
pub use component_id::ComponentId;
pub use create_flags::CreateFlags;
pub use error_mask::{ErrorMask, ErrorMaskGuard};
