// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use super::component::ComponentShared;

bitflags! {
    /// Error codes that are silently dropped by the dispatcher while set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ErrorMask: u32 {
        const UNPOPULATED = 0x1;
        const SAME_STATE = 0x2;
        const BAD_PARAMETER = 0x4;
    }
}

/// Atomic storage for an [`ErrorMask`], read from runtime threads.
#[derive(Debug, Default)]
pub(crate) struct AtomicErrorMask(AtomicU32);

impl AtomicErrorMask {
    pub(crate) fn insert(&self, mask: ErrorMask) {
        self.0.fetch_or(mask.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove(&self, mask: ErrorMask) {
        self.0.fetch_and(!mask.bits(), Ordering::AcqRel);
    }

    pub(crate) fn load(&self) -> ErrorMask {
        ErrorMask::from_bits_truncate(self.0.load(Ordering::Acquire))
    }
}

/// Unmasks on drop the bits it masked.
#[must_use = "the mask is removed when the guard is dropped"]
pub struct ErrorMaskGuard {
    component: Arc<ComponentShared>,
    mask: ErrorMask,
}

impl ErrorMaskGuard {
    pub(crate) fn new(component: Arc<ComponentShared>, mask: ErrorMask) -> Self {
        component.mask_errors(mask);
        Self { component, mask }
    }
}

impl Drop for ErrorMaskGuard {
    fn drop(&mut self) {
        self.component.unmask_errors(self.mask);
    }
}
