//! This module contains a guard which reverts a patch when it goes out of scope

use tracing::debug;

use crate::error::PatchError;
use crate::method::Method;

use super::{Patch, PatchGuard};

/// Guard for a patch. When this guard is dropped, the original is restored.
///
/// A guard whose patch was already superseded or reverted does nothing on drop.
pub struct ScopedPatch<R, A, T> {
    /// Underlying patch handle
    patch: Patch<R, A, T>,
    /// Whether the patch still has to be reverted on drop
    armed: bool,
}

impl<R, A, T> ScopedPatch<R, A, T> {
    /// Wraps a patch handle
    pub(crate) fn new(patch: Patch<R, A, T>) -> Self {
        Self { patch, armed: true }
    }

    /// Get the underlying patch handle in case info is needed
    pub fn patch(&self) -> &Patch<R, A, T> {
        &self.patch
    }
}

impl<R, A, T> PatchGuard for ScopedPatch<R, A, T> {
    type Original = Option<Method<R, A, T>>;

    fn restore(mut self) -> Result<Self::Original, PatchError> {
        self.armed = false;
        self.patch.revert()
    }
}

impl<R, A, T> Drop for ScopedPatch<R, A, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.patch.revert() {
            debug!(method = %self.patch.name(), %err, "scoped patch was already inactive");
        }
    }
}
