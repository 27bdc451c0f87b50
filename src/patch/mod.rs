//! # Patch
//!
//! This module covers patch handles, which are used to revert an interception on-command

pub mod scoped;

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::error::PatchError;
use crate::method::Method;
use crate::slot::{self, SlotState};

pub use scoped::ScopedPatch;

/// Anything that can revert a patch and hand back the original it captured
pub trait PatchGuard: Sized {
    /// Value restored by the guard
    type Original;

    /// Restores the original value of a patch
    fn restore(self) -> Result<Self::Original, PatchError>;
}

/// Handle to a patch installed by [`Slot::patch`](crate::Slot::patch) or
/// [`MethodTable::patch`](crate::MethodTable::patch)
///
/// Dropping the handle leaves the patch installed. Use [`Patch::unpatch`] to revert it, or
/// [`Patch::scoped`] to revert it when the guard goes out of scope.
pub struct Patch<R, A, T> {
    /// Name of the patched method
    name: Arc<str>,
    /// Slot the patch was installed in. Weak so that the handle doesn't keep the owner alive
    slot: Weak<RwLock<SlotState<R, A, T>>>,
    /// Id of the patch in its slot
    id: u64,
    /// Value the slot held before the patch
    original: Option<Method<R, A, T>>,
    /// Wrapper that was installed
    wrapper: Method<R, A, T>,
}

impl<R, A, T> Patch<R, A, T> {
    /// Creates a handle for a patch that was just installed
    pub(crate) fn new(
        name: Arc<str>,
        slot: Weak<RwLock<SlotState<R, A, T>>>,
        id: u64,
        original: Option<Method<R, A, T>>,
        wrapper: Method<R, A, T>,
    ) -> Self {
        Self {
            name,
            slot,
            id,
            original,
            wrapper,
        }
    }

    /// Name of the patched method
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value the method held before this patch, `None` if it was absent
    pub fn original(&self) -> Option<&Method<R, A, T>> {
        self.original.as_ref()
    }

    /// The wrapper installed by this patch
    pub fn wrapper(&self) -> &Method<R, A, T> {
        &self.wrapper
    }

    /// Returns true while this patch is the one installed in its slot
    pub fn is_active(&self) -> bool {
        self.slot
            .upgrade()
            .map_or(false, |state| slot::is_active(&state, self.id))
    }

    /// Reverts the patch, restoring and returning the original.
    ///
    /// Fails without touching the slot if the patch is no longer installed or the slot is gone.
    pub fn unpatch(self) -> Result<Option<Method<R, A, T>>, PatchError> {
        self.revert()
    }

    /// Turns the handle into a guard that reverts the patch when dropped
    pub fn scoped(self) -> ScopedPatch<R, A, T> {
        ScopedPatch::new(self)
    }

    /// Reverts the patch without consuming the handle
    pub(crate) fn revert(&self) -> Result<Option<Method<R, A, T>>, PatchError> {
        let state = self.slot.upgrade().ok_or_else(|| PatchError::OwnerDropped {
            name: Arc::clone(&self.name),
        })?;
        slot::revert(&state, &self.name, Some(self.id))
    }
}

impl<R, A, T> PatchGuard for Patch<R, A, T> {
    type Original = Option<Method<R, A, T>>;

    fn restore(self) -> Result<Self::Original, PatchError> {
        self.unpatch()
    }
}

impl<R, A, T> fmt::Debug for Patch<R, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("original", &self.original)
            .field("wrapper", &self.wrapper)
            .finish()
    }
}
