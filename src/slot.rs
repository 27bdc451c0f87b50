//! # Slot
//!
//! A single named method cell that can be patched and restored

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::error::PatchError;
use crate::method::{intercept, Method, Original};
use crate::patch::Patch;

/// Source of patch ids. Ids are never reused, so a stale [`Patch`] can't revert a newer one.
static NEXT_PATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping for the patch currently installed in a slot
pub(crate) struct ActivePatch<R, A, T> {
    /// Id of the patch, shared with its [`Patch`] handle
    id: u64,
    /// Value the slot held before the patch
    original: Option<Method<R, A, T>>,
}

/// Contents of a slot
pub(crate) struct SlotState<R, A, T> {
    /// Value currently installed, either an original or a wrapper
    installed: Option<Method<R, A, T>>,
    /// Reverse hook for `installed` when it is a wrapper
    active: Option<ActivePatch<R, A, T>>,
}

/// Locks slot state for reading.
///
/// Every write leaves the state consistent, so a poisoned lock is still safe to use.
pub(crate) fn read<R, A, T>(
    state: &RwLock<SlotState<R, A, T>>,
) -> RwLockReadGuard<'_, SlotState<R, A, T>> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

/// Locks slot state for writing
fn write<R, A, T>(
    state: &RwLock<SlotState<R, A, T>>,
) -> RwLockWriteGuard<'_, SlotState<R, A, T>> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Returns true if patch `id` is the one installed in `state`
pub(crate) fn is_active<R, A, T>(state: &RwLock<SlotState<R, A, T>>, id: u64) -> bool {
    read(state).active.as_ref().map_or(false, |active| active.id == id)
}

/// Reverts the active patch of a slot, restoring and returning its original.
///
/// With `id` set, only that patch is reverted. Otherwise whichever patch is active is.
pub(crate) fn revert<R, A, T>(
    state: &RwLock<SlotState<R, A, T>>,
    name: &Arc<str>,
    id: Option<u64>,
) -> Result<Option<Method<R, A, T>>, PatchError> {
    let mut state = write(state);
    match state.active.take() {
        Some(active) if id.map_or(true, |id| id == active.id) => {
            state.installed = active.original.clone();
            debug!(method = %name, patch = active.id, "reverted patch");
            Ok(active.original)
        }
        Some(active) => {
            state.active = Some(active);
            Err(PatchError::Superseded {
                name: Arc::clone(name),
            })
        }
        None if id.is_some() => Err(PatchError::Superseded {
            name: Arc::clone(name),
        }),
        None => Err(PatchError::NotPatched {
            name: Arc::clone(name),
        }),
    }
}

/// A named, patchable method
///
/// Clones share the same cell: patching through one clone is visible through every other. A struct with a
/// `Slot` field per method models an object whose methods can be intercepted individually.
pub struct Slot<R, A, T> {
    /// Name of the method, used in errors and logs
    name: Arc<str>,
    /// Shared contents
    state: Arc<RwLock<SlotState<R, A, T>>>,
}

impl<R, A, T> Slot<R, A, T> {
    /// Creates a slot holding `method`
    pub fn new(name: impl Into<Arc<str>>, method: Method<R, A, T>) -> Self {
        Self::with_state(name.into(), Some(method))
    }

    /// Creates a slot that holds no method
    pub fn empty(name: impl Into<Arc<str>>) -> Self {
        Self::with_state(name.into(), None)
    }

    /// Creates a slot with nothing patched
    fn with_state(name: Arc<str>, installed: Option<Method<R, A, T>>) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(SlotState {
                installed,
                active: None,
            })),
        }
    }

    /// Name of the method
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The installed method, which is the wrapper while patched
    pub fn get(&self) -> Option<Method<R, A, T>> {
        read(&self.state).installed.clone()
    }

    /// Returns true if a patch is installed
    pub fn is_patched(&self) -> bool {
        read(&self.state).active.is_some()
    }

    /// Overwrites the slot with `method`.
    ///
    /// Any active patch is discarded without restoring its original, and its [`Patch`] handle goes stale.
    pub fn set(&self, method: Method<R, A, T>) {
        let mut state = write(&self.state);
        if let Some(active) = state.active.take() {
            debug!(method = %self.name, patch = active.id, "assignment discarded patch");
        }
        state.installed = Some(method);
    }

    /// Calls the installed method on `receiver`.
    ///
    /// The slot is not locked while the method runs, so the method may patch or unpatch this slot.
    pub fn call(&self, receiver: &R, args: A) -> Result<T, PatchError> {
        let method = self.get().ok_or_else(|| PatchError::NotCallable {
            name: Arc::clone(&self.name),
        })?;
        trace!(method = %self.name, "dispatch");
        Ok(method.call(receiver, args))
    }

    /// Reverses the active patch, restoring and returning the original it captured
    pub fn unpatch(&self) -> Result<Option<Method<R, A, T>>, PatchError> {
        revert(&self.state, &self.name, None)
    }
}

impl<R, A, T> Slot<R, A, T>
where
    R: Send + Sync + 'static,
    A: 'static,
    T: 'static,
{
    /// Installs `handler` in place of the current method.
    ///
    /// The handler receives the receiver, the original bound to that receiver, and the call's arguments.
    /// When `context` is given it is used as the receiver of every call instead of the caller's receiver.
    ///
    /// If the slot is already patched, that patch is reversed first and its original is captured instead
    /// of its wrapper, so a slot never holds more than one layer of interception.
    pub fn patch<H>(&self, handler: H, context: Option<R>) -> Patch<R, A, T>
    where
        H: for<'a> Fn(&'a R, Original<'a, R, A, T>, A) -> T + Send + Sync + 'static,
    {
        let id = NEXT_PATCH_ID.fetch_add(1, Ordering::Relaxed);
        let mut state = write(&self.state);

        let original = match state.active.take() {
            Some(active) => {
                debug!(method = %self.name, patch = active.id, "reversing patch before repatching");
                active.original
            }
            None => state.installed.clone(),
        };

        let wrapper = intercept(Arc::clone(&self.name), original.clone(), handler, context);
        state.installed = Some(wrapper.clone());
        state.active = Some(ActivePatch {
            id,
            original: original.clone(),
        });
        drop(state);

        debug!(method = %self.name, patch = id, had_original = original.is_some(), "installed patch");
        Patch::new(
            Arc::clone(&self.name),
            Arc::downgrade(&self.state),
            id,
            original,
            wrapper,
        )
    }
}

impl<R, A, T> Clone for Slot<R, A, T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R, A, T> fmt::Debug for Slot<R, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.state);
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("installed", &state.installed)
            .field("patched", &state.active.is_some())
            .finish()
    }
}
