//! # Error
//!
//! Errors raised by slots, tables and patch handles

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when dispatching through or reverting a patched method
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The method holds no callable value
    #[error("`{name}` does not hold a callable method")]
    NotCallable {
        /// Name of the method that was called
        name: Arc<str>,
    },
    /// The reverse hook was invoked on a method with no active patch
    #[error("`{name}` is not patched")]
    NotPatched {
        /// Name of the method that was unpatched
        name: Arc<str>,
    },
    /// The patch was replaced by a newer patch or an assignment, or was already reverted
    #[error("patch on `{name}` is no longer active")]
    Superseded {
        /// Name of the patched method
        name: Arc<str>,
    },
    /// The owner of the patched method no longer exists
    #[error("owner of `{name}` was dropped")]
    OwnerDropped {
        /// Name of the patched method
        name: Arc<str>,
    },
}

impl PatchError {
    /// Name of the method the error refers to
    pub fn name(&self) -> &str {
        match self {
            Self::NotCallable { name }
            | Self::NotPatched { name }
            | Self::Superseded { name }
            | Self::OwnerDropped { name } => name,
        }
    }
}
