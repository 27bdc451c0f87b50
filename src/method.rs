//! # Method
//!
//! Callable values stored in slots, and the bound form of an original handed to handlers

use std::fmt;
use std::sync::Arc;

use crate::error::PatchError;

/// A shareable method taking a receiver `R` and arguments `A`, returning `T`
///
/// Multiple arguments are passed as a tuple. Cloning a `Method` clones the handle, not the function,
/// so clones compare equal under [`Method::ptr_eq`].
pub struct Method<R, A, T>(Arc<dyn Fn(&R, A) -> T + Send + Sync>);

impl<R, A, T> Method<R, A, T> {
    /// Creates a new method from a function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&R, A) -> T + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the method on `receiver`
    pub fn call(&self, receiver: &R, args: A) -> T {
        (self.0)(receiver, args)
    }

    /// Returns true if both handles refer to the same function
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<R, A, T> Clone for Method<R, A, T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R, A, T> fmt::Debug for Method<R, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// The original implementation, bound to the receiver of the current call
///
/// Handed to handlers as their second argument. The original is `None` when the method was absent
/// at the time it was patched, in which case [`Original::call`] fails with [`PatchError::NotCallable`].
pub struct Original<'a, R, A, T> {
    /// Method that was installed before the patch
    method: Option<&'a Method<R, A, T>>,
    /// Receiver the original is bound to
    receiver: &'a R,
    /// Name of the patched method
    name: &'a Arc<str>,
}

impl<'a, R, A, T> Original<'a, R, A, T> {
    /// Calls the original with the bound receiver
    pub fn call(&self, args: A) -> Result<T, PatchError> {
        match self.method {
            Some(method) => Ok(method.call(self.receiver, args)),
            None => Err(PatchError::NotCallable {
                name: Arc::clone(self.name),
            }),
        }
    }

    /// Receiver the original is bound to
    pub fn receiver(&self) -> &'a R {
        self.receiver
    }

    /// The unbound original, if there was one
    pub fn method(&self) -> Option<&'a Method<R, A, T>> {
        self.method
    }

    /// Returns true if there is an original to call
    pub fn is_callable(&self) -> bool {
        self.method.is_some()
    }
}

impl<R, A, T> Clone for Original<'_, R, A, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, A, T> Copy for Original<'_, R, A, T> {}

/// Builds the wrapper installed by a patch.
///
/// The receiver is `context` when given, otherwise the receiver of each call. Both the handler and the
/// bound original see the same receiver.
pub(crate) fn intercept<R, A, T, H>(
    name: Arc<str>,
    original: Option<Method<R, A, T>>,
    handler: H,
    context: Option<R>,
) -> Method<R, A, T>
where
    R: Send + Sync + 'static,
    A: 'static,
    T: 'static,
    H: for<'a> Fn(&'a R, Original<'a, R, A, T>, A) -> T + Send + Sync + 'static,
{
    Method::new(move |receiver: &R, args: A| {
        let receiver = context.as_ref().unwrap_or(receiver);
        let original = Original {
            method: original.as_ref(),
            receiver,
            name: &name,
        };
        handler(receiver, original, args)
    })
}
