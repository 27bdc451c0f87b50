#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod error;
pub mod method;
pub mod patch;
pub mod slot;
pub mod table;

pub use error::PatchError;
pub use method::{Method, Original};
pub use patch::{Patch, PatchGuard, ScopedPatch};
pub use slot::Slot;
pub use table::{monkeypatch, MethodTable};
