//! Workspace facade crate.
//!
//! Re-exports the service facade so host applications can depend on a single
//! crate and pick the bridge set through features (`desktop-shims` wires the
//! desktop adapters from `bridge-desktop`).

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
