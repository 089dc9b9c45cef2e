//! Core: owning handles for objects that live in a foreign reference-counted
//! runtime.
//!
//! # Role in objref
//! `objref-core` is the leaf of the workspace. It defines the
//! [`ForeignRuntime`] seam (retain, release, identity comparison) and the
//! [`ForeignHandle`] smart handle built on it.
//!
//! # Primary responsibilities
//! - **ForeignHandle**: retain on clone, release on drop/reset, adopt on
//!   construction, identity equality, ordering, and hashing.
//! - **ForeignRuntime**: the four primitives the handle needs from the
//!   foreign object system.
//! - **ObjcRuntime** (Apple targets): binding to the Objective-C runtime.
//!
//! # How it fits in the system
//! `objref-notify` stores each notification registration token in a
//! `ForeignHandle`, so the token's lifetime follows the subscription that
//! owns it. `objref-harness` supplies a counting runtime for tests.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod handle;
pub mod runtime;

#[cfg(target_vendor = "apple")]
pub mod objc;

pub use handle::ForeignHandle;
pub use runtime::{ForeignRuntime, RawObject, ThreadSafeRuntime};

#[cfg(target_vendor = "apple")]
pub use objc::{NSObject, ObjcRuntime, ObjectPtr};
