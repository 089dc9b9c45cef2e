//! The seam between owning handles and the foreign runtime that actually
//! keeps the reference counts.
//!
//! A runtime is a zero-sized marker type. Handles are generic over it, so the
//! primitives resolve statically and a handle stays pointer-sized.
//!
//! # Invariants
//!
//! 1. `retain` and `release` are called only with identities the caller keeps
//!    alive for the duration of the call.
//! 2. `identity_eq` is true iff the two identities are the same address, and
//!    `identity_cmp` is a total order compatible with it. Hashing of handles
//!    is derived from the address, so any override must keep these
//!    relationships intact.

use std::cmp::Ordering;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Type-erased identity of a foreign object.
pub type RawObject = NonNull<c_void>;

/// Retain/release/compare primitives of a foreign reference-counted runtime.
///
/// # Safety
///
/// Implementors promise that `retain` increments and `release` decrements the
/// object's reference count exactly once per call, and that the comparison
/// functions honour the identity rules in the module docs. A retain or
/// release failure must not return normally: panic or abort instead.
pub unsafe trait ForeignRuntime: 'static {
    /// Increment the foreign reference count of `object` once.
    ///
    /// # Safety
    ///
    /// `object` must refer to a live object of this runtime.
    unsafe fn retain(object: RawObject);

    /// Decrement the foreign reference count of `object` once. The object may
    /// be destroyed before this returns.
    ///
    /// # Safety
    ///
    /// `object` must refer to a live object of this runtime, and the caller
    /// must own the reference being given up.
    unsafe fn release(object: RawObject);

    /// Identity equality. Never looks at object contents.
    #[inline]
    fn identity_eq(a: RawObject, b: RawObject) -> bool {
        a == b
    }

    /// Total order over identities, used by ordered containers only.
    #[inline]
    fn identity_cmp(a: RawObject, b: RawObject) -> Ordering {
        a.as_ptr().addr().cmp(&b.as_ptr().addr())
    }
}

/// Marker for runtimes whose primitives may be called concurrently from any
/// thread.
///
/// Handles over such a runtime are `Send` and `Sync` when the nominal object
/// type is.
///
/// # Safety
///
/// `retain` and `release` must be atomic with respect to each other across
/// threads.
pub unsafe trait ThreadSafeRuntime: ForeignRuntime {}
