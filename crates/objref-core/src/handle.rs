//! Owning handle to a foreign reference-counted object.
//!
//! # Design
//!
//! [`ForeignHandle<T, R>`] holds at most one identity and owns exactly one
//! foreign reference to it. Rust ownership maps onto the foreign
//! retain/release protocol directly:
//!
//! | Rust operation       | Foreign traffic                   |
//! |----------------------|-----------------------------------|
//! | [`from_raw`]         | none (adopts the caller's +1)     |
//! | `clone()`            | one retain                        |
//! | move / [`take`]      | none                              |
//! | [`swap`]             | none                              |
//! | [`reset`] / drop     | one release                       |
//! | [`into_raw`]         | none (hands the +1 back)          |
//!
//! Equality, ordering, and hashing work on identities (addresses) and never
//! touch the referenced object.
//!
//! # Failure Modes
//!
//! - **Empty handle**: every accessor is well defined (`None`, null, `false`).
//! - **Runtime failure**: a failing retain or release is fatal inside the
//!   runtime implementation; the handle never sees a half-updated identity.
//!
//! [`from_raw`]: ForeignHandle::from_raw
//! [`take`]: ForeignHandle::take
//! [`swap`]: ForeignHandle::swap
//! [`reset`]: ForeignHandle::reset
//! [`into_raw`]: ForeignHandle::into_raw

use std::cmp::Ordering;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use crate::runtime::{ForeignRuntime, RawObject, ThreadSafeRuntime};

#[cfg(feature = "tracing")]
use tracing::trace;

/// Owning, identity-compared handle to a foreign object of nominal type `T`
/// living in runtime `R`.
///
/// # Invariants
///
/// 1. A non-empty handle owns exactly one foreign reference to its identity.
/// 2. That reference is released exactly once: on drop, [`reset`], or when
///    the handle is overwritten.
/// 3. Two handles compare equal iff they hold the same identity (both empty
///    counts as the same).
///
/// [`reset`]: ForeignHandle::reset
pub struct ForeignHandle<T, R: ForeignRuntime> {
    object: Option<NonNull<T>>,
    _runtime: PhantomData<fn() -> R>,
}

impl<T, R: ForeignRuntime> ForeignHandle<T, R> {
    /// An empty handle. Owns nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            object: None,
            _runtime: PhantomData,
        }
    }

    /// Adopt a reference the caller already owns. No retain is performed.
    ///
    /// A null pointer yields an empty handle.
    ///
    /// # Safety
    ///
    /// If `ptr` is non-null it must point to a live object of runtime `R`,
    /// and the caller must own one reference to it which is transferred to
    /// the returned handle.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let object = NonNull::new(ptr);
        #[cfg(feature = "tracing")]
        if let Some(object) = object {
            trace!(object = ?object, ty = std::any::type_name::<T>(), "adopt");
        }
        Self {
            object,
            _runtime: PhantomData,
        }
    }

    /// Retain `ptr` and hold the new reference. Use this for borrowed
    /// references the caller does not own.
    ///
    /// # Safety
    ///
    /// If `ptr` is non-null it must point to a live object of runtime `R`.
    #[must_use]
    pub unsafe fn retain_raw(ptr: *mut T) -> Self {
        if let Some(object) = NonNull::new(ptr) {
            // SAFETY: the caller guarantees the object is alive.
            unsafe { retain::<T, R>(object) };
        }
        // SAFETY: the retain above produced the reference being adopted.
        unsafe { Self::from_raw(ptr) }
    }

    /// The held identity, non-owning. Valid while this handle keeps it.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.object
    }

    /// The held identity as a raw pointer, null when empty.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.object.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// True when the handle holds an identity.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.object.is_some()
    }

    /// Release the held reference (if any) and become empty.
    pub fn reset(&mut self) {
        if let Some(object) = self.object.take() {
            // SAFETY: this handle owned the reference until the `take` above.
            unsafe { release::<T, R>(object) };
        }
    }

    /// Release the held reference (if any) and adopt `ptr` instead, without
    /// retaining it.
    ///
    /// # Safety
    ///
    /// Same contract as [`ForeignHandle::from_raw`].
    pub unsafe fn reset_to(&mut self, ptr: *mut T) {
        // SAFETY: forwarded from the caller.
        let mut next = unsafe { Self::from_raw(ptr) };
        self.swap(&mut next);
    }

    /// Move the held identity out, leaving this handle empty. No refcount
    /// traffic.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Exchange identities with `other`. No refcount traffic.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.object, &mut other.object);
    }

    /// Give up ownership without releasing. The caller becomes responsible
    /// for the reference this handle owned. Returns null when empty.
    #[must_use]
    pub fn into_raw(self) -> *mut T {
        let this = ManuallyDrop::new(self);
        this.as_ptr()
    }

    /// Hash of the identity. Stable for the lifetime of the handle and equal
    /// for equal handles.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    fn raw(&self) -> Option<RawObject> {
        self.object.map(NonNull::cast)
    }

    #[inline]
    fn address(&self) -> usize {
        self.as_ptr().addr()
    }
}

/// # Safety
///
/// `object` must be alive.
unsafe fn retain<T, R: ForeignRuntime>(object: NonNull<T>) {
    #[cfg(feature = "tracing")]
    trace!(object = ?object, ty = std::any::type_name::<T>(), "retain");
    // SAFETY: forwarded from the caller.
    unsafe { R::retain(object.cast()) };
}

/// # Safety
///
/// `object` must be alive and the caller must own the released reference.
unsafe fn release<T, R: ForeignRuntime>(object: NonNull<T>) {
    #[cfg(feature = "tracing")]
    trace!(object = ?object, ty = std::any::type_name::<T>(), "release");
    // SAFETY: forwarded from the caller.
    unsafe { R::release(object.cast()) };
}

impl<T, R: ForeignRuntime> Clone for ForeignHandle<T, R> {
    fn clone(&self) -> Self {
        if let Some(object) = self.object {
            // SAFETY: `self` owns a reference, so the object is alive.
            unsafe { retain::<T, R>(object) };
        }
        Self {
            object: self.object,
            _runtime: PhantomData,
        }
    }
}

impl<T, R: ForeignRuntime> Drop for ForeignHandle<T, R> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T, R: ForeignRuntime> Default for ForeignHandle<T, R> {
    fn default() -> Self {
        Self::empty()
    }
}

fn identity_order<R: ForeignRuntime>(a: Option<RawObject>, b: Option<RawObject>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => R::identity_cmp(a, b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

impl<T, U, R: ForeignRuntime> PartialEq<ForeignHandle<U, R>> for ForeignHandle<T, R> {
    fn eq(&self, other: &ForeignHandle<U, R>) -> bool {
        match (self.raw(), other.raw()) {
            (Some(a), Some(b)) => R::identity_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T, R: ForeignRuntime> Eq for ForeignHandle<T, R> {}

impl<T, U, R: ForeignRuntime> PartialOrd<ForeignHandle<U, R>> for ForeignHandle<T, R> {
    fn partial_cmp(&self, other: &ForeignHandle<U, R>) -> Option<Ordering> {
        Some(identity_order::<R>(self.raw(), other.raw()))
    }
}

impl<T, R: ForeignRuntime> Ord for ForeignHandle<T, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        identity_order::<R>(self.raw(), other.raw())
    }
}

impl<T, R: ForeignRuntime> Hash for ForeignHandle<T, R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.address());
    }
}

impl<T, R: ForeignRuntime> fmt::Debug for ForeignHandle<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHandle")
            .field("type", &std::any::type_name::<T>())
            .field("object", &self.as_ptr())
            .finish()
    }
}

impl<T, R: ForeignRuntime> fmt::Pointer for ForeignHandle<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

// SAFETY: the handle only ever touches the identity through `R`, whose
// primitives are callable from any thread. Sending or sharing the handle
// shares the object itself, hence the bounds on `T`.
unsafe impl<T: Send + Sync, R: ThreadSafeRuntime> Send for ForeignHandle<T, R> {}

// SAFETY: `&ForeignHandle` only allows `clone`, which retains through a
// thread-safe runtime.
unsafe impl<T: Send + Sync, R: ThreadSafeRuntime> Sync for ForeignHandle<T, R> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::{BTreeSet, HashSet};

    thread_local! {
        static RETAINS: Cell<usize> = const { Cell::new(0) };
        static RELEASES: Cell<usize> = const { Cell::new(0) };
    }

    /// Counts calls; never dereferences the identities it is handed.
    enum Counting {}

    // SAFETY: counts only, no real objects behind the identities.
    unsafe impl ForeignRuntime for Counting {
        unsafe fn retain(_object: RawObject) {
            RETAINS.with(|c| c.set(c.get() + 1));
        }

        unsafe fn release(_object: RawObject) {
            RELEASES.with(|c| c.set(c.get() + 1));
        }
    }

    struct Probe;

    static SLOTS: [u64; 4] = [0; 4];

    fn identity(index: usize) -> *mut Probe {
        ptr::from_ref(&SLOTS[index]).cast_mut().cast()
    }

    fn adopt(index: usize) -> ForeignHandle<Probe, Counting> {
        // SAFETY: the counting runtime never dereferences identities.
        unsafe { ForeignHandle::from_raw(identity(index)) }
    }

    fn counts() -> (usize, usize) {
        (RETAINS.with(Cell::get), RELEASES.with(Cell::get))
    }

    fn reset_counts() {
        RETAINS.with(|c| c.set(0));
        RELEASES.with(|c| c.set(0));
    }

    #[test]
    fn empty_handle_is_inert() {
        reset_counts();
        let mut h: ForeignHandle<Probe, Counting> = ForeignHandle::empty();
        assert!(!h.is_valid());
        assert!(h.get().is_none());
        assert!(h.as_ptr().is_null());
        h.reset();
        h.reset();
        drop(h);
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn null_pointer_adopts_to_empty() {
        // SAFETY: null is always accepted.
        let h: ForeignHandle<Probe, Counting> = unsafe { ForeignHandle::from_raw(ptr::null_mut()) };
        assert!(!h.is_valid());
        assert_eq!(h, ForeignHandle::<Probe, Counting>::default());
    }

    #[test]
    fn adopt_then_drop_releases_once() {
        reset_counts();
        let h = adopt(0);
        assert!(h.is_valid());
        assert_eq!(h.as_ptr(), identity(0));
        drop(h);
        assert_eq!(counts(), (0, 1));
    }

    #[test]
    fn clone_retains_once() {
        reset_counts();
        let a = adopt(0);
        let b = a.clone();
        assert_eq!(counts(), (1, 0));
        assert_eq!(a, b);
        drop(a);
        drop(b);
        assert_eq!(counts(), (1, 2));
    }

    #[test]
    fn clone_from_releases_previous_identity() {
        reset_counts();
        let a = adopt(0);
        let mut b = adopt(1);
        b.clone_from(&a);
        assert_eq!(counts(), (1, 1));
        assert_eq!(b.as_ptr(), identity(0));
    }

    #[test]
    fn take_moves_without_traffic() {
        reset_counts();
        let mut a = adopt(2);
        let b = a.take();
        assert_eq!(counts(), (0, 0));
        assert!(!a.is_valid());
        assert_ne!(a, b);
        assert_eq!(b.as_ptr(), identity(2));
    }

    #[test]
    fn reset_to_releases_old_and_adopts_new() {
        reset_counts();
        let mut h = adopt(0);
        // SAFETY: the counting runtime never dereferences identities.
        unsafe { h.reset_to(identity(1)) };
        assert_eq!(counts(), (0, 1));
        assert_eq!(h.as_ptr(), identity(1));
    }

    #[test]
    fn swap_twice_restores() {
        reset_counts();
        let mut a = adopt(0);
        let mut b = adopt(1);
        a.swap(&mut b);
        assert_eq!(a.as_ptr(), identity(1));
        assert_eq!(b.as_ptr(), identity(0));
        a.swap(&mut b);
        assert_eq!(a.as_ptr(), identity(0));
        assert_eq!(b.as_ptr(), identity(1));
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn into_raw_skips_release() {
        reset_counts();
        let raw = adopt(3).into_raw();
        assert_eq!(raw, identity(3));
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn retain_raw_retains_once() {
        reset_counts();
        // SAFETY: the counting runtime never dereferences identities.
        let h: ForeignHandle<Probe, Counting> = unsafe { ForeignHandle::retain_raw(identity(1)) };
        assert_eq!(counts(), (1, 0));
        drop(h);
        assert_eq!(counts(), (1, 1));
    }

    #[test]
    fn empty_sorts_before_everything() {
        let empty: ForeignHandle<Probe, Counting> = ForeignHandle::empty();
        let a = adopt(0);
        assert!(empty < a);
        assert_eq!(empty.cmp(&empty), Ordering::Equal);
    }

    #[test]
    fn address_order_and_containers() {
        let handles: Vec<_> = (0..4).rev().map(adopt).collect();
        let ordered: BTreeSet<_> = handles.iter().cloned().collect();
        let addresses: Vec<_> = ordered.iter().map(ForeignHandle::as_ptr).collect();
        let expected: Vec<_> = (0..4).map(identity).collect();
        assert_eq!(addresses, expected);

        let hashed: HashSet<_> = handles.iter().cloned().chain(handles.iter().cloned()).collect();
        assert_eq!(hashed.len(), 4);
    }

    #[test]
    fn equality_across_nominal_types() {
        struct Other;
        let a = adopt(0);
        // SAFETY: the counting runtime never dereferences identities.
        let b: ForeignHandle<Other, Counting> = unsafe { ForeignHandle::retain_raw(identity(0).cast()) };
        assert!(a == b);
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
    }

    #[test]
    fn hash_is_stable_and_identity_based() {
        let a = adopt(0);
        let b = a.clone();
        assert_eq!(a.compute_hash(), a.compute_hash());
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn debug_format() {
        let a = adopt(0);
        let dbg = format!("{a:?}");
        assert!(dbg.contains("ForeignHandle"));
        assert!(dbg.contains("Probe"));
        assert_eq!(format!("{a:p}"), format!("{:p}", identity(0)));
    }
}
