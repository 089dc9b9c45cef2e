//! Counting foreign runtime for tests.
//!
//! [`MockRuntime`] keeps a thread-local ledger of every object it allocates:
//! current refcount, number of retain and release calls, and whether the
//! object has been deallocated. Misuse that would corrupt a real runtime
//! (retaining a dead object, releasing past zero, touching an identity the
//! runtime never allocated) panics instead.
//!
//! Object memory is never reclaimed, so identities stay unique for the life
//! of the thread and a dead object can still be inspected.
//!
//! # Usage
//!
//! ```
//! use objref_harness::runtime::MockRuntime;
//!
//! struct Thing;
//!
//! let a = MockRuntime::adopt_new::<Thing>("thing");
//! let b = a.clone();
//! assert_eq!(MockRuntime::refcount(&a), 2);
//!
//! let id = a.get().unwrap();
//! drop(a);
//! drop(b);
//! let stats = MockRuntime::stats(id);
//! assert_eq!((stats.retains, stats.releases), (1, 2));
//! assert!(stats.deallocated);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

use objref_core::{ForeignHandle, ForeignRuntime, RawObject};
use tracing::trace;

/// Ledger entry for one mock object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectStats {
    /// Current reference count.
    pub refcount: usize,
    /// Retain calls made through the runtime.
    pub retains: usize,
    /// Release calls made through the runtime.
    pub releases: usize,
    /// True once the refcount dropped to zero.
    pub deallocated: bool,
}

#[derive(Debug)]
struct Record {
    label: &'static str,
    stats: ObjectStats,
}

/// Backing allocation; gives every mock object a distinct address.
#[repr(C)]
struct MockObject {
    _serial: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    records: HashMap<usize, Record>,
    next_serial: u64,
}

thread_local! {
    static LEDGER: RefCell<Ledger> = RefCell::new(Ledger::default());
}

/// Foreign runtime double backed by a thread-local ledger.
///
/// Not a [`ThreadSafeRuntime`](objref_core::ThreadSafeRuntime): objects must
/// stay on the thread that allocated them.
#[derive(Debug)]
pub enum MockRuntime {}

impl MockRuntime {
    /// Allocate an object with refcount 1, owned by the caller.
    pub fn alloc<T>(label: &'static str) -> NonNull<T> {
        LEDGER.with(|ledger| {
            let mut ledger = ledger.borrow_mut();
            let serial = ledger.next_serial;
            ledger.next_serial += 1;
            let object = NonNull::from(Box::leak(Box::new(MockObject { _serial: serial })));
            ledger.records.insert(
                object.as_ptr().addr(),
                Record {
                    label,
                    stats: ObjectStats {
                        refcount: 1,
                        ..ObjectStats::default()
                    },
                },
            );
            trace!(label, object = ?object, "mock alloc");
            object.cast()
        })
    }

    /// Allocate an object and adopt it into a handle.
    pub fn adopt_new<T>(label: &'static str) -> ForeignHandle<T, Self> {
        // SAFETY: `alloc` hands out a live object with one reference we own.
        unsafe { ForeignHandle::from_raw(Self::alloc::<T>(label).as_ptr()) }
    }

    /// Ledger entry for `object`.
    ///
    /// # Panics
    ///
    /// Panics if the runtime never allocated `object`.
    pub fn stats<T>(object: NonNull<T>) -> ObjectStats {
        Self::with_record(object.cast(), |record| record.stats)
    }

    /// Current refcount of the object `handle` holds (0 for an empty handle).
    pub fn refcount<T>(handle: &ForeignHandle<T, Self>) -> usize {
        handle.get().map_or(0, |object| Self::stats(object).refcount)
    }

    /// Label given at allocation.
    pub fn label<T>(object: NonNull<T>) -> &'static str {
        Self::with_record(object.cast(), |record| record.label)
    }

    /// Number of allocated objects that are still alive on this thread.
    pub fn live_objects() -> usize {
        LEDGER.with(|ledger| {
            ledger
                .borrow()
                .records
                .values()
                .filter(|record| !record.stats.deallocated)
                .count()
        })
    }

    /// True once the object at `addr` has been deallocated. Unknown
    /// addresses count as dead.
    pub(crate) fn is_dead_addr(addr: usize) -> bool {
        LEDGER.with(|ledger| {
            ledger
                .borrow()
                .records
                .get(&addr)
                .is_none_or(|record| record.stats.deallocated)
        })
    }

    fn with_record<R>(object: RawObject, f: impl FnOnce(&mut Record) -> R) -> R {
        LEDGER.with(|ledger| {
            let mut ledger = ledger.borrow_mut();
            let Some(record) = ledger.records.get_mut(&object.as_ptr().addr()) else {
                panic!("{object:p} was not allocated by MockRuntime on this thread");
            };
            f(record)
        })
    }
}

// SAFETY: each call adjusts the ledger refcount by exactly one and panics on
// any misuse instead of returning.
unsafe impl ForeignRuntime for MockRuntime {
    unsafe fn retain(object: RawObject) {
        Self::with_record(object, |record| {
            assert!(
                !record.stats.deallocated,
                "retain of deallocated {} at {object:p}",
                record.label
            );
            record.stats.refcount += 1;
            record.stats.retains += 1;
        });
    }

    unsafe fn release(object: RawObject) {
        // Handles parked in other thread-locals may drop after the ledger
        // during thread teardown.
        if LEDGER.try_with(|_| ()).is_err() {
            return;
        }
        Self::with_record(object, |record| {
            assert!(
                record.stats.refcount > 0,
                "over-release of {} at {object:p}",
                record.label
            );
            record.stats.refcount -= 1;
            record.stats.releases += 1;
            if record.stats.refcount == 0 {
                record.stats.deallocated = true;
                trace!(label = record.label, object = ?object, "mock dealloc");
            }
        });
    }
}
