//! Objective-C runtime binding (Apple targets only).
//!
//! `objc_retain` and `objc_release` are the entry points the compiler emits
//! under ARC; calling them by hand gives the manual retain/release discipline
//! that [`ObjectPtr`] needs.

use std::ffi::c_void;
use std::marker::{PhantomData, PhantomPinned};

use crate::handle::ForeignHandle;
use crate::runtime::{ForeignRuntime, RawObject, ThreadSafeRuntime};

#[link(name = "objc", kind = "dylib")]
unsafe extern "C" {
    fn objc_retain(object: *mut c_void) -> *mut c_void;
    fn objc_release(object: *mut c_void);
}

/// The Objective-C runtime of the current process.
#[derive(Debug)]
pub enum ObjcRuntime {}

// SAFETY: `objc_retain`/`objc_release` adjust the retain count by exactly one
// and are thread-safe. A retain that hands back another object is treated as
// fatal.
unsafe impl ForeignRuntime for ObjcRuntime {
    unsafe fn retain(object: RawObject) {
        // SAFETY: the caller guarantees `object` is a live Objective-C object.
        let retained = unsafe { objc_retain(object.as_ptr()) };
        assert_eq!(retained, object.as_ptr(), "objc_retain returned a different object");
    }

    unsafe fn release(object: RawObject) {
        // SAFETY: the caller owns the reference being released.
        unsafe { objc_release(object.as_ptr()) };
    }
}

// SAFETY: the Objective-C retain count is updated atomically.
unsafe impl ThreadSafeRuntime for ObjcRuntime {}

/// Opaque `NSObject`. Only ever used behind a pointer.
#[repr(C)]
pub struct NSObject {
    _private: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Owning pointer to an Objective-C object.
pub type ObjectPtr<T = NSObject> = ForeignHandle<T, ObjcRuntime>;
