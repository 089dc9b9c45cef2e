//! Scoped subscription to a named event of a foreign notification facility.
//!
//! # Design
//!
//! [`EventSubscription<F>`] owns the registration token the facility hands
//! back, stored in a [`ForeignHandle`]. The handle adopts the token's
//! reference, so the token lives exactly as long as the subscription does.
//!
//! # State machine
//!
//! ```text
//!   new / new_in ──ok──▶ Subscribed ──reset / drop / take──▶ Unsubscribed
//!        │                                                        ▲
//!        └──────────────refused / no center───────────────────────┘
//! ```
//!
//! Unsubscribed never goes back to Subscribed; a new subscription is a new
//! value.
//!
//! # Failure Modes
//!
//! - **Refused registration**: logged (with the `tracing` feature) and
//!   observable only through [`EventSubscription::is_subscribed`]. An empty
//!   center or event name is refused without calling the facility.
//! - **In-flight delivery**: [`EventSubscription::reset`] does not wait for a
//!   callback the facility has already started running on another thread.

use std::fmt;

use objref_core::ForeignHandle;

use crate::facility::{Handler, NotificationFacility, SubscribeError};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// RAII registration of a callback with a notification facility.
///
/// Dropping the subscription unregisters the callback and releases the
/// registration token, in that order. There is no `Clone`: a token stands for
/// a single unregister obligation.
///
/// # Invariants
///
/// 1. [`is_subscribed`](Self::is_subscribed) is true iff the token handle is
///    non-empty iff the registration has not been undone.
/// 2. Each successful registration is unregistered exactly once.
#[must_use = "dropping an EventSubscription unsubscribes immediately"]
pub struct EventSubscription<F: NotificationFacility> {
    token: ForeignHandle<F::Token, F::Runtime>,
}

impl<F: NotificationFacility> EventSubscription<F> {
    /// A subscription that is not registered anywhere.
    pub const fn unsubscribed() -> Self {
        Self {
            token: ForeignHandle::empty(),
        }
    }

    /// Register `handler` for `name` on the facility's shared center.
    pub fn new(name: &str, handler: impl Fn() + Send + Sync + 'static) -> Self {
        let center = F::default_center();
        Self::new_in(&center, name, handler)
    }

    /// Register `handler` for `name` on `center`.
    ///
    /// If the facility declines, the result is unsubscribed.
    pub fn new_in(
        center: &ForeignHandle<F::Center, F::Runtime>,
        name: &str,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        match Self::register(center, name, Box::new(handler)) {
            Ok(subscription) => subscription,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(event = name, error = %_err, "notification registration failed");
                Self::unsubscribed()
            }
        }
    }

    fn register(
        center: &ForeignHandle<F::Center, F::Runtime>,
        name: &str,
        handler: Handler,
    ) -> Result<Self, SubscribeError> {
        if !center.is_valid() {
            return Err(SubscribeError::NoCenter);
        }
        if name.is_empty() {
            return Err(SubscribeError::EmptyName);
        }
        let token = F::subscribe(center, name, handler)?;
        #[cfg(feature = "tracing")]
        debug!(event = name, token = ?token, "subscribed");
        // SAFETY: the facility contract hands us one reference to a live
        // token; the handle adopts it.
        let token = unsafe { ForeignHandle::from_raw(token.as_ptr()) };
        Ok(Self { token })
    }

    /// True while the registration is active.
    #[inline]
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.token.is_valid()
    }

    /// Unregister (if subscribed) and release the token. Idempotent.
    pub fn reset(&mut self) {
        let token = self.token.take();
        if let Some(raw) = token.get() {
            #[cfg(feature = "tracing")]
            debug!(token = ?raw, "unsubscribing");
            // SAFETY: `token` still owns its reference, so the token is alive,
            // and it has not been unregistered yet (it was non-empty).
            unsafe { F::unsubscribe(raw) };
        }
        drop(token);
    }

    /// Move the registration out, leaving this subscription unsubscribed.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Exchange registrations with `other`.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        self.token.swap(&mut other.token);
    }
}

impl<F: NotificationFacility> Drop for EventSubscription<F> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<F: NotificationFacility> Default for EventSubscription<F> {
    fn default() -> Self {
        Self::unsubscribed()
    }
}

impl<F: NotificationFacility> fmt::Debug for EventSubscription<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("subscribed", &self.is_subscribed())
            .field("token", &self.token.as_ptr())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use objref_core::{ForeignRuntime, RawObject};
    use std::cell::Cell;
    use std::ptr::{self, NonNull};

    thread_local! {
        static SUBSCRIBE_CALLS: Cell<usize> = const { Cell::new(0) };
        static UNSUBSCRIBE_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    enum Inert {}

    // SAFETY: nothing is reference counted; identities are static slots.
    unsafe impl ForeignRuntime for Inert {
        unsafe fn retain(_object: RawObject) {}
        unsafe fn release(_object: RawObject) {}
    }

    /// Facility that has no shared center and refuses every registration.
    enum Refusing {}

    // SAFETY: never hands out a token.
    unsafe impl NotificationFacility for Refusing {
        type Runtime = Inert;
        type Center = u64;
        type Token = u64;

        fn default_center() -> ForeignHandle<u64, Inert> {
            ForeignHandle::empty()
        }

        fn subscribe(
            _center: &ForeignHandle<u64, Inert>,
            name: &str,
            _handler: Handler,
        ) -> Result<NonNull<u64>, SubscribeError> {
            SUBSCRIBE_CALLS.with(|c| c.set(c.get() + 1));
            Err(SubscribeError::Refused {
                name: name.to_string(),
            })
        }

        unsafe fn unsubscribe(_token: NonNull<u64>) {
            UNSUBSCRIBE_CALLS.with(|c| c.set(c.get() + 1));
        }
    }

    static CENTER: u64 = 0;

    fn center() -> ForeignHandle<u64, Inert> {
        // SAFETY: the inert runtime never dereferences identities.
        unsafe { ForeignHandle::from_raw(ptr::from_ref(&CENTER).cast_mut()) }
    }

    #[test]
    fn default_is_unsubscribed() {
        let mut sub = EventSubscription::<Refusing>::default();
        assert!(!sub.is_subscribed());
        sub.reset();
        sub.reset();
        assert!(!sub.is_subscribed());
        drop(sub);
        assert_eq!(UNSUBSCRIBE_CALLS.with(Cell::get), 0);
    }

    #[test]
    fn missing_default_center_skips_facility() {
        let sub = EventSubscription::<Refusing>::new("E", || {});
        assert!(!sub.is_subscribed());
        assert_eq!(SUBSCRIBE_CALLS.with(Cell::get), 0);
    }

    #[test]
    fn refused_registration_stays_unsubscribed() {
        let center = center();
        let sub = EventSubscription::<Refusing>::new_in(&center, "E", || {});
        assert!(!sub.is_subscribed());
        assert_eq!(SUBSCRIBE_CALLS.with(Cell::get), 1);
        drop(sub);
        assert_eq!(UNSUBSCRIBE_CALLS.with(Cell::get), 0);
    }

    #[test]
    fn empty_name_never_reaches_facility() {
        let center = center();
        let sub = EventSubscription::<Refusing>::new_in(&center, "", || {});
        assert!(!sub.is_subscribed());
        assert_eq!(SUBSCRIBE_CALLS.with(Cell::get), 0);
        assert_eq!(
            EventSubscription::<Refusing>::register(&center, "", Box::new(|| {})).err(),
            Some(SubscribeError::EmptyName)
        );
    }

    #[test]
    fn debug_format() {
        let sub = EventSubscription::<Refusing>::unsubscribed();
        let dbg = format!("{sub:?}");
        assert!(dbg.contains("EventSubscription"));
        assert!(dbg.contains("subscribed: false"));
    }
}
