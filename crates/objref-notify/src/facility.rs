//! The seam between scoped subscriptions and the foreign notification
//! facility that delivers events.

use std::fmt;
use std::ptr::NonNull;

use objref_core::{ForeignHandle, ForeignRuntime};

/// Callback registered for an event. Takes no arguments: any payload the
/// facility carries is dropped at this layer.
///
/// The facility may call it from any thread, hence `Send + Sync`.
pub type Handler = Box<dyn Fn() + Send + Sync + 'static>;

/// Why the facility declined a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// The center handle was empty (no shared center in this process).
    NoCenter,
    /// The event name was empty.
    EmptyName,
    /// The facility refused to register a handler for this event name.
    Refused { name: String },
}

impl fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCenter => write!(f, "no notification center available"),
            Self::EmptyName => write!(f, "event name is empty"),
            Self::Refused { name } => write!(f, "registration refused for event {name:?}"),
        }
    }
}

impl std::error::Error for SubscribeError {}

/// Subscribe/unsubscribe primitives of a foreign notification facility.
///
/// Centers and tokens are foreign objects of [`Self::Runtime`], so their
/// lifetimes follow the same retain/release protocol as any other
/// [`ForeignHandle`].
///
/// # Safety
///
/// A token returned by [`subscribe`](Self::subscribe) must be a live object
/// of `Self::Runtime` carrying one reference owned by the caller, and must
/// stay registered until [`unsubscribe`](Self::unsubscribe) is called with
/// it.
pub unsafe trait NotificationFacility: 'static {
    /// Runtime owning centers and tokens.
    type Runtime: ForeignRuntime;
    /// Nominal type of a notification center.
    type Center;
    /// Nominal type of a per-registration token.
    type Token;

    /// The process-wide shared center. Empty when the process has none.
    fn default_center() -> ForeignHandle<Self::Center, Self::Runtime>;

    /// Register `handler` for `name` on `center`.
    ///
    /// `center` is never empty and `name` is never empty when called from
    /// [`EventSubscription`](crate::EventSubscription).
    fn subscribe(
        center: &ForeignHandle<Self::Center, Self::Runtime>,
        name: &str,
        handler: Handler,
    ) -> Result<NonNull<Self::Token>, SubscribeError>;

    /// Undo the registration `token` stands for. After this returns the
    /// handler is not invoked for new events; a delivery already in progress
    /// may still complete.
    ///
    /// # Safety
    ///
    /// `token` must be alive and still registered.
    unsafe fn unsubscribe(token: NonNull<Self::Token>);
}
