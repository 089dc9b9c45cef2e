//! Test doubles for the objref seams.
//!
//! # Role in objref
//! `objref-harness` is a dev-dependency of the other crates' integration
//! tests. It stands in for the foreign runtime and the foreign notification
//! facility, recording every call so tests can assert exact
//! retain/release/unsubscribe counts.
//!
//! # Primary responsibilities
//! - **MockRuntime**: thread-local refcount ledger.
//! - **MockNotifications / MockCenter**: in-thread notification center with
//!   post, refuse, and call counters; per-thread default center overrides.
//! - **Logging**: `tracing-subscriber` setup driven by `OBJREF_LOG`.

pub mod center;
pub mod logging;
pub mod runtime;

pub use center::{
    CenterObject, DefaultCenterGuard, MockCenter, MockNotifications, MockSubscription, TokenObject,
    push_default_center, with_default_center,
};
pub use logging::{LogConfig, init_test_logging};
pub use runtime::{MockRuntime, ObjectStats};
