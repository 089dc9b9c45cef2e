//! Scoped subscriptions to a foreign notification facility.
//!
//! # Role in objref
//! `objref-notify` sits on top of `objref-core`. Every registration with the
//! foreign facility yields a token object; [`EventSubscription`] keeps that
//! token in a [`ForeignHandle`](objref_core::ForeignHandle) and unregisters
//! when it is dropped or reset.
//!
//! # Primary responsibilities
//! - **NotificationFacility**: subscribe/unsubscribe primitives and the
//!   shared default center.
//! - **EventSubscription**: move-only RAII guard for one registration.
//!
//! # Example
//!
//! ```ignore
//! let sub = EventSubscription::<MyFacility>::new("DidBecomeActive", || {
//!     refresh();
//! });
//! assert!(sub.is_subscribed());
//! drop(sub); // unregistered here
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod facility;
pub mod subscription;

pub use facility::{Handler, NotificationFacility, SubscribeError};
pub use subscription::EventSubscription;
