//! In-thread notification facility double.
//!
//! [`MockNotifications`] implements
//! [`NotificationFacility`](objref_notify::NotificationFacility) on top of
//! [`MockRuntime`]: centers and tokens are ledger objects, so tests can check
//! both the registration bookkeeping and the token refcounts.
//!
//! # Overview
//!
//! - [`MockCenter`] owns a center object and lets tests post events, refuse
//!   event names, and read call counters.
//! - Posting invokes every live handler for the name in registration order.
//!   Handlers run outside any internal borrow, so they may subscribe or reset
//!   subscriptions re-entrantly.
//! - The shared default center is per thread. [`with_default_center`] and
//!   [`push_default_center`] scope an override with an RAII guard, restoring
//!   the previous default even on panic.
//!
//! # Failure Modes
//!
//! | Mode | Condition | Behavior |
//! |------|-----------|----------|
//! | Double unsubscribe | Same token unregistered twice | Panics |
//! | Unknown center | Center not created through `MockCenter` | `SubscribeError::NoCenter` |
//! | Refused name | `MockCenter::refuse(name)` | `SubscribeError::Refused` |

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::Arc;

use objref_core::ForeignHandle;
use objref_notify::{EventSubscription, Handler, NotificationFacility, SubscribeError};
use tracing::debug;

use crate::runtime::{MockRuntime, ObjectStats};

/// Nominal type of mock center objects.
#[repr(C)]
pub struct CenterObject {
    _private: [u8; 0],
}

/// Nominal type of mock registration tokens.
#[repr(C)]
pub struct TokenObject {
    _private: [u8; 0],
}

/// Subscription against the mock facility.
pub type MockSubscription = EventSubscription<MockNotifications>;

type SharedHandler = Arc<dyn Fn() + Send + Sync + 'static>;

struct Observer {
    token: usize,
    name: String,
    handler: SharedHandler,
}

#[derive(Default)]
struct CenterState {
    observers: Vec<Observer>,
    refused: HashSet<String>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    /// Token ledger entries as seen on entry to each unsubscribe.
    unsubscribed_tokens: Vec<ObjectStats>,
}

#[derive(Default)]
struct Registry {
    centers: HashMap<usize, CenterState>,
    /// Token address to owning center address, for live registrations.
    tokens: HashMap<usize, usize>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
    /// Stack of default-center overrides; the bottom entry is the lazily
    /// created base center.
    static DEFAULT_STACK: RefCell<Vec<MockCenter>> = const { RefCell::new(Vec::new()) };
}

/// Owning handle to a mock notification center.
///
/// Cloning shares the same center (and retains it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCenter {
    handle: ForeignHandle<CenterObject, MockRuntime>,
}

impl MockCenter {
    /// Create a fresh center with no observers.
    #[must_use]
    pub fn new() -> Self {
        let handle = MockRuntime::adopt_new::<CenterObject>("center");
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            registry
                .centers
                .retain(|&addr, _| !MockRuntime::is_dead_addr(addr));
            registry
                .centers
                .insert(handle.as_ptr().addr(), CenterState::default());
        });
        Self { handle }
    }

    /// The current default center for this thread.
    #[must_use]
    pub fn shared() -> Self {
        DEFAULT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.is_empty() {
                stack.push(Self::new());
            }
            stack.last().cloned().unwrap_or_default()
        })
    }

    /// Handle to pass to [`EventSubscription::new_in`].
    #[must_use]
    pub fn handle(&self) -> &ForeignHandle<CenterObject, MockRuntime> {
        &self.handle
    }

    /// Subscribe `handler` to `name` on this center.
    pub fn subscribe(&self, name: &str, handler: impl Fn() + Send + Sync + 'static) -> MockSubscription {
        EventSubscription::new_in(&self.handle, name, handler)
    }

    /// Fire `name`, invoking every handler registered for it in registration
    /// order. Returns the number of handlers invoked.
    pub fn post(&self, name: &str) -> usize {
        let handlers: Vec<SharedHandler> = self.with_state(|state| {
            state
                .observers
                .iter()
                .filter(|observer| observer.name == name)
                .map(|observer| Arc::clone(&observer.handler))
                .collect()
        });
        debug!(event = name, observers = handlers.len(), "mock post");
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    /// Make future registrations for `name` fail.
    pub fn refuse(&self, name: &str) {
        self.with_state(|state| {
            state.refused.insert(name.to_string());
        });
    }

    /// Live registrations for `name`.
    #[must_use]
    pub fn observer_count(&self, name: &str) -> usize {
        self.with_state(|state| {
            state
                .observers
                .iter()
                .filter(|observer| observer.name == name)
                .count()
        })
    }

    /// Live registrations for any name.
    #[must_use]
    pub fn total_observers(&self) -> usize {
        self.with_state(|state| state.observers.len())
    }

    /// Subscribe calls received, refused ones included.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.with_state(|state| state.subscribe_calls)
    }

    /// Unsubscribe calls received.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> usize {
        self.with_state(|state| state.unsubscribe_calls)
    }

    /// Token ledger entries captured when each unsubscribe began, in call
    /// order.
    #[must_use]
    pub fn token_stats_at_unsubscribe(&self) -> Vec<ObjectStats> {
        self.with_state(|state| state.unsubscribed_tokens.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CenterState) -> R) -> R {
        let addr = self.handle.as_ptr().addr();
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let Some(state) = registry.centers.get_mut(&addr) else {
                panic!("mock center {addr:#x} is not registered on this thread");
            };
            f(state)
        })
    }
}

impl Default for MockCenter {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard restoring the previous default center when dropped.
///
/// Do not leak this guard: the override would persist until thread exit.
#[must_use]
pub struct DefaultCenterGuard {
    /// Thread-local data: keep the guard on its thread.
    _marker: std::marker::PhantomData<*const ()>,
}

impl Drop for DefaultCenterGuard {
    fn drop(&mut self) {
        DEFAULT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Make `center` the default for this thread until the guard drops.
pub fn push_default_center(center: &MockCenter) -> DefaultCenterGuard {
    DEFAULT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.is_empty() {
            stack.push(MockCenter::new());
        }
        stack.push(center.clone());
    });
    DefaultCenterGuard {
        _marker: std::marker::PhantomData,
    }
}

/// Run `f` with `center` as this thread's default center.
pub fn with_default_center<F, R>(center: &MockCenter, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = push_default_center(center);
    f()
}

/// Notification facility double backed by [`MockRuntime`].
#[derive(Debug)]
pub enum MockNotifications {}

// SAFETY: tokens come from `MockRuntime::alloc` with one reference handed to
// the caller, and stay registered until `unsubscribe`.
unsafe impl NotificationFacility for MockNotifications {
    type Runtime = MockRuntime;
    type Center = CenterObject;
    type Token = TokenObject;

    fn default_center() -> ForeignHandle<CenterObject, MockRuntime> {
        MockCenter::shared().handle.clone()
    }

    fn subscribe(
        center: &ForeignHandle<CenterObject, MockRuntime>,
        name: &str,
        handler: Handler,
    ) -> Result<NonNull<TokenObject>, SubscribeError> {
        let center_addr = center.as_ptr().addr();
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let state = registry
                .centers
                .get_mut(&center_addr)
                .ok_or(SubscribeError::NoCenter)?;
            state.subscribe_calls += 1;
            if state.refused.contains(name) {
                return Err(SubscribeError::Refused {
                    name: name.to_string(),
                });
            }
            let token = MockRuntime::alloc::<TokenObject>("token");
            state.observers.push(Observer {
                token: token.as_ptr().addr(),
                name: name.to_string(),
                handler: Arc::from(handler),
            });
            registry.tokens.insert(token.as_ptr().addr(), center_addr);
            Ok(token)
        })
    }

    unsafe fn unsubscribe(token: NonNull<TokenObject>) {
        let token_addr = token.as_ptr().addr();
        let stats = MockRuntime::stats(token);
        assert!(
            !stats.deallocated,
            "unsubscribe of released {} at {token:p}",
            MockRuntime::label(token)
        );
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let Some(center_addr) = registry.tokens.remove(&token_addr) else {
                panic!("unsubscribe of unknown or already unsubscribed token {token:p}");
            };
            if let Some(state) = registry.centers.get_mut(&center_addr) {
                state.observers.retain(|observer| observer.token != token_addr);
                state.unsubscribe_calls += 1;
                state.unsubscribed_tokens.push(stats);
            }
        });
    }
}
