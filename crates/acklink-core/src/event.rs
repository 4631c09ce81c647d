//! Publish/subscribe bus
//!
//! A typed registry of handlers keyed by [`SubscriptionToken`]. Publishing
//! invokes every handler synchronously, in subscription order, on the
//! publishing thread. There is no queueing: a handler subscribed after a
//! publish never sees that value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identifies one subscription on one bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Synchronous event bus for values of type `E`
pub struct EventBus<E> {
    handlers: RwLock<Vec<(SubscriptionToken, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<(SubscriptionToken, Handler<E>)>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(SubscriptionToken, Handler<E>)>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a handler, returning the token that removes it
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push((token, Arc::new(handler)));
        token
    }

    /// Deliver `value` to every handler.
    ///
    /// Handlers run without the registry lock held, so they may subscribe or
    /// unsubscribe freely.
    pub fn publish(&self, value: E) {
        let handlers: Vec<Handler<E>> = self.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            handler(&value);
        }
    }

    /// Remove a subscription. Unknown tokens are ignored.
    ///
    /// Returns `true` if a handler was removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.write();
        let before = handlers.len();
        handlers.retain(|(t, _)| *t != token);
        handlers.len() != before
    }

    /// Remove every subscription
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
