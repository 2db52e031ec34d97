//! Subscriber callbacks and the ordered registries that hold them.
//!
//! A [`ChangeHandler`] packages a callback together with an identity: clones
//! of one handler compare equal, while two handlers built from identical
//! closures do not. Hubs use that identity for duplicate suppression on
//! subscribe and for removal on unsubscribe, so a caller can hold a clone and
//! later unsubscribe the exact callback it registered.
//!
//! # Example
//!
//! ```
//! use horizon_netwatch::ChangeHandler;
//!
//! let handler: ChangeHandler<u32> = ChangeHandler::new(|value| {
//!     println!("observed {value}");
//! });
//! let same = handler.clone();
//! let other: ChangeHandler<u32> = ChangeHandler::new(|_| {});
//!
//! assert_eq!(handler, same);
//! assert_ne!(handler, other);
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::Span;

/// A shareable subscriber callback for events of type `E`.
///
/// Identity follows the underlying allocation: [`Clone`] produces a handler
/// that is `==` to the original, which is what hubs compare on subscribe and
/// unsubscribe.
pub struct ChangeHandler<E: 'static> {
    callback: Arc<dyn Fn(&E) + Send + Sync>,
}

impl<E: 'static> ChangeHandler<E> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invokes the callback with `event`.
    pub fn invoke(&self, event: &E) {
        (self.callback)(event);
    }

    fn key(&self) -> *const () {
        Arc::as_ptr(&self.callback) as *const ()
    }
}

impl<E: 'static> Clone for ChangeHandler<E> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<E: 'static> PartialEq for ChangeHandler<E> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.key(), other.key())
    }
}

impl<E: 'static> Eq for ChangeHandler<E> {}

impl<E: 'static> fmt::Debug for ChangeHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChangeHandler").field(&self.key()).finish()
    }
}

/// A registered handler plus the tracing span captured at subscribe time.
///
/// Delivery re-enters the captured span so a subscriber's callback logs in
/// the context it was registered from, not in whatever context the engine's
/// worker thread happens to carry.
pub(crate) struct Subscription<E: 'static> {
    handler: ChangeHandler<E>,
    span: Option<Span>,
}

impl<E: 'static> Subscription<E> {
    pub(crate) fn deliver(&self, event: &E) {
        match &self.span {
            Some(span) => span.in_scope(|| self.handler.invoke(event)),
            None => self.handler.invoke(event),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_span(&self) -> bool {
        self.span.is_some()
    }
}

impl<E: 'static> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            span: self.span.clone(),
        }
    }
}

/// Ordered set of subscriptions with identity-based duplicate suppression.
///
/// Insertion order is delivery order. The set itself is not synchronized;
/// hubs keep it behind their own mutex.
pub(crate) struct SubscriberSet<E: 'static> {
    entries: Vec<Subscription<E>>,
}

impl<E: 'static> SubscriberSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds `handler` unless an identical handler is already registered.
    ///
    /// When `capture_span` is set, the current tracing span is stored with
    /// the subscription and re-entered for every delivery.
    pub(crate) fn add(&mut self, handler: ChangeHandler<E>, capture_span: bool) -> bool {
        if self.entries.iter().any(|s| s.handler == handler) {
            tracing::trace!(
                target: "horizon_netwatch::subscriber",
                handler = ?handler,
                "duplicate subscribe suppressed"
            );
            return false;
        }
        let span = capture_span.then(Span::current);
        self.entries.push(Subscription { handler, span });
        true
    }

    /// Removes the subscription whose handler is identical to `handler`.
    pub(crate) fn remove(&mut self, handler: &ChangeHandler<E>) -> bool {
        match self.entries.iter().position(|s| s.handler == *handler) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Clones the current subscriptions for delivery outside any lock.
    pub(crate) fn snapshot(&self) -> Vec<Subscription<E>> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: 'static> Default for SubscriberSet<E> {
    fn default() -> Self {
        Self::new()
    }
}
