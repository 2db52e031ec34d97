//! The network availability hub.
//!
//! An [`AvailabilityChangeHub`] turns raw address-set churn into a debounced
//! boolean: is any non-loopback interface up with an address assigned. It
//! owns no native watch of its own; instead it registers one internal relay
//! handler with an [`AddressChangeHub`] while it has subscribers, probes the
//! interface table on every relayed change, and notifies only when the
//! boolean actually flips.
//!
//! Subscribers therefore see a clean transition stream. A burst of address
//! events that leaves the host reachable produces nothing; pulling the cable
//! produces exactly one `false`.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::hub::{AddressChangeHub, AddressEvent};
use crate::provider::InterfaceProvider;
use crate::subscriber::{ChangeHandler, SubscriberSet};

/// Handler type registered with an [`AvailabilityChangeHub`].
///
/// The event payload is the new availability state.
pub type AvailabilityHandler = ChangeHandler<bool>;

struct AvailState {
    subscribers: SubscriberSet<bool>,
    /// Availability at the last probe; notifications fire on flips only.
    last_known: bool,
}

struct AvailShared {
    state: Mutex<AvailState>,
}

/// Subscriber hub for network availability transitions.
pub struct AvailabilityChangeHub {
    provider: Arc<dyn InterfaceProvider>,
    address_hub: Arc<AddressChangeHub>,
    shared: Arc<AvailShared>,
    /// Internal handler relayed through the address hub. One stable
    /// identity for the hub's whole lifetime, so subscribe and unsubscribe
    /// on the address hub always pair up.
    relay: ChangeHandler<AddressEvent>,
}

impl AvailabilityChangeHub {
    pub fn new(address_hub: Arc<AddressChangeHub>, provider: Arc<dyn InterfaceProvider>) -> Self {
        let shared = Arc::new(AvailShared {
            state: Mutex::new(AvailState {
                subscribers: SubscriberSet::new(),
                last_known: provider.is_reachable(),
            }),
        });

        let relay = Self::make_relay(&shared, Arc::clone(&provider));

        Self {
            provider,
            address_hub,
            shared,
            relay,
        }
    }

    /// Registers `handler`, capturing the caller's tracing span for
    /// delivery.
    ///
    /// The first subscriber probes the current availability synchronously
    /// (so the baseline is fresh, not the value cached at construction) and
    /// hooks the relay into the address hub. Errors from arming the address
    /// watches propagate and roll the registration back.
    pub fn subscribe(&self, handler: AvailabilityHandler) -> Result<()> {
        self.subscribe_with_span(handler, true)
    }

    /// Registers `handler`, with control over tracing span capture.
    pub fn subscribe_with_span(
        &self,
        handler: AvailabilityHandler,
        capture_span: bool,
    ) -> Result<()> {
        let rollback_key = handler.clone();
        // The avail lock is held across the address-hub call. The reverse
        // order never occurs: relay fan-out runs without the address hub's
        // lock, so this edge cannot deadlock.
        let mut state = self.shared.state.lock();

        if !state.subscribers.add(handler, capture_span) {
            return Ok(());
        }

        if state.subscribers.len() == 1 {
            state.last_known = self.provider.is_reachable();
            tracing::debug!(
                target: "horizon_netwatch::availability",
                available = state.last_known,
                "availability baseline probed for first subscriber"
            );
            if let Err(err) = self
                .address_hub
                .subscribe_with_span(self.relay.clone(), false)
            {
                state.subscribers.remove(&rollback_key);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Removes `handler`. Returns false if it was not registered.
    ///
    /// The last unsubscribe detaches the relay from the address hub, which
    /// tears down the native watches if no one else is using them.
    pub fn unsubscribe(&self, handler: &AvailabilityHandler) -> bool {
        let mut state = self.shared.state.lock();
        if !state.subscribers.remove(handler) {
            return false;
        }
        if state.subscribers.is_empty() {
            self.address_hub.unsubscribe(&self.relay);
            tracing::debug!(
                target: "horizon_netwatch::availability",
                "last availability subscriber gone; relay detached"
            );
        }
        true
    }

    /// The most recently probed availability state.
    ///
    /// Kept fresh while subscribers exist; with none, this is the value from
    /// construction or the final probe before teardown.
    pub fn is_available(&self) -> bool {
        self.shared.state.lock().last_known
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    fn make_relay(
        shared: &Arc<AvailShared>,
        provider: Arc<dyn InterfaceProvider>,
    ) -> ChangeHandler<AddressEvent> {
        let weak: Weak<AvailShared> = Arc::downgrade(shared);
        ChangeHandler::new(move |event: &AddressEvent| {
            let Some(shared) = weak.upgrade() else {
                return;
            };

            if let AddressEvent::WatchFailed { family, error } = event {
                tracing::warn!(
                    target: "horizon_netwatch::availability",
                    family = %family,
                    error = %error,
                    "address watch degraded; availability tracking continues on remaining families"
                );
                return;
            }

            let available = provider.is_reachable();
            let snapshot = {
                let mut state = shared.state.lock();
                if state.subscribers.is_empty() || state.last_known == available {
                    return;
                }
                state.last_known = available;
                state.subscribers.snapshot()
            };

            tracing::debug!(
                target: "horizon_netwatch::availability",
                available,
                subscribers = snapshot.len(),
                "network availability changed"
            );
            for subscription in &snapshot {
                subscription.deliver(&available);
            }
        })
    }
}

impl Drop for AvailabilityChangeHub {
    fn drop(&mut self) {
        let hooked = !self.shared.state.lock().subscribers.is_empty();
        if hooked {
            self.address_hub.unsubscribe(&self.relay);
        }
    }
}
