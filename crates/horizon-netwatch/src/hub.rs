//! The address change hub.
//!
//! An [`AddressChangeHub`] multiplexes any number of subscribers over at
//! most one armed [`ChangeWatch`](crate::watch) per address family. The
//! native side is only engaged while someone is listening: the first
//! subscriber arms a watch for each supported family, the last unsubscribe
//! tears them down, and every firing re-arms its family before subscriber
//! callbacks run so back-to-back changes are never missed.
//!
//! # Example
//!
//! ```ignore
//! use horizon_netwatch::{AddressChangeHub, AddressEvent, ChangeHandler};
//!
//! let hub = AddressChangeHub::system();
//! let handler = ChangeHandler::new(|event: &AddressEvent| {
//!     println!("network addresses changed: {event:?}");
//! });
//! hub.subscribe(handler.clone())?;
//! // ... later
//! hub.unsubscribe(&handler);
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, WatchError};
use crate::interface::AddressFamily;
use crate::source::ChangeSource;
use crate::subscriber::{ChangeHandler, SubscriberSet};
use crate::system::SystemChangeSource;
use crate::watch::{ChangeWatch, Deferred, FireHandler};

/// Handler type registered with an [`AddressChangeHub`].
pub type AddressChangeHandler = ChangeHandler<AddressEvent>;

/// Notification delivered to address change subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressEvent {
    /// The set of addresses for this family changed in some way.
    ///
    /// The event only says that something changed; subscribers re-query the
    /// interface table if they need the new state.
    Changed(AddressFamily),

    /// The watch for this family could not be re-armed after a firing.
    ///
    /// The family stays unwatched until the hub next transitions from zero
    /// subscribers back to one, which retries arming from scratch.
    WatchFailed {
        family: AddressFamily,
        error: WatchError,
    },
}

impl AddressEvent {
    pub fn family(&self) -> AddressFamily {
        match self {
            AddressEvent::Changed(family) => *family,
            AddressEvent::WatchFailed { family, .. } => *family,
        }
    }
}

struct HubState {
    subscribers: SubscriberSet<AddressEvent>,
    /// True from the first successful subscribe until the last unsubscribe.
    armed: bool,
    v4_watch: Option<ChangeWatch>,
    v6_watch: Option<ChangeWatch>,
}

impl HubState {
    fn slot_mut(&mut self, family: AddressFamily) -> &mut Option<ChangeWatch> {
        match family {
            AddressFamily::V4 => &mut self.v4_watch,
            AddressFamily::V6 => &mut self.v6_watch,
        }
    }

    fn take_watches(&mut self) -> Vec<ChangeWatch> {
        let mut watches = Vec::new();
        watches.extend(self.v4_watch.take());
        watches.extend(self.v6_watch.take());
        watches
    }
}

struct HubShared {
    source: Arc<dyn ChangeSource>,
    state: Mutex<HubState>,
}

/// Subscriber hub for IP address-set changes.
pub struct AddressChangeHub {
    shared: Arc<HubShared>,
}

impl AddressChangeHub {
    /// Creates a hub over an arbitrary change source.
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            shared: Arc::new(HubShared {
                source,
                state: Mutex::new(HubState {
                    subscribers: SubscriberSet::new(),
                    armed: false,
                    v4_watch: None,
                    v6_watch: None,
                }),
            }),
        }
    }

    /// Creates a hub watching the operating system's address tables.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemChangeSource::new()))
    }

    /// Registers `handler`, capturing the caller's tracing span for
    /// delivery.
    ///
    /// Subscribing a handler that is already registered is a no-op. The
    /// first subscriber synchronously arms the native watches; an arming
    /// failure rolls the registration back and is returned to the caller.
    /// An unsupported address family is not a failure, the hub simply
    /// watches the families the host supports.
    pub fn subscribe(&self, handler: AddressChangeHandler) -> Result<()> {
        self.subscribe_with_span(handler, true)
    }

    /// Registers `handler`, with control over tracing span capture.
    ///
    /// With `capture_span` set to false the handler runs in whatever span
    /// the dispatch thread carries, which is normally none.
    pub fn subscribe_with_span(
        &self,
        handler: AddressChangeHandler,
        capture_span: bool,
    ) -> Result<()> {
        let rollback_key = handler.clone();
        let mut state = self.shared.state.lock();

        if !state.subscribers.add(handler, capture_span) {
            return Ok(());
        }

        if state.subscribers.len() == 1 && !state.armed {
            if let Err(err) = Self::arm_all(&self.shared, &mut state) {
                state.subscribers.remove(&rollback_key);
                state.armed = false;
                let partial = state.take_watches();
                // Teardown must not run under the state lock: a watch that
                // already fired is blocked on this lock in phase one, and
                // disarm waits for phase one to finish.
                drop(state);
                for mut watch in partial {
                    watch.disarm();
                }
                return Err(err);
            }
            state.armed = true;
            tracing::debug!(
                target: "horizon_netwatch::hub",
                v4 = state.v4_watch.is_some(),
                v6 = state.v6_watch.is_some(),
                "address watches armed for first subscriber"
            );
        }

        Ok(())
    }

    /// Removes `handler`. Returns false if it was not registered.
    ///
    /// The last unsubscribe tears down the native watches; once this call
    /// returns, the removed handler will not be invoked again.
    pub fn unsubscribe(&self, handler: &AddressChangeHandler) -> bool {
        let mut teardown = Vec::new();
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.subscribers.remove(handler);
            if removed && state.subscribers.is_empty() && state.armed {
                state.armed = false;
                teardown = state.take_watches();
                tracing::debug!(
                    target: "horizon_netwatch::hub",
                    "last subscriber gone; tearing down address watches"
                );
            }
            removed
        };

        for mut watch in teardown {
            watch.disarm();
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    /// True while the hub has subscribers and native watches engaged.
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed
    }

    /// True if a live watch exists for `family`.
    ///
    /// False either because the family is unsupported or because its watch
    /// was dropped after a re-arm failure.
    pub fn is_watching(&self, family: AddressFamily) -> bool {
        self.shared.state.lock().slot_mut(family).is_some()
    }

    fn arm_all(shared: &Arc<HubShared>, state: &mut HubState) -> Result<()> {
        for family in AddressFamily::ALL {
            match shared.source.open(family) {
                Err(WatchError::UnsupportedFamily(_)) => {
                    tracing::debug!(
                        target: "horizon_netwatch::hub",
                        family = %family,
                        "address family unsupported on this host; skipping watch"
                    );
                }
                Err(err) => return Err(err),
                Ok(channel) => {
                    let mut watch =
                        ChangeWatch::new(family, channel, Self::fire_handler(shared, family));
                    watch.arm()?;
                    *state.slot_mut(family) = Some(watch);
                }
            }
        }

        if state.v4_watch.is_none() && state.v6_watch.is_none() {
            tracing::warn!(
                target: "horizon_netwatch::hub",
                "no address family can be watched on this host; subscribers will see no events"
            );
        }
        Ok(())
    }

    fn fire_handler(shared: &Arc<HubShared>, family: AddressFamily) -> FireHandler {
        let weak: Weak<HubShared> = Arc::downgrade(shared);
        Box::new(move || {
            let shared = weak.upgrade()?;
            shared.on_watch_fired(family)
        })
    }
}

impl HubShared {
    /// Phase one of a firing: snapshot subscribers and re-arm the family,
    /// returning the fan-out as deferred work.
    fn on_watch_fired(&self, family: AddressFamily) -> Option<Deferred> {
        let mut state = self.state.lock();

        if !state.armed || state.subscribers.is_empty() {
            tracing::trace!(
                target: "horizon_netwatch::hub",
                family = %family,
                "change signal with no live subscribers; dropping"
            );
            return None;
        }

        let snapshot = state.subscribers.snapshot();

        // Re-arm before any subscriber runs so a change arriving during
        // fan-out is caught by the next firing instead of being lost.
        let rearm_error = match state.slot_mut(family).as_mut() {
            Some(watch) => watch.arm().err(),
            None => None,
        };

        let mut failed: Option<(ChangeWatch, WatchError)> = None;
        if let Some(error) = rearm_error {
            tracing::warn!(
                target: "horizon_netwatch::hub",
                family = %family,
                error = %error,
                "failed to re-arm after change; family is no longer watched"
            );
            if let Some(dead) = state.slot_mut(family).take() {
                failed = Some((dead, error));
            }
        }
        drop(state);

        Some(Box::new(move || {
            let event = AddressEvent::Changed(family);
            tracing::trace!(
                target: "horizon_netwatch::hub",
                family = %family,
                subscribers = snapshot.len(),
                "delivering address change"
            );
            for subscription in &snapshot {
                subscription.deliver(&event);
            }

            if let Some((mut dead, error)) = failed {
                // The gate has already marked this firing's phase one
                // complete, so disarming here cannot self-deadlock.
                dead.disarm();
                let event = AddressEvent::WatchFailed { family, error };
                for subscription in &snapshot {
                    subscription.deliver(&event);
                }
            }
        }))
    }
}
