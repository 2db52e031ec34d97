//! Stable address-table waits.
//!
//! A caller who needs the host's full unicast address table wants it *after*
//! the table has stopped moving, not mid-renumber. [`StableAddressWaiter`]
//! registers a one-shot stability request with a [`StableSource`] and
//! resolves a [`CompletionSlot`] with a fresh snapshot when the source
//! declares the table stable. Both a blocking and a callback form are
//! offered; each call is its own independent registration.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::interface::AddressTable;
use crate::provider::InterfaceProvider;
use crate::source::StableSource;

/// Tuning for quiescence-based stability detection.
///
/// The system source declares the table stable once no change has been
/// observed for a full [`settle_window`](Self::settle_window), and gives up
/// waiting for quiet after [`max_wait`](Self::max_wait), declaring the table
/// stable as-is so a flapping network cannot stall callers forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableWaitConfig {
    settle_window: Duration,
    max_wait: Duration,
}

impl Default for StableWaitConfig {
    fn default() -> Self {
        Self {
            settle_window: Duration::from_millis(400),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl StableWaitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long the table must stay quiet to count as stable.
    pub fn settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// Sets the hard upper bound on any single wait.
    pub fn max_wait(mut self, max: Duration) -> Self {
        self.max_wait = max;
        self
    }

    pub fn settle_window_duration(&self) -> Duration {
        self.settle_window
    }

    pub fn max_wait_duration(&self) -> Duration {
        self.max_wait
    }
}

enum SlotState<T> {
    Pending {
        on_complete: Option<Box<dyn FnOnce(T) + Send>>,
    },
    Completed(T),
}

/// A one-shot rendezvous between a producer and any number of consumers.
///
/// The slot starts pending and is resolved exactly once with a value.
/// Consumers either block on [`wait`](Self::wait) or attach a callback at
/// construction; both observe the same resolution. Resolving a slot twice is
/// a contract violation and panics.
pub struct CompletionSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> CompletionSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending { on_complete: None }),
            ready: Condvar::new(),
        }
    }

    /// A slot that invokes `callback` with the value on resolution.
    ///
    /// The callback runs on whichever thread resolves the slot, outside the
    /// slot's internal lock.
    pub fn with_callback(callback: Box<dyn FnOnce(T) + Send>) -> Self {
        Self {
            state: Mutex::new(SlotState::Pending {
                on_complete: Some(callback),
            }),
            ready: Condvar::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Completed(_))
    }
}

impl<T: Clone> CompletionSlot<T> {
    /// Resolves the slot, waking blocked waiters and running the callback.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already resolved.
    pub fn complete(&self, value: T) {
        let callback = {
            let mut state = self.state.lock();
            match &mut *state {
                SlotState::Completed(_) => {
                    panic!("completion slot resolved twice; one-shot contract violated");
                }
                SlotState::Pending { on_complete } => {
                    let callback = on_complete.take();
                    *state = SlotState::Completed(value.clone());
                    self.ready.notify_all();
                    callback
                }
            }
        };

        if let Some(callback) = callback {
            callback(value);
        }
    }

    /// Blocks until the slot is resolved and returns the value.
    pub fn wait(&self) -> T {
        let mut state = self.state.lock();
        loop {
            if let SlotState::Completed(value) = &*state {
                return value.clone();
            }
            self.ready.wait(&mut state);
        }
    }

    /// Blocks up to `timeout` for resolution.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let SlotState::Completed(value) = &*state {
                return Some(value.clone());
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    SlotState::Completed(value) => Some(value.clone()),
                    SlotState::Pending { .. } => None,
                };
            }
        }
    }

    /// Returns the value if already resolved, without blocking.
    pub fn try_get(&self) -> Option<T> {
        match &*self.state.lock() {
            SlotState::Completed(value) => Some(value.clone()),
            SlotState::Pending { .. } => None,
        }
    }
}

impl<T> Default for CompletionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves stable-address-table requests against a provider and a source.
pub struct StableAddressWaiter {
    provider: Arc<dyn InterfaceProvider>,
    source: Arc<dyn StableSource>,
}

impl StableAddressWaiter {
    pub fn new(provider: Arc<dyn InterfaceProvider>, source: Arc<dyn StableSource>) -> Self {
        Self { provider, source }
    }

    /// Blocks until the address table is stable and returns a snapshot.
    ///
    /// If the source reports stability synchronously the call returns
    /// without blocking. Concurrent calls are independent registrations and
    /// each resolves on its own.
    pub fn wait_stable(&self) -> Result<AddressTable> {
        let slot = Arc::new(CompletionSlot::new());

        let resolver = Arc::clone(&slot);
        let provider = Arc::clone(&self.provider);
        self.source.begin(Box::new(move || {
            resolver.complete(provider.unicast_addresses());
        }))?;

        tracing::debug!(
            target: "horizon_netwatch::stable",
            "blocking on stable address table"
        );
        Ok(slot.wait())
    }

    /// Registers `on_ready` to receive a snapshot once the table is stable.
    ///
    /// The callback is invoked exactly once, possibly before this method
    /// returns when the source resolves synchronously.
    pub fn begin_wait_stable<F>(&self, on_ready: F) -> Result<()>
    where
        F: FnOnce(AddressTable) + Send + 'static,
    {
        let slot = Arc::new(CompletionSlot::with_callback(Box::new(on_ready)));

        let resolver = Arc::clone(&slot);
        let provider = Arc::clone(&self.provider);
        self.source.begin(Box::new(move || {
            resolver.complete(provider.unicast_addresses());
        }))?;

        tracing::debug!(
            target: "horizon_netwatch::stable",
            "stable address table request registered"
        );
        Ok(())
    }
}
