//! Process-wide notification facade.
//!
//! [`NetworkNotifier`] wires the hubs, the stable-address waiter, and the
//! system sources together behind one handle. Construction is cheap and
//! infallible; nothing native is engaged until a hub gains its first
//! subscriber or a stable wait begins. Most applications use the process
//! singleton from [`NetworkNotifier::global`].
//!
//! # Example
//!
//! ```ignore
//! use horizon_netwatch::{ChangeHandler, NetworkNotifier};
//!
//! let notifier = NetworkNotifier::global();
//!
//! let on_flip = ChangeHandler::new(|available: &bool| {
//!     println!("network availability is now {available}");
//! });
//! notifier.availability_changes().subscribe(on_flip.clone())?;
//!
//! let table = notifier.stable_unicast_addresses()?;
//! println!("{} stable unicast addresses", table.len());
//! ```

use std::sync::{Arc, OnceLock};

use crate::availability::AvailabilityChangeHub;
use crate::error::Result;
use crate::hub::AddressChangeHub;
use crate::interface::{AddressTable, NetworkInterface};
use crate::provider::{InterfaceProvider, SystemInterfaceProvider};
use crate::source::{ChangeSource, StableSource};
use crate::stable::{StableAddressWaiter, StableWaitConfig};
use crate::system::{SystemChangeSource, SystemStableSource};

static GLOBAL_NOTIFIER: OnceLock<NetworkNotifier> = OnceLock::new();

/// Entry point for network change notifications.
pub struct NetworkNotifier {
    provider: Arc<dyn InterfaceProvider>,
    addresses: Arc<AddressChangeHub>,
    availability: AvailabilityChangeHub,
    stable: StableAddressWaiter,
}

impl NetworkNotifier {
    /// A notifier over the live system with default stability tuning.
    pub fn new() -> Self {
        Self::with_stable_config(StableWaitConfig::default())
    }

    /// A notifier over the live system with custom stability tuning.
    pub fn with_stable_config(config: StableWaitConfig) -> Self {
        Self::with_sources(
            Arc::new(SystemInterfaceProvider::new()),
            Arc::new(SystemChangeSource::new()),
            Arc::new(SystemStableSource::with_config(config)),
        )
    }

    /// A notifier over arbitrary sources.
    ///
    /// This is the seam embedders and tests use to supply scripted
    /// providers and change sources.
    pub fn with_sources(
        provider: Arc<dyn InterfaceProvider>,
        changes: Arc<dyn ChangeSource>,
        stability: Arc<dyn StableSource>,
    ) -> Self {
        let addresses = Arc::new(AddressChangeHub::new(changes));
        let availability =
            AvailabilityChangeHub::new(Arc::clone(&addresses), Arc::clone(&provider));
        let stable = StableAddressWaiter::new(Arc::clone(&provider), stability);

        Self {
            provider,
            addresses,
            availability,
            stable,
        }
    }

    /// The process-wide notifier, created on first use.
    pub fn global() -> &'static NetworkNotifier {
        GLOBAL_NOTIFIER.get_or_init(NetworkNotifier::new)
    }

    /// Hub for IP address-set change notifications.
    pub fn address_changes(&self) -> &AddressChangeHub {
        &self.addresses
    }

    /// Hub for network availability transitions.
    pub fn availability_changes(&self) -> &AvailabilityChangeHub {
        &self.availability
    }

    /// Blocks until the unicast address table is stable and returns it.
    pub fn stable_unicast_addresses(&self) -> Result<AddressTable> {
        self.stable.wait_stable()
    }

    /// Delivers the stable unicast address table to `on_ready`, exactly
    /// once, without blocking the caller.
    pub fn begin_stable_unicast_addresses<F>(&self, on_ready: F) -> Result<()>
    where
        F: FnOnce(AddressTable) + Send + 'static,
    {
        self.stable.begin_wait_stable(on_ready)
    }

    /// Snapshot of the host's interfaces.
    pub fn interfaces(&self) -> Vec<NetworkInterface> {
        self.provider.interfaces()
    }

    /// Live check: is any non-loopback interface up with an address.
    pub fn is_reachable(&self) -> bool {
        self.provider.is_reachable()
    }
}

impl Default for NetworkNotifier {
    fn default() -> Self {
        Self::new()
    }
}
