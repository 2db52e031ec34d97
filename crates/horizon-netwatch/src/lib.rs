//! Network change notifications for Horizon applications.
//!
//! This crate watches the host's network configuration and tells interested
//! code when it moves:
//!
//! - **Address changes**: subscribe to be told when the set of IP addresses
//!   assigned to the host changes, per address family
//! - **Availability changes**: subscribe to a debounced up/down boolean that
//!   flips when the host gains or loses a usable non-loopback interface
//! - **Stable address table**: block (or register a callback) until the
//!   unicast address table has stopped moving, then receive a snapshot
//!
//! Native watches are lazy in both directions: the first subscriber arms
//! them, the last unsubscribe tears them down, and a torn-down engine holds
//! no OS resources at all.
//!
//! # Subscribing to changes
//!
//! ```ignore
//! use horizon_netwatch::{AddressEvent, ChangeHandler, NetworkNotifier};
//!
//! let notifier = NetworkNotifier::global();
//!
//! let on_change = ChangeHandler::new(|event: &AddressEvent| {
//!     if let AddressEvent::Changed(family) = event {
//!         println!("{family} address set changed");
//!     }
//! });
//! notifier.address_changes().subscribe(on_change.clone())?;
//!
//! // The handler's identity is its registration key; drop it later with
//! // the clone you kept.
//! notifier.address_changes().unsubscribe(&on_change);
//! ```
//!
//! # Watching availability
//!
//! ```ignore
//! use horizon_netwatch::{ChangeHandler, NetworkNotifier};
//!
//! let on_flip = ChangeHandler::new(|available: &bool| {
//!     println!("network is now {}", if *available { "up" } else { "down" });
//! });
//! NetworkNotifier::global()
//!     .availability_changes()
//!     .subscribe(on_flip)?;
//! ```
//!
//! # Waiting for a stable address table
//!
//! ```ignore
//! use horizon_netwatch::NetworkNotifier;
//!
//! // Blocks until the table has settled, then returns a snapshot.
//! let table = NetworkNotifier::global().stable_unicast_addresses()?;
//! for address in table.iter() {
//!     println!("{address}");
//! }
//! ```
//!
//! # Delivery model
//!
//! Notifications are delivered on dispatch worker threads, never on the OS
//! watcher thread. Subscribers for one event run sequentially in
//! subscription order, each inside the tracing span captured when it
//! subscribed. A watch is re-armed before fan-out begins, so a change
//! arriving while subscribers run is never lost. Unsubscribing from inside
//! a callback is safe, including unsubscribing the last handler.

mod availability;
mod error;
mod hub;
mod interface;
mod notifier;
mod pool;
mod provider;
mod source;
mod stable;
mod subscriber;
mod system;
mod watch;

pub use availability::{AvailabilityChangeHub, AvailabilityHandler};
pub use error::{Result, WatchError};
pub use hub::{AddressChangeHandler, AddressChangeHub, AddressEvent};
pub use interface::{
    AddressFamily, AddressTable, InterfaceAddress, NetworkInterface, UnicastAddress,
};
pub use notifier::NetworkNotifier;
pub use pool::{DispatchPool, DispatchPoolConfig};
pub use provider::{InterfaceProvider, SystemInterfaceProvider};
pub use source::{ChangeChannel, ChangeSource, FireTrigger, StableSource};
pub use stable::{CompletionSlot, StableAddressWaiter, StableWaitConfig};
pub use subscriber::ChangeHandler;
pub use system::{SystemChangeSource, SystemStableSource};
