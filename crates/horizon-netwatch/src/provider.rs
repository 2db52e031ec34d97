//! Interface snapshot providers.
//!
//! A provider answers "what does the network look like right now". The hubs
//! and waiters in this crate never enumerate interfaces themselves; they go
//! through an [`InterfaceProvider`] so tests can substitute scripted
//! topologies for the live system.

use std::net::IpAddr;

use crate::interface::{AddressTable, InterfaceAddress, NetworkInterface, UnicastAddress};

/// Source of point-in-time interface snapshots.
///
/// The two provided methods are derived views of [`interfaces`]; implementors
/// with a cheaper native path may override them.
///
/// [`interfaces`]: InterfaceProvider::interfaces
pub trait InterfaceProvider: Send + Sync {
    /// Enumerates all interfaces known to the host.
    fn interfaces(&self) -> Vec<NetworkInterface>;

    /// Returns true if at least one non-loopback interface is up and has an
    /// address assigned.
    ///
    /// This is a local-stack check, not a probe of any remote host.
    fn is_reachable(&self) -> bool {
        self.interfaces()
            .iter()
            .any(|iface| iface.is_up && !iface.is_loopback && iface.has_addresses())
    }

    /// Flattens every interface's addresses into a single table.
    fn unicast_addresses(&self) -> AddressTable {
        let rows: Vec<UnicastAddress> = self
            .interfaces()
            .iter()
            .flat_map(|iface| iface.unicast_addresses().collect::<Vec<_>>())
            .collect();
        AddressTable::new(rows)
    }
}

/// Provider backed by the operating system's interface list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaceProvider;

impl SystemInterfaceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl InterfaceProvider for SystemInterfaceProvider {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        let interfaces: Vec<NetworkInterface> = netdev::get_interfaces()
            .into_iter()
            .map(convert_interface)
            .collect();
        tracing::trace!(
            target: "horizon_netwatch::provider",
            count = interfaces.len(),
            "enumerated system interfaces"
        );
        interfaces
    }
}

fn convert_interface(iface: netdev::Interface) -> NetworkInterface {
    let mut addresses = Vec::with_capacity(iface.ipv4.len() + iface.ipv6.len());
    for net in &iface.ipv4 {
        addresses.push(InterfaceAddress {
            address: IpAddr::V4(net.addr()),
            prefix_len: net.prefix_len(),
        });
    }
    for net in &iface.ipv6 {
        addresses.push(InterfaceAddress {
            address: IpAddr::V6(net.addr()),
            prefix_len: net.prefix_len(),
        });
    }

    NetworkInterface {
        name: iface.name.clone(),
        index: iface.index,
        is_up: iface.is_up(),
        is_loopback: iface.is_loopback(),
        addresses,
    }
}
