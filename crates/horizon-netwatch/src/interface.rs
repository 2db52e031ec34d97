//! Network interface and address data model.
//!
//! These types are plain snapshots. They are produced by an
//! [`InterfaceProvider`](crate::provider::InterfaceProvider) at a point in
//! time and never update themselves; watching for changes is the job of the
//! hubs in this crate.

use std::fmt;
use std::net::IpAddr;

/// Internet protocol address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl AddressFamily {
    /// Both families, in the order hubs arm them.
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// Returns true if `address` belongs to this family.
    pub fn matches(&self, address: &IpAddr) -> bool {
        match self {
            AddressFamily::V4 => address.is_ipv4(),
            AddressFamily::V6 => address.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// An address assigned to an interface, with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// The assigned address.
    pub address: IpAddr,
    /// Routing prefix length in bits.
    pub prefix_len: u8,
}

impl InterfaceAddress {
    pub fn family(&self) -> AddressFamily {
        match self.address {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// A unicast address together with the interface that carries it.
///
/// This is the row type of an [`AddressTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastAddress {
    /// The assigned address.
    pub address: IpAddr,
    /// Routing prefix length in bits.
    pub prefix_len: u8,
    /// OS index of the owning interface.
    pub interface_index: u32,
    /// Name of the owning interface.
    pub interface_name: String,
}

impl UnicastAddress {
    pub fn family(&self) -> AddressFamily {
        match self.address {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for UnicastAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.address, self.prefix_len, self.interface_name
        )
    }
}

/// Snapshot of every unicast address assigned to the host.
///
/// Returned by stable-address waits once the table has settled. The table is
/// a value: cloning it is cheap enough for handing to callbacks, and it never
/// changes after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable {
    addresses: Vec<UnicastAddress>,
}

impl AddressTable {
    pub fn new(addresses: Vec<UnicastAddress>) -> Self {
        Self { addresses }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// All addresses in the table, in provider order.
    pub fn addresses(&self) -> &[UnicastAddress] {
        &self.addresses
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnicastAddress> {
        self.addresses.iter()
    }

    /// Addresses belonging to one family.
    pub fn for_family(&self, family: AddressFamily) -> impl Iterator<Item = &UnicastAddress> {
        self.addresses.iter().filter(move |a| a.family() == family)
    }

    /// Returns true if `address` appears anywhere in the table.
    pub fn contains(&self, address: &IpAddr) -> bool {
        self.addresses.iter().any(|a| a.address == *address)
    }
}

impl From<Vec<UnicastAddress>> for AddressTable {
    fn from(addresses: Vec<UnicastAddress>) -> Self {
        Self::new(addresses)
    }
}

impl IntoIterator for AddressTable {
    type Item = UnicastAddress;
    type IntoIter = std::vec::IntoIter<UnicastAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.into_iter()
    }
}

/// Snapshot of one network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name (e.g. "eth0", "en0", "Ethernet").
    pub name: String,
    /// OS interface index.
    pub index: u32,
    /// Whether the interface is administratively and operationally up.
    pub is_up: bool,
    /// Whether this is a loopback interface.
    pub is_loopback: bool,
    /// Addresses assigned to the interface.
    pub addresses: Vec<InterfaceAddress>,
}

impl NetworkInterface {
    /// Returns true if the interface has at least one assigned address.
    pub fn has_addresses(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// Addresses belonging to one family.
    pub fn addresses_for(&self, family: AddressFamily) -> impl Iterator<Item = &InterfaceAddress> {
        self.addresses.iter().filter(move |a| a.family() == family)
    }

    /// Flattens this interface's addresses into unicast table rows.
    pub fn unicast_addresses(&self) -> impl Iterator<Item = UnicastAddress> + '_ {
        self.addresses.iter().map(|a| UnicastAddress {
            address: a.address,
            prefix_len: a.prefix_len,
            interface_index: self.index,
            interface_name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_family_matches() {
        assert!(AddressFamily::V4.matches(&v4(192, 168, 1, 1)));
        assert!(!AddressFamily::V6.matches(&v4(192, 168, 1, 1)));
        assert!(AddressFamily::V6.matches(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_family_display() {
        assert_eq!(AddressFamily::V4.to_string(), "IPv4");
        assert_eq!(AddressFamily::V6.to_string(), "IPv6");
    }

    #[test]
    fn test_address_table_queries() {
        let table = AddressTable::new(vec![
            UnicastAddress {
                address: v4(10, 0, 0, 5),
                prefix_len: 24,
                interface_index: 2,
                interface_name: "eth0".to_string(),
            },
            UnicastAddress {
                address: IpAddr::V6(Ipv6Addr::LOCALHOST),
                prefix_len: 128,
                interface_index: 1,
                interface_name: "lo".to_string(),
            },
        ]);

        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert!(table.contains(&v4(10, 0, 0, 5)));
        assert!(!table.contains(&v4(10, 0, 0, 6)));
        assert_eq!(table.for_family(AddressFamily::V4).count(), 1);
        assert_eq!(table.for_family(AddressFamily::V6).count(), 1);
    }

    #[test]
    fn test_interface_flatten() {
        let iface = NetworkInterface {
            name: "eth0".to_string(),
            index: 2,
            is_up: true,
            is_loopback: false,
            addresses: vec![
                InterfaceAddress {
                    address: v4(10, 0, 0, 5),
                    prefix_len: 24,
                },
                InterfaceAddress {
                    address: IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
                    prefix_len: 64,
                },
            ],
        };

        assert!(iface.has_addresses());
        assert_eq!(iface.addresses_for(AddressFamily::V4).count(), 1);

        let rows: Vec<UnicastAddress> = iface.unicast_addresses().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].interface_name, "eth0");
        assert_eq!(rows[0].interface_index, 2);
    }

    #[test]
    fn test_display_formats() {
        let addr = UnicastAddress {
            address: v4(192, 168, 1, 7),
            prefix_len: 24,
            interface_index: 3,
            interface_name: "wlan0".to_string(),
        };
        assert_eq!(addr.to_string(), "192.168.1.7/24 (wlan0)");
    }
}
