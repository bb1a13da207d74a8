//! Peer address allocation
//!
//! Addresses are handed out by scanning every peer's `AllowedIPs` for IPv4
//! `/32` host tokens and taking one past the highest address found. The
//! scan starts from the server address, so with no peers the first client
//! gets the address right after the server (`10.0.0.2` by default).
//!
//! The policy is monotonic rather than gap-filling: an address freed in the
//! middle of the range is not reused, but once the highest peer is removed
//! its address becomes the next one handed out again.

use crate::config::validation::validate_subnet;
use crate::config::{ConfigDocument, PeerEntry};
use crate::error::{Result, WgUtilsError};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use tracing::debug;

/// Server address used when none is configured
pub const DEFAULT_SERVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

/// Subnet used when none is configured
pub const DEFAULT_SUBNET: &str = "10.0.0.0/24";

/// Convert a dotted-quad address to its integer form
pub fn address_to_int(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

/// Convert an integer back to a dotted-quad address
pub fn int_to_address(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

/// Parse an `AllowedIPs` token that names a single IPv4 host
///
/// Only `a.b.c.d/32` tokens qualify, where each group is 1-3 digits with a
/// value of at most 255. Everything else (other prefixes, IPv6, malformed
/// text) yields `None`.
pub fn parse_host_token(token: &str) -> Option<Ipv4Addr> {
    let (addr, prefix) = token.trim().split_once('/')?;
    if prefix != "32" {
        return None;
    }
    parse_dotted_quad(addr)
}

fn parse_dotted_quad(addr: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut groups = addr.split('.');

    for octet in octets.iter_mut() {
        let group = groups.next()?;
        if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = group.parse().ok()?;
    }

    if groups.next().is_some() {
        return None;
    }

    Some(Ipv4Addr::from(octets))
}

/// Hands out the next free host address for a new peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressAllocator {
    server: Ipv4Addr,
    subnet: Ipv4Net,
}

impl AddressAllocator {
    /// Create an allocator for `subnet`, with `server` reserved for the interface
    pub fn new(subnet: Ipv4Net, server: Ipv4Addr) -> Result<Self> {
        let subnet = subnet.trunc();
        let allocator = Self { server, subnet };

        if !allocator.is_host(server) {
            return Err(WgUtilsError::Validation(format!(
                "Server address {} is not a host address of {}",
                server, subnet
            )));
        }

        Ok(allocator)
    }

    /// Build an allocator from textual settings
    pub fn from_settings(subnet: &str, server: &str) -> Result<Self> {
        let subnet = validate_subnet(subnet)?;
        let server: Ipv4Addr = server.parse().map_err(|_| {
            WgUtilsError::Validation(format!("Invalid server address: {}", server))
        })?;
        Self::new(subnet, server)
    }

    /// Reserved interface address
    pub fn server(&self) -> Ipv4Addr {
        self.server
    }

    /// Subnet addresses are drawn from
    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    /// Compute the address for the next peer added to `doc`
    ///
    /// Fails with `AllocationExhausted` when one past the highest assigned
    /// address is not a usable host of the subnet, including when it would
    /// run past `255.255.255.255`. The error names the highest address and,
    /// when a peer holds it, that peer's public key.
    pub fn allocate(&self, doc: &ConfigDocument) -> Result<Ipv4Addr> {
        let holder = doc
            .peers
            .iter()
            .flat_map(|peer| peer.host_addresses().into_iter().map(move |addr| (addr, peer)))
            .max_by_key(|(addr, _)| address_to_int(*addr))
            .filter(|(addr, _)| address_to_int(*addr) > address_to_int(self.server));

        let highest = holder
            .map(|(addr, _)| address_to_int(addr))
            .unwrap_or_else(|| address_to_int(self.server));

        let next = highest
            .checked_add(1)
            .map(int_to_address)
            .filter(|addr| self.is_host(*addr))
            .ok_or_else(|| self.exhausted(holder))?;

        debug!(
            "Allocated {} (highest assigned {}, {} peers)",
            next,
            int_to_address(highest),
            doc.peers.len()
        );
        Ok(next)
    }

    fn exhausted(&self, holder: Option<(Ipv4Addr, &PeerEntry)>) -> WgUtilsError {
        let message = match holder {
            Some((addr, peer)) if !self.subnet.contains(&addr) => format!(
                "{} held by peer {} is outside {}, so no address can follow it",
                addr,
                peer.public_key().unwrap_or("<no public key>"),
                self.subnet
            ),
            Some((addr, peer)) => format!(
                "no free host address left in {} after {} (peer {})",
                self.subnet,
                addr,
                peer.public_key().unwrap_or("<no public key>")
            ),
            None => format!("no free host address left in {}", self.subnet),
        };
        WgUtilsError::AllocationExhausted(message)
    }

    /// Whether `addr` is inside the subnet and is neither its network nor broadcast address
    pub fn is_host(&self, addr: Ipv4Addr) -> bool {
        self.subnet.contains(&addr)
            && addr != self.subnet.network()
            && addr != self.subnet.broadcast()
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER_ADDRESS,
            subnet: Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 24)
                .expect("24 is a valid IPv4 prefix length"),
        }
    }
}
