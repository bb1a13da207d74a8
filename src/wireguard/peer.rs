//! Peer provisioning
//!
//! This module handles adding and removing `[Peer]` entries in a
//! configuration store. Every operation is a full read-parse-modify-
//! serialize-write cycle; the manager holds no document between calls.

use crate::config::validation::{validate_allowed_ips, validate_config_value, validate_endpoint};
use crate::config::{ConfigDocument, PeerEntry, Section};
use crate::error::{Result, WgUtilsError};
use crate::wireguard::allocator::{parse_host_token, AddressAllocator};
use crate::wireguard::store::PeerStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Request to add a peer
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NewPeer {
    /// Peer public key, written as-is
    pub public_key: String,
    /// Explicit `AllowedIPs`; when absent an address is allocated
    pub allowed_ips: Option<String>,
    /// Optional preshared key
    pub preshared_key: Option<String>,
    /// Optional keepalive interval in seconds
    pub persistent_keepalive: Option<u16>,
    /// Optional `host:port` endpoint
    pub endpoint: Option<String>,
    /// Optional application list stored under `AllowedApps`
    pub allowed_apps: Option<String>,
}

impl NewPeer {
    /// Create a request with only a public key
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Self::default()
        }
    }

    /// Use explicit `AllowedIPs` instead of allocating
    pub fn with_allowed_ips(mut self, allowed_ips: impl Into<String>) -> Self {
        self.allowed_ips = Some(allowed_ips.into());
        self
    }

    /// Attach a preshared key
    pub fn with_preshared_key(mut self, key: impl Into<String>) -> Self {
        self.preshared_key = Some(key.into());
        self
    }

    /// Set the keepalive interval
    pub fn with_persistent_keepalive(mut self, secs: u16) -> Self {
        self.persistent_keepalive = Some(secs);
        self
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the application list
    pub fn with_allowed_apps(mut self, apps: impl Into<String>) -> Self {
        self.allowed_apps = Some(apps.into());
        self
    }

    /// Check caller-supplied values
    ///
    /// The public key is only checked for presence; its encoding is the
    /// key generator's business. Every text field must be a single line
    /// without surrounding whitespace, so it reads back exactly as written.
    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            return Err(WgUtilsError::Validation(
                "Public key cannot be empty".to_string(),
            ));
        }

        validate_config_value(PeerEntry::PUBLIC_KEY, &self.public_key)?;
        let optional = [
            (PeerEntry::ALLOWED_IPS, &self.allowed_ips),
            (PeerEntry::PRESHARED_KEY, &self.preshared_key),
            (PeerEntry::ENDPOINT, &self.endpoint),
            (PeerEntry::ALLOWED_APPS, &self.allowed_apps),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                validate_config_value(key, value)?;
            }
        }
        if let Some(allowed_ips) = &self.allowed_ips {
            validate_allowed_ips(allowed_ips)?;
        }
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        Ok(())
    }

    fn into_entry(self, allowed_ips: String) -> Result<PeerEntry> {
        let mut entry = PeerEntry::new(self.public_key)?;
        entry.set(PeerEntry::ALLOWED_IPS, allowed_ips)?;
        entry.set_opt(PeerEntry::PRESHARED_KEY, self.preshared_key)?;
        entry.set_opt(PeerEntry::PERSISTENT_KEEPALIVE, self.persistent_keepalive)?;
        entry.set_opt(PeerEntry::ENDPOINT, self.endpoint)?;
        entry.set_opt(PeerEntry::ALLOWED_APPS, self.allowed_apps)?;
        Ok(entry)
    }
}

// Preshared keys are secrets
impl fmt::Debug for NewPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewPeer")
            .field("public_key", &self.public_key)
            .field("allowed_ips", &self.allowed_ips)
            .field("preshared_key", &self.preshared_key.as_ref().map(|_| "[REDACTED]"))
            .field("persistent_keepalive", &self.persistent_keepalive)
            .field("endpoint", &self.endpoint)
            .field("allowed_apps", &self.allowed_apps)
            .finish()
    }
}

/// Result of adding a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedPeer {
    /// Assigned address without prefix (e.g. `10.0.0.2`)
    pub ip: String,
}

/// What to do when a new peer's public key is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with `DuplicatePeer`
    #[default]
    Reject,
    /// Append the duplicate anyway
    Allow,
}

/// Options for writing a fresh server configuration
#[derive(Clone)]
pub struct InitOptions {
    /// Server private key
    pub private_key: String,
    /// UDP listen port
    pub listen_port: u16,
    /// Server address inside the tunnel
    pub address: Ipv4Addr,
    /// Prefix length written after the server address
    pub prefix_len: u8,
    /// Outbound interface used by the NAT rules
    pub nat_interface: String,
}

impl InitOptions {
    /// Defaults: port 51820, address 10.0.0.1/24, NAT through eth0
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            listen_port: 51820,
            address: Ipv4Addr::new(10, 0, 0, 1),
            prefix_len: 24,
            nat_interface: "eth0".to_string(),
        }
    }

    fn interface_section(&self) -> Result<Section> {
        let mut section = Section::new();
        section.set("Address", format!("{}/{}", self.address, self.prefix_len))?;
        section.set("ListenPort", self.listen_port)?;
        section.set("PrivateKey", &self.private_key)?;
        section.set(
            "PostUp",
            format!(
                "iptables -A FORWARD -i %i -j ACCEPT; iptables -t nat -A POSTROUTING -o {} -j MASQUERADE",
                self.nat_interface
            ),
        )?;
        section.set(
            "PostDown",
            format!(
                "iptables -D FORWARD -i %i -j ACCEPT; iptables -t nat -D POSTROUTING -o {} -j MASQUERADE",
                self.nat_interface
            ),
        )?;
        Ok(section)
    }
}

impl fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOptions")
            .field("private_key", &"[REDACTED]")
            .field("listen_port", &self.listen_port)
            .field("address", &self.address)
            .field("prefix_len", &self.prefix_len)
            .field("nat_interface", &self.nat_interface)
            .finish()
    }
}

/// Adds and removes peers in a configuration store
///
/// Mutations through one manager are serialized by an internal lock, so a
/// manager shared behind an `Arc` never loses concurrent updates. Other
/// processes writing the same file are not coordinated with.
pub struct PeerManager<S> {
    store: S,
    allocator: AddressAllocator,
    duplicates: DuplicatePolicy,
    lock: Mutex<()>,
}

impl<S: PeerStore> PeerManager<S> {
    /// Create a manager with the default allocator and duplicate rejection
    pub fn new(store: S) -> Self {
        Self {
            store,
            allocator: AddressAllocator::default(),
            duplicates: DuplicatePolicy::default(),
            lock: Mutex::new(()),
        }
    }

    /// Use a different address allocator
    pub fn with_allocator(mut self, allocator: AddressAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Use a different duplicate-key policy
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read and parse the current configuration
    pub async fn read_document(&self) -> Result<ConfigDocument> {
        let text = self.store.read().await?;
        Ok(ConfigDocument::parse(&text))
    }

    /// All peers currently configured
    pub async fn list_peers(&self) -> Result<Vec<PeerEntry>> {
        Ok(self.read_document().await?.peers)
    }

    /// `PrivateKey` of the `[Interface]` section
    pub async fn interface_private_key(&self) -> Result<String> {
        let doc = self.read_document().await?;
        doc.interface
            .as_ref()
            .and_then(|interface| interface.get("PrivateKey"))
            .map(str::to_string)
            .ok_or_else(|| {
                WgUtilsError::NotFound(format!(
                    "Interface PrivateKey in {}",
                    self.store.describe()
                ))
            })
    }

    /// Write a fresh configuration holding only an `[Interface]` section
    ///
    /// Replaces whatever the store held before.
    pub async fn init_config(&self, options: &InitOptions) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut doc = ConfigDocument::new();
        doc.interface = Some(options.interface_section()?);
        self.store.write(&doc.serialize()).await?;

        info!(
            "Initialized {} with address {}/{} listening on {}",
            self.store.describe(),
            options.address,
            options.prefix_len,
            options.listen_port
        );
        Ok(())
    }

    /// Append a peer, allocating an address unless one was given
    ///
    /// Returns the peer's bare address: the allocated one, or the address
    /// part of the first explicit `AllowedIPs` token.
    pub async fn add_peer(&self, peer: NewPeer) -> Result<AddedPeer> {
        peer.validate()?;
        let _guard = self.lock.lock().await;

        let mut doc = self.read_document().await?;

        if doc.find_peer(&peer.public_key).is_some() {
            match self.duplicates {
                DuplicatePolicy::Reject => {
                    return Err(WgUtilsError::DuplicatePeer(peer.public_key));
                }
                DuplicatePolicy::Allow => {
                    warn!("Adding duplicate peer {}", peer.public_key);
                }
            }
        }

        let (allowed_ips, ip) = match &peer.allowed_ips {
            Some(explicit) => {
                ensure_addresses_free(&doc, self.allocator.server(), explicit)?;
                (explicit.clone(), first_address(explicit))
            }
            None => {
                let addr = self.allocator.allocate(&doc)?;
                (format!("{}/32", addr), addr.to_string())
            }
        };

        let public_key = peer.public_key.clone();
        doc.peers.push(peer.into_entry(allowed_ips)?);
        self.store.write(&doc.serialize()).await?;

        info!(
            "Added peer {} at {} to {}",
            public_key,
            ip,
            self.store.describe()
        );
        Ok(AddedPeer { ip })
    }

    /// Remove the first peer with this public key
    ///
    /// Returns `false` and leaves the store untouched when no peer matches.
    pub async fn delete_peer(&self, public_key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;

        let mut doc = self.read_document().await?;
        if doc.remove_peer(public_key).is_none() {
            debug!(
                "Peer {} not found in {}, nothing to delete",
                public_key,
                self.store.describe()
            );
            return Ok(false);
        }

        self.store.write(&doc.serialize()).await?;
        info!("Deleted peer {} from {}", public_key, self.store.describe());
        Ok(true)
    }
}

/// Reject explicit `/32` hosts that are reserved, held by another peer, or
/// listed twice
fn ensure_addresses_free(doc: &ConfigDocument, server: Ipv4Addr, allowed_ips: &str) -> Result<()> {
    let mut taken: HashSet<Ipv4Addr> = doc.assigned_addresses().into_iter().collect();
    taken.insert(server);

    let mut requested = HashSet::new();
    for token in allowed_ips.split(',') {
        if let Some(addr) = parse_host_token(token) {
            if taken.contains(&addr) {
                return Err(WgUtilsError::AddressInUse(addr.to_string()));
            }
            if !requested.insert(addr) {
                return Err(WgUtilsError::Validation(format!(
                    "Address {} is listed more than once in AllowedIPs",
                    addr
                )));
            }
        }
    }
    Ok(())
}

fn first_address(allowed_ips: &str) -> String {
    let first = allowed_ips.split(',').next().unwrap_or_default().trim();
    first.split('/').next().unwrap_or(first).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wireguard::store::MemoryStore;
    use std::sync::Arc;

    const BASE: &str = "[Interface]
Address = 10.0.0.1/24
ListenPort = 51820
PrivateKey = server-private

[Peer]
PublicKey = existing
AllowedIPs = 10.0.0.2/32";

    fn manager(text: &str) -> PeerManager<MemoryStore> {
        PeerManager::new(MemoryStore::new(text))
    }

    #[tokio::test]
    async fn test_add_first_peer_to_empty_interface() {
        let mgr = manager("[Interface]\nAddress = 10.0.0.1/24");
        let added = mgr.add_peer(NewPeer::new("client")).await.unwrap();
        assert_eq!(added.ip, "10.0.0.2");
        assert_eq!(
            mgr.store().contents().await,
            "[Interface]\nAddress = 10.0.0.1/24\n\n[Peer]\nPublicKey = client\nAllowedIPs = 10.0.0.2/32"
        );
    }

    #[tokio::test]
    async fn test_add_peer_allocates_after_highest() {
        let mgr = manager(BASE);
        assert_eq!(mgr.add_peer(NewPeer::new("a")).await.unwrap().ip, "10.0.0.3");
        assert_eq!(mgr.add_peer(NewPeer::new("b")).await.unwrap().ip, "10.0.0.4");
        assert_eq!(mgr.list_peers().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_optional_fields_only_when_present() {
        let mgr = manager(BASE);
        mgr.add_peer(
            NewPeer::new("full")
                .with_preshared_key("psk")
                .with_persistent_keepalive(25)
                .with_endpoint("vpn.example.com:51820")
                .with_allowed_apps("browser,mail"),
        )
        .await
        .unwrap();
        mgr.add_peer(NewPeer::new("bare")).await.unwrap();

        let doc = mgr.read_document().await.unwrap();
        let full = doc.find_peer("full").unwrap();
        assert_eq!(full.preshared_key(), Some("psk"));
        assert_eq!(full.persistent_keepalive(), Some("25"));
        assert_eq!(full.endpoint(), Some("vpn.example.com:51820"));
        assert_eq!(full.get(PeerEntry::ALLOWED_APPS), Some("browser,mail"));

        let bare = doc.find_peer("bare").unwrap();
        assert_eq!(bare.section().len(), 2);
        assert!(bare.preshared_key().is_none());
    }

    #[tokio::test]
    async fn test_explicit_allowed_ips_bypass_allocation() {
        let mgr = manager(BASE);
        let added = mgr
            .add_peer(NewPeer::new("site").with_allowed_ips("10.0.0.50/32, 192.168.10.0/24"))
            .await
            .unwrap();
        assert_eq!(added.ip, "10.0.0.50");

        let doc = mgr.read_document().await.unwrap();
        assert_eq!(
            doc.find_peer("site").unwrap().allowed_ips(),
            Some("10.0.0.50/32, 192.168.10.0/24")
        );
    }

    #[tokio::test]
    async fn test_explicit_address_collision_rejected() {
        let mgr = manager(BASE);
        let err = mgr
            .add_peer(NewPeer::new("other").with_allowed_ips("10.0.0.2/32"))
            .await
            .unwrap_err();
        assert!(matches!(err, WgUtilsError::AddressInUse(ref a) if a == "10.0.0.2"));
        assert_eq!(mgr.store().contents().await, BASE);
    }

    #[tokio::test]
    async fn test_explicit_server_address_rejected() {
        let mgr = manager(BASE);
        let err = mgr
            .add_peer(NewPeer::new("other").with_allowed_ips("10.0.0.1/32"))
            .await
            .unwrap_err();
        assert!(matches!(err, WgUtilsError::AddressInUse(ref a) if a == "10.0.0.1"));
        assert_eq!(mgr.store().contents().await, BASE);
    }

    #[tokio::test]
    async fn test_explicit_repeated_address_rejected() {
        let mgr = manager(BASE);
        let err = mgr
            .add_peer(NewPeer::new("other").with_allowed_ips("10.0.0.9/32, 10.0.0.9/32"))
            .await
            .unwrap_err();
        assert!(matches!(err, WgUtilsError::Validation(ref m) if m.contains("10.0.0.9")));
        assert_eq!(mgr.store().contents().await, BASE);
    }

    #[tokio::test]
    async fn test_line_breaks_never_reach_the_store() {
        let mgr = manager(BASE);

        let injected = NewPeer::new("k\n[Interface]\nPostUp = touch /tmp/marker");
        assert!(matches!(
            mgr.add_peer(injected).await,
            Err(WgUtilsError::Validation(_))
        ));
        for peer in [
            NewPeer::new("k").with_preshared_key("psk\r\n[Peer]"),
            NewPeer::new("k").with_allowed_apps("mail\nPostUp = reboot"),
            NewPeer::new("k").with_endpoint("host:51820\n"),
            NewPeer::new(" k "),
        ] {
            assert!(mgr.add_peer(peer).await.is_err());
        }
        assert_eq!(mgr.store().contents().await, BASE);

        let mut options = InitOptions::new("server-private\nPostUp = reboot");
        assert!(mgr.init_config(&options).await.is_err());
        options.private_key = "server-private".to_string();
        options.nat_interface = "eth0\n[Peer]".to_string();
        assert!(mgr.init_config(&options).await.is_err());
        assert_eq!(mgr.store().contents().await, BASE);
    }

    #[tokio::test]
    async fn test_duplicate_public_key() {
        let mgr = manager(BASE);
        let err = mgr.add_peer(NewPeer::new("existing")).await.unwrap_err();
        assert!(matches!(err, WgUtilsError::DuplicatePeer(_)));
        assert_eq!(mgr.store().contents().await, BASE);

        let lenient = manager(BASE).with_duplicate_policy(DuplicatePolicy::Allow);
        lenient.add_peer(NewPeer::new("existing")).await.unwrap();
        assert_eq!(lenient.list_peers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_io() {
        let mgr = manager(BASE);
        assert!(mgr.add_peer(NewPeer::new("  ")).await.is_err());
        assert!(mgr
            .add_peer(NewPeer::new("k").with_allowed_ips("10.0.0.9"))
            .await
            .is_err());
        assert!(mgr
            .add_peer(NewPeer::new("k").with_endpoint("no-port"))
            .await
            .is_err());
        assert_eq!(mgr.store().contents().await, BASE);
    }

    #[tokio::test]
    async fn test_delete_missing_peer_leaves_store_untouched() {
        let original = "# managed by hand\n[Interface]\nListenPort=51820\n\n[Peer]\nPublicKey=existing\n";
        let mgr = manager(original);
        assert!(!mgr.delete_peer("absent").await.unwrap());
        assert_eq!(mgr.store().contents().await, original);
    }

    #[tokio::test]
    async fn test_delete_existing_peer() {
        let mgr = manager(BASE);
        assert!(mgr.delete_peer("existing").await.unwrap());
        assert_eq!(
            mgr.store().contents().await,
            "[Interface]\nAddress = 10.0.0.1/24\nListenPort = 51820\nPrivateKey = server-private"
        );
    }

    #[tokio::test]
    async fn test_add_then_delete_restores_document() {
        let mgr = manager(BASE);
        let before = mgr.read_document().await.unwrap();

        mgr.add_peer(NewPeer::new("temp").with_preshared_key("psk"))
            .await
            .unwrap();
        assert!(mgr.delete_peer("temp").await.unwrap());

        assert_eq!(mgr.read_document().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_addresses() {
        let mgr = Arc::new(manager(BASE));
        let mut handles = Vec::new();
        for i in 0..16 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move {
                mgr.add_peer(NewPeer::new(format!("peer-{}", i))).await
            }));
        }

        let mut ips = HashSet::new();
        for handle in handles {
            ips.insert(handle.await.unwrap().unwrap().ip);
        }
        assert_eq!(ips.len(), 16);
        assert_eq!(mgr.list_peers().await.unwrap().len(), 17);
    }

    #[tokio::test]
    async fn test_init_config() {
        let mgr = manager("");
        let mut options = InitOptions::new("server-private");
        options.nat_interface = "ens3".to_string();
        mgr.init_config(&options).await.unwrap();

        assert_eq!(
            mgr.store().contents().await,
            "[Interface]\n\
             Address = 10.0.0.1/24\n\
             ListenPort = 51820\n\
             PrivateKey = server-private\n\
             PostUp = iptables -A FORWARD -i %i -j ACCEPT; iptables -t nat -A POSTROUTING -o ens3 -j MASQUERADE\n\
             PostDown = iptables -D FORWARD -i %i -j ACCEPT; iptables -t nat -D POSTROUTING -o ens3 -j MASQUERADE"
        );
        assert_eq!(mgr.interface_private_key().await.unwrap(), "server-private");
    }

    #[tokio::test]
    async fn test_missing_private_key() {
        let mgr = manager("[Peer]\nPublicKey = k");
        assert!(matches!(
            mgr.interface_private_key().await,
            Err(WgUtilsError::NotFound(_))
        ));
    }

    #[test]
    fn test_first_address() {
        assert_eq!(first_address("10.0.0.9/32"), "10.0.0.9");
        assert_eq!(first_address(" fd00::9/128, 10.0.0.9/32"), "fd00::9");
    }

    #[test]
    fn test_new_peer_debug_redacts_preshared_key() {
        let peer = NewPeer::new("k").with_preshared_key("super-secret");
        let debug = format!("{:?}", peer);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("super-secret"));
    }
}
