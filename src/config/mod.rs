//! WireGuard configuration document model
//!
//! This module holds the structured form of a `wg0.conf` file: an optional
//! `[Interface]` section, any other named sections, and an ordered list of
//! `[Peer]` entries. Parsing is tolerant and never fails; serialization is
//! the inverse of parsing for everything the model holds.

mod parser;
mod serializer;
pub mod validation;

pub use parser::parse;
pub use serializer::serialize;

use crate::config::validation::{validate_config_key, validate_config_value};
use crate::error::Result;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;

/// Section header for the local interface
pub const INTERFACE_SECTION: &str = "Interface";

/// Section header for a peer entry
pub const PEER_SECTION: &str = "Peer";

/// An ordered key/value section
///
/// Setting an existing key overwrites its value in place, so the original
/// key order survives edits. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    entries: Vec<(String, String)>,
}

impl Section {
    /// Create an empty section
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite a value
    ///
    /// Non-string values are rendered through their `Display` impl, so
    /// `set("ListenPort", 51820)` stores `"51820"`. Keys and values that
    /// would not read back unchanged (line breaks, surrounding whitespace,
    /// `=` in a key) are rejected with `Validation`.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> Result<()> {
        let key = key.into();
        let value = value.to_string();
        validate_config_key(&key)?;
        validate_config_value(&key, &value)?;
        self.insert_parsed(key, value);
        Ok(())
    }

    /// Insert the value only when present
    pub fn set_opt<V: ToString>(&mut self, key: impl Into<String>, value: Option<V>) -> Result<()> {
        match value {
            Some(value) => self.set(key, value),
            None => Ok(()),
        }
    }

    /// Build a section from key/value pairs, checked like [`Section::set`]
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut section = Section::new();
        for (key, value) in pairs {
            section.set(key, value)?;
        }
        Ok(section)
    }

    /// Store a pair taken from a parsed line as-is
    pub(crate) fn insert_parsed(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove a key, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Check whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over key/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A single `[Peer]` entry
///
/// Recognized keys get typed accessors; any other key is carried along
/// untouched so extension keys survive a round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PeerEntry {
    section: Section,
}

impl PeerEntry {
    /// Peer public key (the peer's identity within a document)
    pub const PUBLIC_KEY: &'static str = "PublicKey";
    /// Comma-separated `address/prefix` list
    pub const ALLOWED_IPS: &'static str = "AllowedIPs";
    /// Optional symmetric preshared key
    pub const PRESHARED_KEY: &'static str = "PresharedKey";
    /// Optional keepalive interval in seconds
    pub const PERSISTENT_KEEPALIVE: &'static str = "PersistentKeepalive";
    /// Optional `host:port` endpoint
    pub const ENDPOINT: &'static str = "Endpoint";
    /// Optional per-peer application list (extension key)
    pub const ALLOWED_APPS: &'static str = "AllowedApps";

    /// Create an entry holding only a public key
    pub fn new(public_key: impl Into<String>) -> Result<Self> {
        let mut entry = Self::default();
        entry.section.set(Self::PUBLIC_KEY, public_key.into())?;
        Ok(entry)
    }

    /// Wrap an already-populated section
    pub fn from_section(section: Section) -> Self {
        Self { section }
    }

    /// Public key, if set
    pub fn public_key(&self) -> Option<&str> {
        self.section.get(Self::PUBLIC_KEY)
    }

    /// Raw `AllowedIPs` value, if set
    pub fn allowed_ips(&self) -> Option<&str> {
        self.section.get(Self::ALLOWED_IPS)
    }

    /// Preshared key, if set
    pub fn preshared_key(&self) -> Option<&str> {
        self.section.get(Self::PRESHARED_KEY)
    }

    /// Keepalive interval as written in the file, if set
    pub fn persistent_keepalive(&self) -> Option<&str> {
        self.section.get(Self::PERSISTENT_KEEPALIVE)
    }

    /// Endpoint, if set
    pub fn endpoint(&self) -> Option<&str> {
        self.section.get(Self::ENDPOINT)
    }

    /// Individual `AllowedIPs` tokens, trimmed, empty tokens skipped
    pub fn allowed_ip_tokens(&self) -> impl Iterator<Item = &str> {
        self.allowed_ips()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Host addresses this peer holds, i.e. its IPv4 `/32` tokens
    pub fn host_addresses(&self) -> Vec<Ipv4Addr> {
        self.allowed_ip_tokens()
            .filter_map(crate::wireguard::allocator::parse_host_token)
            .collect()
    }

    /// Get any key, recognized or not
    pub fn get(&self, key: &str) -> Option<&str> {
        self.section.get(key)
    }

    /// Set any key, recognized or not
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> Result<()> {
        self.section.set(key, value)
    }

    /// Set a key only when a value is present
    pub fn set_opt<V: ToString>(&mut self, key: impl Into<String>, value: Option<V>) -> Result<()> {
        self.section.set_opt(key, value)
    }

    /// Underlying section
    pub fn section(&self) -> &Section {
        &self.section
    }

    /// Mutable access to the underlying section
    pub fn section_mut(&mut self) -> &mut Section {
        &mut self.section
    }
}

/// Parsed WireGuard configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    /// The `[Interface]` section, at most one per document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<Section>,

    /// Other named sections, in order of first appearance
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<(String, Section)>,

    /// Peer entries, in order of appearance
    pub peers: Vec<PeerEntry>,
}

impl ConfigDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Self {
        parser::parse(text)
    }

    /// Render the document as configuration text
    pub fn serialize(&self) -> String {
        serializer::serialize(self)
    }

    /// Look up a named non-peer section
    pub fn section(&self, name: &str) -> Option<&Section> {
        if name == INTERFACE_SECTION {
            return self.interface.as_ref();
        }
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, section)| section)
    }

    /// Replace (or create) a named non-peer section with an empty one
    pub(crate) fn reset_section(&mut self, name: &str) -> &mut Section {
        if name == INTERFACE_SECTION {
            return self.interface.insert(Section::new());
        }
        match self.sections.iter().position(|(n, _)| n == name) {
            Some(index) => {
                let slot = &mut self.sections[index].1;
                *slot = Section::new();
                slot
            }
            None => {
                self.sections.push((name.to_string(), Section::new()));
                let last = self.sections.len() - 1;
                &mut self.sections[last].1
            }
        }
    }

    /// First peer whose public key matches
    pub fn find_peer(&self, public_key: &str) -> Option<&PeerEntry> {
        self.peers
            .iter()
            .find(|peer| peer.public_key() == Some(public_key))
    }

    /// Remove the first peer whose public key matches
    pub fn remove_peer(&mut self, public_key: &str) -> Option<PeerEntry> {
        let index = self
            .peers
            .iter()
            .position(|peer| peer.public_key() == Some(public_key))?;
        Some(self.peers.remove(index))
    }

    /// Every `/32` host address held by any peer
    pub fn assigned_addresses(&self) -> Vec<Ipv4Addr> {
        self.peers
            .iter()
            .flat_map(PeerEntry::host_addresses)
            .collect()
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serializer::serialize(self))
    }
}
