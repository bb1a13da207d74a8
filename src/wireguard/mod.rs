//! WireGuard peer provisioning and tooling
//!
//! This module handles peer address allocation, add/remove of peers in a
//! config store, key material, and the `wg`/`wg-quick` front-end used for
//! key generation, live-apply and status queries.

pub mod allocator;
mod keys;
mod peer;
mod status;
mod store;
mod tools;

pub use allocator::AddressAllocator;
pub use keys::{KeyPair, PresharedKey, PrivateKey};
pub use peer::{AddedPeer, DuplicatePolicy, InitOptions, NewPeer, PeerManager};
pub use status::{parse_show_output, PeerStatus};
pub use store::{FileStore, MemoryStore, PeerStore};
pub use tools::{WgTools, DEFAULT_WG_BINARY, DEFAULT_WG_QUICK_BINARY};
