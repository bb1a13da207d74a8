//! WireGuard key material
//!
//! Keys are produced by the external `wg` tool and handled here as the
//! base64 text it prints. Secret keys are zeroed on drop and never show up
//! in `Debug` or `Display` output.

use serde::{Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// WireGuard private key (base64 text)
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: Zeroizing<String>,
}

impl PrivateKey {
    /// Wrap base64 key text, trimming surrounding whitespace
    pub fn new(base64: &str) -> Self {
        Self {
            secret: Zeroizing::new(base64.trim().to_string()),
        }
    }

    /// The base64 text, for writing into a config file
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

// Ensure private keys are never accidentally logged
impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Symmetric preshared key (base64 text)
#[derive(Clone, PartialEq, Eq)]
pub struct PresharedKey {
    secret: Zeroizing<String>,
}

impl PresharedKey {
    /// Wrap base64 key text, trimming surrounding whitespace
    pub fn new(base64: &str) -> Self {
        Self {
            secret: Zeroizing::new(base64.trim().to_string()),
        }
    }

    /// The base64 text, for writing into a config file
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PresharedKey([REDACTED])")
    }
}

/// WireGuard key pair (private + public)
#[derive(Clone)]
pub struct KeyPair {
    /// Private key
    pub private: PrivateKey,
    /// Public key (derived from private), base64
    pub public: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

/// Serializes both keys; only used when the caller explicitly asks to print them
impl Serialize for KeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("KeyPair", 2)?;
        state.serialize_field("publicKey", &self.public)?;
        state.serialize_field("privateKey", self.private.expose())?;
        state.end()
    }
}
