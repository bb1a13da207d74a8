//! Peer status from `wg show`
//!
//! `wg show <iface>` prints an `interface:` block followed by one stanza per
//! peer: a `peer: <public key>` line, indented `label: value` lines, and a
//! blank line between stanzas.

use serde::Serialize;
use std::time::Duration;

/// Runtime status of one peer as reported by `wg show`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    /// Peer public key
    pub public_key: String,
    /// Current endpoint (`host:port`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Allowed IPs as printed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<String>,
    /// Human-readable age of the latest handshake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_handshake: Option<String>,
    /// Human-readable transfer counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<String>,
    /// Keepalive setting as printed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<String>,
    /// Whether a preshared key is configured (the key itself is never printed)
    pub has_preshared_key: bool,
}

impl PeerStatus {
    /// Whether the peer has completed a handshake within `max_age`
    ///
    /// Only understands the `wg show` duration text (e.g. `1 minute, 5
    /// seconds ago`); anything unparseable counts as no handshake.
    pub fn handshake_within(&self, max_age: Duration) -> bool {
        self.latest_handshake
            .as_deref()
            .and_then(parse_handshake_age)
            .map(|age| age <= max_age)
            .unwrap_or(false)
    }
}

/// Parse the text printed by `wg show <iface>`
pub fn parse_show_output(output: &str) -> Vec<PeerStatus> {
    let mut peers = Vec::new();
    let mut current: Option<PeerStatus> = None;

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() {
            peers.extend(current.take());
            continue;
        }

        if let Some(key) = line.strip_prefix("peer:") {
            peers.extend(current.take());
            current = Some(PeerStatus {
                public_key: key.trim().to_string(),
                ..PeerStatus::default()
            });
            continue;
        }

        let Some(peer) = current.as_mut() else {
            continue;
        };
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();

        match label.trim() {
            "endpoint" => peer.endpoint = Some(value),
            "allowed ips" => peer.allowed_ips = Some(value),
            "latest handshake" => peer.latest_handshake = Some(value),
            "transfer" => peer.transfer = Some(value),
            "persistent keepalive" => peer.persistent_keepalive = Some(value),
            "preshared key" => peer.has_preshared_key = true,
            _ => {}
        }
    }

    peers.extend(current);
    peers
}

/// Parse `1 hour, 2 minutes, 3 seconds ago` into a duration
///
/// Amounts too large for a `u64` of seconds yield `None`.
fn parse_handshake_age(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text == "Now" {
        return Some(Duration::ZERO);
    }

    let text = text.strip_suffix("ago")?.trim();

    let mut total = 0u64;
    for part in text.split(',') {
        let mut words = part.split_whitespace();
        let amount: u64 = words.next()?.parse().ok()?;
        let unit = words.next()?.trim_end_matches('s');
        let secs = match unit {
            "second" => 1,
            "minute" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            "year" => 31_536_000,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(secs)?)?;
    }

    Some(Duration::from_secs(total))
}
