//! Tolerant `wg0.conf` parser
//!
//! Parsing is purely syntactic: blank lines and `#`/`;` comments are
//! skipped, `[Name]` lines open sections and every other line is split at
//! its first `=`. Nothing here can fail; odd input yields a partial
//! document.

use crate::config::{ConfigDocument, PeerEntry, Section, PEER_SECTION};

/// Where key/value lines are currently being written
enum Target {
    /// Before the first section header
    None,
    /// The most recently opened `[Peer]`
    Peer,
    /// A named section (`Interface` or anything else)
    Named(String),
}

/// Parse configuration text into a document
pub fn parse(text: &str) -> ConfigDocument {
    let mut doc = ConfigDocument::new();
    let mut target = Target::None;

    for raw in text.split('\n') {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = section_header(line) {
            target = if name == PEER_SECTION {
                doc.peers.push(PeerEntry::default());
                Target::Peer
            } else {
                doc.reset_section(name);
                Target::Named(name.to_string())
            };
            continue;
        }

        let (key, value) = split_key_value(line);
        match &target {
            Target::None => {}
            Target::Peer => {
                if let Some(peer) = doc.peers.last_mut() {
                    peer.section_mut().insert_parsed(key, value);
                }
            }
            Target::Named(name) => {
                if let Some(section) = named_section_mut(&mut doc, name) {
                    section.insert_parsed(key, value);
                }
            }
        }
    }

    doc
}

/// Section name if the line is a `[Name]` header
fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}

/// Split at the first `=`; later `=` characters stay in the value
fn split_key_value(line: &str) -> (&str, &str) {
    match line.split_once('=') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (line, ""),
    }
}

fn named_section_mut<'a>(doc: &'a mut ConfigDocument, name: &str) -> Option<&'a mut Section> {
    if name == crate::config::INTERFACE_SECTION {
        return doc.interface.as_mut();
    }
    doc.sections
        .iter_mut()
        .find(|(n, _)| n == name)
        .map(|(_, section)| section)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_CONF: &str = "[Interface]
Address = 10.0.0.1/24
ListenPort = 51820
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=

[Peer]
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
AllowedIPs = 10.0.0.2/32

[Peer]
PublicKey = TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0=
AllowedIPs = 10.0.0.3/32
PersistentKeepalive = 25";

    #[test]
    fn test_parse_interface_and_peers() {
        let doc = parse(SERVER_CONF);

        let interface = doc.interface.as_ref().expect("interface section");
        assert_eq!(interface.get("Address"), Some("10.0.0.1/24"));
        assert_eq!(interface.get("ListenPort"), Some("51820"));
        assert_eq!(
            interface.get("PrivateKey"),
            Some("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=")
        );

        assert_eq!(doc.peers.len(), 2);
        assert_eq!(doc.peers[0].allowed_ips(), Some("10.0.0.2/32"));
        assert_eq!(doc.peers[1].persistent_keepalive(), Some("25"));
    }

    #[test]
    fn test_value_keeps_everything_after_first_equals() {
        let doc = parse("[Peer]\nPublicKey = abc=\nX-Note = a=b=c");
        let peer = &doc.peers[0];
        assert_eq!(peer.public_key(), Some("abc="));
        assert_eq!(peer.get("X-Note"), Some("a=b=c"));
    }

    #[test]
    fn test_lines_before_first_section_are_dropped() {
        let doc = parse("Stray = value\nanother\n[Interface]\nAddress = 10.0.0.1/24");
        let interface = doc.interface.unwrap();
        assert_eq!(interface.len(), 1);
        assert!(doc.peers.is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let commented = "# server config\n\n[Interface]\n; listen here\nListenPort = 51820\n\n\n# first peer\n[Peer]\n  # indented comment\nPublicKey = k1\n";
        let stripped = "[Interface]\nListenPort = 51820\n[Peer]\nPublicKey = k1";
        assert_eq!(parse(commented), parse(stripped));
    }

    #[test]
    fn test_crlf_line_endings() {
        let doc = parse("[Interface]\r\nAddress = 10.0.0.1/24\r\n\r\n[Peer]\r\nPublicKey = k\r\n");
        assert_eq!(doc.interface.unwrap().get("Address"), Some("10.0.0.1/24"));
        assert_eq!(doc.peers[0].public_key(), Some("k"));
    }

    #[test]
    fn test_line_without_equals_becomes_empty_value() {
        let doc = parse("[Peer]\nPublicKey = k\nFlag");
        assert_eq!(doc.peers[0].get("Flag"), Some(""));
    }

    #[test]
    fn test_repeated_interface_overwrites() {
        let doc = parse("[Interface]\nAddress = 10.0.0.1/24\n[Interface]\nListenPort = 1");
        let interface = doc.interface.unwrap();
        assert_eq!(interface.get("Address"), None);
        assert_eq!(interface.get("ListenPort"), Some("1"));
    }

    #[test]
    fn test_unknown_sections_are_kept() {
        let doc = parse("[Interface]\nAddress = 10.0.0.1/24\n[Extra]\nFoo = bar\n[Peer]\nPublicKey = k");
        assert_eq!(doc.section("Extra").and_then(|s| s.get("Foo")), Some("bar"));
        assert_eq!(doc.peers.len(), 1);
    }

    #[test]
    fn test_section_names_are_case_sensitive() {
        let doc = parse("[peer]\nPublicKey = k");
        assert!(doc.peers.is_empty());
        assert!(doc.section("peer").is_some());
    }

    #[test]
    fn test_arbitrary_text_does_not_panic() {
        let doc = parse("]][[\n=\n[\n[]\n==x==\n\u{0}");
        assert!(doc.peers.is_empty());
        assert!(parse("").peers.is_empty());
    }
}
