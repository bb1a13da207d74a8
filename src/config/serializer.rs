//! `wg0.conf` serializer

use crate::config::{ConfigDocument, Section, INTERFACE_SECTION, PEER_SECTION};
use std::fmt::Write;

/// Render a document as configuration text
///
/// Sections are emitted as `[Interface]`, then other named sections, then
/// every `[Peer]`, each followed by a blank line. Trailing whitespace of
/// the whole output is trimmed, so the result has no final newline.
pub fn serialize(doc: &ConfigDocument) -> String {
    let mut out = String::new();

    if let Some(interface) = &doc.interface {
        write_section(&mut out, INTERFACE_SECTION, interface);
    }

    for (name, section) in &doc.sections {
        write_section(&mut out, name, section);
    }

    for peer in &doc.peers {
        write_section(&mut out, PEER_SECTION, peer.section());
    }

    out.truncate(out.trim_end().len());
    out
}

fn write_section(out: &mut String, name: &str, section: &Section) {
    // Writing into a String cannot fail
    let _ = writeln!(out, "[{}]", name);
    for (key, value) in section.iter() {
        let _ = writeln!(out, "{} = {}", key, value);
    }
    out.push('\n');
}
