//! Input validation functions
//!
//! Validation for values that come from callers rather than from a parsed
//! file: interface names passed to external tools, explicit `AllowedIPs`,
//! endpoints, the allocation subnet, and keys/values written into a
//! config section. Parsed documents are never validated.

use crate::error::{Result, WgUtilsError};
use ipnet::Ipv4Net;
use std::net::IpAddr;

/// Validate interface name (alphanumeric, max 15 chars)
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WgUtilsError::Validation(
            "Interface name cannot be empty".to_string(),
        ));
    }

    if name.len() > 15 {
        return Err(WgUtilsError::Validation(format!(
            "Interface name '{}' exceeds maximum length of 15 characters",
            name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(WgUtilsError::Validation(format!(
            "Interface name '{}' contains invalid characters (only alphanumeric, '_', '-' and '.' allowed)",
            name
        )));
    }

    Ok(())
}

/// Validate IP address
pub fn validate_ip_address(ip: &str) -> Result<()> {
    ip.parse::<IpAddr>()
        .map_err(|_| WgUtilsError::Validation(format!("Invalid IP address: {}", ip)))?;
    Ok(())
}

/// Validate CIDR notation (IP/prefix)
pub fn validate_cidr(cidr: &str) -> Result<()> {
    let (ip, prefix) = cidr.split_once('/').ok_or_else(|| {
        WgUtilsError::Validation(format!(
            "Invalid CIDR notation: {} (expected format: IP/prefix)",
            cidr
        ))
    })?;

    let addr: IpAddr = ip
        .parse()
        .map_err(|_| WgUtilsError::Validation(format!("Invalid IP address in CIDR: {}", cidr)))?;

    let prefix: u8 = prefix.parse().map_err(|_| {
        WgUtilsError::Validation(format!("Invalid prefix length in CIDR: {}", cidr))
    })?;

    let max_prefix = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };

    if prefix > max_prefix {
        return Err(WgUtilsError::Validation(format!(
            "Prefix length {} exceeds maximum {} for IP address {}",
            prefix, max_prefix, ip
        )));
    }

    Ok(())
}

/// Validate a comma-separated `AllowedIPs` list
///
/// Every token must be valid CIDR, so empty lists and trailing commas are
/// rejected.
pub fn validate_allowed_ips(list: &str) -> Result<()> {
    for token in list.split(',').map(str::trim) {
        validate_cidr(token)?;
    }
    Ok(())
}

/// Validate endpoint format (host:port)
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| {
        WgUtilsError::Validation(format!(
            "Invalid endpoint format: {} (expected format: host:port)",
            endpoint
        ))
    })?;

    let port: u16 = port.parse().map_err(|_| {
        WgUtilsError::Validation(format!("Invalid port in endpoint: {}", endpoint))
    })?;

    if port == 0 {
        return Err(WgUtilsError::Validation(
            "Port number cannot be 0".to_string(),
        ));
    }

    // Host validation is lenient (can be hostname or IP)
    if host.is_empty() {
        return Err(WgUtilsError::Validation(
            "Host cannot be empty in endpoint".to_string(),
        ));
    }

    Ok(())
}

/// Validate and parse the IPv4 subnet peers are allocated from
pub fn validate_subnet(subnet: &str) -> Result<Ipv4Net> {
    let net: Ipv4Net = subnet.parse().map_err(|_| {
        WgUtilsError::Validation(format!(
            "Invalid subnet: {} (expected IPv4 CIDR like 10.0.0.0/24)",
            subnet
        ))
    })?;

    if net.prefix_len() > 30 {
        return Err(WgUtilsError::Validation(format!(
            "Subnet {} is too small to hold a server and peers (prefix must be /30 or shorter)",
            subnet
        )));
    }

    Ok(net.trunc())
}

/// Validate a section key so that `Key = Value` parses back to the same key
///
/// Keys must be non-empty, single-line, free of `=`, carry no surrounding
/// whitespace, and must not start with `[`, `#` or `;`.
pub fn validate_config_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(WgUtilsError::Validation(
            "Config key cannot be empty".to_string(),
        ));
    }

    if has_line_break(key) || key.contains('=') || key.trim() != key {
        return Err(WgUtilsError::Validation(format!(
            "Config key {:?} must be a single line without '=' or surrounding whitespace",
            key
        )));
    }

    if key.starts_with(['[', '#', ';']) {
        return Err(WgUtilsError::Validation(format!(
            "Config key {:?} cannot start with '[', '#' or ';'",
            key
        )));
    }

    Ok(())
}

/// Validate a section value so that it survives a write and re-parse
///
/// Values must be single-line and carry no surrounding whitespace.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    if has_line_break(value) {
        return Err(WgUtilsError::Validation(format!(
            "{} cannot contain line breaks",
            key
        )));
    }

    if value.trim() != value {
        return Err(WgUtilsError::Validation(format!(
            "{} cannot have leading or trailing whitespace",
            key
        )));
    }

    Ok(())
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_key() {
        assert!(validate_config_key("PublicKey").is_ok());
        assert!(validate_config_key("X-Custom").is_ok());

        assert!(validate_config_key("").is_err());
        assert!(validate_config_key("Key\n[Interface]").is_err());
        assert!(validate_config_key("Key\r").is_err());
        assert!(validate_config_key("A=B").is_err());
        assert!(validate_config_key(" Key").is_err());
        assert!(validate_config_key("[Interface]").is_err());
        assert!(validate_config_key("#Key").is_err());
        assert!(validate_config_key(";Key").is_err());
    }

    #[test]
    fn test_validate_config_value() {
        assert!(validate_config_value("PublicKey", "abc=").is_ok());
        assert!(validate_config_value("PostUp", "iptables -A FORWARD -i %i -j ACCEPT; true").is_ok());
        assert!(validate_config_value("Empty", "").is_ok());

        let err = validate_config_value("PublicKey", "k\n[Interface]\nPostUp = touch /tmp/x")
            .unwrap_err();
        assert!(err.to_string().contains("PublicKey cannot contain line breaks"));
        assert!(validate_config_value("PublicKey", "k\r").is_err());
        assert!(validate_config_value("PublicKey", " k").is_err());
        assert!(validate_config_value("PublicKey", "k\t").is_err());
    }

    #[test]
    fn test_validate_interface_name() {
        assert!(validate_interface_name("wg0").is_ok());
        assert!(validate_interface_name("wg-test").is_ok());
        assert!(validate_interface_name("wg_test").is_ok());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("wg@test").is_err());
        assert!(validate_interface_name("wg0; rm -rf").is_err());
        assert!(validate_interface_name("toolonginterfacename").is_err());
    }

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.1").is_ok());
        assert!(validate_ip_address("::1").is_ok());
        assert!(validate_ip_address("invalid").is_err());
        assert!(validate_ip_address("256.1.1.1").is_err());
    }

    #[test]
    fn test_validate_cidr() {
        assert!(validate_cidr("192.168.1.0/24").is_ok());
        assert!(validate_cidr("10.0.0.2/32").is_ok());
        assert!(validate_cidr("fe80::/64").is_ok());
        assert!(validate_cidr("192.168.1.1").is_err());
        assert!(validate_cidr("192.168.1.0/33").is_err());
        assert!(validate_cidr("fe80::/129").is_err());
    }

    #[test]
    fn test_validate_allowed_ips() {
        assert!(validate_allowed_ips("10.0.0.2/32").is_ok());
        assert!(validate_allowed_ips("10.0.0.2/32, fd00::2/128").is_ok());
        assert!(validate_allowed_ips("10.0.0.2/32,").is_err());
        assert!(validate_allowed_ips("").is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("example.com:51820").is_ok());
        assert!(validate_endpoint("192.168.1.1:51820").is_ok());
        assert!(validate_endpoint("[::1]:51820").is_ok());
        assert!(validate_endpoint("invalid").is_err());
        assert!(validate_endpoint("example.com:0").is_err());
        assert!(validate_endpoint(":51820").is_err());
    }

    #[test]
    fn test_validate_subnet() {
        let net = validate_subnet("10.0.0.0/24").unwrap();
        assert_eq!(net.prefix_len(), 24);
        assert_eq!(validate_subnet("10.0.0.7/24").unwrap().network().to_string(), "10.0.0.0");
        assert!(validate_subnet("10.0.0.0/31").is_err());
        assert!(validate_subnet("fd00::/64").is_err());
        assert!(validate_subnet("nonsense").is_err());
    }
}
