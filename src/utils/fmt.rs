//! Formatting helpers for MAC and IPv4 addresses as they appear in logs
//! and in the colon-hex lexical space of the codec.

use itertools::Itertools;

/// Format raw octets as a lowercase colon-separated hex string.
pub fn format_mac(octets: &[u8]) -> String {
    octets.iter().map(|b| format!("{:02x}", b)).join(":")
}

/// Format raw octets as a dotted-quad string.
pub fn format_ip(octets: &[u8]) -> String {
    octets.iter().map(|b| b.to_string()).join(".")
}

/// Parse a single colon-hex element (one octet, 1 or 2 digits).
pub fn parse_hex_octet(elem: &str) -> Option<u8> {
    if elem.is_empty() || elem.len() > 2 {
        return None;
    }
    u8::from_str_radix(elem, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_formatting() {
        assert_eq!(format_mac(&[0x1e, 0x4b, 0xad, 0x91, 0x68, 0x3a]), "1e:4b:ad:91:68:3a");
        assert_eq!(format_mac(&[]), "");
    }

    #[test]
    fn ip_formatting() {
        assert_eq!(format_ip(&[192, 168, 98, 1]), "192.168.98.1");
    }

    #[test]
    fn hex_octets() {
        assert_eq!(parse_hex_octet("ff"), Some(0xff));
        assert_eq!(parse_hex_octet("F"), Some(0xf));
        assert_eq!(parse_hex_octet(""), None);
        assert_eq!(parse_hex_octet("100"), None);
        assert_eq!(parse_hex_octet("zz"), None);
    }
}
