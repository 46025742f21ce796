//! Obfuscation of the first client line.
//!
//! The client XORs its login line against a salt derived from an IPv4
//! address and sends it as uppercase hex. The server never learns the salt;
//! it recovers it from the known command prefix (`tetrisstart` or
//! `tetrifaster`), which is why only the command length bounds the salt.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::ProtocolError;

/// Longest salt a 4-byte address can produce.
const MAX_SALT_LEN: usize = 5;

/// Decimal salt for `a.b.c.d`: `54a + 41b + 29c + 17d`.
pub fn ipv4_salt(address: Ipv4Addr) -> String {
    let [a, b, c, d] = address.octets().map(u32::from);
    (54 * a + 41 * b + 29 * c + 17 * d).to_string()
}

/// Salt for any address; only IPv4 is defined by the protocol.
pub fn salt_for(address: IpAddr) -> Result<String, ProtocolError> {
    match address {
        IpAddr::V4(v4) => Ok(ipv4_salt(v4)),
        IpAddr::V6(v6) => Err(ProtocolError::UnsupportedAddressFamily(v6.to_string())),
    }
}

/// Encodes `message`, starting the chain from `initial`.
pub fn encode_login(message: &str, salt: &str, initial: u8) -> String {
    let salt = salt.as_bytes();
    let mut out = format!("{:02X}", initial);
    let mut previous = initial as u32;
    for (i, byte) in message.bytes().enumerate() {
        let next = ((previous + byte as u32) % 255) ^ salt[i % salt.len()] as u32;
        out.push_str(&format!("{:02X}", next));
        previous = next;
    }
    out
}

fn decode_hex(encoded: &str) -> Option<Vec<u32>> {
    if encoded.len() % 2 != 0 || !encoded.is_ascii() {
        return None;
    }
    (0..encoded.len())
        .step_by(2)
        .map(|i| u32::from_str_radix(&encoded[i..i + 2], 16).ok())
        .collect()
}

/// Smallest period of `key` up to the salt length limit.
fn key_period(key: &[u32]) -> usize {
    (1..=MAX_SALT_LEN)
        .find(|p| (0..key.len().saturating_sub(*p)).all(|j| key[j] == key[j + p]))
        .unwrap_or(MAX_SALT_LEN)
}

/// Decodes a login line whose plaintext starts with `command`.
///
/// Returns `None` if the hex is invalid or too short to recover the salt;
/// a wrong guess at `command` yields garbage the caller must reject.
pub fn decode_login(encoded: &str, command: &str) -> Option<String> {
    let bytes = decode_hex(encoded)?;
    let command = command.as_bytes();
    if command.is_empty() || bytes.len() <= command.len() {
        return None;
    }
    let key: Vec<u32> = (0..command.len())
        .map(|i| ((command[i] as u32 + bytes[i]) % 255) ^ bytes[i + 1])
        .collect();
    let period = key_period(&key);

    let decoded: Vec<u8> = (1..bytes.len())
        .map(|i| {
            let mixed = bytes[i] ^ key[(i - 1) % period];
            ((mixed + 255 - bytes[i - 1]) % 255) as u8
        })
        .collect();
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_from_address() {
        assert_eq!(ipv4_salt(Ipv4Addr::new(127, 0, 0, 1)), "6875");
        assert_eq!(ipv4_salt(Ipv4Addr::new(192, 168, 1, 10)), "17455");
        assert_eq!(ipv4_salt(Ipv4Addr::new(255, 255, 255, 255)), "35955");
    }

    #[test]
    fn test_ipv6_is_rejected() {
        let result = salt_for("::1".parse().unwrap());
        assert!(matches!(result, Err(ProtocolError::UnsupportedAddressFamily(_))));
    }

    #[test]
    fn test_encoding_starts_with_initial_byte() {
        let encoded = encode_login("tetrisstart bob 1.13", "6875", 0xAB);
        assert!(encoded.starts_with("AB"));
        assert_eq!(encoded.len(), 2 * (1 + "tetrisstart bob 1.13".len()));
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_decode_recovers_login_for_any_salt_length() {
        let line = "tetrisstart alice 1.13";
        for salt in ["7", "688", "6875", "17427", "35955"] {
            for initial in [0u8, 17, 128, 254, 255] {
                let encoded = encode_login(line, salt, initial);
                assert_eq!(
                    decode_login(&encoded, "tetrisstart").as_deref(),
                    Some(line),
                    "salt {} initial {}",
                    salt,
                    initial
                );
            }
        }
    }

    #[test]
    fn test_wrong_command_does_not_decode_to_line() {
        let encoded = encode_login("tetrifaster carl 1.13", "17427", 42);
        let decoded = decode_login(&encoded, "tetrisstart");
        assert_ne!(decoded.as_deref(), Some("tetrifaster carl 1.13"));
    }

    #[test]
    fn test_invalid_hex_is_rejected() {
        assert!(decode_login("ABC", "tetrisstart").is_none());
        assert!(decode_login("ZZZZ", "tetrisstart").is_none());
        assert!(decode_login("ABCD", "tetrisstart").is_none());
    }
}
