// MIT License - Copyright (c) 2026 Peter Wright
// TPI frame codec

use std::fmt;

use crate::constants::MAX_COMMAND_CODE;
use crate::error::{EvlError, Result};

/// A single TPI packet: a three-digit command code and its payload.
///
/// # Wire Format
///
/// ```text
/// <3-digit zero-padded code><data><2 uppercase hex digits checksum>
/// ```
///
/// The checksum is the low byte of the sum of every character of the code
/// digits and the data. Frames are terminated by CRLF on the wire; the codec
/// itself never sees the terminator.
///
/// ```
/// use evl_bridge::Packet;
///
/// let packet = Packet::new(654, "3").unwrap();
/// assert_eq!(packet.serialize(), "6543D2");
/// assert_eq!(Packet::deserialize("6543D2").unwrap(), packet);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    code: u16,
    data: String,
}

impl Packet {
    /// Build a packet, rejecting codes that do not fit in three digits.
    pub fn new(code: u16, data: impl Into<String>) -> Result<Self> {
        if code > MAX_COMMAND_CODE {
            return Err(EvlError::validation(format!(
                "command code {} exceeds {}",
                code, MAX_COMMAND_CODE
            )));
        }
        Ok(Self {
            code,
            data: data.into(),
        })
    }

    /// Build a packet with no payload.
    ///
    /// Only meant for the crate's own code constants, which are all in range.
    pub(crate) fn command(code: u16) -> Self {
        debug_assert!(code <= MAX_COMMAND_CODE);
        Self {
            code,
            data: String::new(),
        }
    }

    /// Payload-carrying counterpart of [`Packet::command`].
    pub(crate) fn with_data(code: u16, data: impl Into<String>) -> Self {
        debug_assert!(code <= MAX_COMMAND_CODE);
        Self {
            code,
            data: data.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    fn code_str(&self) -> String {
        format!("{:03}", self.code)
    }

    /// Two uppercase hex digits of the checksum over code and data.
    pub fn checksum(&self) -> String {
        checksum_hex(&self.code_str(), &self.data)
    }

    /// Render the packet as it appears on the wire, without the line terminator.
    pub fn serialize(&self) -> String {
        let code = self.code_str();
        let checksum = checksum_hex(&code, &self.data);
        let mut out = String::with_capacity(code.len() + self.data.len() + 2);
        out.push_str(&code);
        out.push_str(&self.data);
        out.push_str(&checksum);
        out
    }

    /// Parse one received line.
    ///
    /// A trailing CR/LF is tolerated. Fails with [`EvlError::Frame`] when the
    /// line is too short, the code is not numeric, or the checksum does not
    /// match.
    pub fn deserialize(line: &str) -> Result<Self> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let bytes = trimmed.as_bytes();
        if bytes.len() < 5 {
            return Err(EvlError::frame(line, "frame shorter than 5 bytes"));
        }
        if !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(EvlError::frame(line, "command code is not numeric"));
        }
        let split = bytes.len() - 2;
        if !trimmed.is_char_boundary(split) || !bytes[split..].iter().all(u8::is_ascii) {
            return Err(EvlError::frame(line, "checksum is not ASCII"));
        }

        let code_str = &trimmed[..3];
        let data = &trimmed[3..split];
        let found = &trimmed[split..];
        let expected = checksum_hex(code_str, data);
        if expected != found {
            return Err(EvlError::frame(
                line,
                format!("checksum match failed, expected={}, found={}", expected, found),
            ));
        }

        // Three ASCII digits always parse and never exceed 999
        let code = code_str
            .parse::<u16>()
            .map_err(|e| EvlError::frame(line, e.to_string()))?;
        Ok(Self {
            code,
            data: data.to_string(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}[{}]", self.code, self.data)
    }
}

fn checksum_hex(code: &str, data: &str) -> String {
    let sum = code
        .bytes()
        .chain(data.bytes())
        .fold(0u32, |acc, b| acc.wrapping_add(b as u32));
    format!("{:02X}", sum & 0xFF)
}

/// Parse the leading partition digit of an event payload.
pub fn parse_partition(data: &str) -> Option<u8> {
    data.get(0..1)?.parse().ok()
}

/// Parse a zero-padded numeric field at `range` of an event payload.
pub fn parse_field(data: &str, range: std::ops::Range<usize>) -> Option<u16> {
    let field = data.get(range)?;
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_sum(s: &str) -> u32 {
        s.bytes().map(|b| b as u32).sum()
    }

    #[test]
    fn test_serialize_partition_alarm() {
        let packet = Packet::new(654, "3").unwrap();
        let expected = format!("6543{:02X}", ascii_sum("6543") & 0xFF);
        assert_eq!(packet.serialize(), expected);
        assert_eq!(Packet::deserialize(&expected).unwrap(), packet);
    }

    #[test]
    fn test_serialize_zero_pads_code() {
        let packet = Packet::new(5, "jkfdhgfdhgjf").unwrap();
        let wire = packet.serialize();
        assert!(wire.starts_with("005jkfdhgfdhgjf"));
        assert_eq!(wire.len(), 3 + 12 + 2);
        assert_eq!(Packet::deserialize(&wire).unwrap(), packet);
    }

    #[test]
    fn test_known_frames() {
        // Frames as documented for the TPI
        assert_eq!(Packet::command(1).serialize(), "00191");
        assert_eq!(Packet::new(500, "000").unwrap().serialize(), "50000025");
        assert_eq!(Packet::new(505, "3").unwrap().serialize(), "5053CD");
    }

    #[test]
    fn test_roundtrip_long_payload() {
        let packet = Packet::new(654, "3456789123456789").unwrap();
        assert_eq!(Packet::deserialize(&packet.serialize()).unwrap(), packet);
    }

    #[test]
    fn test_roundtrip_code_range() {
        for code in [0u16, 1, 9, 10, 99, 100, 500, 999] {
            for data in ["", "1", "1234", "a b~c", "\"quoted\""] {
                let packet = Packet::new(code, data).unwrap();
                assert_eq!(Packet::deserialize(&packet.serialize()).unwrap(), packet);
            }
        }
    }

    #[test]
    fn test_checksum_flip_rejected() {
        let wire = Packet::new(609, "012").unwrap().serialize();
        let split = wire.len() - 2;
        for pos in split..wire.len() {
            for replacement in "0123456789ABCDEF".chars() {
                if wire.as_bytes()[pos] as char == replacement {
                    continue;
                }
                let mut corrupted = wire.clone();
                corrupted.replace_range(pos..pos + 1, &replacement.to_string());
                assert!(
                    Packet::deserialize(&corrupted).is_err(),
                    "corrupted frame {} accepted",
                    corrupted
                );
            }
        }
    }

    #[test]
    fn test_lowercase_checksum_rejected() {
        let wire = Packet::new(654, "3").unwrap().serialize();
        assert!(Packet::deserialize(&wire.to_lowercase()).is_err());
    }

    #[test]
    fn test_deserialize_strips_terminator() {
        let packet = Packet::new(500, "000").unwrap();
        let line = format!("{}\r\n", packet.serialize());
        assert_eq!(Packet::deserialize(&line).unwrap(), packet);
    }

    #[test]
    fn test_deserialize_rejects_short_and_non_numeric() {
        assert!(matches!(Packet::deserialize("5002"), Err(EvlError::Frame { .. })));
        assert!(matches!(Packet::deserialize(""), Err(EvlError::Frame { .. })));
        assert!(matches!(Packet::deserialize("AB1000"), Err(EvlError::Frame { .. })));
    }

    #[test]
    fn test_deserialize_rejects_multibyte_tail() {
        assert!(Packet::deserialize("500€").is_err());
    }

    #[test]
    fn test_new_rejects_large_code() {
        assert!(matches!(Packet::new(1000, ""), Err(EvlError::Validation(_))));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_partition("1012"), Some(1));
        assert_eq!(parse_partition(""), None);
        assert_eq!(parse_field("1012", 1..4), Some(12));
        assert_eq!(parse_field("1a12", 1..4), None);
        assert_eq!(parse_field("10", 1..4), None);
    }
}
