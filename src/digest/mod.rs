//
// Copyright (c) 2025 Nathan Fiedler
//

//! 128-bit content identity used to fingerprint files and chunks in reports.
//!
//! This is unrelated to the block hash keying the dedup index; it only gives
//! a stable, printable name to a byte range.
use byteorder::{BigEndian, ReadBytesExt};
use md5::{Digest, Md5};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

///
/// Unsigned 128-bit value held as two 64-bit halves.
///
/// Ordering compares the high half first, so it agrees with the numeric
/// order of the full value and with the lexical order of [`to_hex`](U128::to_hex).
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct U128 {
    pub hi: u64,
    pub lo: u64,
}

impl U128 {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Interpret 16 bytes as a big-endian number.
    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        let mut rdr = Cursor::new(&bytes[..]);
        // reading from a 16 byte array cannot come up short
        let hi = rdr.read_u64::<BigEndian>().unwrap_or_default();
        let lo = rdr.read_u64::<BigEndian>().unwrap_or_default();
        Self { hi, lo }
    }

    pub fn to_be_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.hi.to_be_bytes());
        bytes[8..].copy_from_slice(&self.lo.to_be_bytes());
        bytes
    }

    /// Lowercase hexadecimal, always 32 digits.
    pub fn to_hex(self) -> String {
        hex::encode(self.to_be_bytes())
    }

    ///
    /// Parse a hexadecimal string of at most 32 digits.
    ///
    /// Surrounding whitespace and a leading `0x` are ignored; shorter input
    /// is treated as having leading zeros.
    ///
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.len() > 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let padded = format!("{digits:0>32}");
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(Self::from_be_bytes(bytes))
    }
}

impl fmt::Display for U128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

impl FromStr for U128 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<u128> for U128 {
    fn from(value: u128) -> Self {
        Self {
            hi: (value >> 64) as u64,
            lo: value as u64,
        }
    }
}

/// MD5 digest of `data`.
pub fn md5(data: &[u8]) -> U128 {
    let mut hasher = Md5::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..]);
    U128::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_values() {
        assert_eq!(md5(b"").to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            md5(b"The quick brown fox jumps over the lazy dog").to_hex(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_display_matches_hex() {
        let value = U128::new(0x0102, 0xdead_beef);
        assert_eq!(format!("{value}"), value.to_hex());
        assert_eq!(value.to_hex(), "000000000000010200000000deadbeef");
    }

    #[test]
    fn test_from_hex() {
        let value = U128::from_hex("  0xDEADbeef \n").unwrap();
        assert_eq!(value, U128::new(0, 0xdead_beef));
        let full = "9e107d9d372bb6826bd81d3542a419d6";
        assert_eq!(U128::from_hex(full).unwrap().to_hex(), full);
        assert_eq!("abc".parse::<U128>().unwrap(), U128::new(0, 0xabc));
        assert_eq!(U128::from_hex("").unwrap(), U128::default());
        assert!(U128::from_hex("xyz").is_err());
        assert!(U128::from_hex(&"1".repeat(33)).is_err());
    }

    #[test]
    fn test_ordering() {
        let small = U128::new(0, u64::MAX);
        let large = U128::new(1, 0);
        assert!(small < large);
        assert!(small.to_hex() < large.to_hex());
        assert_eq!(U128::from(u128::MAX), U128::new(u64::MAX, u64::MAX));
        assert_eq!(U128::from(1u128 << 64), large);
    }
}
