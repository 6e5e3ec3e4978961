//! IPv6 prefix type and address classification helpers.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// IPv6 prefix. Bits beyond `length` are always zero, so the derived
/// ordering (bytes, then length) puts numerically smaller prefixes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Prefix {
    bytes: [u8; 16],
    length: u8,
}

/// Error parsing a prefix from text.
#[derive(Debug, thiserror::Error)]
pub enum PrefixParseError {
    #[error("missing '/' in prefix")]
    MissingLength,
    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("invalid prefix length")]
    Length,
}

impl Prefix {
    /// `::/0`.
    pub const fn empty() -> Self {
        Self {
            bytes: [0; 16],
            length: 0,
        }
    }

    pub fn new(addr: Ipv6Addr, length: u8) -> Self {
        Self::from_bytes(&addr.octets(), length)
    }

    /// Build from the leading bytes of a prefix field; missing bytes are zero.
    pub fn from_bytes(bytes: &[u8], length: u8) -> Self {
        let length = length.min(128);
        let mut out = [0u8; 16];
        let n = bytes.len().min(16);
        out[..n].copy_from_slice(&bytes[..n]);
        mask_bits(&mut out, length);
        Self { bytes: out, length }
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.bytes)
    }

    pub fn bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_link_local(&self) -> bool {
        self.length >= 10 && self.bytes[0] == 0xfe && (self.bytes[1] & 0xc0) == 0x80
    }

    pub fn is_multicast(&self) -> bool {
        self.length >= 8 && self.bytes[0] == 0xff
    }

    /// fc00::/7.
    pub fn is_unique_local(&self) -> bool {
        self.length >= 7 && (self.bytes[0] & 0xfe) == 0xfc
    }

    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        let mut masked = addr.octets();
        mask_bits(&mut masked, self.length);
        masked == self.bytes
    }
}

fn mask_bits(bytes: &mut [u8; 16], length: u8) {
    let length = usize::from(length);
    for (i, b) in bytes.iter_mut().enumerate() {
        let start = i * 8;
        if start >= length {
            *b = 0;
        } else if start + 8 > length {
            *b &= 0xffu8 << (start + 8 - length);
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.length)
    }
}

impl FromStr for Prefix {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s.split_once('/').ok_or(PrefixParseError::MissingLength)?;
        let addr: Ipv6Addr = addr.trim().parse()?;
        let len: u8 = len.trim().parse().map_err(|_| PrefixParseError::Length)?;
        if len > 128 {
            return Err(PrefixParseError::Length);
        }
        Ok(Prefix::new(addr, len))
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// ff02::2
pub const LINK_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);

pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
