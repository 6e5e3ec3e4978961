//! Neighbor Discovery wire format: RA header and options (PIO, RIO,
//! RDNSS), NA parsing, RS/NS building. Checksums are left zero for the
//! platform to fill in.

use std::net::Ipv6Addr;

use serde::Serialize;

use crate::ip6::Prefix;

pub const ICMP6_TYPE_ROUTER_SOLICIT: u8 = 133;
pub const ICMP6_TYPE_ROUTER_ADVERT: u8 = 134;
pub const ICMP6_TYPE_NEIGHBOR_SOLICIT: u8 = 135;
pub const ICMP6_TYPE_NEIGHBOR_ADVERT: u8 = 136;

pub const OPTION_SOURCE_LINK_LAYER_ADDR: u8 = 1;
pub const OPTION_PREFIX_INFO: u8 = 3;
pub const OPTION_ROUTE_INFO: u8 = 24;
pub const OPTION_RECURSIVE_DNS_SERVER: u8 = 25;

/// Option lengths are in units of 8 octets.
const LENGTH_UNIT: usize = 8;
const RA_HEADER_SIZE: usize = 16;
const NA_SIZE: usize = 24;
const PREFERENCE_OFFSET: u8 = 3;
const PREFERENCE_MASK: u8 = 3 << PREFERENCE_OFFSET;

/// Error parsing an ND message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NdParseError {
    #[error("message too short")]
    TooShort,
    #[error("unexpected ICMPv6 type {0}")]
    UnexpectedType(u8),
    #[error("unexpected ICMPv6 code {0}")]
    UnexpectedCode(u8),
}

/// Route preference (RFC 4191 §2.1). The reserved value `10` reads as medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum RoutePreference {
    Low,
    #[default]
    Medium,
    High,
}

impl RoutePreference {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0b01 => RoutePreference::High,
            0b11 => RoutePreference::Low,
            _ => RoutePreference::Medium,
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            RoutePreference::High => 0b01,
            RoutePreference::Medium => 0b00,
            RoutePreference::Low => 0b11,
        }
    }

    /// Signed form: -1, 0, +1.
    pub fn as_i8(self) -> i8 {
        match self {
            RoutePreference::Low => -1,
            RoutePreference::Medium => 0,
            RoutePreference::High => 1,
        }
    }
}

/// Router Advertisement header (everything after type/code/checksum plus those).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RaHeader {
    pub cur_hop_limit: u8,
    pub flags: u8,
    pub router_lifetime: u16,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub checksum: u16,
}

impl RaHeader {
    pub const MANAGED_ADDRESS_CONFIG_FLAG: u8 = 0x80;
    pub const OTHER_CONFIG_FLAG: u8 = 0x40;
    pub const SNAC_ROUTER_FLAG: u8 = 0x02;

    pub fn parse(bytes: &[u8]) -> Result<Self, NdParseError> {
        if bytes.len() < RA_HEADER_SIZE {
            return Err(NdParseError::TooShort);
        }
        if bytes[0] != ICMP6_TYPE_ROUTER_ADVERT {
            return Err(NdParseError::UnexpectedType(bytes[0]));
        }
        Ok(Self {
            checksum: be16(&bytes[2..]),
            cur_hop_limit: bytes[4],
            flags: bytes[5],
            router_lifetime: be16(&bytes[6..]),
            reachable_time: be32(&bytes[8..]),
            retrans_timer: be32(&bytes[12..]),
        })
    }

    pub fn to_bytes(&self) -> [u8; RA_HEADER_SIZE] {
        let mut out = [0u8; RA_HEADER_SIZE];
        out[0] = ICMP6_TYPE_ROUTER_ADVERT;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4] = self.cur_hop_limit;
        out[5] = self.flags;
        out[6..8].copy_from_slice(&self.router_lifetime.to_be_bytes());
        out[8..12].copy_from_slice(&self.reachable_time.to_be_bytes());
        out[12..16].copy_from_slice(&self.retrans_timer.to_be_bytes());
        out
    }

    pub fn is_managed_address_config_flag_set(&self) -> bool {
        self.flags & Self::MANAGED_ADDRESS_CONFIG_FLAG != 0
    }

    pub fn set_managed_address_config_flag(&mut self) {
        self.flags |= Self::MANAGED_ADDRESS_CONFIG_FLAG;
    }

    pub fn is_other_config_flag_set(&self) -> bool {
        self.flags & Self::OTHER_CONFIG_FLAG != 0
    }

    pub fn set_other_config_flag(&mut self) {
        self.flags |= Self::OTHER_CONFIG_FLAG;
    }

    pub fn is_snac_router_flag_set(&self) -> bool {
        self.flags & Self::SNAC_ROUTER_FLAG != 0
    }

    pub fn default_router_preference(&self) -> RoutePreference {
        RoutePreference::from_bits((self.flags & PREFERENCE_MASK) >> PREFERENCE_OFFSET)
    }

    pub fn set_default_router_preference(&mut self, preference: RoutePreference) {
        self.flags = (self.flags & !PREFERENCE_MASK) | (preference.to_bits() << PREFERENCE_OFFSET);
    }
}

/// A received RA: header plus raw option bytes.
#[derive(Debug, Clone, Copy)]
pub struct RouterAdvert<'a> {
    header: RaHeader,
    options: &'a [u8],
}

impl<'a> RouterAdvert<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, NdParseError> {
        let header = RaHeader::parse(bytes)?;
        Ok(Self {
            header,
            options: &bytes[RA_HEADER_SIZE..],
        })
    }

    pub fn header(&self) -> &RaHeader {
        &self.header
    }

    pub fn options(&self) -> OptionIter<'a> {
        OptionIter {
            remaining: self.options,
        }
    }
}

/// One ND option: type and full bytes (including type and length).
#[derive(Debug, Clone, Copy)]
pub struct RawOption<'a> {
    pub kind: u8,
    pub bytes: &'a [u8],
}

/// Walks ND options. Stops at a zero length or an option running past the end.
pub struct OptionIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = RawOption<'a>;

    fn next(&mut self) -> Option<RawOption<'a>> {
        if self.remaining.len() < 2 {
            return None;
        }
        let size = usize::from(self.remaining[1]) * LENGTH_UNIT;
        if size == 0 || size > self.remaining.len() {
            self.remaining = &[];
            return None;
        }
        let (bytes, rest) = self.remaining.split_at(size);
        self.remaining = rest;
        Some(RawOption {
            kind: bytes[0],
            bytes,
        })
    }
}

/// Prefix Information Option (RFC 4861 §4.6.2, P flag per RFC 9762).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixInfoOption {
    pub prefix: Prefix,
    pub flags: u8,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
}

impl PrefixInfoOption {
    pub const ON_LINK_FLAG: u8 = 0x80;
    pub const AUTO_ADDR_CONFIG_FLAG: u8 = 0x40;
    pub const DHCP6_PD_PREFERRED_FLAG: u8 = 0x10;
    const SIZE: usize = 32;

    /// None if the option is malformed.
    pub fn parse(option: &RawOption<'_>) -> Option<Self> {
        let b = option.bytes;
        if option.kind != OPTION_PREFIX_INFO || b.len() < Self::SIZE {
            return None;
        }
        let prefix_length = b[2];
        let valid_lifetime = be32(&b[4..]);
        let preferred_lifetime = be32(&b[8..]);
        if prefix_length > 128 || preferred_lifetime > valid_lifetime {
            return None;
        }
        Some(Self {
            prefix: Prefix::from_bytes(&b[16..32], prefix_length),
            flags: b[3],
            valid_lifetime,
            preferred_lifetime,
        })
    }

    pub fn is_on_link_flag_set(&self) -> bool {
        self.flags & Self::ON_LINK_FLAG != 0
    }

    pub fn is_auto_addr_config_flag_set(&self) -> bool {
        self.flags & Self::AUTO_ADDR_CONFIG_FLAG != 0
    }

    pub fn is_dhcp6_pd_preferred_flag_set(&self) -> bool {
        self.flags & Self::DHCP6_PD_PREFERRED_FLAG != 0
    }
}

/// Route Information Option (RFC 4191 §2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfoOption {
    pub prefix: Prefix,
    pub preference: RoutePreference,
    pub route_lifetime: u32,
}

impl RouteInfoOption {
    pub fn parse(option: &RawOption<'_>) -> Option<Self> {
        let b = option.bytes;
        if option.kind != OPTION_ROUTE_INFO || b.len() < LENGTH_UNIT {
            return None;
        }
        let prefix_length = b[2];
        if prefix_length > 128 || b.len() < Self::option_size_for(prefix_length) {
            return None;
        }
        Some(Self {
            prefix: Prefix::from_bytes(&b[8..], prefix_length),
            preference: RoutePreference::from_bits((b[3] & PREFERENCE_MASK) >> PREFERENCE_OFFSET),
            route_lifetime: be32(&b[4..]),
        })
    }

    fn option_size_for(prefix_length: u8) -> usize {
        match prefix_length {
            0 => LENGTH_UNIT,
            1..=64 => 2 * LENGTH_UNIT,
            _ => 3 * LENGTH_UNIT,
        }
    }
}

/// Recursive DNS Server Option (RFC 8106 §5.1).
#[derive(Debug, Clone, Copy)]
pub struct RdnssOption<'a> {
    pub lifetime: u32,
    addresses: &'a [u8],
}

impl<'a> RdnssOption<'a> {
    pub fn parse(option: &RawOption<'a>) -> Option<Self> {
        let b = option.bytes;
        let units = b.len() / LENGTH_UNIT;
        if option.kind != OPTION_RECURSIVE_DNS_SERVER || units < 3 || (units - 1) % 2 != 0 {
            return None;
        }
        Some(Self {
            lifetime: be32(&b[4..]),
            addresses: &b[8..],
        })
    }

    pub fn addresses(&self) -> impl Iterator<Item = Ipv6Addr> + 'a {
        self.addresses.chunks_exact(16).map(|c| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(c);
            Ipv6Addr::from(octets)
        })
    }
}

/// Received Neighbor Advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborAdvert {
    pub flags: u8,
    pub target: Ipv6Addr,
}

impl NeighborAdvert {
    pub fn parse(bytes: &[u8]) -> Result<Self, NdParseError> {
        if bytes.len() < NA_SIZE {
            return Err(NdParseError::TooShort);
        }
        if bytes[0] != ICMP6_TYPE_NEIGHBOR_ADVERT {
            return Err(NdParseError::UnexpectedType(bytes[0]));
        }
        if bytes[1] != 0 {
            return Err(NdParseError::UnexpectedCode(bytes[1]));
        }
        let mut target = [0u8; 16];
        target.copy_from_slice(&bytes[8..24]);
        Ok(Self {
            flags: bytes[4],
            target: Ipv6Addr::from(target),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; NA_SIZE];
        out[0] = ICMP6_TYPE_NEIGHBOR_ADVERT;
        out[4] = self.flags;
        out[8..24].copy_from_slice(&self.target.octets());
        out
    }
}

/// Router Solicitation with no options.
pub fn router_solicit() -> Vec<u8> {
    let mut out = vec![0u8; 8];
    out[0] = ICMP6_TYPE_ROUTER_SOLICIT;
    out
}

/// Neighbor Solicitation for `target`, with a source link-layer address
/// option when `link_layer_addr` is given.
pub fn neighbor_solicit(target: &Ipv6Addr, link_layer_addr: Option<&[u8]>) -> Vec<u8> {
    let mut out = vec![0u8; 24];
    out[0] = ICMP6_TYPE_NEIGHBOR_SOLICIT;
    out[8..24].copy_from_slice(&target.octets());
    if let Some(lla) = link_layer_addr {
        let size = (2 + lla.len()).div_ceil(LENGTH_UNIT) * LENGTH_UNIT;
        let start = out.len();
        out.resize(start + size, 0);
        out[start] = OPTION_SOURCE_LINK_LAYER_ADDR;
        out[start + 1] = (size / LENGTH_UNIT) as u8;
        out[start + 2..start + 2 + lla.len()].copy_from_slice(lla);
    }
    out
}

/// Builds an RA message option by option.
#[derive(Debug, Clone)]
pub struct RouterAdvertBuilder {
    buf: Vec<u8>,
}

impl RouterAdvertBuilder {
    pub fn new(header: &RaHeader) -> Self {
        Self {
            buf: header.to_bytes().to_vec(),
        }
    }

    pub fn prefix_info(mut self, prefix: &Prefix, flags: u8, valid: u32, preferred: u32) -> Self {
        let mut opt = [0u8; PrefixInfoOption::SIZE];
        opt[0] = OPTION_PREFIX_INFO;
        opt[1] = (PrefixInfoOption::SIZE / LENGTH_UNIT) as u8;
        opt[2] = prefix.length();
        opt[3] = flags;
        opt[4..8].copy_from_slice(&valid.to_be_bytes());
        opt[8..12].copy_from_slice(&preferred.to_be_bytes());
        opt[16..32].copy_from_slice(prefix.bytes());
        self.buf.extend_from_slice(&opt);
        self
    }

    pub fn route_info(mut self, prefix: &Prefix, preference: RoutePreference, lifetime: u32) -> Self {
        let size = RouteInfoOption::option_size_for(prefix.length());
        let mut opt = vec![0u8; size];
        opt[0] = OPTION_ROUTE_INFO;
        opt[1] = (size / LENGTH_UNIT) as u8;
        opt[2] = prefix.length();
        opt[3] = preference.to_bits() << PREFERENCE_OFFSET;
        opt[4..8].copy_from_slice(&lifetime.to_be_bytes());
        opt[8..].copy_from_slice(&prefix.bytes()[..size - LENGTH_UNIT]);
        self.buf.extend_from_slice(&opt);
        self
    }

    pub fn rdnss(mut self, lifetime: u32, addresses: &[Ipv6Addr]) -> Self {
        let units = 1 + 2 * addresses.len();
        self.buf.push(OPTION_RECURSIVE_DNS_SERVER);
        self.buf.push(units as u8);
        self.buf.extend_from_slice(&[0, 0]);
        self.buf.extend_from_slice(&lifetime.to_be_bytes());
        for addr in addresses {
            self.buf.extend_from_slice(&addr.octets());
        }
        self
    }

    /// Appends an arbitrary option (type, body padded to 8-octet units).
    pub fn raw_option(mut self, kind: u8, body: &[u8]) -> Self {
        let size = (2 + body.len()).div_ceil(LENGTH_UNIT) * LENGTH_UNIT;
        let start = self.buf.len();
        self.buf.resize(start + size, 0);
        self.buf[start] = kind;
        self.buf[start + 1] = (size / LENGTH_UNIT) as u8;
        self.buf[start + 2..start + 2 + body.len()].copy_from_slice(body);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}
