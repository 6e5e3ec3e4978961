//! Compact SRP Update codec.
//!
//! A coded message is a 3-byte header `[message id][dispatch]` followed by
//! self-describing blocks: the header block, zero or more service blocks,
//! one host block and one footer block. Decoding rebuilds the plain DNS
//! Update an uncompressed SRP client would have sent.

mod compact;
mod decoder;
mod dns;
mod encoder;
mod label;
mod txt;

use std::net::Ipv6Addr;

pub use decoder::decode;
pub use encoder::{encode_update, MsgEncoder};
pub use txt::TxtEntry;

pub const DEFAULT_DOMAIN_NAME: &str = "default.service.arpa.";
pub const DEFAULT_TTL: u32 = 7200;
pub const DEFAULT_LEASE: u32 = 7200;
pub const DEFAULT_KEY_LEASE: u32 = 1_209_600;

pub const ECDSA_KEY_SIZE: usize = 64;
pub const ECDSA_SIGNATURE_SIZE: usize = 64;

pub type EcdsaPublicKey = [u8; ECDSA_KEY_SIZE];
pub type EcdsaSignature = [u8; ECDSA_SIGNATURE_SIZE];

/// Back-reference tables keep at most this many label ranges and TXT
/// payload offsets. Anything beyond is encoded without being referable.
pub(crate) const MAX_SAVED_OFFSETS: usize = 16;

pub(crate) const HEADER_SIZE: usize = 3;

// Header dispatch: 0b0010_11zt
pub(crate) const HEADER_DISPATCH_CODE: u8 = 0x2c;
pub(crate) const HEADER_DISPATCH_CODE_MASK: u8 = 0xfc;
pub(crate) const HEADER_ZONE_FLAG: u8 = 0x02;
pub(crate) const HEADER_TTL_FLAG: u8 = 0x01;

// Block dispatch types (top 2 bits).
pub(crate) const BLOCK_TYPE_MASK: u8 = 0xc0;
pub(crate) const SERVICE_ADD: u8 = 0x00;
pub(crate) const SERVICE_REMOVE: u8 = 0x40;
pub(crate) const HOST_BLOCK: u8 = 0x80;
pub(crate) const FOOTER_BLOCK: u8 = 0xc0;

pub(crate) const SERVICE_PTR_TTL_FLAG: u8 = 0x20;
pub(crate) const SERVICE_SRV_TXT_TTL_FLAG: u8 = 0x10;
pub(crate) const SERVICE_SUB_TYPE_FLAG: u8 = 0x08;
pub(crate) const SERVICE_PRIORITY_FLAG: u8 = 0x04;
pub(crate) const SERVICE_WEIGHT_FLAG: u8 = 0x02;
pub(crate) const SERVICE_TXT_DATA_FLAG: u8 = 0x01;

pub(crate) const HOST_ADDR_TTL_FLAG: u8 = 0x20;
pub(crate) const HOST_ADDR_LIST_FLAG: u8 = 0x10;
pub(crate) const HOST_KEY_TTL_FLAG: u8 = 0x08;
pub(crate) const HOST_KEY_FLAG: u8 = 0x04;

pub(crate) const ADDR_CONTEXT_FLAG: u8 = 0x80;
pub(crate) const ADDR_MORE_FLAG: u8 = 0x40;
pub(crate) const ADDR_CONTEXT_ID_MASK: u8 = 0x0f;

pub(crate) const FOOTER_LEASE_FLAG: u8 = 0x10;
pub(crate) const FOOTER_KEY_LEASE_FLAG: u8 = 0x08;
pub(crate) const FOOTER_SIGN_MASK: u8 = 0x03;
pub(crate) const FOOTER_SIGN_ELIDED: u8 = 0x00;
pub(crate) const FOOTER_SIGN_64: u8 = 0x01;

pub(crate) const TXT_REFER_FLAG: u8 = 0x80;
pub(crate) const TXT_FIRST_SEGMENT_BITS: u8 = 7;

/// Error encoding or decoding a compact SRP message.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum CoderError {
    #[error("invalid arguments")]
    InvalidArgs,
    #[error("malformed coded message")]
    Parse,
    #[error("message exceeds the maximum size")]
    NoBufs,
}

/// Cheap discriminator: true when `buf` starts with a coded header.
/// A true result does not mean the message decodes.
pub fn is_encoded(buf: &[u8]) -> bool {
    buf.len() > HEADER_SIZE && buf[2] & HEADER_DISPATCH_CODE_MASK == HEADER_DISPATCH_CODE
}

/// Compares two domain names ignoring ASCII case and a trailing dot.
pub fn is_same_domain(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Add,
    Remove,
}

/// One service instance registered (or removed) by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpService {
    pub action: ServiceAction,
    /// Single label, may contain dots.
    pub instance_label: String,
    /// Service type name without the domain, e.g. `_matter._tcp`.
    pub service_name: String,
    pub sub_type_labels: Vec<String>,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub txt_entries: Vec<TxtEntry>,
}

impl SrpService {
    pub fn new(instance_label: &str, service_name: &str, port: u16) -> Self {
        Self {
            action: ServiceAction::Add,
            instance_label: instance_label.to_string(),
            service_name: service_name.to_string(),
            sub_type_labels: Vec::new(),
            port,
            priority: 0,
            weight: 0,
            txt_entries: Vec::new(),
        }
    }

    pub fn is_removing(&self) -> bool {
        self.action == ServiceAction::Remove
    }
}

/// Everything an SRP client puts in one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpUpdate {
    pub message_id: u16,
    pub domain_name: String,
    pub default_ttl: u32,
    /// Host name without the domain.
    pub host_name: String,
    pub services: Vec<SrpService>,
    pub addresses: Vec<Ipv6Addr>,
    pub key: EcdsaPublicKey,
    pub lease: u32,
    pub key_lease: u32,
    pub signature: EcdsaSignature,
}

impl SrpUpdate {
    pub fn new(message_id: u16, host_name: &str) -> Self {
        Self {
            message_id,
            domain_name: DEFAULT_DOMAIN_NAME.to_string(),
            default_ttl: DEFAULT_TTL,
            host_name: host_name.to_string(),
            services: Vec::new(),
            addresses: Vec::new(),
            key: [0; ECDSA_KEY_SIZE],
            lease: DEFAULT_LEASE,
            key_lease: DEFAULT_KEY_LEASE,
            signature: [0; ECDSA_SIGNATURE_SIZE],
        }
    }
}
