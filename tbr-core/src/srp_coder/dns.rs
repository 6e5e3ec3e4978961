//! Plain DNS Update writer helpers used to rebuild decoded messages.

use super::CoderError;

pub(crate) const TYPE_SOA: u16 = 6;
pub(crate) const TYPE_PTR: u16 = 12;
pub(crate) const TYPE_TXT: u16 = 16;
pub(crate) const TYPE_SIG: u16 = 24;
pub(crate) const TYPE_KEY: u16 = 25;
pub(crate) const TYPE_AAAA: u16 = 28;
pub(crate) const TYPE_SRV: u16 = 33;
pub(crate) const TYPE_OPT: u16 = 41;
pub(crate) const TYPE_ANY: u16 = 255;

pub(crate) const CLASS_IN: u16 = 1;
pub(crate) const CLASS_NONE: u16 = 254;
pub(crate) const CLASS_ANY: u16 = 255;

/// Opcode UPDATE.
pub(crate) const UPDATE_FLAGS: [u8; 2] = [0x28, 0x00];

pub(crate) const KEY_FLAGS: [u8; 2] = [0x02, 0x01];
pub(crate) const KEY_PROTOCOL_DNSSEC: u8 = 3;
pub(crate) const ALGORITHM_ECDSA_P256_SHA256: u8 = 13;

/// Update lease option: class is the UDP payload size, TTL carries DO.
pub(crate) const OPT_UDP_PAYLOAD_SIZE: u16 = 1272;
pub(crate) const OPT_TTL: [u8; 4] = [0, 0, 0x80, 0];
pub(crate) const OPTION_UPDATE_LEASE: u16 = 2;
pub(crate) const UPDATE_LEASE_OPTION_LEN: u16 = 8;

const POINTER_FLAGS: u16 = 0xc000;
const MAX_POINTER_OFFSET: usize = 0x3fff;
const MAX_LABEL_LENGTH: usize = 63;

/// Header with zone count 1; the remaining counts are patched at the end.
pub(crate) fn append_update_header(out: &mut Vec<u8>, message_id: u16) {
    out.extend_from_slice(&message_id.to_be_bytes());
    out.extend_from_slice(&UPDATE_FLAGS);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&[0; 6]);
}

/// Sets the update (authority) and additional record counts.
pub(crate) fn patch_counts(out: &mut [u8], update_count: u16, additional_count: u16) {
    out[8..10].copy_from_slice(&update_count.to_be_bytes());
    out[10..12].copy_from_slice(&additional_count.to_be_bytes());
}

pub(crate) fn append_label(out: &mut Vec<u8>, label: &[u8]) -> Result<(), CoderError> {
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        return Err(CoderError::Parse);
    }
    out.push(label.len() as u8);
    out.extend_from_slice(label);
    Ok(())
}

pub(crate) fn append_labels(out: &mut Vec<u8>, labels: &[Vec<u8>]) -> Result<(), CoderError> {
    labels.iter().try_for_each(|label| append_label(out, label))
}

/// Compression pointer to a name earlier in `out`.
pub(crate) fn append_pointer(out: &mut Vec<u8>, offset: usize) -> Result<(), CoderError> {
    if offset > MAX_POINTER_OFFSET {
        return Err(CoderError::NoBufs);
    }
    out.extend_from_slice(&(POINTER_FLAGS | offset as u16).to_be_bytes());
    Ok(())
}

/// Appends type, class, TTL and a data length. Returns the record data
/// offset for `patch_rdata_len` when `rdata_len` is not yet known.
pub(crate) fn append_rr_header(out: &mut Vec<u8>, rr_type: u16, class: u16, ttl: &[u8; 4], rdata_len: u16) -> usize {
    out.extend_from_slice(&rr_type.to_be_bytes());
    out.extend_from_slice(&class.to_be_bytes());
    out.extend_from_slice(ttl);
    out.extend_from_slice(&rdata_len.to_be_bytes());
    out.len()
}

pub(crate) fn patch_rdata_len(out: &mut [u8], rdata_offset: usize) -> Result<(), CoderError> {
    let len = u16::try_from(out.len() - rdata_offset).map_err(|_| CoderError::NoBufs)?;
    out[rdata_offset - 2..rdata_offset].copy_from_slice(&len.to_be_bytes());
    Ok(())
}
