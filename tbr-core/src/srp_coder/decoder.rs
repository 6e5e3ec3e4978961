//! Rebuilds a plain DNS Update from a coded SRP message.
//!
//! The output uses compression pointers to the zone, service, instance,
//! sub-type and host names it has already written, the same layout an
//! uncompressed SRP client produces.

use std::net::Ipv6Addr;

use tracing::{debug, warn};

use super::compact::Cursor;
use super::dns::{self, append_labels, append_pointer, append_rr_header, patch_rdata_len};
use super::label::{read_label, read_name};
use super::*;
use crate::netdata::NetworkData;

const SUB_TYPE_LABEL: &[u8] = b"_sub";
const KEY_RDATA_LEN: u16 = 4 + ECDSA_KEY_SIZE as u16;
const SIG_FIXED_RDATA_LEN: usize = 18;

/// Decodes `coded` into a DNS Update message. Nothing is returned unless
/// the whole message decodes.
pub fn decode(coded: &[u8], network_data: &dyn NetworkData) -> Result<Vec<u8>, CoderError> {
    if !is_encoded(coded) {
        return Err(CoderError::InvalidArgs);
    }

    let result = MsgDecoder::new(coded, network_data).decode();
    match &result {
        Ok(msg) => debug!("srp coder: decoded {} bytes into {}", coded.len(), msg.len()),
        Err(e) => warn!("srp coder: failed to decode {} byte message: {}", coded.len(), e),
    }
    result
}

struct MsgDecoder<'a> {
    cur: Cursor<'a>,
    network_data: &'a dyn NetworkData,
    out: Vec<u8>,
    default_ttl: u32,
    update_count: u16,
    additional_count: u16,
    domain_offset: usize,
    host_name: Vec<Vec<u8>>,
    host_name_offset: Option<usize>,
}

fn ttl_bytes(ttl: u32) -> [u8; 4] {
    ttl.to_be_bytes()
}

impl<'a> MsgDecoder<'a> {
    fn new(coded: &'a [u8], network_data: &'a dyn NetworkData) -> Self {
        Self {
            cur: Cursor::new(coded),
            network_data,
            out: Vec::with_capacity(coded.len() * 3),
            default_ttl: DEFAULT_TTL,
            update_count: 0,
            additional_count: 0,
            domain_offset: 0,
            host_name: Vec::new(),
            host_name_offset: None,
        }
    }

    fn decode(mut self) -> Result<Vec<u8>, CoderError> {
        self.decode_header_block()?;

        let host_dispatch = loop {
            let dispatch = self.cur.read_u8()?;
            match dispatch & BLOCK_TYPE_MASK {
                SERVICE_ADD | SERVICE_REMOVE => self.decode_service_block(dispatch)?,
                _ => break dispatch,
            }
        };

        self.decode_host_block(host_dispatch)?;
        self.decode_footer_block()?;

        if self.out.len() > usize::from(u16::MAX) {
            return Err(CoderError::NoBufs);
        }
        dns::patch_counts(&mut self.out, self.update_count, self.additional_count);
        Ok(self.out)
    }

    fn count_update(&mut self) -> Result<(), CoderError> {
        self.update_count = self.update_count.checked_add(1).ok_or(CoderError::NoBufs)?;
        Ok(())
    }

    fn decode_header_block(&mut self) -> Result<(), CoderError> {
        let id = self.cur.read_bytes(2)?;
        let dispatch = self.cur.read_u8()?;
        dns::append_update_header(&mut self.out, u16::from_be_bytes([id[0], id[1]]));

        self.domain_offset = self.out.len();
        if dispatch & HEADER_ZONE_FLAG != 0 {
            let domain = read_name(&mut self.cur)?;
            append_labels(&mut self.out, &domain)?;
        } else {
            for label in DEFAULT_DOMAIN_NAME.split('.').filter(|l| !l.is_empty()) {
                dns::append_label(&mut self.out, label.as_bytes())?;
            }
        }
        self.out.push(0);
        self.out.extend_from_slice(&dns::TYPE_SOA.to_be_bytes());
        self.out.extend_from_slice(&dns::CLASS_IN.to_be_bytes());

        if dispatch & HEADER_TTL_FLAG != 0 {
            self.default_ttl = self.cur.read_compact_uint(8)?;
        }

        self.host_name = read_name(&mut self.cur)?;
        Ok(())
    }

    fn append_host_name(&mut self) -> Result<(), CoderError> {
        match self.host_name_offset {
            Some(offset) => append_pointer(&mut self.out, offset),
            None => {
                self.host_name_offset = Some(self.out.len());
                append_labels(&mut self.out, &self.host_name)?;
                append_pointer(&mut self.out, self.domain_offset)
            }
        }
    }

    /// Delete-all-RRsets pseudo record for the name just written.
    fn append_delete_all(&mut self) {
        append_rr_header(&mut self.out, dns::TYPE_ANY, dns::CLASS_ANY, &ttl_bytes(0), 0);
    }

    fn decode_service_block(&mut self, dispatch: u8) -> Result<(), CoderError> {
        let removing = dispatch & BLOCK_TYPE_MASK == SERVICE_REMOVE;
        let mut ptr_ttl = self.default_ttl;
        let mut srv_ttl = self.default_ttl;

        if !removing {
            if dispatch & SERVICE_PTR_TTL_FLAG != 0 {
                ptr_ttl = self.cur.read_compact_uint(8)?;
            }
            if dispatch & SERVICE_SRV_TXT_TTL_FLAG != 0 {
                srv_ttl = self.cur.read_compact_uint(8)?;
            }
        }

        let instance_label = read_label(&mut self.cur)?;
        if instance_label.is_empty() {
            return Err(CoderError::Parse);
        }
        let service_name = read_name(&mut self.cur)?;

        let (class, ttl) = if removing {
            (dns::CLASS_NONE, 0)
        } else {
            (dns::CLASS_IN, ptr_ttl)
        };

        // PTR: service name -> instance name
        let service_offset = self.out.len();
        append_labels(&mut self.out, &service_name)?;
        append_pointer(&mut self.out, self.domain_offset)?;
        let rdata = append_rr_header(&mut self.out, dns::TYPE_PTR, class, &ttl_bytes(ttl), 0);
        let instance_offset = self.out.len();
        dns::append_label(&mut self.out, &instance_label)?;
        append_pointer(&mut self.out, service_offset)?;
        patch_rdata_len(&mut self.out, rdata)?;
        self.count_update()?;

        if !removing && dispatch & SERVICE_SUB_TYPE_FLAG != 0 {
            let mut sub_offset = None;
            loop {
                let sub_type = read_label(&mut self.cur)?;
                if sub_type.is_empty() {
                    break;
                }
                dns::append_label(&mut self.out, &sub_type)?;
                match sub_offset {
                    Some(offset) => append_pointer(&mut self.out, offset)?,
                    None => {
                        sub_offset = Some(self.out.len());
                        dns::append_label(&mut self.out, SUB_TYPE_LABEL)?;
                        append_pointer(&mut self.out, service_offset)?;
                    }
                }
                let rdata = append_rr_header(&mut self.out, dns::TYPE_PTR, class, &ttl_bytes(ttl), 0);
                append_pointer(&mut self.out, instance_offset)?;
                patch_rdata_len(&mut self.out, rdata)?;
                self.count_update()?;
            }
        }

        append_pointer(&mut self.out, instance_offset)?;
        self.append_delete_all();
        self.count_update()?;

        if removing {
            return Ok(());
        }

        let port = self.cur.read_compact_u16(8)?;
        let priority = if dispatch & SERVICE_PRIORITY_FLAG != 0 {
            self.cur.read_compact_u16(8)?
        } else {
            0
        };
        let weight = if dispatch & SERVICE_WEIGHT_FLAG != 0 {
            self.cur.read_compact_u16(8)?
        } else {
            0
        };

        append_pointer(&mut self.out, instance_offset)?;
        let rdata = append_rr_header(&mut self.out, dns::TYPE_SRV, dns::CLASS_IN, &ttl_bytes(srv_ttl), 0);
        self.out.extend_from_slice(&priority.to_be_bytes());
        self.out.extend_from_slice(&weight.to_be_bytes());
        self.out.extend_from_slice(&port.to_be_bytes());
        self.append_host_name()?;
        patch_rdata_len(&mut self.out, rdata)?;
        self.count_update()?;

        append_pointer(&mut self.out, instance_offset)?;
        let rdata = append_rr_header(&mut self.out, dns::TYPE_TXT, dns::CLASS_IN, &ttl_bytes(srv_ttl), 0);
        if dispatch & SERVICE_TXT_DATA_FLAG != 0 {
            self.decode_txt_data()?;
        } else {
            self.out.push(0);
        }
        patch_rdata_len(&mut self.out, rdata)?;
        self.count_update()
    }

    fn decode_txt_data(&mut self) -> Result<(), CoderError> {
        let start = self.cur.offset();
        let is_refer = self.cur.peek_u8()? & TXT_REFER_FLAG != 0;
        let value = usize::from(self.cur.read_compact_u16(TXT_FIRST_SEGMENT_BITS)?);

        let data = if is_refer {
            if value >= start {
                return Err(CoderError::Parse);
            }
            let mut target = Cursor::at(self.cur.buf(), value);
            if target.peek_u8()? & TXT_REFER_FLAG != 0 {
                return Err(CoderError::Parse);
            }
            let len = usize::from(target.read_compact_u16(TXT_FIRST_SEGMENT_BITS)?);
            target.read_bytes(len)?
        } else {
            self.cur.read_bytes(value)?
        };

        self.out.extend_from_slice(data);
        Ok(())
    }

    fn decode_host_block(&mut self, dispatch: u8) -> Result<(), CoderError> {
        if dispatch & BLOCK_TYPE_MASK != HOST_BLOCK {
            return Err(CoderError::Parse);
        }

        self.append_host_name()?;
        self.append_delete_all();
        self.count_update()?;

        let mut addr_ttl = self.default_ttl;
        if dispatch & HOST_ADDR_TTL_FLAG != 0 {
            addr_ttl = self.cur.read_compact_uint(8)?;
        }

        if dispatch & HOST_ADDR_LIST_FLAG != 0 {
            loop {
                let addr_dispatch = self.cur.read_u8()?;
                let address = self.read_address(addr_dispatch)?;

                self.append_host_name()?;
                append_rr_header(&mut self.out, dns::TYPE_AAAA, dns::CLASS_IN, &ttl_bytes(addr_ttl), 16);
                self.out.extend_from_slice(&address.octets());
                self.count_update()?;

                if addr_dispatch & ADDR_MORE_FLAG == 0 {
                    break;
                }
            }
        }

        let mut key_ttl = self.default_ttl;
        if dispatch & HOST_KEY_TTL_FLAG != 0 {
            key_ttl = self.cur.read_compact_uint(8)?;
        }

        if dispatch & HOST_KEY_FLAG != 0 {
            let key = self.cur.read_bytes(ECDSA_KEY_SIZE)?;
            self.append_host_name()?;
            append_rr_header(&mut self.out, dns::TYPE_KEY, dns::CLASS_IN, &ttl_bytes(key_ttl), KEY_RDATA_LEN);
            self.out.extend_from_slice(&dns::KEY_FLAGS);
            self.out.push(dns::KEY_PROTOCOL_DNSSEC);
            self.out.push(dns::ALGORITHM_ECDSA_P256_SHA256);
            self.out.extend_from_slice(key);
            self.count_update()?;
        }

        Ok(())
    }

    fn read_address(&mut self, dispatch: u8) -> Result<Ipv6Addr, CoderError> {
        let mut octets = [0u8; 16];

        if dispatch & ADDR_CONTEXT_FLAG != 0 {
            let context_id = dispatch & ADDR_CONTEXT_ID_MASK;
            let iid = self.cur.read_bytes(8)?;
            let Some(context) = self.network_data.context_by_id(context_id) else {
                warn!("srp coder: no 6LoWPAN context with id {}", context_id);
                return Err(CoderError::Parse);
            };
            octets[..8].copy_from_slice(&context.prefix.bytes()[..8]);
            octets[8..].copy_from_slice(iid);
        } else {
            octets.copy_from_slice(self.cur.read_bytes(16)?);
        }

        Ok(Ipv6Addr::from(octets))
    }

    fn decode_footer_block(&mut self) -> Result<(), CoderError> {
        let dispatch = self.cur.read_u8()?;
        if dispatch & BLOCK_TYPE_MASK != FOOTER_BLOCK {
            return Err(CoderError::Parse);
        }

        let mut lease = DEFAULT_LEASE;
        let mut key_lease = DEFAULT_KEY_LEASE;
        if dispatch & FOOTER_LEASE_FLAG != 0 {
            lease = self.cur.read_compact_uint(8)?;
        }
        if dispatch & FOOTER_KEY_LEASE_FLAG != 0 {
            key_lease = self.cur.read_compact_uint(8)?;
        }

        // Update lease OPT record, owner is the root.
        self.out.push(0);
        append_rr_header(
            &mut self.out,
            dns::TYPE_OPT,
            dns::OPT_UDP_PAYLOAD_SIZE,
            &dns::OPT_TTL,
            4 + dns::UPDATE_LEASE_OPTION_LEN,
        );
        self.out.extend_from_slice(&dns::OPTION_UPDATE_LEASE.to_be_bytes());
        self.out.extend_from_slice(&dns::UPDATE_LEASE_OPTION_LEN.to_be_bytes());
        self.out.extend_from_slice(&lease.to_be_bytes());
        self.out.extend_from_slice(&key_lease.to_be_bytes());
        self.additional_count += 1;

        let signature = match dispatch & FOOTER_SIGN_MASK {
            FOOTER_SIGN_ELIDED => return Ok(()),
            FOOTER_SIGN_64 => self.cur.read_bytes(ECDSA_SIGNATURE_SIZE)?,
            _ => return Err(CoderError::Parse),
        };

        // SIG(0) record, owner is the root.
        self.out.push(0);
        let rdata = append_rr_header(&mut self.out, dns::TYPE_SIG, dns::CLASS_ANY, &ttl_bytes(0), 0);
        self.out.extend_from_slice(&[0; 2]);
        self.out.push(dns::ALGORITHM_ECDSA_P256_SHA256);
        self.out.extend_from_slice(&[0; SIG_FIXED_RDATA_LEN - 3]);
        self.append_host_name()?;
        self.out.extend_from_slice(signature);
        patch_rdata_len(&mut self.out, rdata)?;
        self.additional_count += 1;

        Ok(())
    }
}
