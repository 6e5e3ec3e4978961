//! Builds a coded SRP Update block by block.

use std::net::Ipv6Addr;

use tracing::debug;

use super::compact::{append_compact_uint, Cursor};
use super::label::{append_label, append_name, LabelRanges};
use super::txt::TxtEntry;
use super::*;
use crate::netdata::NetworkData;

/// One encoding session. Back-reference tables live as long as the
/// encoder and are reset by [`MsgEncoder::init`].
#[derive(Debug, Clone, Default)]
pub struct MsgEncoder {
    msg: Vec<u8>,
    labels: LabelRanges,
    txt_offsets: Vec<usize>,
}

impl MsgEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        self.msg.clear();
        self.labels.clear();
        self.txt_offsets.clear();
    }

    pub fn message(&self) -> &[u8] {
        &self.msg
    }

    pub fn into_message(self) -> Vec<u8> {
        self.msg
    }

    fn check_size(&self) -> Result<(), CoderError> {
        if self.msg.len() > usize::from(u16::MAX) {
            return Err(CoderError::NoBufs);
        }
        Ok(())
    }

    fn encode_label(&mut self, label: &str) -> Result<(), CoderError> {
        append_label(&mut self.msg, label.as_bytes(), &mut self.labels)
    }

    fn encode_name(&mut self, name: &str) -> Result<(), CoderError> {
        append_name(&mut self.msg, name, &mut self.labels)
    }

    fn append_uint(&mut self, value: u32) {
        append_compact_uint(&mut self.msg, value, 8, 0);
    }

    /// Message id, non-default zone and TTL, then the host name.
    pub fn encode_header_block(
        &mut self,
        message_id: u16,
        domain_name: &str,
        default_ttl: u32,
        host_name: &str,
    ) -> Result<(), CoderError> {
        let has_zone = !is_same_domain(domain_name, DEFAULT_DOMAIN_NAME);
        let has_ttl = default_ttl != DEFAULT_TTL;

        let mut dispatch = HEADER_DISPATCH_CODE;
        if has_zone {
            dispatch |= HEADER_ZONE_FLAG;
        }
        if has_ttl {
            dispatch |= HEADER_TTL_FLAG;
        }

        self.msg.extend_from_slice(&message_id.to_be_bytes());
        self.msg.push(dispatch);

        if has_zone {
            self.encode_name(domain_name)?;
        }
        if has_ttl {
            self.append_uint(default_ttl);
        }

        self.labels.start(self.msg.len());
        self.encode_name(host_name)?;
        self.check_size()
    }

    pub fn encode_service_block(&mut self, service: &SrpService) -> Result<(), CoderError> {
        let removing = service.is_removing();
        let has_sub_types = !removing && !service.sub_type_labels.is_empty();

        let mut dispatch = if removing { SERVICE_REMOVE } else { SERVICE_ADD };
        if !removing {
            if has_sub_types {
                dispatch |= SERVICE_SUB_TYPE_FLAG;
            }
            if service.priority != 0 {
                dispatch |= SERVICE_PRIORITY_FLAG;
            }
            if service.weight != 0 {
                dispatch |= SERVICE_WEIGHT_FLAG;
            }
            if !service.txt_entries.is_empty() {
                dispatch |= SERVICE_TXT_DATA_FLAG;
            }
        }
        self.msg.push(dispatch);

        self.labels.start(self.msg.len());
        self.encode_label(&service.instance_label)?;
        self.encode_name(&service.service_name)?;

        if has_sub_types {
            for sub_type in &service.sub_type_labels {
                self.encode_label(sub_type)?;
            }
            self.msg.push(0);
        }

        if removing {
            return self.check_size();
        }

        self.append_uint(u32::from(service.port));
        if service.priority != 0 {
            self.append_uint(u32::from(service.priority));
        }
        if service.weight != 0 {
            self.append_uint(u32::from(service.weight));
        }

        if !service.txt_entries.is_empty() {
            let data = TxtEntry::encode_entries(&service.txt_entries)?;
            self.encode_txt_data(&data)?;
        }

        self.check_size()
    }

    /// Writes TXT data, or a reference to an identical earlier payload.
    fn encode_txt_data(&mut self, data: &[u8]) -> Result<(), CoderError> {
        let len = u32::try_from(data.len()).map_err(|_| CoderError::NoBufs)?;

        for &offset in &self.txt_offsets {
            let mut cur = Cursor::at(&self.msg, offset);
            let prev_len = cur.read_compact_uint(TXT_FIRST_SEGMENT_BITS)?;
            if prev_len == len && cur.read_bytes(data.len()).map_or(false, |prev| prev == data) {
                debug!("srp coder: TXT data refers to offset {}", offset);
                let offset = u32::try_from(offset).map_err(|_| CoderError::NoBufs)?;
                append_compact_uint(&mut self.msg, offset, TXT_FIRST_SEGMENT_BITS, TXT_REFER_FLAG);
                return Ok(());
            }
        }

        if self.txt_offsets.len() < MAX_SAVED_OFFSETS {
            self.txt_offsets.push(self.msg.len());
        }
        append_compact_uint(&mut self.msg, len, TXT_FIRST_SEGMENT_BITS, 0);
        self.msg.extend_from_slice(data);
        Ok(())
    }

    pub fn encode_host_dispatch(&mut self, has_addresses: bool) -> Result<(), CoderError> {
        let mut dispatch = HOST_BLOCK | HOST_KEY_FLAG;
        if has_addresses {
            dispatch |= HOST_ADDR_LIST_FLAG;
        }
        self.msg.push(dispatch);
        Ok(())
    }

    /// Addresses inside a compressible 6LoWPAN context whose upper 64 bits
    /// the context fully determines are sent as context id plus IID.
    pub fn encode_host_address(
        &mut self,
        address: &Ipv6Addr,
        has_more: bool,
        network_data: &dyn NetworkData,
    ) -> Result<(), CoderError> {
        let octets = address.octets();
        let mut dispatch = if has_more { ADDR_MORE_FLAG } else { 0 };

        let context = network_data.context_for_address(address).filter(|c| {
            c.compress
                && c.context_id <= ADDR_CONTEXT_ID_MASK
                && c.prefix.length() <= 64
                && c.prefix.bytes()[..8] == octets[..8]
        });

        match context {
            Some(context) => {
                dispatch |= ADDR_CONTEXT_FLAG | context.context_id;
                self.msg.push(dispatch);
                self.msg.extend_from_slice(&octets[8..]);
            }
            None => {
                self.msg.push(dispatch);
                self.msg.extend_from_slice(&octets);
            }
        }
        self.check_size()
    }

    pub fn encode_host_key(&mut self, key: &EcdsaPublicKey) -> Result<(), CoderError> {
        self.msg.extend_from_slice(key);
        self.check_size()
    }

    pub fn encode_footer_block(
        &mut self,
        lease: u32,
        key_lease: u32,
        signature: &EcdsaSignature,
    ) -> Result<(), CoderError> {
        let mut dispatch = FOOTER_BLOCK | FOOTER_SIGN_64;
        if lease != DEFAULT_LEASE {
            dispatch |= FOOTER_LEASE_FLAG;
        }
        if key_lease != DEFAULT_KEY_LEASE {
            dispatch |= FOOTER_KEY_LEASE_FLAG;
        }
        self.msg.push(dispatch);

        if lease != DEFAULT_LEASE {
            self.append_uint(lease);
        }
        if key_lease != DEFAULT_KEY_LEASE {
            self.append_uint(key_lease);
        }
        self.msg.extend_from_slice(signature);
        self.check_size()
    }
}

/// Encodes a complete update in one session.
pub fn encode_update(update: &SrpUpdate, network_data: &dyn NetworkData) -> Result<Vec<u8>, CoderError> {
    let mut encoder = MsgEncoder::new();

    encoder.encode_header_block(update.message_id, &update.domain_name, update.default_ttl, &update.host_name)?;
    for service in &update.services {
        encoder.encode_service_block(service)?;
    }

    encoder.encode_host_dispatch(!update.addresses.is_empty())?;
    for (index, address) in update.addresses.iter().enumerate() {
        encoder.encode_host_address(address, index + 1 < update.addresses.len(), network_data)?;
    }
    encoder.encode_host_key(&update.key)?;
    encoder.encode_footer_block(update.lease, update.key_lease, &update.signature)?;

    debug!(
        "srp coder: encoded update id {} into {} bytes",
        update.message_id,
        encoder.message().len()
    );
    Ok(encoder.into_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netdata::{LowpanContext, StaticNetworkData};

    fn omr_context() -> StaticNetworkData {
        StaticNetworkData {
            on_mesh_prefixes: Vec::new(),
            contexts: vec![LowpanContext {
                context_id: 1,
                prefix: "fd00:dead:beef:cafe::/64".parse().unwrap(),
                compress: true,
            }],
        }
    }

    #[test]
    fn default_header_is_compact() {
        let mut encoder = MsgEncoder::new();
        encoder
            .encode_header_block(0x1234, "default.service.arpa", DEFAULT_TTL, "DAAFF10F39B00F32")
            .unwrap();
        let msg = encoder.message();
        assert_eq!(&msg[..3], [0x12, 0x34, HEADER_DISPATCH_CODE]);
        // Generative hex host label plus the name terminator.
        assert_eq!(msg[3], 0xe0);
        assert_eq!(msg.len(), 3 + 9 + 1);
    }

    #[test]
    fn header_flags_zone_and_ttl() {
        let mut encoder = MsgEncoder::new();
        encoder.encode_header_block(1, "example.com", 120, "host").unwrap();
        let msg = encoder.message();
        assert_eq!(msg[2], HEADER_DISPATCH_CODE | HEADER_ZONE_FLAG | HEADER_TTL_FLAG);
        assert_eq!(&msg[3..16], b"\x07example\x03com\x00");
        assert_eq!(msg[16], 120);
        assert_eq!(&msg[17..], b"\x04host\x00");
    }

    #[test]
    fn service_dispatch_flags() {
        let mut encoder = MsgEncoder::new();
        let mut service = SrpService::new("printer", "_ipp._tcp", 631);
        service.weight = 5;
        service.sub_type_labels.push("_color".to_string());
        encoder.encode_service_block(&service).unwrap();
        let msg = encoder.message();
        assert_eq!(msg[0], SERVICE_ADD | SERVICE_SUB_TYPE_FLAG | SERVICE_WEIGHT_FLAG);

        let mut encoder = MsgEncoder::new();
        service.action = ServiceAction::Remove;
        encoder.encode_service_block(&service).unwrap();
        // Instance, service name and nothing else.
        assert_eq!(encoder.message(), b"\x40\x07printer\x43ipp\xc1\x00");
    }

    #[test]
    fn identical_txt_data_is_referenced() {
        let mut encoder = MsgEncoder::new();
        let mut first = SrpService::new("one", "_test._udp", 1);
        first.txt_entries.push(TxtEntry::key_value("k", "v"));
        let mut second = SrpService::new("two", "_test._udp", 2);
        second.txt_entries = first.txt_entries.clone();

        encoder.encode_service_block(&first).unwrap();
        let txt_offset = encoder.message().len() - 5;
        assert_eq!(&encoder.message()[txt_offset..], b"\x04\x03k=v");

        encoder.encode_service_block(&second).unwrap();
        let msg = encoder.message();
        assert_eq!(msg[msg.len() - 1], TXT_REFER_FLAG | txt_offset as u8);
    }

    #[test]
    fn context_addresses_are_compressed() {
        let net_data = omr_context();
        let mut encoder = MsgEncoder::new();
        let omr: Ipv6Addr = "fd00:dead:beef:cafe::1234".parse().unwrap();
        let external: Ipv6Addr = "fd00::1".parse().unwrap();

        encoder.encode_host_address(&omr, true, &net_data).unwrap();
        assert_eq!(encoder.message().len(), 9);
        assert_eq!(encoder.message()[0], ADDR_CONTEXT_FLAG | ADDR_MORE_FLAG | 1);

        encoder.encode_host_address(&external, false, &net_data).unwrap();
        assert_eq!(encoder.message().len(), 9 + 17);
        assert_eq!(encoder.message()[9], 0);
    }

    #[test]
    fn footer_elides_default_leases() {
        let mut encoder = MsgEncoder::new();
        encoder.encode_footer_block(DEFAULT_LEASE, DEFAULT_KEY_LEASE, &[7; 64]).unwrap();
        assert_eq!(encoder.message().len(), 65);
        assert_eq!(encoder.message()[0], FOOTER_BLOCK | FOOTER_SIGN_64);

        encoder.init();
        encoder.encode_footer_block(3600, DEFAULT_KEY_LEASE, &[7; 64]).unwrap();
        assert_eq!(encoder.message()[0], FOOTER_BLOCK | FOOTER_SIGN_64 | FOOTER_LEASE_FLAG);
        assert_eq!(&encoder.message()[1..3], [0x9c, 0x10]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut encoder = MsgEncoder::new();
        let long = "x".repeat(64);
        assert_eq!(
            encoder.encode_header_block(1, DEFAULT_DOMAIN_NAME, DEFAULT_TTL, &long),
            Err(CoderError::InvalidArgs)
        );
        let mut bad = SrpService::new("ok", "_a.._udp", 1);
        assert_eq!(encoder.encode_service_block(&bad), Err(CoderError::InvalidArgs));
        bad.service_name = "_a._udp".to_string();
        bad.txt_entries.push(TxtEntry::Flag(String::new()));
        assert_eq!(encoder.encode_service_block(&bad), Err(CoderError::InvalidArgs));
    }
}
