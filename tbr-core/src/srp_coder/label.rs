//! Coded DNS labels and names.
//!
//! Label dispatch (top 2 bits):
//! - `00LLLLLL` normal label of length L
//! - `01LLLLLL` service label, a `_` prefix is implied
//! - `10......` refer-offset, a compact uint (6-bit first segment) giving
//!   the offset of an earlier coded label
//! - `110CCCCC` commonly used label number C
//! - `111CCCCC` generative label of kind C built from hex values

use std::ops::Range;

use super::compact::{append_compact_uint, Cursor};
use super::{CoderError, MAX_SAVED_OFFSETS};

pub(crate) const MAX_LABEL_LENGTH: usize = 63;
/// Encoded names (labels plus separators) stay below this.
pub(crate) const MAX_NAME_SIZE: usize = 255;

const TYPE_MASK: u8 = 0xc0;
const TYPE_NORMAL: u8 = 0x00;
const TYPE_SERVICE: u8 = 0x40;
const TYPE_REFER_OFFSET: u8 = 0x80;
const TYPE_COMMONLY_USED: u8 = 0xc0;

const LENGTH_MASK: u8 = 0x3f;
const GENERATIVE_FLAG: u8 = 0x20;
const CODE_MASK: u8 = 0x1f;

const REFER_OFFSET_FIRST_SEGMENT_BITS: u8 = 6;
const HEX_REFER_OFFSET_FIRST_SEGMENT_BITS: u8 = 8;
/// Longest refer-offset chain followed when reading one label.
const MAX_REFER_HOPS: usize = MAX_SAVED_OFFSETS;

const GEN_HEX_STRING: u8 = 0;
const GEN_TWO_HEX_STRINGS: u8 = 1;
const GEN_CHAR_HEX_STRING: u8 = 2;
const GEN_CHAR_HEX_STRING_REFER: u8 = 3;

const HEX_VALUE_SIZE: usize = 8;
const HEX_STRING_LEN: usize = 2 * HEX_VALUE_SIZE;

type HexValue = [u8; HEX_VALUE_SIZE];

const COMMONLY_USED_LABELS: [&[u8]; 6] = [b"_udp", b"_tcp", b"_matter", b"_matterc", b"_matterd", b"_hap"];

/// Labels recognized by pattern and stored as raw hex values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generative {
    /// `0123456789ABCDEF`
    HexString(HexValue),
    /// `0123456789ABCDEF-0123456789ABCDEF`
    TwoHexStrings(HexValue, HexValue),
    /// `_X0123456789ABCDEF`, X any byte except a digit
    CharHexString(u8, HexValue),
}

/// Sixteen uppercase hex digits.
fn parse_hex_value(s: &[u8]) -> Option<HexValue> {
    if s.len() != HEX_STRING_LEN {
        return None;
    }
    let digit = |c: u8| match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    };
    let mut value = [0u8; HEX_VALUE_SIZE];
    for (byte, pair) in value.iter_mut().zip(s.chunks_exact(2)) {
        *byte = (digit(pair[0])? << 4) | digit(pair[1])?;
    }
    Some(value)
}

fn parse_generative(label: &[u8]) -> Option<Generative> {
    match label {
        [b'_', c, rest @ ..] if !c.is_ascii_digit() && *c != 0 => {
            parse_hex_value(rest).map(|v| Generative::CharHexString(*c, v))
        }
        _ if label.len() == HEX_STRING_LEN => parse_hex_value(label).map(Generative::HexString),
        _ if label.len() == 2 * HEX_STRING_LEN + 1 && label[HEX_STRING_LEN] == b'-' => {
            let first = parse_hex_value(&label[..HEX_STRING_LEN])?;
            let second = parse_hex_value(&label[HEX_STRING_LEN + 1..])?;
            Some(Generative::TwoHexStrings(first, second))
        }
        _ => None,
    }
}

fn push_hex(label: &mut Vec<u8>, value: &[u8]) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for byte in value {
        label.push(DIGITS[usize::from(byte >> 4)]);
        label.push(DIGITS[usize::from(byte & 0x0f)]);
    }
}

/// Label ranges of the message being encoded that later labels may refer
/// back to.
#[derive(Debug, Clone, Default)]
pub(crate) struct LabelRanges {
    ranges: Vec<Range<usize>>,
    current: Option<usize>,
}

impl LabelRanges {
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.current = None;
    }

    /// Opens a new range at the end of `msg`. Once the table is full new
    /// labels are no longer referable.
    pub fn start(&mut self, msg_len: usize) {
        if self.ranges.len() >= MAX_SAVED_OFFSETS {
            self.current = None;
            return;
        }
        self.ranges.push(msg_len..msg_len);
        self.current = Some(self.ranges.len() - 1);
    }

    fn extend(&mut self, msg_len: usize) {
        if let Some(index) = self.current {
            self.ranges[index].end = msg_len;
        }
    }

    /// Offset of an earlier coded label equal to `label`.
    fn find_label(&self, msg: &[u8], label: &[u8]) -> Option<usize> {
        for range in &self.ranges {
            let mut cur = Cursor::range(msg, range.start, range.end);
            while !cur.is_empty() {
                let offset = cur.offset();
                match read_label(&mut cur) {
                    Ok(prev) if prev == label => return Some(offset),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
        None
    }

    /// Offset of an earlier occurrence of the raw bytes of `value`.
    fn find_hex_value(&self, msg: &[u8], value: &HexValue) -> Option<usize> {
        self.ranges.iter().find_map(|range| {
            let window = msg.get(range.start..range.end)?;
            window
                .windows(HEX_VALUE_SIZE)
                .position(|w| w == &value[..])
                .map(|pos| range.start + pos)
        })
    }
}

/// Appends one coded label, picking the shortest form available, and
/// extends the current referable range over it.
pub(crate) fn append_label(msg: &mut Vec<u8>, label: &[u8], ranges: &mut LabelRanges) -> Result<(), CoderError> {
    encode_label(msg, label, ranges)?;
    ranges.extend(msg.len());
    Ok(())
}

fn encode_label(msg: &mut Vec<u8>, label: &[u8], ranges: &LabelRanges) -> Result<(), CoderError> {
    if let Some(code) = COMMONLY_USED_LABELS.iter().position(|l| *l == label) {
        msg.push(TYPE_COMMONLY_USED | code as u8);
        return Ok(());
    }

    if let Some(offset) = ranges.find_label(msg, label) {
        let offset = u32::try_from(offset).map_err(|_| CoderError::NoBufs)?;
        append_compact_uint(msg, offset, REFER_OFFSET_FIRST_SEGMENT_BITS, TYPE_REFER_OFFSET);
        return Ok(());
    }

    if let Some(generative) = parse_generative(label) {
        let dispatch = TYPE_COMMONLY_USED | GENERATIVE_FLAG;
        match generative {
            Generative::HexString(value) => {
                msg.push(dispatch | GEN_HEX_STRING);
                msg.extend_from_slice(&value);
            }
            Generative::TwoHexStrings(first, second) => {
                msg.push(dispatch | GEN_TWO_HEX_STRINGS);
                msg.extend_from_slice(&first);
                msg.extend_from_slice(&second);
            }
            Generative::CharHexString(c, value) => match ranges.find_hex_value(msg, &value) {
                Some(offset) => {
                    let offset = u32::try_from(offset).map_err(|_| CoderError::NoBufs)?;
                    msg.push(dispatch | GEN_CHAR_HEX_STRING_REFER);
                    msg.push(c);
                    append_compact_uint(msg, offset, HEX_REFER_OFFSET_FIRST_SEGMENT_BITS, 0);
                }
                None => {
                    msg.push(dispatch | GEN_CHAR_HEX_STRING);
                    msg.push(c);
                    msg.extend_from_slice(&value);
                }
            },
        }
        return Ok(());
    }

    if label.len() > MAX_LABEL_LENGTH {
        return Err(CoderError::InvalidArgs);
    }
    let (dispatch, body) = match label.strip_prefix(b"_") {
        Some(rest) => (TYPE_SERVICE, rest),
        None => (TYPE_NORMAL, label),
    };
    msg.push(dispatch | body.len() as u8);
    msg.extend_from_slice(body);
    Ok(())
}

/// Appends a dot-separated name as coded labels plus a terminating
/// empty label. A trailing dot is accepted; empty inner labels are not.
pub(crate) fn append_name(msg: &mut Vec<u8>, name: &str, ranges: &mut LabelRanges) -> Result<(), CoderError> {
    if name.len() >= MAX_NAME_SIZE {
        return Err(CoderError::InvalidArgs);
    }

    let mut rest = name.as_bytes();
    while !rest.is_empty() {
        let (label, tail): (&[u8], &[u8]) = match rest.iter().position(|&b| b == b'.') {
            Some(dot) => (&rest[..dot], &rest[dot + 1..]),
            None => (rest, &[]),
        };
        if label.len() > MAX_LABEL_LENGTH {
            return Err(CoderError::InvalidArgs);
        }
        rest = tail;
        if label.is_empty() {
            if !rest.is_empty() {
                return Err(CoderError::InvalidArgs);
            }
            break;
        }
        append_label(msg, label, ranges)?;
    }

    msg.push(TYPE_NORMAL);
    Ok(())
}

/// Resolves a refer-offset at the cursor. The target must precede it.
fn read_refer_offset<'a>(cur: &mut Cursor<'a>, first_segment_bits: u8) -> Result<Cursor<'a>, CoderError> {
    let start = cur.offset();
    let offset = cur.read_compact_uint(first_segment_bits)? as usize;
    if offset >= start {
        return Err(CoderError::Parse);
    }
    Ok(Cursor::at(cur.buf(), offset))
}

fn read_hex_value(cur: &mut Cursor<'_>, label: &mut Vec<u8>) -> Result<(), CoderError> {
    let value = cur.read_bytes(HEX_VALUE_SIZE)?;
    push_hex(label, value);
    Ok(())
}

fn is_refer_offset(cur: &Cursor<'_>) -> Result<bool, CoderError> {
    Ok(cur.peek_u8()? & TYPE_MASK == TYPE_REFER_OFFSET)
}

/// Reads one coded label. The terminating empty label reads as empty.
/// Refer-offsets are followed up to `MAX_REFER_HOPS` deep.
pub(crate) fn read_label(cur: &mut Cursor<'_>) -> Result<Vec<u8>, CoderError> {
    if !is_refer_offset(cur)? {
        return read_label_in_place(cur);
    }

    let mut target = read_refer_offset(cur, REFER_OFFSET_FIRST_SEGMENT_BITS)?;
    let mut hops = 1;
    while is_refer_offset(&target)? {
        if hops == MAX_REFER_HOPS {
            return Err(CoderError::Parse);
        }
        target = read_refer_offset(&mut target, REFER_OFFSET_FIRST_SEGMENT_BITS)?;
        hops += 1;
    }
    read_label_in_place(&mut target)
}

/// Reads a label stored at the cursor itself, not behind a refer-offset.
fn read_label_in_place(cur: &mut Cursor<'_>) -> Result<Vec<u8>, CoderError> {
    let dispatch = cur.peek_u8()?;
    let mut label = Vec::new();

    match dispatch & TYPE_MASK {
        TYPE_NORMAL | TYPE_SERVICE => {
            cur.read_u8()?;
            if dispatch & TYPE_MASK == TYPE_SERVICE {
                label.push(b'_');
            }
            let len = usize::from(dispatch & LENGTH_MASK);
            if label.len() + len > MAX_LABEL_LENGTH {
                return Err(CoderError::Parse);
            }
            label.extend_from_slice(cur.read_bytes(len)?);
        }
        TYPE_REFER_OFFSET => return Err(CoderError::Parse),
        _ => {
            cur.read_u8()?;
            let code = dispatch & CODE_MASK;

            if dispatch & GENERATIVE_FLAG == 0 {
                let common = COMMONLY_USED_LABELS.get(usize::from(code)).ok_or(CoderError::Parse)?;
                label.extend_from_slice(common);
                return Ok(label);
            }

            match code {
                GEN_HEX_STRING => read_hex_value(cur, &mut label)?,
                GEN_TWO_HEX_STRINGS => {
                    read_hex_value(cur, &mut label)?;
                    label.push(b'-');
                    read_hex_value(cur, &mut label)?;
                }
                GEN_CHAR_HEX_STRING | GEN_CHAR_HEX_STRING_REFER => {
                    let c = cur.read_u8()?;
                    label.push(b'_');
                    label.push(c);
                    if code == GEN_CHAR_HEX_STRING_REFER {
                        let mut target = read_refer_offset(cur, HEX_REFER_OFFSET_FIRST_SEGMENT_BITS)?;
                        read_hex_value(&mut target, &mut label)?;
                    } else {
                        read_hex_value(cur, &mut label)?;
                    }
                }
                _ => return Err(CoderError::Parse),
            }
        }
    }

    Ok(label)
}

/// Reads coded labels up to the terminating empty label.
pub(crate) fn read_name(cur: &mut Cursor<'_>) -> Result<Vec<Vec<u8>>, CoderError> {
    let mut labels = Vec::new();
    let mut size = 0;
    loop {
        let label = read_label(cur)?;
        if label.is_empty() {
            return Ok(labels);
        }
        size += label.len() + 1;
        if size >= MAX_NAME_SIZE {
            return Err(CoderError::Parse);
        }
        labels.push(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coded(label: &str) -> Vec<u8> {
        let mut msg = Vec::new();
        append_label(&mut msg, label.as_bytes(), &mut LabelRanges::default()).unwrap();
        msg
    }

    fn read_back(msg: &[u8], offset: usize) -> String {
        let label = read_label(&mut Cursor::at(msg, offset)).unwrap();
        String::from_utf8(label).unwrap()
    }

    #[test]
    fn commonly_used_labels_take_one_byte() {
        assert_eq!(coded("_udp"), [0xc0]);
        assert_eq!(coded("_tcp"), [0xc1]);
        assert_eq!(coded("_hap"), [0xc5]);
        assert_eq!(read_back(&[0xc3], 0), "_matterc");
        assert_eq!(read_label(&mut Cursor::new(&[0xc6])), Err(CoderError::Parse));
    }

    #[test]
    fn literal_labels() {
        assert_eq!(coded("printer"), b"\x07printer");
        assert_eq!(coded("_ipp"), b"\x43ipp");
        assert_eq!(read_back(b"\x43ipp", 0), "_ipp");
        assert_eq!(read_back(b"\x07printer", 0), "printer");

        let long = "a".repeat(64);
        let mut msg = Vec::new();
        let err = append_label(&mut msg, long.as_bytes(), &mut LabelRanges::default());
        assert_eq!(err, Err(CoderError::InvalidArgs));
        let long = format!("_{}", "b".repeat(63));
        let err = append_label(&mut msg, long.as_bytes(), &mut LabelRanges::default());
        assert_eq!(err, Err(CoderError::InvalidArgs));
        assert_eq!(coded(&format!("_{}", "b".repeat(62))).len(), 63);
    }

    #[test]
    fn generative_labels() {
        let hex = coded("0123456789ABCDEF");
        assert_eq!(hex, [0xe0, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        assert_eq!(read_back(&hex, 0), "0123456789ABCDEF");

        let two = coded("8F097FD118441046-00000000B3B3D017");
        assert_eq!(two.len(), 17);
        assert_eq!(two[0], 0xe1);
        assert_eq!(read_back(&two, 0), "8F097FD118441046-00000000B3B3D017");

        let char_hex = coded("_IABCDEF0123456789");
        assert_eq!(char_hex.len(), 10);
        assert_eq!(&char_hex[..2], [0xe2, b'I']);
        assert_eq!(read_back(&char_hex, 0), "_IABCDEF0123456789");
    }

    #[test]
    fn near_generative_labels_stay_literal() {
        // Lowercase hex digits are not recognized.
        assert_eq!(coded("0123456789abcdef").len(), 17);
        // A digit cannot be the leading character.
        assert_eq!(coded("_00123456789ABCDEF").len(), 18);
        // Only 15 hex digits follow the leading character.
        assert_eq!(coded("_ABCDEF0123456789").len(), 17);
        assert_eq!(coded("0123456789ABCDEF+0123456789ABCDEF").len(), 34);
    }

    #[test]
    fn repeated_label_refers_back() {
        let mut msg = vec![0u8; 4];
        let mut ranges = LabelRanges::default();
        ranges.start(msg.len());
        append_name(&mut msg, "living-room.local", &mut ranges).unwrap();
        let before = msg.len();
        ranges.start(msg.len());
        append_label(&mut msg, b"living-room", &mut ranges).unwrap();
        assert_eq!(&msg[before..], [0x84]);
        assert_eq!(read_back(&msg, before), "living-room");

        // Second label of the earlier name is found too.
        append_label(&mut msg, b"local", &mut ranges).unwrap();
        assert_eq!(&msg[before + 1..], [0x90]);
        assert_eq!(read_back(&msg, before + 1), "local");
    }

    #[test]
    fn hex_value_refers_back_to_raw_bytes() {
        let mut msg = Vec::new();
        let mut ranges = LabelRanges::default();
        ranges.start(0);
        append_label(&mut msg, b"8F097FD118441046-00000000B3B3D017", &mut ranges).unwrap();
        let before = msg.len();
        append_label(&mut msg, b"_I8F097FD118441046", &mut ranges).unwrap();
        assert_eq!(&msg[before..], [0xe3, b'I', 0x01]);
        assert_eq!(read_back(&msg, before), "_I8F097FD118441046");
    }

    #[test]
    fn only_saved_ranges_are_referable() {
        let mut msg = Vec::new();
        let mut ranges = LabelRanges::default();
        for i in 0..=MAX_SAVED_OFFSETS {
            ranges.start(msg.len());
            append_label(&mut msg, format!("label{i}").as_bytes(), &mut ranges).unwrap();
        }

        let before = msg.len();
        append_label(&mut msg, b"label15", &mut ranges).unwrap();
        assert_eq!(msg[before] & TYPE_MASK, TYPE_REFER_OFFSET);

        let before = msg.len();
        append_label(&mut msg, b"label16", &mut ranges).unwrap();
        assert_eq!(&msg[before..], b"\x07label16");
    }

    #[test]
    fn name_rules() {
        let mut msg = Vec::new();
        let mut ranges = LabelRanges::default();
        append_name(&mut msg, "host.example.", &mut ranges).unwrap();
        assert_eq!(msg, b"\x04host\x07example\x00");

        let labels = read_name(&mut Cursor::new(&msg)).unwrap();
        assert_eq!(labels, [b"host".to_vec(), b"example".to_vec()]);

        let mut msg = Vec::new();
        assert_eq!(append_name(&mut msg, "a..b", &mut ranges), Err(CoderError::InvalidArgs));
        assert_eq!(append_name(&mut msg, &"a.".repeat(128), &mut ranges), Err(CoderError::InvalidArgs));

        let mut msg = Vec::new();
        append_name(&mut msg, ".", &mut ranges).unwrap();
        assert_eq!(msg, [0x00]);
        assert!(read_name(&mut Cursor::new(&msg)).unwrap().is_empty());
    }

    #[test]
    fn malformed_labels_are_parse_errors() {
        // Refer offset pointing at itself.
        assert_eq!(read_label(&mut Cursor::at(&[0x00, 0x81], 1)), Err(CoderError::Parse));
        // Truncated literal.
        assert_eq!(read_label(&mut Cursor::new(b"\x05abc")), Err(CoderError::Parse));
        // Service label that would exceed 63 characters.
        let mut long = vec![0x7f];
        long.extend_from_slice(&[b'a'; 63]);
        assert_eq!(read_label(&mut Cursor::new(&long)), Err(CoderError::Parse));
        // Unknown generative kind.
        assert_eq!(read_label(&mut Cursor::new(&[0xe4, 0, 0, 0, 0, 0, 0, 0, 0])), Err(CoderError::Parse));
        // Truncated hex value.
        assert_eq!(read_label(&mut Cursor::new(&[0xe0, 1, 2, 3])), Err(CoderError::Parse));
        // Hex refer offset pointing forward.
        assert_eq!(read_label(&mut Cursor::new(&[0xe3, b'I', 0x05])), Err(CoderError::Parse));
    }

    /// `a` literal, then refer-offsets each pointing at the one before,
    /// until `len` bytes. Returns the message and the last offset.
    fn refer_chain(len: usize) -> (Vec<u8>, usize) {
        let mut msg = vec![0x01, b'a'];
        let mut prev = 0;
        while msg.len() < len {
            let offset = msg.len();
            append_compact_uint(&mut msg, prev as u32, REFER_OFFSET_FIRST_SEGMENT_BITS, TYPE_REFER_OFFSET);
            prev = offset;
        }
        (msg, prev)
    }

    #[test]
    fn refer_chains_are_bounded() {
        // One byte per refer-offset: a literal plus MAX_REFER_HOPS links.
        let (msg, last) = refer_chain(2 + MAX_REFER_HOPS);
        let mut cur = Cursor::at(&msg, last);
        assert_eq!(read_label(&mut cur).unwrap(), b"a");
        assert!(cur.is_empty());

        let (msg, last) = refer_chain(3 + MAX_REFER_HOPS);
        assert_eq!(read_label(&mut Cursor::at(&msg, last)), Err(CoderError::Parse));

        let (msg, last) = refer_chain(60_000);
        assert_eq!(read_label(&mut Cursor::at(&msg, last)), Err(CoderError::Parse));
    }
}
