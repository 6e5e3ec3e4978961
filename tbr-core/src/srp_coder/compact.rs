//! Compact unsigned integers and a bounded read cursor.
//!
//! A compact uint is big-endian 7-bit segments, each with a continuation
//! bit (0x80). The first segment may be narrower than 8 bits so that its
//! top bits can carry a dispatch pattern; its continuation flag is then
//! `1 << (bits - 1)`.

use super::CoderError;

const SEGMENT_VALUE_MASK: u8 = 0x7f;
const SEGMENT_CONTINUATION: u8 = 0x80;
const BITS_PER_SEGMENT: u32 = 7;
/// A u32 needs at most 5 segments; one more when the first is split off.
const MAX_SEGMENTS: usize = 6;
const MAX_VALUE_BEFORE_SHIFT: u32 = u32::MAX >> BITS_PER_SEGMENT;

/// Appends `value` with a first segment of `first_segment_bits` (1..=8)
/// bits. `first_segment_value` supplies the dispatch bits above them.
pub(crate) fn append_compact_uint(out: &mut Vec<u8>, value: u32, first_segment_bits: u8, first_segment_value: u8) {
    let mut segments = [0u8; MAX_SEGMENTS];
    let mut cur = MAX_SEGMENTS - 1;
    let mut value = value;

    loop {
        segments[cur] |= (value & u32::from(SEGMENT_VALUE_MASK)) as u8;
        value >>= BITS_PER_SEGMENT;
        if value == 0 {
            break;
        }
        cur -= 1;
        segments[cur] = SEGMENT_CONTINUATION;
    }

    if first_segment_bits < 8 {
        let flag = 1u8 << (first_segment_bits - 1);
        let mask = flag - 1;
        let top = segments[cur] & SEGMENT_VALUE_MASK;

        if top & mask == top {
            let mut first = first_segment_value | top;
            if segments[cur] & SEGMENT_CONTINUATION != 0 {
                first |= flag;
            }
            segments[cur] = first;
        } else {
            cur -= 1;
            segments[cur] = first_segment_value | flag;
        }
    }

    out.extend_from_slice(&segments[cur..]);
}

/// Read position within `buf[..end]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, end: buf.len() }
    }

    /// From `offset` to the end of `buf`.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self::range(buf, offset, buf.len())
    }

    pub fn range(buf: &'a [u8], offset: usize, end: usize) -> Self {
        let end = end.min(buf.len());
        Self { buf, offset: offset.min(end), end }
    }

    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.end
    }

    pub fn peek_u8(&self) -> Result<u8, CoderError> {
        if self.is_empty() {
            return Err(CoderError::Parse);
        }
        Ok(self.buf[self.offset])
    }

    pub fn read_u8(&mut self) -> Result<u8, CoderError> {
        let byte = self.peek_u8()?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CoderError> {
        if self.end - self.offset < len {
            return Err(CoderError::Parse);
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_compact_uint(&mut self, first_segment_bits: u8) -> Result<u32, CoderError> {
        let (mut mask, mut continuation) = if first_segment_bits < 8 {
            let flag = 1u8 << (first_segment_bits - 1);
            (flag - 1, flag)
        } else {
            (SEGMENT_VALUE_MASK, SEGMENT_CONTINUATION)
        };
        let mut value: u32 = 0;

        loop {
            let segment = self.read_u8()?;
            if value > MAX_VALUE_BEFORE_SHIFT {
                return Err(CoderError::Parse);
            }
            value = (value << BITS_PER_SEGMENT) | u32::from(segment & mask);
            if segment & continuation == 0 {
                return Ok(value);
            }
            mask = SEGMENT_VALUE_MASK;
            continuation = SEGMENT_CONTINUATION;
        }
    }

    pub fn read_compact_u16(&mut self, first_segment_bits: u8) -> Result<u16, CoderError> {
        let value = self.read_compact_uint(first_segment_bits)?;
        u16::try_from(value).map_err(|_| CoderError::Parse)
    }
}
