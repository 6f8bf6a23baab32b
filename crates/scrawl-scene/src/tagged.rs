//! Tagged-value primitives for the scene block stream.
//!
//! Block payloads are sequences of tagged values. Each value starts with a
//! tag byte encoded as `varuint(index << 4 | tag_type)`: the index identifies
//! the field within its enclosing block, the low nibble says how the value is
//! encoded. All scalars are little-endian; variable-length integers are
//! LEB128 capped at 10 bytes.
//!
//! [`TagReader`] is a cursor over a borrowed byte slice, [`TagWriter`] builds
//! a byte vector with length-backpatched subblocks. Both are pure; errors
//! carry absolute stream offsets so a caller can report where a page broke.

use crate::crdt::CrdtId;
use crate::error::SceneError;
use crate::Result;

/// How a tagged value is encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TagType {
    /// One raw byte (bools, style codes).
    Byte1 = 0x1,
    /// Two raw bytes.
    Byte2 = 0x2,
    /// Four raw bytes (u32, f32).
    Byte4 = 0x4,
    /// Eight raw bytes (f64).
    Byte8 = 0x8,
    /// A u32 length followed by that many payload bytes.
    Length4 = 0xC,
    /// A CRDT identifier: author byte + varuint counter.
    Id = 0xF,
}

impl TagType {
    fn from_nibble(v: u8) -> Option<Self> {
        match v {
            0x1 => Some(Self::Byte1),
            0x2 => Some(Self::Byte2),
            0x4 => Some(Self::Byte4),
            0x8 => Some(Self::Byte8),
            0xC => Some(Self::Length4),
            0xF => Some(Self::Id),
            _ => None,
        }
    }
}

/// Longest accepted LEB128 encoding (u64 needs at most 10 bytes).
const VARUINT_MAX_BYTES: usize = 10;

/// Cursor over a borrowed payload slice.
pub struct TagReader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Absolute offset of `buf[0]` in the enclosing stream, for errors.
    base: usize,
}

impl<'a> TagReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the cursor in the enclosing stream.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Error unless every byte of this reader has been consumed.
    pub fn finish(self, what: &'static str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SceneError::TrailingData {
                what,
                count: self.remaining(),
            })
        }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SceneError::Truncated {
                what,
                offset: self.offset(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self, what: &'static str) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(what)?))
    }

    pub fn read_f64(&mut self, what: &'static str) -> Result<f64> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        self.take(n, what)
    }

    pub fn read_varuint(&mut self) -> Result<u64> {
        let start = self.offset();
        let mut value: u64 = 0;
        let mut shift = 0u32;
        for _ in 0..VARUINT_MAX_BYTES {
            let byte = self.read_u8("varuint")?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
        Err(SceneError::Varuint { offset: start })
    }

    /// Decode the tag at the cursor without consuming it.
    ///
    /// Returns `None` when the reader is exhausted, so optional trailing
    /// fields can be probed safely.
    pub fn peek_tag(&self) -> Result<Option<(u8, TagType)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut probe = TagReader::with_base(&self.buf[self.pos..], self.offset());
        let raw = probe.read_varuint()?;
        let nibble = (raw & 0xF) as u8;
        let tag_type = TagType::from_nibble(nibble).ok_or(SceneError::UnknownTagType {
            tag_type: nibble,
            offset: self.offset(),
        })?;
        Ok(Some(((raw >> 4) as u8, tag_type)))
    }

    /// True if the next tag matches `index` and `tag_type`.
    pub fn has_tag(&self, index: u8, tag_type: TagType) -> bool {
        matches!(self.peek_tag(), Ok(Some((i, t))) if i == index && t == tag_type)
    }

    /// Consume a tag, requiring it to match `index` and `tag_type`.
    pub fn expect_tag(&mut self, index: u8, tag_type: TagType) -> Result<()> {
        let offset = self.offset();
        let raw = self.read_varuint()?;
        let nibble = (raw & 0xF) as u8;
        let found_type = TagType::from_nibble(nibble).ok_or(SceneError::UnknownTagType {
            tag_type: nibble,
            offset,
        })?;
        let found_index = (raw >> 4) as u8;
        if found_index != index || found_type != tag_type {
            return Err(SceneError::Tag {
                offset,
                expected_index: index,
                expected_type: tag_type,
                found_index,
                found_type,
            });
        }
        Ok(())
    }

    /// Read a tagged CRDT identifier.
    pub fn read_id(&mut self, index: u8) -> Result<CrdtId> {
        self.expect_tag(index, TagType::Id)?;
        let author = self.read_u8("crdt id author")?;
        let counter = self.read_varuint()?;
        Ok(CrdtId::new(author, counter))
    }

    /// Read a tagged single byte interpreted as a bool (nonzero = true).
    pub fn read_bool(&mut self, index: u8) -> Result<bool> {
        Ok(self.read_byte(index)? != 0)
    }

    /// Read a tagged single raw byte.
    pub fn read_byte(&mut self, index: u8) -> Result<u8> {
        self.expect_tag(index, TagType::Byte1)?;
        self.read_u8("byte value")
    }

    /// Read a tagged u32.
    pub fn read_u32_field(&mut self, index: u8) -> Result<u32> {
        self.expect_tag(index, TagType::Byte4)?;
        self.read_u32("u32 value")
    }

    /// Read a tagged f32.
    pub fn read_f32_field(&mut self, index: u8) -> Result<f32> {
        self.expect_tag(index, TagType::Byte4)?;
        self.read_f32("f32 value")
    }

    /// Read a tagged f64.
    pub fn read_f64_field(&mut self, index: u8) -> Result<f64> {
        self.expect_tag(index, TagType::Byte8)?;
        self.read_f64("f64 value")
    }

    /// Enter a tagged length-prefixed subblock, returning a reader over it.
    pub fn subblock(&mut self, index: u8) -> Result<TagReader<'a>> {
        self.expect_tag(index, TagType::Length4)?;
        let len = self.read_u32("subblock length")? as usize;
        let base = self.offset();
        let body = self.take(len, "subblock body")?;
        Ok(TagReader::with_base(body, base))
    }

    /// Enter a subblock if one with the given index is next.
    pub fn optional_subblock(&mut self, index: u8) -> Result<Option<TagReader<'a>>> {
        if self.has_tag(index, TagType::Length4) {
            Ok(Some(self.subblock(index)?))
        } else {
            Ok(None)
        }
    }

    /// Read a tagged string: subblock of varuint byte length, an is-ascii
    /// flag byte, and UTF-8 payload.
    pub fn read_string(&mut self, index: u8) -> Result<String> {
        let mut sub = self.subblock(index)?;
        let len = sub.read_varuint()? as usize;
        let _is_ascii = sub.read_u8("string ascii flag")?;
        let bytes = sub.read_bytes(len, "string bytes")?.to_vec();
        sub.finish("string")?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Builds a payload, mirroring [`TagReader`].
#[derive(Default)]
pub struct TagWriter {
    buf: Vec<u8>,
}

impl TagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varuint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_tag(&mut self, index: u8, tag_type: TagType) {
        self.write_varuint(u64::from(index) << 4 | u64::from(tag_type as u8));
    }

    pub fn write_id(&mut self, index: u8, id: CrdtId) {
        self.write_tag(index, TagType::Id);
        self.write_u8(id.author);
        self.write_varuint(id.counter);
    }

    pub fn write_bool(&mut self, index: u8, v: bool) {
        self.write_byte(index, u8::from(v));
    }

    pub fn write_byte(&mut self, index: u8, v: u8) {
        self.write_tag(index, TagType::Byte1);
        self.write_u8(v);
    }

    pub fn write_u32_field(&mut self, index: u8, v: u32) {
        self.write_tag(index, TagType::Byte4);
        self.write_u32(v);
    }

    pub fn write_f32_field(&mut self, index: u8, v: f32) {
        self.write_tag(index, TagType::Byte4);
        self.write_f32(v);
    }

    pub fn write_f64_field(&mut self, index: u8, v: f64) {
        self.write_tag(index, TagType::Byte8);
        self.write_f64(v);
    }

    /// Write a length-prefixed subblock; the length is backpatched after the
    /// closure has produced the body.
    pub fn subblock(&mut self, index: u8, body: impl FnOnce(&mut TagWriter)) {
        self.write_tag(index, TagType::Length4);
        let len_at = self.buf.len();
        self.buf.extend_from_slice(&[0u8; 4]);
        body(self);
        let len = (self.buf.len() - len_at - 4) as u32;
        self.buf[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
    }

    pub fn write_string(&mut self, index: u8, s: &str) {
        self.subblock(index, |w| {
            w.write_varuint(s.len() as u64);
            w.write_u8(u8::from(s.is_ascii()));
            w.write_bytes(s.as_bytes());
        });
    }
}
