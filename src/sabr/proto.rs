//! Hand-rolled protobuf reader/writer for the SABR part payloads.
//!
//! The reader is strict: running off the end of a message, an unknown wire
//! type or a non-UTF-8 string field is a [`DecodeError`], never a silently
//! defaulted value.

use crate::common::errors::DecodeError;

// ─── Protobuf Reader ───────────────────────────────────────────────────────

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LEN: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

pub struct ProtoReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ProtoReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let Some(&b) = self.data.get(self.pos) else {
                return Err(DecodeError::Truncated { offset: start });
            };
            self.pos += 1;
            if shift >= 64 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            result |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Reads a field key, returning `(field_number, wire_type)`.
    pub fn read_tag(&mut self) -> Result<(u32, u8), DecodeError> {
        let offset = self.pos;
        let tag = self.read_varint()?;
        let field = (tag >> 3) as u32;
        if field == 0 {
            return Err(DecodeError::InvalidField { offset });
        }
        Ok((field, (tag & 7) as u8))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_varint()? != 0)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()? as usize;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated { offset: start })?;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    pub fn skip_field(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => self.read_varint().map(drop),
            WIRE_FIXED64 => self.advance(8),
            WIRE_LEN => self.read_bytes().map(drop),
            WIRE_FIXED32 => self.advance(4),
            other => Err(DecodeError::InvalidWireType {
                wire_type: other,
                offset: self.pos,
            }),
        }
    }

    fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        if self.pos + n > self.data.len() {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        self.pos += n;
        Ok(())
    }
}

// ─── Protobuf Writer ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct ProtoWriter {
    buf: Vec<u8>,
}

impl ProtoWriter {
    pub fn new() -> Self {
        Self::default()
    }

    // Write a protobuf varint (7-bit continuation encoding)
    pub fn write_varint(&mut self, mut v: u64) {
        while v > 0x7F {
            self.buf.push((v as u8 & 0x7F) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    fn write_tag(&mut self, field: u32, wire_type: u8) {
        self.write_varint(((field as u64) << 3) | (wire_type as u64));
    }

    /// Field type 0 (varint), always written
    pub fn write_u64(&mut self, field: u32, value: u64) {
        self.write_tag(field, WIRE_VARINT);
        self.write_varint(value);
    }

    /// Field type 0 (varint), always written; negatives use the 10-byte form
    pub fn write_i64(&mut self, field: u32, value: i64) {
        self.write_u64(field, value as u64);
    }

    pub fn write_i32(&mut self, field: u32, value: i32) {
        self.write_i64(field, value as i64);
    }

    pub fn write_bool(&mut self, field: u32, value: bool) {
        self.write_u64(field, value as u64);
    }

    /// Field type 2 (length-delimited bytes)
    pub fn write_bytes(&mut self, field: u32, value: &[u8]) {
        self.write_tag(field, WIRE_LEN);
        self.write_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn write_string(&mut self, field: u32, value: &str) {
        self.write_bytes(field, value.as_bytes());
    }

    /// Embed a nested message (field type 2)
    pub fn write_message(&mut self, field: u32, nested: ProtoWriter) {
        self.write_bytes(field, &nested.finish());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
