//! UMP framing.
//!
//! A UMP stream is `[varint part_type][varint part_size][payload]` repeated.
//! Network reads split that stream at arbitrary offsets, so the demuxer keeps
//! whatever trailing bytes do not yet form a whole part and glues them in
//! front of the next chunk.

use std::ops::Range;

use bytes::{Bytes, BytesMut};

use super::UmpPartId;

// ─── UMP Varint ────────────────────────────────────────────────────────────

// UMP uses a *different* multi-byte encoding than protobuf varint:
//  - 0x00..0x7F  (1 byte):  value = byte[0]
//  - 0x80..0xBF  (2 bytes): value = (byte[0] & 0x3F) + 64 * byte[1]
//  - 0xC0..0xDF  (3 bytes): value = (byte[0] & 0x1F) + 32 * (byte[1] + 256 * byte[2])
//  - 0xE0..0xEF  (4 bytes): value = (byte[0] & 0x0F) + 16 * (byte[1] + 256 * (byte[2] + 256 * byte[3]))
//  - 0xF0..      (5 bytes): skip byte[0], read LE u32 from bytes[1..5]

/// Parse one UMP varint at `offset`, returning `(value, bytes_consumed)`.
/// Returns `None` if not enough bytes are available.
pub fn read_ump_varint(data: &[u8], offset: usize) -> Option<(u64, usize)> {
    let first = *data.get(offset)? as u64;
    let byte = |i: usize| data.get(offset + i).map(|b| *b as u64);

    if first < 0x80 {
        return Some((first, 1));
    }
    if first < 0xC0 {
        return Some(((first & 0x3F) + 64 * byte(1)?, 2));
    }
    if first < 0xE0 {
        let (b2, b3) = (byte(1)?, byte(2)?);
        return Some(((first & 0x1F) + 32 * (b2 + 256 * b3), 3));
    }
    if first < 0xF0 {
        let (b2, b3, b4) = (byte(1)?, byte(2)?, byte(3)?);
        return Some(((first & 0x0F) + 16 * (b2 + 256 * (b3 + 256 * b4)), 4));
    }
    let tail = data.get(offset + 1..offset + 5)?;
    let value = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as u64;
    Some((value, 5))
}

/// Append `value` in UMP varint form, using the shortest encoding.
pub fn write_ump_varint(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 1 << 14 {
        out.push(0x80 | (value & 0x3F) as u8);
        out.push((value >> 6) as u8);
    } else if value < 1 << 21 {
        let rest = value >> 5;
        out.push(0xC0 | (value & 0x1F) as u8);
        out.push(rest as u8);
        out.push((rest >> 8) as u8);
    } else if value < 1 << 28 {
        let rest = value >> 4;
        out.push(0xE0 | (value & 0x0F) as u8);
        out.push(rest as u8);
        out.push((rest >> 8) as u8);
        out.push((rest >> 16) as u8);
    } else {
        out.push(0xF0);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Append one complete part to `out`.
pub fn write_part(out: &mut Vec<u8>, part_type: UmpPartId, payload: &[u8]) {
    write_ump_varint(out, part_type.as_u64() as u32);
    write_ump_varint(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

// ─── Record Decoder ────────────────────────────────────────────────────────

/// One decoded UMP part. The payload shares the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub part_type: UmpPartId,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A whole part; `payload` indexes into the buffer, `next` is the offset
    /// just past it.
    Complete {
        part_type: u64,
        payload: Range<usize>,
        next: usize,
    },
    /// The bytes from the offset onwards are the start of a part whose
    /// header or payload has not fully arrived.
    Incomplete,
}

pub fn decode_record(data: &[u8], offset: usize) -> Record {
    let Some((part_type, n1)) = read_ump_varint(data, offset) else {
        return Record::Incomplete;
    };
    let Some((part_size, n2)) = read_ump_varint(data, offset + n1) else {
        return Record::Incomplete;
    };
    let start = offset + n1 + n2;
    let Some(end) = start
        .checked_add(part_size as usize)
        .filter(|end| *end <= data.len())
    else {
        return Record::Incomplete;
    };

    Record::Complete {
        part_type,
        payload: start..end,
        next: end,
    }
}

// ─── Demultiplexer ─────────────────────────────────────────────────────────

/// Prepend the previous read's leftover bytes to `chunk` and clear them.
pub fn combine(remainder: &mut Bytes, chunk: Bytes) -> Bytes {
    if remainder.is_empty() {
        return chunk;
    }
    let mut buf = BytesMut::with_capacity(remainder.len() + chunk.len());
    buf.extend_from_slice(remainder);
    buf.extend_from_slice(&chunk);
    *remainder = Bytes::new();
    buf.freeze()
}

/// Split `buffer` into its complete parts plus the undecodable tail.
pub fn demux(buffer: &Bytes) -> (Vec<Part>, Bytes) {
    let mut parts = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        match decode_record(buffer, offset) {
            Record::Complete {
                part_type,
                payload,
                next,
            } => {
                parts.push(Part {
                    part_type: UmpPartId::from_u64(part_type),
                    payload: buffer.slice(payload),
                });
                offset = next;
            }
            Record::Incomplete => break,
        }
    }

    (parts, buffer.slice(offset..))
}

/// Streaming front end over [`combine`] and [`demux`].
#[derive(Debug, Default)]
pub struct UmpDemuxer {
    partial: Bytes,
}

impl UmpDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new chunk and return every part it completes, in stream order.
    pub fn push(&mut self, chunk: Bytes) -> Vec<Part> {
        let buffer = combine(&mut self.partial, chunk);
        let (parts, rest) = demux(&buffer);
        self.partial = rest;
        parts
    }

    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }
}
