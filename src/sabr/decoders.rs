//! Schema decoders for the part payloads the parser understands.
//!
//! Field numbers follow the googlevideo protos. Fields that arrive with an
//! unexpected wire type are skipped like unknown fields.

use super::proto::{ProtoReader, WIRE_LEN, WIRE_VARINT};
use super::structs::*;
use crate::common::errors::DecodeError;

pub fn decode_format_id(data: &[u8]) -> Result<FormatId, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut msg = FormatId::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => msg.itag = r.read_varint()? as i32,
            2 if wire == WIRE_VARINT => msg.last_modified = Some(r.read_varint()?),
            3 if wire == WIRE_LEN => msg.xtags = Some(r.read_string()?),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(msg)
}

fn decode_time_range(data: &[u8]) -> Result<TimeRange, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut msg = TimeRange::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => msg.start_ticks = r.read_varint()? as i64,
            2 if wire == WIRE_VARINT => msg.duration_ticks = r.read_varint()? as i64,
            3 if wire == WIRE_VARINT => msg.timescale = r.read_varint()? as i32,
            _ => r.skip_field(wire)?,
        }
    }
    Ok(msg)
}

fn decode_byte_span(data: &[u8]) -> Result<ByteSpan, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut msg = ByteSpan::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => msg.start = r.read_varint()?,
            2 if wire == WIRE_VARINT => msg.end = r.read_varint()?,
            _ => r.skip_field(wire)?,
        }
    }
    Ok(msg)
}

pub fn decode_media_header(data: &[u8]) -> Result<MediaHeader, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut h = MediaHeader::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => h.header_id = r.read_varint()? as u32,
            2 if wire == WIRE_LEN => h.video_id = Some(r.read_string()?),
            3 if wire == WIRE_VARINT => h.itag = r.read_varint()? as i32,
            4 if wire == WIRE_VARINT => h.lmt = Some(r.read_varint()?),
            5 if wire == WIRE_LEN => h.xtags = Some(r.read_string()?),
            6 if wire == WIRE_VARINT => h.start_range = Some(r.read_varint()? as i64),
            7 if wire == WIRE_VARINT => h.compression_algorithm = Some(r.read_varint()? as i32),
            8 if wire == WIRE_VARINT => h.is_init_seg = r.read_bool()?,
            9 if wire == WIRE_VARINT => h.sequence_number = Some(r.read_varint()? as i64),
            10 if wire == WIRE_VARINT => h.bitrate_bps = Some(r.read_varint()? as i64),
            11 if wire == WIRE_VARINT => h.start_ms = Some(r.read_varint()? as i64),
            12 if wire == WIRE_VARINT => h.duration_ms = Some(r.read_varint()? as i64),
            13 if wire == WIRE_LEN => h.format_id = Some(decode_format_id(r.read_bytes()?)?),
            14 if wire == WIRE_VARINT => h.content_length = Some(r.read_varint()? as i64),
            15 if wire == WIRE_LEN => h.time_range = Some(decode_time_range(r.read_bytes()?)?),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(h)
}

pub fn decode_format_init_metadata(
    data: &[u8],
) -> Result<FormatInitializationMetadata, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut m = FormatInitializationMetadata::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_LEN => m.video_id = Some(r.read_string()?),
            2 if wire == WIRE_LEN => m.format_id = Some(decode_format_id(r.read_bytes()?)?),
            3 if wire == WIRE_VARINT => m.end_time_ms = Some(r.read_varint()? as i64),
            4 if wire == WIRE_VARINT => m.end_segment_number = Some(r.read_varint()? as i64),
            5 if wire == WIRE_LEN => m.mime_type = Some(r.read_string()?),
            6 if wire == WIRE_LEN => m.init_range = Some(decode_byte_span(r.read_bytes()?)?),
            7 if wire == WIRE_LEN => m.index_range = Some(decode_byte_span(r.read_bytes()?)?),
            9 if wire == WIRE_VARINT => m.duration_units = Some(r.read_varint()? as i64),
            10 if wire == WIRE_VARINT => m.duration_timescale = Some(r.read_varint()? as i64),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(m)
}

fn decode_playback_cookie(data: &[u8]) -> Result<PlaybackCookie, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut c = PlaybackCookie::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => c.resolution = Some(r.read_varint()? as i32),
            2 if wire == WIRE_VARINT => c.field2 = Some(r.read_varint()? as i32),
            7 if wire == WIRE_LEN => c.video_fmt = Some(decode_format_id(r.read_bytes()?)?),
            8 if wire == WIRE_LEN => c.audio_fmt = Some(decode_format_id(r.read_bytes()?)?),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(c)
}

pub fn decode_next_request_policy(data: &[u8]) -> Result<NextRequestPolicy, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut m = NextRequestPolicy::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => m.target_audio_readahead_ms = r.read_varint()? as i32,
            2 if wire == WIRE_VARINT => m.target_video_readahead_ms = r.read_varint()? as i32,
            4 if wire == WIRE_VARINT => m.backoff_time_ms = r.read_varint()? as i32,
            7 if wire == WIRE_LEN => {
                m.playback_cookie = Some(decode_playback_cookie(r.read_bytes()?)?)
            }
            8 if wire == WIRE_LEN => m.video_id = Some(r.read_string()?),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(m)
}

pub fn decode_sabr_error(data: &[u8]) -> Result<SabrErrorMsg, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut m = SabrErrorMsg::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_LEN => m.error_type = r.read_string()?,
            2 if wire == WIRE_VARINT => m.code = r.read_varint()? as i32,
            _ => r.skip_field(wire)?,
        }
    }
    Ok(m)
}

pub fn decode_sabr_redirect(data: &[u8]) -> Result<SabrRedirect, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut m = SabrRedirect::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_LEN => m.url = r.read_string()?,
            _ => r.skip_field(wire)?,
        }
    }
    Ok(m)
}

pub fn decode_stream_protection_status(
    data: &[u8],
) -> Result<StreamProtectionStatus, DecodeError> {
    let mut r = ProtoReader::new(data);
    let mut m = StreamProtectionStatus::default();
    while r.has_remaining() {
        let (field, wire) = r.read_tag()?;
        match field {
            1 if wire == WIRE_VARINT => m.status = r.read_varint()? as i32,
            2 if wire == WIRE_VARINT => m.max_retries = Some(r.read_varint()? as i32),
            _ => r.skip_field(wire)?,
        }
    }
    Ok(m)
}

/// Splits the one-byte header id selector off a MEDIA or MEDIA_END payload.
pub fn split_header_id(payload: &[u8]) -> Result<(u32, &[u8]), DecodeError> {
    payload
        .split_first()
        .map(|(id, rest)| (*id as u32, rest))
        .ok_or(DecodeError::MissingHeaderId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sabr::proto::ProtoWriter;

    #[test]
    fn test_media_header_with_format_id() {
        let mut fid = ProtoWriter::new();
        fid.write_i32(1, 137);
        fid.write_u64(2, 1_700_000_000);
        let mut w = ProtoWriter::new();
        w.write_u64(1, 7);
        w.write_string(2, "dQw4w9WgXcQ");
        w.write_i32(3, 137);
        w.write_bool(8, true);
        w.write_u64(12, 5000);
        w.write_message(13, fid);
        // unknown field is skipped
        w.write_string(99, "ignored");

        let h = decode_media_header(&w.finish()).unwrap();
        assert_eq!(h.header_id, 7);
        assert_eq!(h.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert!(h.is_init_seg);
        assert_eq!(h.duration_ms, Some(5000));
        assert_eq!(
            h.format_id,
            Some(FormatId {
                itag: 137,
                last_modified: Some(1_700_000_000),
                xtags: None
            })
        );
    }

    #[test]
    fn test_truncated_media_header_fails() {
        let mut w = ProtoWriter::new();
        w.write_string(5, "xtags");
        let bytes = w.finish();
        assert!(decode_media_header(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_next_request_policy_cookie() {
        let mut fmt = ProtoWriter::new();
        fmt.write_i32(1, 248);
        let mut cookie = ProtoWriter::new();
        cookie.write_i32(1, 1080);
        cookie.write_message(7, fmt);
        let mut w = ProtoWriter::new();
        w.write_i32(4, 250);
        w.write_message(7, cookie);

        let p = decode_next_request_policy(&w.finish()).unwrap();
        assert_eq!(p.backoff_time_ms, 250);
        let cookie = p.playback_cookie.unwrap();
        assert_eq!(cookie.resolution, Some(1080));
        assert_eq!(cookie.video_fmt.map(|f| f.itag), Some(248));
    }

    #[test]
    fn test_sabr_error_and_redirect() {
        let mut w = ProtoWriter::new();
        w.write_string(1, "sabr.malformed_config");
        w.write_i32(2, 3);
        let e = decode_sabr_error(&w.finish()).unwrap();
        assert_eq!(e.error_type, "sabr.malformed_config");
        assert_eq!(e.code, 3);

        let mut w = ProtoWriter::new();
        w.write_string(1, "https://rr1.example/videoplayback");
        let r = decode_sabr_redirect(&w.finish()).unwrap();
        assert_eq!(r.url, "https://rr1.example/videoplayback");
    }

    #[test]
    fn test_stream_protection_status() {
        let mut w = ProtoWriter::new();
        w.write_i32(1, 3);
        w.write_i32(2, 5);
        let s = decode_stream_protection_status(&w.finish()).unwrap();
        assert!(s.is_blocked());
        assert_eq!(s.max_retries, Some(5));
    }

    #[test]
    fn test_split_header_id() {
        assert_eq!(split_header_id(&[3, 1, 2]).unwrap(), (3, &[1u8, 2][..]));
        assert_eq!(split_header_id(&[]), Err(DecodeError::MissingHeaderId));
    }
}
