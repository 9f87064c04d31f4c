//! Per-request session state and the part handlers.
//!
//! [`SessionState::apply`] is a reducer over decoded parts: it updates the
//! state and, once a part settles the request, returns the [`Terminal`]
//! outcome. It does no I/O, so the read loop owns cancellation and the
//! cache write.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::cache::CacheWrite;
use super::context::{ContextFailure, StreamingContext};
use super::decoders::{self, split_header_id};
use super::format_key::FormatKey;
use super::response::{ResponseBuilder, ResponseEnvelope};
use super::structs::{FormatInitializationMetadata, MediaHeader, PlaybackCookie};
use super::ump::Part;
use super::UmpPartId;
use crate::common::errors::{DecodeError, FailureReason, SabrError, ServerFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Header seen, no media bytes yet.
    Pending,
    Assembling,
    /// MEDIA_END seen; the buffer no longer changes.
    Finalized,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub header_id: u32,
    pub media_header: MediaHeader,
    pub data: BytesMut,
    pub state: SegmentState,
}

impl Segment {
    fn new(media_header: MediaHeader) -> Self {
        Self {
            header_id: media_header.header_id,
            media_header,
            data: BytesMut::new(),
            state: SegmentState::Pending,
        }
    }
}

/// How a session ended successfully.
#[derive(Debug)]
pub struct Terminal {
    pub envelope: ResponseEnvelope,
    /// Set for initialization segment fetches; the caller hands it to the
    /// segment cache without waiting on it.
    pub cache_write: Option<CacheWrite>,
}

pub struct SessionState {
    context: StreamingContext,
    builder: ResponseBuilder,
    requested_key: Option<FormatKey>,
    format_init_metadata: Vec<FormatInitializationMetadata>,
    playback_cookie: Option<PlaybackCookie>,
    segments: HashMap<u32, Segment>,
    target_header_id: Option<u32>,
    done: bool,
}

impl SessionState {
    pub fn new(context: StreamingContext, builder: ResponseBuilder) -> Self {
        let requested_key = context.format.as_ref().map(FormatKey::from_format);
        Self {
            context,
            builder,
            requested_key,
            format_init_metadata: Vec::new(),
            playback_cookie: None,
            segments: HashMap::new(),
            target_header_id: None,
            done: false,
        }
    }

    pub fn context(&self) -> &StreamingContext {
        &self.context
    }

    pub fn target_header_id(&self) -> Option<u32> {
        self.target_header_id
    }

    pub fn segment(&self, header_id: u32) -> Option<&Segment> {
        self.segments.get(&header_id)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one part. `Ok(Some(_))` and `Err(_)` both end the session; parts
    /// applied after that are ignored.
    pub fn apply(&mut self, part: &Part) -> Result<Option<Terminal>, SabrError> {
        if self.done {
            tracing::trace!("SABR: session done, ignoring {:?} part", part.part_type);
            return Ok(None);
        }

        let outcome = match part.part_type {
            UmpPartId::FormatInitializationMetadata => self.handle_format_init(part).map(|_| None),
            UmpPartId::NextRequestPolicy => self.handle_next_request_policy(part).map(|_| None),
            UmpPartId::MediaHeader => self.handle_media_header(part).map(|_| None),
            UmpPartId::Media => self.handle_media(part).map(|_| None),
            UmpPartId::MediaEnd => self.handle_media_end(part),
            UmpPartId::SabrError => self.handle_sabr_error(part),
            UmpPartId::StreamProtectionStatus => self.handle_stream_protection_status(part),
            UmpPartId::SabrRedirect => self.handle_sabr_redirect(part),
            UmpPartId::Unknown(other) => {
                tracing::trace!(
                    "SABR: skipping unknown part type={} len={}",
                    other,
                    part.payload.len()
                );
                Ok(None)
            }
        };

        if !matches!(outcome, Ok(None)) {
            self.done = true;
        }
        outcome
    }

    /// Called when the body ends without a terminal part. Under SABR a
    /// recorded redirect becomes an empty response the caller must follow.
    /// Plain UMP follows live redirects immediately, so any redirect left in
    /// its context is the caller's stale one.
    pub fn finish(&mut self) -> Result<Terminal, SabrError> {
        self.done = true;
        if !self.context.is_sabr || self.context.stream_info.redirect.is_none() {
            return Err(SabrError::EmptyResponse);
        }
        tracing::debug!("SABR: body exhausted, handing back recorded redirect");
        Ok(Terminal {
            envelope: self.builder.build(&self.context, Bytes::new())?,
            cache_write: None,
        })
    }

    fn handle_format_init(&mut self, part: &Part) -> Result<(), SabrError> {
        let m = decode(part, decoders::decode_format_init_metadata)?;
        tracing::trace!(
            "SABR: format init itag={:?} mime={:?} end_seg={:?}",
            m.format_id.as_ref().map(|f| f.itag),
            m.mime_type,
            m.end_segment_number
        );
        self.format_init_metadata.push(m);
        Ok(())
    }

    fn handle_next_request_policy(&mut self, part: &Part) -> Result<(), SabrError> {
        let p = decode(part, decoders::decode_next_request_policy)?;
        tracing::trace!(
            "SABR: next request policy backoff={}ms cookie={}",
            p.backoff_time_ms,
            p.playback_cookie.is_some()
        );
        if self.context.wants_video() {
            self.playback_cookie = p.playback_cookie;
        }
        Ok(())
    }

    fn handle_media_header(&mut self, part: &Part) -> Result<(), SabrError> {
        let h = decode(part, decoders::decode_media_header)?;
        let key = FormatKey::from_media_header(&h);

        if self.target_header_id == Some(h.header_id) {
            tracing::trace!("SABR: header id={} is already the target", h.header_id);
            return Ok(());
        }
        if self.context.is_sabr && self.requested_key.as_ref() != Some(&key) {
            tracing::trace!(
                "SABR: media header id={} key={} is not the requested format",
                h.header_id,
                key
            );
            return Ok(());
        }

        if self.target_header_id.is_none() {
            tracing::debug!(
                "SABR: target segment header id={} key={} init={} seq={:?}",
                h.header_id,
                key,
                h.is_init_seg,
                h.sequence_number
            );
            self.target_header_id = Some(h.header_id);
        }
        self.segments.insert(h.header_id, Segment::new(h));
        Ok(())
    }

    fn handle_media(&mut self, part: &Part) -> Result<(), SabrError> {
        let (header_id, data) = split_header_id(&part.payload).map_err(|e| decode_err(part, e))?;

        match self.segments.get_mut(&header_id) {
            Some(segment) if segment.state != SegmentState::Finalized => {
                segment.data.extend_from_slice(data);
                segment.state = SegmentState::Assembling;
            }
            _ => {
                tracing::trace!(
                    "SABR: dropping {}B of media for untracked header id={}",
                    data.len(),
                    header_id
                );
            }
        }
        Ok(())
    }

    fn handle_media_end(&mut self, part: &Part) -> Result<Option<Terminal>, SabrError> {
        let (header_id, _) = split_header_id(&part.payload).map_err(|e| decode_err(part, e))?;

        if self.target_header_id != Some(header_id) {
            if let Some(segment) = self.segments.get_mut(&header_id) {
                segment.state = SegmentState::Finalized;
            }
            return Ok(None);
        }
        let Some(mut segment) = self.segments.remove(&header_id) else {
            return Ok(None);
        };
        segment.state = SegmentState::Finalized;

        let info = &mut self.context.stream_info;
        info.playback_cookie = self.playback_cookie.take();
        info.format_init_metadata = std::mem::take(&mut self.format_init_metadata);
        info.media_header = (!segment.media_header.is_init_seg).then(|| segment.media_header.clone());

        let init_fetch = match (&self.context.format, self.context.byte_range) {
            (Some(format), Some(range)) if self.context.is_init => Some((format.clone(), range)),
            _ => None,
        };

        let (body, cache_write) = match init_fetch {
            Some((format, range)) => {
                let body = Bytes::copy_from_slice(range.slice(&segment.data));
                (body, Some(CacheWrite { segment, format }))
            }
            None => (segment.data.split().freeze(), None),
        };

        tracing::debug!(
            "SABR: target segment id={} complete, returning {}B",
            header_id,
            body.len()
        );

        Ok(Some(Terminal {
            envelope: self.builder.build(&self.context, body)?,
            cache_write,
        }))
    }

    fn handle_sabr_error(&mut self, part: &Part) -> Result<Option<Terminal>, SabrError> {
        let err = decode(part, decoders::decode_sabr_error)?;
        tracing::warn!("SABR: server error type={} code={}", err.error_type, err.code);

        self.context.error = Some(ContextFailure {
            sabr_error: err.clone(),
        });
        Err(self.server_failure(FailureReason::SabrError(err))?)
    }

    fn handle_stream_protection_status(
        &mut self,
        part: &Part,
    ) -> Result<Option<Terminal>, SabrError> {
        let status = decode(part, decoders::decode_stream_protection_status)?;
        let blocked = status.is_blocked();
        let code = status.status;
        self.context.stream_info.stream_protection_status = Some(status);

        match code {
            _ if blocked => {
                tracing::warn!("SABR: stream protection status={} blocks playback", code);
                Err(self.server_failure(FailureReason::Blocked { status: code })?)
            }
            _ => {
                tracing::debug!("SABR: stream protection status={} is not blocking", code);
                Ok(None)
            }
        }
    }

    fn handle_sabr_redirect(&mut self, part: &Part) -> Result<Option<Terminal>, SabrError> {
        let redirect = decode(part, decoders::decode_sabr_redirect)?;
        tracing::debug!("SABR: redirect to {}", redirect.url);
        self.context.stream_info.redirect = Some(redirect);

        if !(self.context.is_ump && !self.context.is_sabr) {
            return Ok(None);
        }
        Ok(Some(Terminal {
            envelope: self.builder.build(&self.context, Bytes::new())?,
            cache_write: None,
        }))
    }

    fn server_failure(&self, reason: FailureReason) -> Result<SabrError, SabrError> {
        let response = self.builder.build(&self.context, Bytes::new())?;
        Ok(SabrError::Server(Box::new(ServerFailure {
            reason,
            context: self.context.clone(),
            response,
        })))
    }
}

fn decode<T>(part: &Part, f: fn(&[u8]) -> Result<T, DecodeError>) -> Result<T, SabrError> {
    f(&part.payload).map_err(|e| decode_err(part, e))
}

fn decode_err(part: &Part, source: DecodeError) -> SabrError {
    SabrError::Decode {
        part: part.part_type,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sabr::context::{ByteRange, RequestedFormat};
    use crate::sabr::proto::ProtoWriter;
    use crate::sabr::response::{RequestKind, ResponseMeta};

    fn part(part_type: UmpPartId, payload: Vec<u8>) -> Part {
        Part {
            part_type,
            payload: Bytes::from(payload),
        }
    }

    fn media_header(header_id: u64, itag: i32, init: bool) -> Part {
        let mut w = ProtoWriter::new();
        w.write_u64(1, header_id);
        w.write_i32(3, itag);
        w.write_bool(8, init);
        part(UmpPartId::MediaHeader, w.finish())
    }

    fn media(header_id: u8, data: &[u8]) -> Part {
        let mut payload = vec![header_id];
        payload.extend_from_slice(data);
        part(UmpPartId::Media, payload)
    }

    fn media_end(header_id: u8) -> Part {
        part(UmpPartId::MediaEnd, vec![header_id])
    }

    fn session(context: StreamingContext) -> SessionState {
        let builder = ResponseBuilder::new(ResponseMeta::default(), "https://vp.example", RequestKind::Segment);
        SessionState::new(context, builder)
    }

    fn sabr_context(itag: i32) -> StreamingContext {
        StreamingContext {
            is_sabr: true,
            is_ump: true,
            format: Some(RequestedFormat {
                itag,
                has_video: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn apply_all(s: &mut SessionState, parts: &[Part]) -> Option<Terminal> {
        parts.iter().find_map(|p| s.apply(p).unwrap())
    }

    #[test]
    fn test_target_segment_is_assembled_in_order() {
        let mut s = session(sabr_context(136));
        let terminal = apply_all(
            &mut s,
            &[
                media_header(1, 136, false),
                media(1, b"ab"),
                media(1, b"cd"),
                media_end(1),
            ],
        )
        .unwrap();

        assert_eq!(&terminal.envelope.body[..], b"abcd");
        assert!(terminal.cache_write.is_none());
        assert!(s.is_done());
        let ctx = terminal.envelope.streaming_context().unwrap().unwrap();
        assert_eq!(ctx.stream_info.media_header.unwrap().header_id, 1);
    }

    #[test]
    fn test_media_for_untracked_header_is_dropped() {
        let mut s = session(sabr_context(136));
        s.apply(&media_header(1, 136, false)).unwrap();
        s.apply(&media_header(2, 140, false)).unwrap();
        s.apply(&media(2, b"audio")).unwrap();
        s.apply(&media(9, b"stray")).unwrap();
        s.apply(&media(1, b"video")).unwrap();

        assert!(s.segment(2).is_none());
        assert_eq!(s.segment(1).unwrap().data.len(), 5);
        assert_eq!(s.segment(1).unwrap().state, SegmentState::Assembling);
    }

    #[test]
    fn test_first_matching_header_wins() {
        let mut s = session(StreamingContext {
            is_ump: true,
            ..Default::default()
        });
        s.apply(&media_header(3, 18, false)).unwrap();
        s.apply(&media_header(4, 22, false)).unwrap();
        assert_eq!(s.target_header_id(), Some(3));

        s.apply(&media(4, b"other")).unwrap();
        s.apply(&media(3, b"mine")).unwrap();
        assert!(s.apply(&media_end(4)).unwrap().is_none());
        assert_eq!(s.segment(4).unwrap().state, SegmentState::Finalized);

        let terminal = s.apply(&media_end(3)).unwrap().unwrap();
        assert_eq!(&terminal.envelope.body[..], b"mine");
    }

    #[test]
    fn test_media_after_finalize_is_dropped() {
        let mut s = session(StreamingContext::default());
        s.apply(&media_header(1, 18, false)).unwrap();
        s.apply(&media_header(2, 18, false)).unwrap();
        s.apply(&media(2, b"x")).unwrap();
        s.apply(&media_end(2)).unwrap();
        s.apply(&media(2, b"late")).unwrap();
        assert_eq!(&s.segment(2).unwrap().data[..], b"x");
    }

    #[test]
    fn test_init_fetch_slices_body_and_keeps_full_segment_for_cache() {
        let mut ctx = sabr_context(136);
        ctx.is_init = true;
        ctx.byte_range = Some(ByteRange { start: 0, end: 9 });
        let mut s = session(ctx);
        let data: Vec<u8> = (0..20).collect();

        let terminal = apply_all(
            &mut s,
            &[media_header(1, 136, true), media(1, &data), media_end(1)],
        )
        .unwrap();

        assert_eq!(&terminal.envelope.body[..], &data[..10]);
        let write = terminal.cache_write.unwrap();
        assert_eq!(&write.segment.data[..], &data[..]);
        assert_eq!(write.format.itag, 136);
        let ctx = terminal.envelope.streaming_context().unwrap().unwrap();
        assert!(ctx.stream_info.media_header.is_none());
    }

    #[test]
    fn test_playback_cookie_only_kept_for_video_formats() {
        let mut cookie = ProtoWriter::new();
        cookie.write_i32(1, 720);
        let mut policy = ProtoWriter::new();
        policy.write_message(7, cookie);
        let policy = policy.finish();

        let mut audio_ctx = sabr_context(140);
        if let Some(f) = audio_ctx.format.as_mut() {
            f.has_video = false;
        }
        for (ctx, expect_cookie) in [(sabr_context(140), true), (audio_ctx, false)] {
            let mut s = session(ctx);
            let terminal = apply_all(
                &mut s,
                &[
                    part(UmpPartId::NextRequestPolicy, policy.clone()),
                    media_header(1, 140, false),
                    media_end(1),
                ],
            )
            .unwrap();
            let ctx = terminal.envelope.streaming_context().unwrap().unwrap();
            assert_eq!(ctx.stream_info.playback_cookie.is_some(), expect_cookie);
        }
    }

    #[test]
    fn test_sabr_error_is_terminal_failure() {
        let mut w = ProtoWriter::new();
        w.write_string(1, "sabr.malformed_config");
        w.write_i32(2, 1);
        let mut s = session(sabr_context(136));

        let err = s.apply(&part(UmpPartId::SabrError, w.finish())).unwrap_err();
        let failure = err.server_failure().unwrap();
        assert_eq!(
            failure.context.error.as_ref().unwrap().sabr_error.error_type,
            "sabr.malformed_config"
        );
        assert!(failure.response.body.is_empty());
        assert!(s.is_done());
        assert!(s.apply(&media_header(1, 136, false)).unwrap().is_none());
    }

    #[test]
    fn test_protection_status_only_status_three_is_terminal() {
        let status = |code: i32| {
            let mut w = ProtoWriter::new();
            w.write_i32(1, code);
            part(UmpPartId::StreamProtectionStatus, w.finish())
        };
        let mut s = session(sabr_context(136));
        assert!(s.apply(&status(2)).unwrap().is_none());
        assert!(!s.is_done());
        assert_eq!(
            s.context().stream_info.stream_protection_status.as_ref().unwrap().status,
            2
        );

        let err = s.apply(&status(3)).unwrap_err();
        assert_eq!(
            err.server_failure().unwrap().reason,
            FailureReason::Blocked { status: 3 }
        );
    }

    #[test]
    fn test_redirect_is_immediate_only_for_plain_ump() {
        let mut w = ProtoWriter::new();
        w.write_string(1, "https://rr5.example/vp");
        let redirect = part(UmpPartId::SabrRedirect, w.finish());

        let mut plain = session(StreamingContext {
            is_ump: true,
            ..Default::default()
        });
        let terminal = plain.apply(&redirect).unwrap().unwrap();
        assert!(terminal.envelope.body.is_empty());
        let ctx = terminal.envelope.streaming_context().unwrap().unwrap();
        assert_eq!(ctx.stream_info.redirect.unwrap().url, "https://rr5.example/vp");

        let mut sabr = session(sabr_context(136));
        assert!(sabr.apply(&redirect).unwrap().is_none());
        let terminal = sabr.finish().unwrap();
        assert!(terminal.envelope.body.is_empty());
    }

    #[test]
    fn test_finish_without_redirect_fails() {
        let mut s = session(sabr_context(136));
        s.apply(&media_header(1, 136, false)).unwrap();
        assert!(matches!(s.finish(), Err(SabrError::EmptyResponse)));
    }

    #[test]
    fn test_finish_ignores_stale_redirect_in_plain_ump() {
        let mut ctx = StreamingContext {
            is_ump: true,
            ..Default::default()
        };
        ctx.stream_info.redirect = Some(crate::sabr::structs::SabrRedirect {
            url: "https://old.example/vp".into(),
        });
        let mut s = session(ctx);
        assert!(matches!(s.finish(), Err(SabrError::EmptyResponse)));
    }

    #[test]
    fn test_malformed_payload_is_fatal() {
        let mut s = session(sabr_context(136));
        let err = s
            .apply(&part(UmpPartId::MediaHeader, vec![0x0A, 0x09, b'x']))
            .unwrap_err();
        assert!(matches!(
            err,
            SabrError::Decode {
                part: UmpPartId::MediaHeader,
                ..
            }
        ));
        assert!(matches!(
            session(sabr_context(1)).apply(&part(UmpPartId::Media, vec![])),
            Err(SabrError::Decode { .. })
        ));
    }
}
