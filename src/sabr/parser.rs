//! The read loop that drives a UMP response body through the session.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::cache::SegmentCache;
use super::context::StreamingContext;
use super::response::{RequestKind, ResponseBuilder, ResponseEnvelope, ResponseMeta};
use super::session::{SessionState, Terminal};
use super::ump::UmpDemuxer;
use crate::common::errors::{SabrError, ServerFailure};
use crate::common::types::AnyError;

/// Parses one UMP response body into the envelope of its target segment.
///
/// The token is shared with whoever issued the request: the parser cancels
/// it once a terminal part is handled, and stops reading as soon as anyone
/// else cancels it.
pub struct SabrUmpParser<S> {
    body: S,
    builder: ResponseBuilder,
    context: StreamingContext,
    cancel: CancellationToken,
    cache: Option<Arc<dyn SegmentCache>>,
}

impl<S, E> SabrUmpParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<AnyError>,
{
    pub fn new(
        body: S,
        builder: ResponseBuilder,
        context: StreamingContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            body,
            builder,
            context,
            cancel,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn SegmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn parse(self) -> Result<ResponseEnvelope, SabrError> {
        let Self {
            mut body,
            builder,
            context,
            cancel,
            cache,
        } = self;

        let mut state = SessionState::new(context, builder);
        let mut demuxer = UmpDemuxer::new();
        let mut reads = 0usize;

        let outcome = 'read: loop {
            if cancel.is_cancelled() {
                break Err(SabrError::NoData);
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(SabrError::NoData),
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    cancel.cancel();
                    break Err(SabrError::Body(e.into()));
                }
                None => {
                    tracing::trace!(
                        "SABR: body exhausted after {} reads, {}B left undecoded",
                        reads,
                        demuxer.partial_len()
                    );
                    break state.finish();
                }
            };
            reads += 1;

            for part in demuxer.push(chunk) {
                match state.apply(&part) {
                    Ok(None) => {}
                    Ok(Some(terminal)) => {
                        cancel.cancel();
                        break 'read Ok(terminal);
                    }
                    Err(e) => {
                        cancel.cancel();
                        break 'read Err(e);
                    }
                }
            }
        };

        let Terminal {
            envelope,
            cache_write,
        } = outcome?;

        if let Some(write) = cache_write {
            match cache {
                Some(cache) => write.spawn(cache),
                None => tracing::trace!("SABR: no segment cache, init segment not stored"),
            }
        }

        if envelope.body.is_empty() {
            if let Some(reason) = state.context().failure_reason() {
                tracing::warn!("SABR: empty response masks a server failure: {}", reason);
                return Err(SabrError::Server(Box::new(ServerFailure {
                    reason,
                    context: state.context().clone(),
                    response: envelope,
                })));
            }
        }

        Ok(envelope)
    }
}

/// Parses a `reqwest` response whose body is UMP-framed.
pub async fn parse_response(
    res: reqwest::Response,
    request_uri: impl Into<String>,
    request_kind: RequestKind,
    context: StreamingContext,
    cancel: CancellationToken,
    cache: Option<Arc<dyn SegmentCache>>,
) -> Result<ResponseEnvelope, SabrError> {
    let builder = ResponseBuilder::new(ResponseMeta::from_reqwest(&res), request_uri, request_kind);
    tracing::debug!(
        "SABR: parsing {} response from {} (status {})",
        if context.is_sabr { "SABR" } else { "UMP" },
        res.url(),
        res.status()
    );

    let parser = SabrUmpParser::new(Box::pin(res.bytes_stream()), builder, context, cancel);
    match cache {
        Some(cache) => parser.with_cache(cache).parse().await,
        None => parser.parse().await,
    }
}
