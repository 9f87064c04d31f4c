use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::context::RequestedFormat;
use super::format_key::FormatKey;
use super::session::Segment;
use crate::common::types::AnyResult;

/// Storage for finalized initialization segments, keyed by format.
#[async_trait]
pub trait SegmentCache: Send + Sync {
    async fn put(&self, segment: Segment, format: RequestedFormat) -> AnyResult<()>;
}

/// A pending cache store produced when an initialization segment completes.
#[derive(Debug)]
pub struct CacheWrite {
    pub segment: Segment,
    pub format: RequestedFormat,
}

impl CacheWrite {
    /// Runs the store on the runtime without waiting for it. Failures are
    /// logged and otherwise ignored.
    pub fn spawn(self, cache: Arc<dyn SegmentCache>) {
        let header_id = self.segment.header_id;
        let itag = self.format.itag;
        tokio::spawn(async move {
            if let Err(e) = cache.put(self.segment, self.format).await {
                tracing::warn!(
                    "SABR: caching init segment id={} itag={} failed: {}",
                    header_id,
                    itag,
                    e
                );
            }
        });
    }
}

/// Process-local [`SegmentCache`].
#[derive(Debug, Default)]
pub struct MemorySegmentCache {
    segments: DashMap<FormatKey, Bytes>,
}

impl MemorySegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, format: &RequestedFormat) -> Option<Bytes> {
        self.segments
            .get(&FormatKey::from_format(format))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[async_trait]
impl SegmentCache for MemorySegmentCache {
    async fn put(&self, segment: Segment, format: RequestedFormat) -> AnyResult<()> {
        let key = FormatKey::from_format(&format);
        tracing::trace!("SABR: cached init segment {} ({}B)", key, segment.data.len());
        self.segments.insert(key, segment.data.freeze());
        Ok(())
    }
}
