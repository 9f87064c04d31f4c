//! SABR/UMP response demultiplexing.
//!
//! A UMP body is a run of tagged, length-prefixed parts that interleave
//! control messages with the bytes of one or more media segments. This
//! module pulls the single segment a request asked for out of that run and
//! turns it into the response the host player consumes, together with the
//! streaming context that seeds the next request of the session.

pub mod cache;
pub mod context;
pub mod decoders;
pub mod format_key;
pub mod parser;
pub mod proto;
pub mod response;
pub mod session;
pub mod structs;
pub mod ump;

pub use cache::{CacheWrite, MemorySegmentCache, SegmentCache};
pub use context::{
    ByteRange, ContextFailure, RequestedFormat, STREAMING_CONTEXT_HEADER, StreamInfo,
    StreamingContext,
};
pub use format_key::FormatKey;
pub use parser::{SabrUmpParser, parse_response};
pub use response::{RequestKind, ResponseBuilder, ResponseEnvelope, ResponseMeta};
pub use session::{Segment, SegmentState, SessionState, Terminal};
pub use ump::{Part, UmpDemuxer};

/// UMP part types the parser acts on. Every other tag is carried as
/// `Unknown` and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UmpPartId {
    MediaHeader,
    Media,
    MediaEnd,
    NextRequestPolicy,
    FormatInitializationMetadata,
    SabrRedirect,
    SabrError,
    StreamProtectionStatus,
    Unknown(u64),
}

impl UmpPartId {
    pub fn from_u64(v: u64) -> Self {
        match v {
            20 => Self::MediaHeader,
            21 => Self::Media,
            22 => Self::MediaEnd,
            35 => Self::NextRequestPolicy,
            42 => Self::FormatInitializationMetadata,
            43 => Self::SabrRedirect,
            44 => Self::SabrError,
            58 => Self::StreamProtectionStatus,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Self::MediaHeader => 20,
            Self::Media => 21,
            Self::MediaEnd => 22,
            Self::NextRequestPolicy => 35,
            Self::FormatInitializationMetadata => 42,
            Self::SabrRedirect => 43,
            Self::SabrError => 44,
            Self::StreamProtectionStatus => 58,
            Self::Unknown(other) => other,
        }
    }
}
