//! The streaming context threaded from one request of a session to the next.
//!
//! The caller builds a [`StreamingContext`] before each request, the parser
//! fills in what the server reported, and the result travels back to the
//! caller base64-encoded in the [`STREAMING_CONTEXT_HEADER`] response header.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::{Deserialize, Serialize};

use super::structs::{
    FormatInitializationMetadata, MediaHeader, PlaybackCookie, SabrErrorMsg, SabrRedirect,
    StreamProtectionStatus,
};
use crate::common::errors::{ContextError, FailureReason};

pub const STREAMING_CONTEXT_HEADER: &str = "X-Streaming-Context";

/// Inclusive byte range of an initialization segment request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Bytes `start..=end` of `data`, clamped to its length.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let len = data.len();
        let start = usize::try_from(self.start).unwrap_or(len).min(len);
        let end = usize::try_from(self.end)
            .ok()
            .and_then(|e| e.checked_add(1))
            .unwrap_or(len)
            .min(len);
        if start >= end { &[] } else { &data[start..end] }
    }
}

/// The adaptive format the caller wants, as the player API describes it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedFormat {
    pub itag: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xtags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// What the server told us during the session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<SabrRedirect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_protection_status: Option<StreamProtectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_cookie: Option<PlaybackCookie>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub format_init_metadata: Vec<FormatInitializationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_header: Option<MediaHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFailure {
    pub sabr_error: SabrErrorMsg,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingContext {
    #[serde(rename = "isSABR")]
    pub is_sabr: bool,
    #[serde(rename = "isUMP")]
    pub is_ump: bool,
    pub is_init: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<RequestedFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_range: Option<ByteRange>,
    pub stream_info: StreamInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ContextFailure>,
}

impl StreamingContext {
    pub fn to_header_value(&self) -> Result<String, ContextError> {
        Ok(B64.encode(serde_json::to_vec(self)?))
    }

    pub fn from_header_value(value: &str) -> Result<Self, ContextError> {
        let json = B64.decode(value.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn wants_video(&self) -> bool {
        self.format.as_ref().is_some_and(|f| f.has_video)
    }

    pub fn is_blocked(&self) -> bool {
        self.stream_info
            .stream_protection_status
            .as_ref()
            .is_some_and(StreamProtectionStatus::is_blocked)
    }

    /// The server-side failure this context records, if any. A reported
    /// error takes precedence over a blocking protection status.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        if let Some(failure) = &self.error {
            return Some(FailureReason::SabrError(failure.sabr_error.clone()));
        }
        self.stream_info
            .stream_protection_status
            .as_ref()
            .filter(|s| s.is_blocked())
            .map(|s| FailureReason::Blocked { status: s.status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_round_trips_through_base64_json() {
        let ctx = StreamingContext {
            is_sabr: true,
            is_ump: true,
            format: Some(RequestedFormat {
                itag: 136,
                has_video: true,
                ..Default::default()
            }),
            byte_range: Some(ByteRange { start: 0, end: 740 }),
            ..Default::default()
        };
        let value = ctx.to_header_value().unwrap();
        assert_eq!(StreamingContext::from_header_value(&value).unwrap(), ctx);
    }

    #[test]
    fn test_json_field_names() {
        let mut ctx = StreamingContext {
            is_sabr: true,
            ..Default::default()
        };
        ctx.stream_info.redirect = Some(SabrRedirect {
            url: "https://rr2.example".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["isSABR"], true);
        assert_eq!(json["isUMP"], false);
        assert_eq!(json["streamInfo"]["redirect"]["url"], "https://rr2.example");
    }

    #[test]
    fn test_sparse_context_from_caller() {
        let value = B64.encode(r#"{"isUMP":true,"format":{"itag":140,"has_audio":true}}"#);
        let ctx = StreamingContext::from_header_value(&value).unwrap();
        assert!(ctx.is_ump);
        assert!(!ctx.is_sabr);
        assert!(!ctx.wants_video());
        assert_eq!(ctx.format.unwrap().itag, 140);
    }

    #[test]
    fn test_garbage_header_is_rejected() {
        assert!(matches!(
            StreamingContext::from_header_value("not base64!"),
            Err(ContextError::Base64(_))
        ));
        let value = B64.encode("{");
        assert!(matches!(
            StreamingContext::from_header_value(&value),
            Err(ContextError::Json(_))
        ));
    }

    #[test]
    fn test_failure_reason_prefers_reported_error() {
        let mut ctx = StreamingContext::default();
        assert_eq!(ctx.failure_reason(), None);

        ctx.stream_info.stream_protection_status = Some(StreamProtectionStatus {
            status: 3,
            max_retries: None,
        });
        assert_eq!(ctx.failure_reason(), Some(FailureReason::Blocked { status: 3 }));

        let err = SabrErrorMsg {
            error_type: "sabr.unavailable".into(),
            code: 1,
        };
        ctx.error = Some(ContextFailure {
            sabr_error: err.clone(),
        });
        assert_eq!(ctx.failure_reason(), Some(FailureReason::SabrError(err)));
    }

    #[test]
    fn test_byte_range_slice_is_inclusive_and_clamped() {
        let data: Vec<u8> = (0..20).collect();
        assert_eq!(ByteRange { start: 0, end: 9 }.slice(&data), &data[0..10]);
        assert_eq!(ByteRange { start: 15, end: 99 }.slice(&data), &data[15..]);
        assert!(ByteRange { start: 30, end: 40 }.slice(&data).is_empty());
    }
}
