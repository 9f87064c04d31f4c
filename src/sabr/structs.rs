use serde::{Deserialize, Serialize};

/// Status value of a stream protection status part that blocks playback.
pub const PROTECTION_STATUS_BLOCKED: i32 = 3;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatId {
    pub itag: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xtags: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_ticks: i64,
    pub duration_ticks: i64,
    pub timescale: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaHeader {
    pub header_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub itag: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xtags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_range: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_algorithm: Option<i32>,
    pub is_init_seg: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_bps: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_id: Option<FormatId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatInitializationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_id: Option<FormatId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_segment_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_range: Option<ByteSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_range: Option<ByteSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_units: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_timescale: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackCookie {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field2: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_fmt: Option<FormatId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_fmt: Option<FormatId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextRequestPolicy {
    pub target_audio_readahead_ms: i32,
    pub target_video_readahead_ms: i32,
    pub backoff_time_ms: i32,
    pub playback_cookie: Option<PlaybackCookie>,
    pub video_id: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabrRedirect {
    pub url: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabrErrorMsg {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamProtectionStatus {
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
}

impl StreamProtectionStatus {
    pub fn is_blocked(&self) -> bool {
        self.status == PROTECTION_STATUS_BLOCKED
    }
}
