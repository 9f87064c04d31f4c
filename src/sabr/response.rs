use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::context::{STREAMING_CONTEXT_HEADER, StreamingContext};
use crate::common::errors::ContextError;

/// Request types of the host player's networking engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Manifest = 0,
    #[default]
    Segment = 1,
    License = 2,
    App = 3,
    Timing = 4,
    ServerCertificate = 5,
    Key = 6,
    Ads = 7,
    ContentSteering = 8,
}

impl RequestKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Manifest),
            1 => Some(Self::Segment),
            2 => Some(Self::License),
            3 => Some(Self::App),
            4 => Some(Self::Timing),
            5 => Some(Self::ServerCertificate),
            6 => Some(Self::Key),
            7 => Some(Self::Ads),
            8 => Some(Self::ContentSteering),
            _ => None,
        }
    }
}

/// The upstream response as it looked before its body was read.
#[derive(Debug, Default, Clone)]
pub struct ResponseMeta {
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub final_uri: String,
}

impl ResponseMeta {
    pub fn from_reqwest(res: &reqwest::Response) -> Self {
        let headers = res
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        Self {
            headers,
            status: res.status().as_u16(),
            final_uri: res.url().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub status: u16,
    pub request_uri: String,
    pub final_uri: String,
    pub request_kind: RequestKind,
}

impl ResponseEnvelope {
    /// Decodes the embedded streaming context, if the response carries one.
    pub fn streaming_context(&self) -> Option<Result<StreamingContext, ContextError>> {
        self.headers
            .get(STREAMING_CONTEXT_HEADER)
            .map(|v| StreamingContext::from_header_value(v))
    }
}

/// Produces the envelopes of one parse session.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    meta: ResponseMeta,
    request_uri: String,
    request_kind: RequestKind,
}

impl ResponseBuilder {
    pub fn new(meta: ResponseMeta, request_uri: impl Into<String>, request_kind: RequestKind) -> Self {
        Self {
            meta,
            request_uri: request_uri.into(),
            request_kind,
        }
    }

    /// Builds the envelope with a snapshot of `context` in its headers.
    pub fn build(
        &self,
        context: &StreamingContext,
        body: Bytes,
    ) -> Result<ResponseEnvelope, ContextError> {
        let mut headers = self.meta.headers.clone();
        headers.insert(
            STREAMING_CONTEXT_HEADER.to_string(),
            context.to_header_value()?,
        );

        Ok(ResponseEnvelope {
            headers,
            body,
            status: self.meta.status,
            request_uri: self.request_uri.clone(),
            final_uri: self.meta.final_uri.clone(),
            request_kind: self.request_kind,
        })
    }
}
