use std::fmt;

use thiserror::Error;

use crate::common::types::AnyError;
use crate::sabr::{ResponseEnvelope, StreamingContext, UmpPartId, structs::SabrErrorMsg};

/// Whether the caller may retry with a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Recoverable,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The server or the stream reported a failure.
    Network,
    /// The bytes on the wire did not match the expected schema.
    Protocol,
    /// Reading the response body failed.
    Transport,
}

/// A part payload that could not be decoded against its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of message at byte {offset}")]
    Truncated { offset: usize },
    #[error("varint at byte {offset} does not fit in 64 bits")]
    VarintOverflow { offset: usize },
    #[error("field number 0 at byte {offset}")]
    InvalidField { offset: usize },
    #[error("unsupported wire type {wire_type} at byte {offset}")]
    InvalidWireType { wire_type: u8, offset: usize },
    #[error("string field at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("media part has no header id")]
    MissingHeaderId,
}

/// The streaming context header could not be produced or read back.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("streaming context is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("streaming context is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why the server refused to deliver media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    SabrError(SabrErrorMsg),
    Blocked { status: i32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SabrError(e) => write!(f, "SABR error type={} code={}", e.error_type, e.code),
            Self::Blocked { status } => write!(f, "stream protection status {status}"),
        }
    }
}

/// A protocol-reported failure, with the context snapshot and the empty
/// response that carries it back to the caller.
#[derive(Debug)]
pub struct ServerFailure {
    pub reason: FailureReason,
    pub context: StreamingContext,
    pub response: ResponseEnvelope,
}

#[derive(Debug, Error)]
pub enum SabrError {
    #[error("malformed {part:?} part: {source}")]
    Decode {
        part: UmpPartId,
        source: DecodeError,
    },
    #[error("server streaming error: {}", .0.reason)]
    Server(Box<ServerFailure>),
    #[error("empty response with no redirect information")]
    EmptyResponse,
    #[error("couldn't read any data from the stream")]
    NoData,
    #[error("failed to read response body: {0}")]
    Body(AnyError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl SabrError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Decode { .. } | Self::Context(_) => Severity::Critical,
            Self::Server(_) | Self::EmptyResponse | Self::NoData | Self::Body(_) => {
                Severity::Recoverable
            }
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode { .. } | Self::Context(_) => ErrorCategory::Protocol,
            Self::Body(_) => ErrorCategory::Transport,
            Self::Server(_) | Self::EmptyResponse | Self::NoData => ErrorCategory::Network,
        }
    }

    pub fn server_failure(&self) -> Option<&ServerFailure> {
        match self {
            Self::Server(failure) => Some(&**failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let decode = SabrError::Decode {
            part: UmpPartId::MediaHeader,
            source: DecodeError::Truncated { offset: 4 },
        };
        assert_eq!(decode.severity(), Severity::Critical);
        assert_eq!(decode.category(), ErrorCategory::Protocol);
        assert_eq!(
            decode.to_string(),
            "malformed MediaHeader part: unexpected end of message at byte 4"
        );

        assert_eq!(SabrError::EmptyResponse.severity(), Severity::Recoverable);
        assert_eq!(SabrError::NoData.category(), ErrorCategory::Network);
        assert_eq!(
            SabrError::Body("reset".into()).category(),
            ErrorCategory::Transport
        );
    }
}
