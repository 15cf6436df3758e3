#![forbid(unsafe_code)]

//! Error kinds shared by the caption source, the resolver and the HTTP layer.

use axum::http::StatusCode;
use thiserror::Error;

/// Failures surfaced to callers of the resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("no usable captions found for this video")]
    NotAvailable,

    #[error("captions are disabled for this video")]
    Disabled,

    #[error("upstream refused the request as automated traffic")]
    Blocked,

    #[error("video is unavailable or private")]
    NotFound,

    #[error("caption download timed out")]
    Timeout,

    #[error("caption file had an unrecognized format")]
    UnrecognizedFormat,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid video id: {0}")]
    InvalidVideoId(String),
}

impl TranscriptError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAvailable | Self::Disabled | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Blocked => StatusCode::FORBIDDEN,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidVideoId(_) => StatusCode::BAD_REQUEST,
            Self::UnrecognizedFormat | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable label, used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAvailable => "not_available",
            Self::Disabled => "disabled",
            Self::Blocked => "blocked",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::UnrecognizedFormat => "unrecognized_format",
            Self::Upstream(_) => "upstream_error",
            Self::InvalidVideoId(_) => "invalid_video_id",
        }
    }
}

/// Failures reported by a [`crate::source::CaptionSource`].
///
/// `TrackMissing` and `Decode` only concern the track that was asked for;
/// the resolver recovers from them by moving on. Everything else is fatal for
/// the whole request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("requested caption track is not available")]
    TrackMissing,

    #[error("captions are disabled")]
    Disabled,

    #[error("blocked by upstream")]
    Blocked,

    #[error("video not found")]
    NotFound,

    #[error("external call timed out")]
    Timeout,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Upstream(String),
}

impl SourceError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TrackMissing | Self::Decode(_))
    }
}

impl From<SourceError> for TranscriptError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::TrackMissing => Self::NotAvailable,
            SourceError::Disabled => Self::Disabled,
            SourceError::Blocked => Self::Blocked,
            SourceError::NotFound => Self::NotFound,
            SourceError::Timeout => Self::Timeout,
            SourceError::Decode(_) => Self::UnrecognizedFormat,
            SourceError::Upstream(message) => Self::Upstream(message),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized subtitle format")]
    UnrecognizedFormat,
}
