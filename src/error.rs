//! Capture error taxonomy and platform exception classification.

use std::fmt;
use thiserror::Error;

/// Closed set of failure codes surfaced by the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    PermissionDenied,
    NotSupported,
    ConstraintFailed,
    StabilizationTimeout,
    StreamEnded,
    CaptureInterrupted,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::NotSupported => "not_supported",
            ErrorCode::ConstraintFailed => "constraint_failed",
            ErrorCode::StabilizationTimeout => "stabilization_timeout",
            ErrorCode::StreamEnded => "stream_ended",
            ErrorCode::CaptureInterrupted => "capture_interrupted",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw failure reported by the media platform.
///
/// `name` follows the DOMException naming used by browsers
/// (`NotAllowedError`, `OverconstrainedError`, ...), so backends that are
/// not browsers pick the closest name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new("NotAllowedError", message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new("NotSupportedError", message)
    }

    pub fn overconstrained(message: impl Into<String>) -> Self {
        Self::new("OverconstrainedError", message)
    }

    pub fn not_readable(message: impl Into<String>) -> Self {
        Self::new("NotReadableError", message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new("InvalidStateError", message)
    }
}

/// Error surfaced to callers of the capture engine.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct CaptureError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<PlatformError>,
}

impl CaptureError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_cause(code: ErrorCode, message: impl Into<String>, cause: PlatformError) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(cause),
        }
    }

    /// Wraps a platform failure, classifying it on the way.
    pub fn from_platform(message: impl Into<String>, cause: PlatformError) -> Self {
        Self::with_cause(classify(&cause), message, cause)
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Maps a raw platform failure onto the capture error taxonomy.
pub fn classify(error: &PlatformError) -> ErrorCode {
    match error.name.as_str() {
        "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
            ErrorCode::PermissionDenied
        }
        "NotSupportedError" | "TypeError" => ErrorCode::NotSupported,
        "OverconstrainedError"
        | "ConstraintNotSatisfiedError"
        | "NotFoundError"
        | "DevicesNotFoundError"
        | "NotReadableError"
        | "TrackStartError" => ErrorCode::ConstraintFailed,
        "AbortError" => ErrorCode::CaptureInterrupted,
        "InvalidStateError" => ErrorCode::StreamEnded,
        _ => ErrorCode::Unknown,
    }
}
