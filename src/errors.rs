use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const MALFORMED_ENCODING: &str = "MALFORMED_ENCODING";
pub const OVERLAY_SOURCE_UNAVAILABLE: &str = "OVERLAY_SOURCE_UNAVAILABLE";
pub const UPLOAD_REJECTED: &str = "UPLOAD_REJECTED";
pub const NETWORK_UNAVAILABLE: &str = "NETWORK_UNAVAILABLE";
pub const EMPTY_CAPTURE: &str = "EMPTY_CAPTURE";
pub const USAGE_ERROR: &str = "USAGE_ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PadErrorKind {
    MalformedEncoding,
    OverlaySourceUnavailable,
    UploadRejected,
    NetworkUnavailable,
    EmptyCapture,
}

impl PadErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::MalformedEncoding => MALFORMED_ENCODING,
            Self::OverlaySourceUnavailable => OVERLAY_SOURCE_UNAVAILABLE,
            Self::UploadRejected => UPLOAD_REJECTED,
            Self::NetworkUnavailable => NETWORK_UNAVAILABLE,
            Self::EmptyCapture => EMPTY_CAPTURE,
        }
    }
}

/// Failure surfaced by the capture, compositing and upload path.
///
/// Every variant is recoverable at the pad controller: the controller keeps
/// the kind for its `Error` state and renders [`PadError::notification`] for
/// the person signing.
#[derive(Debug, Clone)]
pub struct PadError {
    pub kind: PadErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl PadError {
    fn new(kind: PadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn malformed_encoding(message: impl Into<String>) -> Self {
        Self::new(PadErrorKind::MalformedEncoding, message)
    }

    pub fn overlay_unavailable(message: impl Into<String>) -> Self {
        Self::new(PadErrorKind::OverlaySourceUnavailable, message)
    }

    pub fn upload_rejected(message: impl Into<String>) -> Self {
        Self::new(PadErrorKind::UploadRejected, message)
    }

    pub fn network_unavailable(message: impl Into<String>) -> Self {
        Self::new(PadErrorKind::NetworkUnavailable, message)
    }

    pub fn empty_capture() -> Self {
        Self::new(
            PadErrorKind::EmptyCapture,
            "nothing has been drawn or placed on the pad",
        )
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Plain-language text for a toast or inline alert.
    pub fn notification(&self) -> String {
        match self.kind {
            PadErrorKind::MalformedEncoding => {
                "The signature image could not be read. Please clear the pad and sign again."
                    .to_owned()
            }
            PadErrorKind::OverlaySourceUnavailable => {
                "A saved signature could not be loaded onto the document. Nothing was saved; please try again."
                    .to_owned()
            }
            PadErrorKind::UploadRejected => format!(
                "The server did not accept the signature: {}",
                self.message
            ),
            PadErrorKind::NetworkUnavailable => {
                "Could not reach the server. Check your connection and press Save to try again."
                    .to_owned()
            }
            PadErrorKind::EmptyCapture => "Please sign before saving.".to_owned(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code().to_owned(),
                message: self.message.clone(),
                notification: self.notification(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for PadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for PadError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    pub notification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    /// Envelope for failures outside the capture path (bad flags, unreadable
    /// files, invalid config).
    pub fn usage(error: &Error) -> Self {
        let message = format!("{error:#}");
        Self {
            ok: false,
            error: ErrorEnvelopeBody {
                code: USAGE_ERROR.to_owned(),
                notification: message.clone(),
                message,
                details: None,
            },
        }
    }
}

pub fn find_pad_error(error: &Error) -> Option<&PadError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PadError>())
}
