use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CANCELED_NOTICE: &str = "Request canceled";

const FACE_HINT: &str = "make sure both images show a clearly visible face";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Cancelled,
    Remote,
    Protocol,
    UnsupportedFormat,
    Processing,
    Transport,
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please upload both images!")]
    MissingImages,
    #[error("Please enter valid values (0-100) for ratios!")]
    InvalidRatios,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request was cancelled")]
    Cancelled,
    #[error("{0}")]
    Remote(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("{0}")]
    Processing(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("failed to display image: {0}")]
    Render(String),
}

impl SwapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Processing(_) => ErrorKind::Processing,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Render(_) => ErrorKind::Render,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text for the error line. Cancellation gets the neutral notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => CANCELED_NOTICE.to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Remote(message) | Self::Processing(message) | Self::Protocol(message) => {
                with_face_hint(format!("Error: {message}"), message)
            }
            other => format!("Error: {other}"),
        }
    }
}

fn with_face_hint(text: String, message: &str) -> String {
    if message.to_ascii_lowercase().contains("face") {
        format!("{text} ({FACE_HINT})")
    } else {
        text
    }
}
