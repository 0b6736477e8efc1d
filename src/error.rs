//! Typed errors for the ingestion and engine layers.
//!
//! Every [`IngestError`] maps to exactly one [`Status`] so handlers can turn a
//! failed step straight into a response envelope.

use crate::envelope::{IdentificationResult, Status};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Download(String),

    #[error("not an image URL!")]
    NotAnImage,

    #[error("{0}")]
    Storage(#[from] std::io::Error),

    #[error("Image file format error, only support png, jpg, jpeg, bmp, got {0}")]
    FileType(String),

    #[error("{0}")]
    Content(String),

    #[error("filename has no usable basename")]
    InvalidFilename,

    #[error("missing form field")]
    MissingField,

    #[error("invalid form data: {0}")]
    Form(String),
}

impl IngestError {
    pub fn status(&self) -> Status {
        match self {
            IngestError::Download(_) | IngestError::NotAnImage => Status::DownloadError,
            IngestError::Storage(_) => Status::StorageError,
            IngestError::FileType(_) => Status::FileTypeError,
            IngestError::Content(_) => Status::ContentError,
            IngestError::InvalidFilename | IngestError::MissingField | IngestError::Form(_) => {
                Status::ParameterError
            }
        }
    }

    /// Envelope describing this failure to the client.
    pub fn to_envelope(&self) -> IdentificationResult {
        let message = match self {
            IngestError::Download(_) | IngestError::NotAnImage => {
                format!("Image download error: {}", self)
            }
            IngestError::Storage(_) => format!("Image storage error: {}", self),
            IngestError::Content(_) => format!("Image content error: {}", self),
            IngestError::FileType(_) => self.to_string(),
            IngestError::InvalidFilename | IngestError::MissingField | IngestError::Form(_) => {
                return IdentificationResult::parameter_error()
            }
        };
        IdentificationResult::failure(self.status(), message)
    }
}

/// Failure of the identification engine call itself, as opposed to the
/// preprocess/inference outcomes the engine reports normally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine returned HTTP {0}")]
    HttpStatus(u16),

    #[error("engine returned unknown status {0}")]
    UnknownStatus(i32),

    #[error("failed to encode image for engine: {0}")]
    Encode(#[from] image::ImageError),

    #[error("identification worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
