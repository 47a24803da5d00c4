//! Common error types for ATR

use thiserror::Error;

/// Common result type for ATR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across ATR crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Caller input defects found before any network call.
///
/// Display text is suitable for showing directly to the submitter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No JSON payload provided")]
    MissingPayload,

    #[error("Invalid JSON structure. Must include a non-empty \"targets\" array.")]
    MissingTargets,

    #[error("Target {index} missing required field: {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("Target {index} field {field} has an invalid type")]
    InvalidField { index: usize, field: &'static str },

    #[error("Envelope field {field} has an invalid type")]
    InvalidEnvelopeField { field: &'static str },

    #[error("Missing or invalid lat/lon")]
    MissingLocation,

    #[error("No image file provided")]
    MissingImage,

    #[error("Invalid image type {media_type}. Allowed: {allowed}")]
    InvalidImageType { media_type: String, allowed: String },

    #[error("Image exceeds the {limit} byte limit")]
    ImageTooLarge { limit: usize },
}

impl ValidationError {
    /// Stable machine-readable kind, used as the HTTP error code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingPayload => "MISSING_PAYLOAD",
            ValidationError::MissingTargets => "MISSING_TARGETS",
            ValidationError::MissingField { .. } => "MISSING_FIELD",
            ValidationError::InvalidField { .. } | ValidationError::InvalidEnvelopeField { .. } => {
                "INVALID_FIELD"
            }
            ValidationError::MissingLocation => "MISSING_LOCATION",
            ValidationError::MissingImage => "MISSING_IMAGE",
            ValidationError::InvalidImageType { .. } => "INVALID_IMAGE_TYPE",
            ValidationError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
        }
    }
}
