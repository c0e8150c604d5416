//! Error types for the conversion service.
//!
//! Every variant maps to a stable, generic client message. Paths, engine
//! diagnostics and io details stay in the server log.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::metrics::CONVERSION_FAILURES;

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Why an upload was refused before any workspace was created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputRejection {
    #[error("no file field in upload")]
    MissingFile,

    #[error("upload of {size} bytes exceeds limit of {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("extension {0:?} not accepted")]
    Extension(String),

    #[error("content type {0:?} not accepted")]
    MimeType(String),

    #[error("leading bytes do not match the declared extension")]
    Signature,

    #[error("filename of {0} bytes is too long")]
    FilenameTooLong(usize),

    #[error("malformed multipart body: {0}")]
    Malformed(String),
}

/// Admission tier that refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Api,
    Convert,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Api => "api",
            Tier::Convert => "convert",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input rejected: {0}")]
    InputValidation(#[from] InputRejection),

    #[error("workspace resource failure at {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path {path:?} escapes {boundary:?}")]
    PathViolation { path: PathBuf, boundary: PathBuf },

    #[error("conversion engine failed: {0}")]
    Conversion(String),

    #[error("conversion exceeded {0:?}")]
    Timeout(Duration),

    #[error("engine reported success but no output was found in {0:?}")]
    OutputMissing(PathBuf),

    #[error("engine produced an unusable output at {0:?}")]
    InvalidOutput(PathBuf),

    #[error("admission denied by {} tier", .0.as_str())]
    AdmissionDenied(Tier),
}

impl ConvertError {
    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Resource {
            path: path.into(),
            source,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::InputValidation(_) => "input_validation",
            ConvertError::Resource { .. } => "resource",
            ConvertError::PathViolation { .. } => "path_violation",
            ConvertError::Conversion(_) => "conversion",
            ConvertError::Timeout(_) => "timeout",
            ConvertError::OutputMissing(_) => "output_missing",
            ConvertError::InvalidOutput(_) => "invalid_output",
            ConvertError::AdmissionDenied(_) => "admission_denied",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::InputValidation(InputRejection::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ConvertError::InputValidation(_) | ConvertError::PathViolation { .. } => {
                StatusCode::BAD_REQUEST
            }
            ConvertError::AdmissionDenied(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ConvertError::InputValidation(rejection) => match rejection {
                InputRejection::MissingFile => "NO_FILE",
                InputRejection::TooLarge { .. } => "FILE_TOO_LARGE",
                InputRejection::Extension(_) => "INVALID_FILE_TYPE",
                InputRejection::MimeType(_) => "INVALID_MIME_TYPE",
                InputRejection::Signature => "INVALID_FILE_CONTENT",
                InputRejection::FilenameTooLong(_) => "FILENAME_TOO_LONG",
                InputRejection::Malformed(_) => "MALFORMED_UPLOAD",
            },
            ConvertError::Resource { .. } => "RESOURCE_ERROR",
            ConvertError::PathViolation { .. } => "PATH_VIOLATION",
            ConvertError::Conversion(_) | ConvertError::Timeout(_) => "CONVERSION_FAILED",
            ConvertError::OutputMissing(_) | ConvertError::InvalidOutput(_) => "INVALID_OUTPUT",
            ConvertError::AdmissionDenied(_) => "RATE_LIMITED",
        }
    }

    /// Client-facing message. Never includes paths or engine output.
    pub fn public_message(&self) -> String {
        match self {
            ConvertError::InputValidation(rejection) => match rejection {
                InputRejection::MissingFile => "No file uploaded".to_string(),
                InputRejection::TooLarge { max, .. } => {
                    format!("File size exceeds {}MB limit", max / (1024 * 1024))
                }
                InputRejection::Extension(_) => "Only PPT and PPTX files are allowed".to_string(),
                InputRejection::MimeType(_) => "Invalid MIME type".to_string(),
                InputRejection::Signature => {
                    "Invalid file content. File appears to be corrupted or fake.".to_string()
                }
                InputRejection::FilenameTooLong(_) => "Filename too long".to_string(),
                InputRejection::Malformed(_) => "Invalid upload".to_string(),
            },
            ConvertError::Resource { .. } => "Failed to prepare conversion".to_string(),
            ConvertError::PathViolation { .. } => "Invalid file path".to_string(),
            ConvertError::Conversion(_) | ConvertError::Timeout(_) => {
                "Failed to convert file. Please check the file format.".to_string()
            }
            ConvertError::OutputMissing(_) | ConvertError::InvalidOutput(_) => {
                "Generated PDF is invalid".to_string()
            }
            ConvertError::AdmissionDenied(Tier::Api) => {
                "Too many requests. Please try again later.".to_string()
            }
            ConvertError::AdmissionDenied(Tier::Convert) => {
                "Too many upload requests. Please try again later.".to_string()
            }
        }
    }
}

// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        match &self {
            ConvertError::PathViolation { .. } => {
                tracing::warn!(security = true, error = %self, "Path violation rejected");
            }
            ConvertError::InputValidation(_) | ConvertError::AdmissionDenied(_) => {
                tracing::info!(kind = self.kind(), error = %self, "Request rejected");
            }
            _ => {
                tracing::error!(kind = self.kind(), error = %self, "Conversion request failed");
            }
        }
        CONVERSION_FAILURES.with_label_values(&[self.kind()]).inc();

        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: self.code(),
        });
        (self.status_code(), body).into_response()
    }
}
