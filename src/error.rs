use thiserror::Error;

/// Main error type for the K-1 reader pipeline.
///
/// Only `UnreadablePdf` and `InputTooLarge` abort a run before a record is
/// produced. Low-quality text, missing fields, and OCR failures are absorbed
/// into the record's confidence score instead of surfacing here.
#[derive(Error, Debug)]
pub enum K1Error {
    #[error("unreadable PDF: {message}")]
    UnreadablePdf {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("input exceeds {limit_mb}MB size cap")]
    InputTooLarge { limit_mb: u64 },

    #[error("file I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("validation invariant violated: {message}")]
    Validation { message: String },

    #[error("general error: {0}")]
    General(#[from] anyhow::Error),
}

impl K1Error {
    /// Create an unreadable-PDF error without an underlying cause.
    pub fn unreadable_pdf(message: impl Into<String>) -> Self {
        Self::UnreadablePdf {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unreadable-PDF error wrapping the parser failure.
    pub fn unreadable_pdf_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::UnreadablePdf {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a file I/O error.
    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error (internal invariant violations only, never
    /// for merely missing fields).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by retrying with different input.
    pub fn is_recoverable(&self) -> bool {
        match self {
            K1Error::UnreadablePdf { .. } => true,
            K1Error::InputTooLarge { .. } => true,
            K1Error::FileIO { .. } => true,
            K1Error::Configuration { .. } => true,
            K1Error::Validation { .. } => false,
            K1Error::General(_) => true,
        }
    }

    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            K1Error::UnreadablePdf { .. } => {
                "This file is not a readable PDF. It may be corrupted or not a PDF at all."
                    .to_string()
            }
            K1Error::InputTooLarge { limit_mb } => {
                format!("Document too large ({}MB limit). Try splitting it first.", limit_mb)
            }
            K1Error::FileIO { path, .. } => {
                format!("Could not access file: {}. Check permissions and disk space.", path)
            }
            K1Error::Configuration { message } => {
                format!("Configuration problem: {}", message)
            }
            _ => "Something went wrong. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type K1Result<T> = Result<T, K1Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_pdf_is_recoverable() {
        let err = K1Error::unreadable_pdf("not a pdf");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("unreadable PDF"));
    }

    #[test]
    fn test_validation_is_not_recoverable() {
        let err = K1Error::validation("typed value without spec");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_user_message_size_cap() {
        let err = K1Error::InputTooLarge { limit_mb: 10 };
        assert!(err.user_message().contains("10MB"));
    }
}
