//! Error taxonomy for the template pipeline.

use crate::protocol::Stage;

/// Errors raised while reading, merging or rebuilding a template package,
/// and by the document store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Packaging error: {0}")]
    PackagingError(String),

    #[error("Malformed XML in {part}: {message}")]
    MalformedXml { part: String, message: String },

    #[error("Document store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    /// Pipeline stage a failure belongs to, when it maps onto one.
    pub fn stage_hint(&self) -> Option<Stage> {
        match self {
            TemplateError::InvalidPackage(_) | TemplateError::UnsupportedFormat(_) => {
                Some(Stage::Loading)
            }
            TemplateError::PartNotFound(_) | TemplateError::MalformedXml { .. } => {
                Some(Stage::UpdatingFields)
            }
            TemplateError::PackagingError(_) => Some(Stage::Generating),
            TemplateError::Store(_) | TemplateError::Io(_) | TemplateError::Json(_) => None,
        }
    }

    /// Message shown to the person editing the document.
    ///
    /// A missing document part is an internal invariant violation and reads
    /// the same as an unreadable file.
    pub fn user_message(&self) -> String {
        match self {
            TemplateError::InvalidPackage(_)
            | TemplateError::UnsupportedFormat(_)
            | TemplateError::PartNotFound(_) => "Could not read this file".to_string(),
            TemplateError::MalformedXml { .. } | TemplateError::PackagingError(_) => {
                format!("Could not generate the document: {self}")
            }
            TemplateError::Store(_) | TemplateError::Io(_) | TemplateError::Json(_) => {
                format!("Could not save the document: {self}")
            }
        }
    }
}

impl From<zip::result::ZipError> for TemplateError {
    fn from(e: zip::result::ZipError) -> Self {
        TemplateError::InvalidPackage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
