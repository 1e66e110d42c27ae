use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// Metadata recorded for a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Store-assigned identifier
    pub id: String,
    /// File name the document was saved under
    pub name: String,
    /// Target folder (None for the root)
    #[serde(default)]
    pub folder_id: Option<String>,
    pub size_bytes: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Remote document store that generated documents are saved to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a document.
    ///
    /// # Arguments
    /// * `bytes` - Document contents
    /// * `name` - Target file name
    /// * `folder_id` - Target folder (None for the root)
    ///
    /// # Returns
    /// The identifier of the stored document
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder_id: Option<&str>,
    ) -> Result<String, TemplateError>;

    /// Look up a stored document's metadata.
    async fn get(&self, id: &str) -> Result<Option<DocumentMetadata>, TemplateError>;
}
