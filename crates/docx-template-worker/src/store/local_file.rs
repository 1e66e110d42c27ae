use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use docx_template_core::{DocumentMetadata, DocumentStore, TemplateError, DOCX_MIME_TYPE};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Document store backed by a local directory.
///
/// Layout:
/// ```text
/// {root}/
///   {folder_id}/{name}       saved documents (root folder when no folder)
///   .metadata/{id}.json      one metadata sidecar per document
/// ```
#[derive(Debug)]
pub struct LocalDocumentStore {
    root: PathBuf,
    /// Metadata of documents seen by this process: id -> metadata
    documents: DashMap<String, DocumentMetadata>,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            documents: DashMap::new(),
        }
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join(".metadata").join(format!("{id}.json"))
    }

    /// Resolve where a document is written, rejecting names that would
    /// leave the store root.
    fn document_path(&self, name: &str, folder_id: Option<&str>) -> Result<PathBuf, TemplateError> {
        validate_component("name", name)?;
        let dir = match folder_id {
            Some(folder) => {
                validate_component("folder", folder)?;
                self.root.join(folder)
            }
            None => self.root.clone(),
        };
        Ok(dir.join(name))
    }
}

fn validate_component(what: &str, value: &str) -> Result<(), TemplateError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(TemplateError::Store(format!("Invalid {what}: {value:?}")));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    #[instrument(skip(self, bytes), level = "debug", fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder_id: Option<&str>,
    ) -> Result<String, TemplateError> {
        let file_path = self.document_path(name, folder_id)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                TemplateError::Store(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Write atomically via temp file
        let temp_path = file_path.with_extension("docx.upload.tmp");
        fs::write(&temp_path, &bytes).await.map_err(|e| {
            TemplateError::Store(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        fs::rename(&temp_path, &file_path).await.map_err(|e| {
            TemplateError::Store(format!(
                "Failed to rename temp file to {}: {}",
                file_path.display(),
                e
            ))
        })?;

        let metadata = DocumentMetadata {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            folder_id: folder_id.map(str::to_string),
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&bytes)),
            mime_type: DOCX_MIME_TYPE.to_string(),
            created_at: Utc::now(),
        };

        let sidecar = self.metadata_path(&metadata.id);
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&sidecar, serde_json::to_vec_pretty(&metadata)?).await?;

        info!(
            "Stored {} ({} bytes) as {}",
            file_path.display(),
            metadata.size_bytes,
            metadata.id
        );
        let id = metadata.id.clone();
        self.documents.insert(id.clone(), metadata);
        Ok(id)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, id: &str) -> Result<Option<DocumentMetadata>, TemplateError> {
        if let Some(entry) = self.documents.get(id) {
            return Ok(Some(entry.value().clone()));
        }

        // Stored by an earlier process
        if validate_component("id", id).is_err() {
            return Ok(None);
        }
        let bytes = match fs::read(self.metadata_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata: DocumentMetadata = serde_json::from_slice(&bytes)?;
        debug!("Loaded metadata for {} from disk", id);
        self.documents.insert(id.to_string(), metadata.clone());
        Ok(Some(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (LocalDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDocumentStore::new(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_upload_and_get() {
        let (store, temp_dir) = setup().await;

        let id = store
            .upload(b"docx bytes".to_vec(), "letter.docx", Some("clients"))
            .await
            .unwrap();

        let stored = std::fs::read(temp_dir.path().join("clients/letter.docx")).unwrap();
        assert_eq!(stored, b"docx bytes");

        let metadata = store.get(&id).await.unwrap().unwrap();
        assert_eq!(metadata.name, "letter.docx");
        assert_eq!(metadata.folder_id.as_deref(), Some("clients"));
        assert_eq!(metadata.size_bytes, 10);
        assert_eq!(metadata.sha256, hex::encode(Sha256::digest(b"docx bytes")));
        assert_eq!(metadata.mime_type, DOCX_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_get_reads_sidecar_from_previous_process() {
        let (store, temp_dir) = setup().await;
        let id = store.upload(b"x".to_vec(), "a.docx", None).await.unwrap();

        let reopened = LocalDocumentStore::new(temp_dir.path());
        let metadata = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(metadata.name, "a.docx");
        assert_eq!(metadata.folder_id, None);
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let (store, _temp_dir) = setup().await;
        assert!(store.get("does-not-exist").await.unwrap().is_none());
        assert!(store.get("../etc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let (store, _temp_dir) = setup().await;

        for (name, folder) in [
            ("../evil.docx", None),
            ("a/b.docx", None),
            ("", None),
            ("ok.docx", Some("..")),
            ("ok.docx", Some(".metadata")),
        ] {
            let result = store.upload(b"x".to_vec(), name, folder).await;
            assert!(
                matches!(result, Err(TemplateError::Store(_))),
                "accepted {name:?} in {folder:?}"
            );
        }
    }
}
