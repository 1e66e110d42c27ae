//! Best-effort local snapshots of unsaved field values.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use docx_template_core::{FieldValues, TemplateError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub template: String,
    pub saved_at: DateTime<Utc>,
    pub values: FieldValues,
}

/// Draft snapshots keyed by template name, one JSON file each.
///
/// Drafts are a convenience, not a durability guarantee: callers log
/// failures and carry on.
#[derive(Debug, Clone)]
pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding the draft for a template. Names are hashed so any
    /// template name maps to a safe file name.
    fn path(&self, template: &str) -> PathBuf {
        let digest = Sha256::digest(template.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(&digest[..16])))
    }

    #[instrument(skip(self, values), level = "debug")]
    pub async fn save(&self, template: &str, values: &FieldValues) -> Result<(), TemplateError> {
        fs::create_dir_all(&self.dir).await?;

        let snapshot = DraftSnapshot {
            template: template.to_string(),
            saved_at: Utc::now(),
            values: values.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let path = self.path(template);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        debug!("Saved draft with {} values to {}", values.len(), path.display());
        Ok(())
    }

    /// Load the draft for a template, if one exists.
    #[instrument(skip(self), level = "debug")]
    pub async fn load(&self, template: &str) -> Result<Option<DraftSnapshot>, TemplateError> {
        let path = self.path(template);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: DraftSnapshot = serde_json::from_slice(&bytes)?;
        // hash prefix collision
        if snapshot.template != template {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    pub async fn exists(&self, template: &str) -> bool {
        fs::try_exists(self.path(template)).await.unwrap_or(false)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn discard(&self, template: &str) -> Result<(), TemplateError> {
        match fs::remove_file(self.path(template)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
