//! Messages exchanged with the template worker.
//!
//! Payloads are owned and moved across the boundary; nothing on either side
//! holds a reference into the other's state.

use serde::{Deserialize, Serialize};

use crate::model::{CustomProperty, FieldValues};
use crate::package::Blob;

/// Processing stage of a single job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Loading,
    Parsing,
    UpdatingFields,
    Generating,
    Complete,
    Error,
}

/// Identity of a job within one processing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    ExtractFields {
        #[serde(with = "serde_bytes")]
        bytes: Vec<u8>,
    },
    MergeAndPackage {
        #[serde(with = "serde_bytes")]
        bytes: Vec<u8>,
        field_values: FieldValues,
    },
}

impl WorkerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::ExtractFields { .. } => "extract_fields",
            WorkerRequest::MergeAndPackage { .. } => "merge_and_package",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerResponse {
    Progress {
        stage: Stage,
        percent: u8,
    },
    FieldsExtracted {
        placeholder_names: Vec<String>,
        custom_properties: Vec<CustomProperty>,
    },
    PackageReady {
        blob: Blob,
    },
    Error {
        stage: Option<Stage>,
        message: String,
    },
}

impl WorkerResponse {
    /// Whether this is the single final response of a job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerResponse::Progress { .. })
    }
}

/// A request tagged with the job it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub request: WorkerRequest,
}

/// A response tagged with the job it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub response: WorkerResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest::MergeAndPackage {
            bytes: vec![1, 2],
            field_values: [("name".to_string(), "Alice".to_string())].into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["kind"], "merge_and_package");
        assert_eq!(value["field_values"], json!({"name": "Alice"}));
        assert_eq!(request.kind(), "merge_and_package");
    }

    #[test]
    fn test_progress_wire_shape() {
        let response = WorkerResponse::Progress {
            stage: Stage::UpdatingFields,
            percent: 40,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"kind": "progress", "stage": "updating_fields", "percent": 40})
        );
        assert!(!response.is_terminal());
    }

    #[test]
    fn test_error_is_terminal() {
        let response = WorkerResponse::Error {
            stage: Some(Stage::Loading),
            message: "bad zip".into(),
        };
        assert!(response.is_terminal());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["stage"], "loading");
    }
}
