//! Core pipeline for DOCX templates.
//!
//! This crate holds everything that runs inside a template job:
//! - `TemplatePackage`: reading and rebuilding the ZIP package
//! - `scan`: placeholder and custom property discovery
//! - `merge`: writing user values back into the package
//! - `protocol`: the request/response messages of the worker
//! - `DocumentStore`: where saved documents go

mod error;
mod merge;
mod model;
mod package;
mod protocol;
mod scan;
mod store;
mod wml;

pub use error::{Result, TemplateError};
pub use merge::{merge_custom_properties, merge_fields, merge_placeholders};
pub use model::{collect_fields, CustomProperty, Field, FieldValues, PlaceholderField};
pub use package::{
    Blob, PackagePart, TemplatePackage, CONTENT_TYPES_PART, CUSTOM_PROPERTIES_PART,
    DOCUMENT_PART, DOCX_MIME_TYPE,
};
pub use protocol::{JobEnvelope, JobEvent, JobId, Stage, WorkerRequest, WorkerResponse};
pub use scan::{
    scan_custom_properties, scan_package_custom_properties, scan_package_placeholders,
    scan_placeholders,
};
pub use store::{DocumentMetadata, DocumentStore};
pub use wml::escape_xml_text;
