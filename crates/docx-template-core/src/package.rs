//! Reading and rebuilding Word Open XML packages.

use std::fmt;
use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, TemplateError};

/// Package content types bookkeeping part.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
/// Main word-processing body.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Custom document properties.
pub const CUSTOM_PROPERTIES_PART: &str = "docProps/custom.xml";
/// MIME type of a `.docx` file.
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// One entry of the ZIP container.
#[derive(Debug, Clone, PartialEq)]
pub struct PackagePart {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub is_dir: bool,
}

impl PackagePart {
    /// A deflated file entry.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            compression: CompressionMethod::Deflated,
            is_dir: false,
        }
    }
}

/// An opened document package: every part of the archive, in archive order.
#[derive(Clone, PartialEq)]
pub struct TemplatePackage {
    parts: Vec<PackagePart>,
}

impl fmt::Debug for TemplatePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplatePackage")
            .field("parts", &self.part_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Output of the repackager, ready to download or upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Blob {
    pub fn docx(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: DOCX_MIME_TYPE.to_string(),
        }
    }
}

impl TemplatePackage {
    /// Open a `.docx` from its raw bytes.
    ///
    /// Fails with `InvalidPackage` when the bytes are not a ZIP container or
    /// lack the content-types or document part, and with `UnsupportedFormat`
    /// when the document part is not UTF-8 XML.
    pub fn open(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data).map_err(|e| {
                    TemplateError::InvalidPackage(format!("Failed to read entry {name}: {e}"))
                })?;
            }
            parts.push(PackagePart {
                name,
                data,
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        let package = Self { parts };
        if package.part(CONTENT_TYPES_PART).is_none() {
            return Err(TemplateError::InvalidPackage(format!(
                "missing {CONTENT_TYPES_PART}"
            )));
        }

        let document = package
            .document_xml()?
            .ok_or_else(|| TemplateError::InvalidPackage(format!("missing {DOCUMENT_PART}")))?;
        roxmltree::Document::parse(document).map_err(|e| {
            TemplateError::UnsupportedFormat(format!("{DOCUMENT_PART} is not valid XML: {e}"))
        })?;

        debug!("Opened package with {} parts", package.parts.len());
        Ok(package)
    }

    /// Assemble a package from parts without validating it.
    pub fn from_parts(parts: impl IntoIterator<Item = PackagePart>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    pub fn parts(&self) -> &[PackagePart] {
        &self.parts
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Raw bytes of a part, if present.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| !p.is_dir && p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Text of an XML part. `Ok(None)` when the part is absent.
    pub fn xml_part(&self, name: &str) -> Result<Option<&str>> {
        match self.part(name) {
            Some(bytes) => decode_utf8(name, bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn document_xml(&self) -> Result<Option<&str>> {
        self.xml_part(DOCUMENT_PART)
    }

    pub fn custom_properties_xml(&self) -> Result<Option<&str>> {
        self.xml_part(CUSTOM_PROPERTIES_PART)
    }

    /// Parts that carry body text: the document, then headers, then footers.
    pub fn story_parts(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.part(DOCUMENT_PART).is_some() {
            names.push(DOCUMENT_PART);
        }
        for prefix in ["word/header", "word/footer"] {
            let mut matching: Vec<&str> = self
                .parts
                .iter()
                .filter(|p| !p.is_dir && p.name.starts_with(prefix) && p.name.ends_with(".xml"))
                .map(|p| p.name.as_str())
                .collect();
            matching.sort_unstable();
            names.extend(matching);
        }
        names
    }

    /// Replace the contents of an existing XML part.
    ///
    /// The new contents must be well-formed XML; unknown parts are
    /// `PartNotFound`.
    pub fn replace_part(&mut self, name: &str, xml: String) -> Result<()> {
        roxmltree::Document::parse(&xml).map_err(|e| TemplateError::MalformedXml {
            part: name.to_string(),
            message: e.to_string(),
        })?;

        let part = self
            .parts
            .iter_mut()
            .find(|p| !p.is_dir && p.name == name)
            .ok_or_else(|| TemplateError::PartNotFound(name.to_string()))?;
        part.data = xml.into_bytes();
        Ok(())
    }

    /// Serialize every part into a new ZIP container.
    ///
    /// Stored entries stay stored; everything else is deflated.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for part in &self.parts {
            let method = match part.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default().compression_method(method);

            if part.is_dir {
                writer
                    .add_directory(part.name.as_str(), options)
                    .map_err(|e| packaging_error(&part.name, e))?;
                continue;
            }

            writer
                .start_file(part.name.as_str(), options)
                .map_err(|e| packaging_error(&part.name, e))?;
            writer
                .write_all(&part.data)
                .map_err(|e| packaging_error(&part.name, e))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| TemplateError::PackagingError(format!("Failed to finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}

fn packaging_error(part: &str, e: impl fmt::Display) -> TemplateError {
    TemplateError::PackagingError(format!("Failed to write {part}: {e}"))
}

fn decode_utf8<'a>(name: &str, bytes: &'a [u8]) -> Result<&'a str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|e| TemplateError::UnsupportedFormat(format!("{name} is not UTF-8: {e}")))
}
