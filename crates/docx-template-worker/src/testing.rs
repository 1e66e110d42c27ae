//! Template builders shared by unit tests.

use std::sync::Mutex;

use docx_template_core::{
    PackagePart, TemplatePackage, CONTENT_TYPES_PART, CUSTOM_PROPERTIES_PART, DOCUMENT_PART,
};

use crate::notify::{Notification, NotificationSink};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn document(paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|text| format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

fn build(document_xml: String, custom_xml: Option<&str>) -> Vec<u8> {
    let mut parts = vec![
        PackagePart::new(CONTENT_TYPES_PART, CONTENT_TYPES),
        PackagePart::new("_rels/.rels", RELS),
        PackagePart::new(DOCUMENT_PART, document_xml),
    ];
    if let Some(custom) = custom_xml {
        parts.push(PackagePart::new(CUSTOM_PROPERTIES_PART, custom));
    }
    TemplatePackage::from_parts(parts).build().unwrap()
}

/// Two placeholders, no custom properties.
pub fn basic_template() -> Vec<u8> {
    build(
        document(&["Dear {{name}}, your balance is {{amount}}."]),
        None,
    )
}

/// Placeholders `title` then `name`, and a custom property `title`.
pub fn template_with_property() -> Vec<u8> {
    let custom = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="title"><vt:lpwstr>Draft</vt:lpwstr></property></Properties>"#;
    build(document(&["{{title}}", "Hello {{name}}"]), Some(custom))
}

/// Keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}
