use std::sync::Arc;
use std::time::{Duration, Instant};

use docx_template_core::{
    scan_package_custom_properties, scan_package_placeholders, PackagePart, TemplatePackage,
    CONTENT_TYPES_PART, CUSTOM_PROPERTIES_PART, DOCUMENT_PART,
};
use docx_template_worker::{
    DraftStore, LocalDocumentStore, LogNotifier, ProcessingSession, SaveTarget, SessionContext,
    SessionOutcome, SessionState,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// An invoice whose `customer` placeholder is split over three runs and
/// whose `status` is both a placeholder and a custom property.
fn invoice_template() -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Invoice for {{{{cust</w:t></w:r><w:r><w:t>om</w:t></w:r><w:r><w:t>er}}}}</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Status: {{{{status}}}} </w:t></w:r></w:p></w:body></w:document>"#
    );
    let header = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{W_NS}"><w:p><w:r><w:t>{{{{company}}}}</w:t></w:r></w:p></w:hdr>"#
    );
    let custom = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="status"><vt:lpwstr>open</vt:lpwstr></property><property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="Reviewer"><vt:lpwstr>nobody</vt:lpwstr></property></Properties>"#;

    TemplatePackage::from_parts([
        PackagePart::new(CONTENT_TYPES_PART, CONTENT_TYPES),
        PackagePart::new(DOCUMENT_PART, document),
        PackagePart::new("word/header1.xml", header),
        PackagePart::new(CUSTOM_PROPERTIES_PART, custom),
        PackagePart::new("word/media/logo.png", vec![0x89, b'P', b'N', b'G']),
    ])
    .build()
    .unwrap()
}

fn setup() -> (SessionContext, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let context = SessionContext {
        store: Arc::new(LocalDocumentStore::new(temp_dir.path().join("store"))),
        notifier: Arc::new(LogNotifier),
        drafts: Some(DraftStore::new(temp_dir.path().join("drafts"))),
        debounce: Duration::from_millis(10),
    };
    (context, temp_dir)
}

async fn open_ready(bytes: Vec<u8>, context: SessionContext) -> ProcessingSession {
    let mut session = ProcessingSession::open("invoice.docx", bytes, context);
    let outcome = session.settle().await;
    assert!(
        matches!(outcome, Some(SessionOutcome::FieldsReady { .. })),
        "unexpected outcome {outcome:?}"
    );
    session
}

#[tokio::test]
async fn test_fields_discovered_in_order() {
    let (context, _temp_dir) = setup();
    let session = open_ready(invoice_template(), context).await;

    let fields: Vec<(&str, bool)> = session
        .fields()
        .iter()
        .map(|f| (f.name.as_str(), f.is_custom_property))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("customer", false),
            ("status", true),
            ("company", false),
            ("Reviewer", true),
        ]
    );
    assert_eq!(session.display_value("Reviewer"), "nobody");
    assert_eq!(session.state(), SessionState::Editing);
}

#[tokio::test]
async fn test_generate_fills_every_target() {
    let (context, _temp_dir) = setup();
    let mut session = open_ready(invoice_template(), context).await;
    let now = Instant::now();

    session.edit_field("customer", "ACME & Sons", now).unwrap();
    session.edit_field("status", "paid", now).unwrap();
    session.edit_field("company", "Initech", now).unwrap();
    session.generate().unwrap();

    let Some(SessionOutcome::Generated { blob, file_name }) = session.settle().await else {
        panic!("expected a generated document");
    };
    assert_eq!(file_name, "invoice.docx");

    let merged = TemplatePackage::open(&blob.bytes).unwrap();
    let document = merged.document_xml().unwrap().unwrap();
    assert!(document.contains("Invoice for ACME &amp; Sons"));
    assert!(document.contains("Status: paid "));
    assert!(!document.contains("{{"));

    let header = merged.xml_part("word/header1.xml").unwrap().unwrap();
    assert!(header.contains("Initech"));

    // the same-named custom property is updated too
    let properties = scan_package_custom_properties(&merged).unwrap();
    assert_eq!(properties[0].name, "status");
    assert_eq!(properties[0].value, "paid");
    assert_eq!(properties[1].value, "nobody");

    assert_eq!(merged.part("word/media/logo.png"), Some(&[0x89, b'P', b'N', b'G'][..]));
    assert!(scan_package_placeholders(&merged).unwrap().is_empty());
}

#[tokio::test]
async fn test_unfilled_placeholders_survive() {
    let (context, _temp_dir) = setup();
    let mut session = open_ready(invoice_template(), context).await;

    session
        .edit_field("company", "Initech", Instant::now())
        .unwrap();
    session.generate().unwrap();
    let Some(SessionOutcome::Generated { blob, .. }) = session.settle().await else {
        panic!("expected a generated document");
    };

    let merged = TemplatePackage::open(&blob.bytes).unwrap();
    let names: Vec<String> = scan_package_placeholders(&merged)
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["customer".to_string(), "status".to_string()]);
}

#[tokio::test]
async fn test_save_as_then_close() {
    let (context, temp_dir) = setup();
    let store = context.store.clone();
    let mut session = open_ready(invoice_template(), context).await;

    session
        .edit_field("customer", "Globex", Instant::now())
        .unwrap();
    session.blur().await;
    assert!(session.has_changes());

    session
        .save_as(SaveTarget {
            name: "globex.docx".to_string(),
            folder_id: Some("2026".to_string()),
        })
        .unwrap();
    let Some(SessionOutcome::Saved { document_id }) = session.settle().await else {
        panic!("expected a saved document");
    };

    let metadata = store.get(&document_id).await.unwrap().unwrap();
    assert_eq!(metadata.name, "globex.docx");
    let saved = std::fs::read(temp_dir.path().join("store/2026/globex.docx")).unwrap();
    assert_eq!(saved.len() as u64, metadata.size_bytes);
    let merged = TemplatePackage::open(&saved).unwrap();
    assert!(merged.document_xml().unwrap().unwrap().contains("Invoice for Globex"));

    assert!(!session.has_changes());
    assert_eq!(
        session.request_close(),
        docx_template_worker::CloseRequest::Closed
    );
}

#[tokio::test]
async fn test_unreadable_file_fails_session() {
    let (context, _temp_dir) = setup();
    let mut session = ProcessingSession::open("broken.docx", b"PK not really".to_vec(), context);

    let outcome = session.settle().await;
    assert!(matches!(outcome, Some(SessionOutcome::Failed { .. })));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.generate().is_err());
}

#[tokio::test]
async fn test_draft_survives_reopen() {
    let (context, _temp_dir) = setup();
    let mut session = open_ready(invoice_template(), context.clone()).await;
    session
        .edit_field("status", "overdue", Instant::now())
        .unwrap();
    session.blur().await;
    drop(session);

    let mut session = ProcessingSession::open("invoice.docx", invoice_template(), context);
    let Some(SessionOutcome::FieldsReady {
        draft_available, ..
    }) = session.settle().await
    else {
        panic!("expected fields");
    };
    assert!(draft_available);
    assert!(session.restore_draft().await.unwrap());
    assert_eq!(session.display_value("status"), "overdue");
}
