use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use docx_template_worker::{
    Command, Config, DraftStore, LocalDocumentStore, LogNotifier, ProcessingSession, SaveTarget,
    SessionContext, SessionError, SessionOutcome,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    info!("Starting docx-template");
    info!("  Store directory: {}", config.store_dir.display());
    if let Some(dir) = &config.drafts_dir {
        info!("  Drafts directory: {}", dir.display());
    }

    let context = SessionContext {
        store: Arc::new(LocalDocumentStore::new(&config.store_dir)),
        notifier: Arc::new(LogNotifier),
        drafts: config.drafts_dir.as_ref().map(DraftStore::new),
        debounce: config.debounce(),
    };

    match &config.command {
        Command::Scan { file } => {
            let session = open_session(file, context).await?;
            let fields = serde_json::to_string_pretty(session.fields())?;
            println!("{fields}");
        }
        Command::Fill {
            file,
            values,
            out,
            save_as,
            folder,
        } => {
            let mut session = open_session(file, context).await?;

            for (name, value) in values {
                match session.edit_field(name, value, Instant::now()) {
                    Ok(()) => {}
                    Err(SessionError::UnknownField(name)) => {
                        warn!("Template has no field named {}, skipping", name);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if let Some(out) = out {
                session.generate()?;
                match session.settle().await {
                    Some(SessionOutcome::Generated { blob, .. }) => {
                        tokio::fs::write(out, &blob.bytes)
                            .await
                            .with_context(|| format!("Failed to write {}", out.display()))?;
                        info!("Wrote {} ({} bytes)", out.display(), blob.bytes.len());
                    }
                    other => bail!("Generating failed: {}", describe(other)),
                }
            } else {
                match save_as {
                    Some(name) => session.save_as(SaveTarget {
                        name: name.clone(),
                        folder_id: folder.clone(),
                    })?,
                    None => session.save()?,
                };
                match session.settle().await {
                    Some(SessionOutcome::Saved { document_id }) => println!("{document_id}"),
                    other => bail!("Saving failed: {}", describe(other)),
                }
            }

            session.request_close();
        }
    }

    Ok(())
}

/// Open a template and wait until its fields are known.
async fn open_session(file: &Path, context: SessionContext) -> anyhow::Result<ProcessingSession> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template.docx".to_string());

    let mut session = ProcessingSession::open(name, bytes, context);
    match session.settle().await {
        Some(SessionOutcome::FieldsReady {
            fields,
            draft_available,
        }) => {
            info!("Found {} fields in {}", fields, file.display());
            if draft_available {
                info!("A draft exists for {}; restoring it", session.template_name());
                session.restore_draft().await?;
            }
            Ok(session)
        }
        other => bail!("Could not read {}: {}", file.display(), describe(other)),
    }
}

fn describe(outcome: Option<SessionOutcome>) -> String {
    match outcome {
        Some(SessionOutcome::Failed { message, .. }) => message,
        Some(other) => format!("unexpected outcome {other:?}"),
        None => "worker stopped before finishing".to_string(),
    }
}
