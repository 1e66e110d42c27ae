//! Off-thread execution of template jobs.

use std::collections::BTreeSet;

use docx_template_core::{
    merge_fields, scan_package_custom_properties, scan_package_placeholders, Blob, FieldValues,
    JobEnvelope, JobEvent, Result, Stage, TemplatePackage, WorkerRequest, WorkerResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Seam between a processing session and whatever runs its jobs.
pub trait JobDispatcher: Send + Sync {
    /// Start a job. Its responses arrive later on the session's event channel.
    fn dispatch(&self, job: JobEnvelope);
}

/// Runs every job on tokio's blocking pool and reports back over a channel.
///
/// The worker keeps no state between jobs. Jobs are never cancelled; a
/// superseded job finishes and its result is dropped by the session.
#[derive(Debug, Clone)]
pub struct TemplateWorker {
    events: mpsc::UnboundedSender<JobEvent>,
}

impl TemplateWorker {
    pub fn new(events: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { events }
    }
}

impl JobDispatcher for TemplateWorker {
    /// Must be called from within a tokio runtime.
    fn dispatch(&self, job: JobEnvelope) {
        let JobEnvelope { job_id, request } = job;
        info!("Dispatching {} ({})", job_id, request.kind());

        let events = self.events.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_job(request, |response| {
                // receiver gone means the session was dropped
                let _ = events.send(JobEvent { job_id, response });
            })
        });

        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                warn!("{} did not complete: {}", job_id, e);
                let _ = events.send(JobEvent {
                    job_id,
                    response: WorkerResponse::Error {
                        stage: None,
                        message: format!("Worker job failed: {e}"),
                    },
                });
            }
        });
    }
}

/// Tracks the current stage so a failure can be attributed to it.
struct JobProgress<F> {
    stage: Stage,
    emit: F,
}

impl<F: FnMut(WorkerResponse)> JobProgress<F> {
    fn enter(&mut self, stage: Stage, percent: u8) {
        self.stage = stage;
        (self.emit)(WorkerResponse::Progress { stage, percent });
    }
}

/// Execute one job to completion.
///
/// `emit` receives zero or more progress responses followed by exactly one
/// terminal response.
#[instrument(skip_all, level = "debug", fields(kind = request.kind()))]
pub fn run_job(request: WorkerRequest, emit: impl FnMut(WorkerResponse)) {
    let mut progress = JobProgress {
        stage: Stage::Idle,
        emit,
    };

    let result = match request {
        WorkerRequest::ExtractFields { bytes } => extract_fields(&bytes, &mut progress),
        WorkerRequest::MergeAndPackage {
            bytes,
            field_values,
        } => merge_and_package(&bytes, &field_values, &mut progress),
    };

    let terminal = match result {
        Ok(response) => {
            progress.enter(Stage::Complete, 100);
            response
        }
        Err(e) => {
            warn!("Job failed during {:?}: {}", progress.stage, e);
            WorkerResponse::Error {
                stage: Some(progress.stage),
                message: e.to_string(),
            }
        }
    };
    (progress.emit)(terminal);
}

fn extract_fields<F: FnMut(WorkerResponse)>(
    bytes: &[u8],
    progress: &mut JobProgress<F>,
) -> Result<WorkerResponse> {
    progress.enter(Stage::Loading, 10);
    let package = TemplatePackage::open(bytes)?;

    progress.enter(Stage::Parsing, 40);
    let placeholders = scan_package_placeholders(&package)?;

    progress.enter(Stage::Parsing, 70);
    let custom_properties = scan_package_custom_properties(&package)?;

    debug!(
        "Extracted {} placeholders and {} custom properties",
        placeholders.len(),
        custom_properties.len()
    );
    Ok(WorkerResponse::FieldsExtracted {
        placeholder_names: placeholders.into_iter().map(|p| p.name).collect(),
        custom_properties,
    })
}

fn merge_and_package<F: FnMut(WorkerResponse)>(
    bytes: &[u8],
    field_values: &FieldValues,
    progress: &mut JobProgress<F>,
) -> Result<WorkerResponse> {
    progress.enter(Stage::Loading, 10);
    let package = TemplatePackage::open(bytes)?;

    progress.enter(Stage::UpdatingFields, 40);
    let property_names: BTreeSet<String> = scan_package_custom_properties(&package)?
        .into_iter()
        .map(|p| p.name)
        .collect();
    let merged = merge_fields(package, field_values, &property_names)?;

    progress.enter(Stage::Generating, 75);
    let bytes = merged.build()?;

    debug!("Generated package of {} bytes", bytes.len());
    Ok(WorkerResponse::PackageReady {
        blob: Blob::docx(bytes),
    })
}
