//! Editing sessions: one opened template, its field values and its jobs.
//!
//! A session is driven from a single task. Jobs run elsewhere and report
//! back over the session's event channel; only the most recently dispatched
//! job is applied, anything older is dropped when it arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docx_template_core::{
    collect_fields, Blob, CustomProperty, DocumentStore, Field, FieldValues, JobEnvelope,
    JobEvent, JobId, Stage, WorkerRequest, WorkerResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::debounce::Debouncer;
use crate::drafts::DraftStore;
use crate::notify::{Notification, NotificationSink};
use crate::worker::{JobDispatcher, TemplateWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the extract-fields job.
    LoadingFields,
    Editing,
    /// Merge job for a save is running; the upload follows it.
    Saving,
    /// Merge job for a download is running.
    Generating,
    /// The template could not be read; the session never became editable.
    Failed,
    Closed,
}

/// Where a saved document goes in the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    pub name: String,
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    FieldsReady { fields: usize, draft_available: bool },
    Generated { blob: Blob, file_name: String },
    Saved { document_id: String },
    Failed { stage: Option<Stage>, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    Closed,
    /// Unsaved changes: the caller must offer save, discard or cancel.
    NeedsConfirmation,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not editable while {0:?}")]
    NotEditable(SessionState),

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

#[derive(Debug, Clone)]
enum PendingAction {
    ExtractFields,
    Generate,
    /// `values` is the snapshot sent with the merge request.
    Save {
        target: SaveTarget,
        values: FieldValues,
    },
}

/// Collaborators a session works with.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub drafts: Option<DraftStore>,
    pub debounce: Duration,
}

pub struct ProcessingSession {
    template_name: String,
    source: Vec<u8>,
    fields: Vec<Field>,
    custom_properties: Vec<CustomProperty>,
    values: FieldValues,
    has_changes: bool,
    state: SessionState,
    progress: (Stage, u8),
    current_job: Option<(JobId, PendingAction)>,
    last_job: u64,
    save_target: SaveTarget,
    debouncer: Debouncer,
    dispatcher: Arc<dyn JobDispatcher>,
    events: mpsc::UnboundedReceiver<JobEvent>,
    context: SessionContext,
}

impl ProcessingSession {
    /// Open a template for editing and start discovering its fields.
    ///
    /// Jobs run on a `TemplateWorker`, so this must be called from within a
    /// tokio runtime.
    pub fn open(template_name: impl Into<String>, bytes: Vec<u8>, context: SessionContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(TemplateWorker::new(tx));
        Self::with_dispatcher(template_name, bytes, context, dispatcher, rx)
    }

    /// Open a template with a custom job dispatcher whose responses arrive on
    /// `events`.
    pub fn with_dispatcher(
        template_name: impl Into<String>,
        bytes: Vec<u8>,
        context: SessionContext,
        dispatcher: Arc<dyn JobDispatcher>,
        events: mpsc::UnboundedReceiver<JobEvent>,
    ) -> Self {
        let template_name = template_name.into();
        let mut session = Self {
            save_target: SaveTarget {
                name: template_name.clone(),
                folder_id: None,
            },
            template_name,
            source: bytes,
            fields: Vec::new(),
            custom_properties: Vec::new(),
            values: FieldValues::new(),
            has_changes: false,
            state: SessionState::LoadingFields,
            progress: (Stage::Idle, 0),
            current_job: None,
            last_job: 0,
            debouncer: Debouncer::new(context.debounce),
            dispatcher,
            events,
            context,
        };
        let request = WorkerRequest::ExtractFields {
            bytes: session.source.clone(),
        };
        session.dispatch(request, PendingAction::ExtractFields);
        session
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Values applied so far (pending debounced edits excluded).
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Stage and percentage reported by the current job.
    pub fn progress(&self) -> (Stage, u8) {
        self.progress
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.current_job.as_ref().map(|(id, _)| *id)
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::LoadingFields
    }

    pub fn is_processing(&self) -> bool {
        self.current_job.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.state == SessionState::Saving
    }

    /// What the form shows for a field: the latest keystroke, the applied
    /// value, or the custom property's current value.
    pub fn display_value(&self, name: &str) -> &str {
        if let Some(pending) = self.debouncer.pending_value(name) {
            return pending;
        }
        if let Some(value) = self.values.get(name) {
            return value;
        }
        self.custom_properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
            .unwrap_or_default()
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::LoadingFields | SessionState::Failed | SessionState::Closed => {
                Err(SessionError::NotEditable(self.state))
            }
            _ => Ok(()),
        }
    }

    /// Record a keystroke. The value is applied once the debounce delay has
    /// elapsed (`commit_due_edits`), on `blur`, or before any save.
    pub fn edit_field(&mut self, name: &str, value: &str, now: Instant) -> Result<(), SessionError> {
        self.ensure_editable()?;
        if !self.fields.iter().any(|f| f.name == name) {
            return Err(SessionError::UnknownField(name.to_string()));
        }
        if let Some((field, value)) = self.debouncer.push(name, value, now) {
            self.apply_edit(field, value);
        }
        Ok(())
    }

    /// Apply the pending edit if its delay has elapsed.
    pub fn commit_due_edits(&mut self, now: Instant) {
        if let Some((field, value)) = self.debouncer.take_due(now) {
            self.apply_edit(field, value);
        }
    }

    /// Focus left the field: apply any pending edit now and snapshot a draft.
    pub async fn blur(&mut self) {
        self.flush_edits();
        if self.has_changes {
            self.save_draft().await;
        }
    }

    fn flush_edits(&mut self) {
        if let Some((field, value)) = self.debouncer.flush() {
            self.apply_edit(field, value);
        }
    }

    fn apply_edit(&mut self, field: String, value: String) {
        if self.values.get(&field) == Some(&value) {
            return;
        }
        debug!("Field {} updated", field);
        self.values.insert(field, value);
        self.has_changes = true;
    }

    /// Snapshot the current values as a draft. Failures are only logged.
    pub async fn save_draft(&self) {
        let Some(drafts) = &self.context.drafts else {
            return;
        };
        if let Err(e) = drafts.save(&self.template_name, &self.values).await {
            warn!("Failed to save draft for {}: {}", self.template_name, e);
        }
    }

    /// Load a previously saved draft into the form. Returns whether a draft
    /// was applied.
    pub async fn restore_draft(&mut self) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let Some(drafts) = &self.context.drafts else {
            return Ok(false);
        };
        let snapshot = match drafts.load(&self.template_name).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Ignoring unreadable draft for {}: {}", self.template_name, e);
                return Ok(false);
            }
        };

        let known: Vec<(String, String)> = snapshot
            .values
            .into_iter()
            .filter(|(name, _)| self.fields.iter().any(|f| &f.name == name))
            .collect();
        let restored = !known.is_empty();
        for (field, value) in known {
            self.apply_edit(field, value);
        }
        info!("Restored draft for {}", self.template_name);
        Ok(restored)
    }

    async fn discard_draft(&self) {
        if let Some(drafts) = &self.context.drafts {
            if let Err(e) = drafts.discard(&self.template_name).await {
                warn!("Failed to discard draft for {}: {}", self.template_name, e);
            }
        }
    }

    /// Merge the values and hand back a document to download.
    pub fn generate(&mut self) -> Result<JobId, SessionError> {
        self.start_merge(None)
    }

    /// Merge the values and store the result under the current save target.
    pub fn save(&mut self) -> Result<JobId, SessionError> {
        let target = self.save_target.clone();
        self.start_merge(Some(target))
    }

    /// Merge the values and store the result under a new name or folder.
    pub fn save_as(&mut self, target: SaveTarget) -> Result<JobId, SessionError> {
        self.start_merge(Some(target))
    }

    /// Dispatch a merge of the current values; `target` set means a save.
    fn start_merge(&mut self, target: Option<SaveTarget>) -> Result<JobId, SessionError> {
        self.ensure_editable()?;
        self.flush_edits();
        let request = WorkerRequest::MergeAndPackage {
            bytes: self.source.clone(),
            field_values: self.values.clone(),
        };
        let action = match target {
            Some(target) => {
                self.state = SessionState::Saving;
                PendingAction::Save {
                    target,
                    values: self.values.clone(),
                }
            }
            None => {
                self.state = SessionState::Generating;
                PendingAction::Generate
            }
        };
        Ok(self.dispatch(request, action))
    }

    /// Send a job, making it the only one whose result is applied.
    fn dispatch(&mut self, request: WorkerRequest, action: PendingAction) -> JobId {
        self.last_job += 1;
        let job_id = JobId(self.last_job);
        if let Some((previous, _)) = self.current_job.replace((job_id, action)) {
            debug!("{} supersedes {}", job_id, previous);
        }
        self.progress = (Stage::Idle, 0);
        self.dispatcher.dispatch(JobEnvelope { job_id, request });
        job_id
    }

    /// Apply one event from the worker. Events of superseded jobs and
    /// progress updates produce no outcome.
    #[instrument(skip_all, level = "debug", fields(job = %event.job_id))]
    pub async fn handle_event(&mut self, event: JobEvent) -> Option<SessionOutcome> {
        if self.current_job() != Some(event.job_id) {
            debug!("Discarding stale result of {}", event.job_id);
            return None;
        }
        if let WorkerResponse::Progress { stage, percent } = event.response {
            self.progress = (stage, percent);
            return None;
        }
        let (_, action) = self.current_job.take()?;

        let outcome = match (action, event.response) {
            (
                PendingAction::ExtractFields,
                WorkerResponse::FieldsExtracted {
                    placeholder_names,
                    custom_properties,
                },
            ) => self.apply_fields(placeholder_names, custom_properties).await,
            (PendingAction::Generate, WorkerResponse::PackageReady { blob }) => {
                self.apply_generated(blob)
            }
            (PendingAction::Save { target, values }, WorkerResponse::PackageReady { blob }) => {
                self.apply_saved(target, values, blob).await
            }
            (action, WorkerResponse::Error { stage, message }) => {
                self.apply_error(action, stage, message)
            }
            (action, response) => {
                let message = format!(
                    "Unexpected {} response for a {} job",
                    response_kind(&response),
                    action.kind()
                );
                self.apply_error(action, None, message)
            }
        };
        Some(outcome)
    }

    /// Wait for the current job to finish and return its outcome.
    ///
    /// Returns `None` when no job is in flight.
    pub async fn settle(&mut self) -> Option<SessionOutcome> {
        while self.is_processing() {
            let event = self.events.recv().await?;
            if let Some(outcome) = self.handle_event(event).await {
                return Some(outcome);
            }
        }
        None
    }

    async fn apply_fields(
        &mut self,
        placeholder_names: Vec<String>,
        custom_properties: Vec<CustomProperty>,
    ) -> SessionOutcome {
        self.fields = collect_fields(&placeholder_names, &custom_properties);
        self.custom_properties = custom_properties;
        self.state = SessionState::Editing;
        self.progress = (Stage::Complete, 100);

        let draft_available = match &self.context.drafts {
            Some(drafts) => drafts.exists(&self.template_name).await,
            None => false,
        };
        info!(
            "{} is ready with {} fields",
            self.template_name,
            self.fields.len()
        );
        SessionOutcome::FieldsReady {
            fields: self.fields.len(),
            draft_available,
        }
    }

    fn apply_generated(&mut self, blob: Blob) -> SessionOutcome {
        self.progress = (Stage::Complete, 100);
        self.state = SessionState::Editing;
        self.context.notifier.notify(Notification::Success(format!(
            "Generated {}",
            self.template_name
        )));
        SessionOutcome::Generated {
            blob,
            file_name: self.template_name.clone(),
        }
    }

    /// Upload a merged document. `saved_values` is what the merge was run
    /// with; edits applied since then stay unsaved.
    async fn apply_saved(
        &mut self,
        target: SaveTarget,
        saved_values: FieldValues,
        blob: Blob,
    ) -> SessionOutcome {
        self.progress = (Stage::Complete, 100);
        let result = self
            .context
            .store
            .upload(blob.bytes, &target.name, target.folder_id.as_deref())
            .await;
        self.state = SessionState::Editing;

        let document_id = match result {
            Ok(document_id) => document_id,
            Err(e) => {
                warn!("Saving {} failed: {}", target.name, e);
                self.context
                    .notifier
                    .notify(Notification::Error(e.user_message()));
                return SessionOutcome::Failed {
                    stage: None,
                    message: e.to_string(),
                };
            }
        };

        self.save_target = target;
        if self.values == saved_values && !self.debouncer.has_pending() {
            self.has_changes = false;
            self.discard_draft().await;
        } else {
            debug!("Fields edited during the save remain unsaved");
            self.has_changes = true;
            self.save_draft().await;
        }
        self.context.notifier.notify(Notification::Success(format!(
            "Saved {}",
            self.save_target.name
        )));
        SessionOutcome::Saved { document_id }
    }

    fn apply_error(
        &mut self,
        action: PendingAction,
        stage: Option<Stage>,
        message: String,
    ) -> SessionOutcome {
        self.progress = (Stage::Error, 0);
        let shown = match action {
            PendingAction::ExtractFields => {
                self.state = SessionState::Failed;
                format!("Could not read this file: {message}")
            }
            PendingAction::Generate | PendingAction::Save { .. } => {
                self.state = SessionState::Editing;
                format!("Could not generate the document: {message}")
            }
        };
        warn!("{} failed during {:?}: {}", self.template_name, stage, message);
        self.context.notifier.notify(Notification::Error(shown));
        SessionOutcome::Failed { stage, message }
    }

    /// Ask to close the session. Pending edits are applied first; with
    /// unsaved changes the caller must confirm before `discard_and_close`.
    pub fn request_close(&mut self) -> CloseRequest {
        self.flush_edits();
        if self.has_changes {
            return CloseRequest::NeedsConfirmation;
        }
        self.close();
        CloseRequest::Closed
    }

    /// Close without saving, dropping the unsaved values and their draft.
    pub async fn discard_and_close(&mut self) {
        self.debouncer.flush();
        self.discard_draft().await;
        self.close();
    }

    fn close(&mut self) {
        if let Some((job_id, _)) = self.current_job.take() {
            debug!("Closing with {} in flight; its result will be ignored", job_id);
        }
        self.state = SessionState::Closed;
        info!("Closed session for {}", self.template_name);
    }
}

impl PendingAction {
    fn kind(&self) -> &'static str {
        match self {
            PendingAction::ExtractFields => "extract_fields",
            PendingAction::Generate | PendingAction::Save { .. } => "merge_and_package",
        }
    }
}

fn response_kind(response: &WorkerResponse) -> &'static str {
    match response {
        WorkerResponse::Progress { .. } => "progress",
        WorkerResponse::FieldsExtracted { .. } => "fields_extracted",
        WorkerResponse::PackageReady { .. } => "package_ready",
        WorkerResponse::Error { .. } => "error",
    }
}
