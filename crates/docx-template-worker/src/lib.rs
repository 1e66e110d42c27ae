//! Job orchestration and editing sessions for DOCX templates.
//!
//! A `ProcessingSession` owns one opened template. It sends extract and
//! merge jobs to a `TemplateWorker`, applies their results in order and
//! saves merged documents through a `DocumentStore`.

pub mod config;
mod debounce;
mod drafts;
mod notify;
mod session;
mod store;
mod worker;

#[cfg(test)]
mod testing;

pub use config::{Command, Config};
pub use debounce::Debouncer;
pub use drafts::{DraftSnapshot, DraftStore};
pub use notify::{LogNotifier, Notification, NotificationSink};
pub use session::{
    CloseRequest, ProcessingSession, SaveTarget, SessionContext, SessionError, SessionOutcome,
    SessionState,
};
pub use store::LocalDocumentStore;
pub use worker::{run_job, JobDispatcher, TemplateWorker};
