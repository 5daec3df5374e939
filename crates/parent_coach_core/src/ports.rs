//! crates/parent_coach_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like the remote lesson
//! and recording backends or the platform's key-value storage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AnalysisSummary, LessonCatalog, LessonDetail, LessonProgress, Module, ProgressUpdate,
    Recording, RecordingDashboard, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The server accepted the request but the result is not ready yet.
    /// Callers are expected to poll (with a bounded budget).
    #[error("Analysis still processing for recording {0}")]
    Processing(Uuid),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait LessonService: Send + Sync {
    /// Fetches the full catalog with the caller's progress attached, plus
    /// the server's monotonic content version.
    async fn get_lessons(&self) -> PortResult<LessonCatalog>;

    /// Fetches a single lesson's content. Fails with `NotFound` if the
    /// lesson has been deleted or renumbered away server-side.
    async fn get_lesson_detail(&self, lesson_id: Uuid) -> PortResult<LessonDetail>;

    async fn get_modules(&self) -> PortResult<Vec<Module>>;

    /// Pushes progress for a lesson, returning the server's view of it.
    /// Fails with `NotFound` when the lesson no longer exists.
    async fn update_progress(
        &self,
        lesson_id: Uuid,
        update: ProgressUpdate,
    ) -> PortResult<LessonProgress>;
}

#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Fetches the recording dashboard: today's recordings (server-filtered
    /// to the caller's calendar day), this week's, and the latest recording
    /// that has a report.
    async fn get_dashboard(&self) -> PortResult<RecordingDashboard>;

    async fn get_recordings(&self) -> PortResult<Vec<Recording>>;

    /// Fetches the analysis report for one recording. Fails with
    /// `Processing` while the analysis is still pending upstream.
    async fn get_analysis(&self, recording_id: Uuid) -> PortResult<AnalysisSummary>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn is_authenticated(&self) -> PortResult<bool>;

    async fn current_user(&self) -> PortResult<User>;
}

/// Durable, process-independent storage of small string values.
/// The platform provides this (AsyncStorage-style); the engine only ever
/// reads and writes opaque strings under namespaced keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()>;

    async fn remove_item(&self, key: &str) -> PortResult<()>;

    /// Lists the stored keys starting with `prefix`. Needed for namespace
    /// sweeps (clearing the lesson-cache namespace in one pass).
    async fn keys_with_prefix(&self, prefix: &str) -> PortResult<Vec<String>>;
}
