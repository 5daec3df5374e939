//! services/engine/src/state.rs
//!
//! Defines the engine's shared state: the injected service ports, the
//! configuration, and the process-wide experienced-user latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parent_coach_core::ports::{AuthService, KeyValueStore, LessonService, RecordingService};
use tracing::{info, warn};

use crate::config::EngineConfig;

//=========================================================================================
// Store Key Namespace
//=========================================================================================

/// Keys the engine owns inside the platform key-value store.
pub mod keys {
    pub const EXPERIENCED_USER: &str = "isExperiencedUser";
    pub const REPORT_READ_PREFIX: &str = "report_read_";
    pub const LESSON_CACHE_PREFIX: &str = "lesson_cache_";
    pub const CONTENT_VERSION: &str = "lesson_content_version";
    pub const LESSON_LIST_CACHE: &str = "lesson_list_cache";
}

//=========================================================================================
// AppState (Shared Across the Whole Engine)
//=========================================================================================

/// The shared engine state, created once at startup and injected into every
/// component. Ports are trait objects so the embedding shell (and tests)
/// decide the concrete transports.
#[derive(Clone)]
pub struct AppState {
    pub lessons: Arc<dyn LessonService>,
    pub recordings: Arc<dyn RecordingService>,
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn KeyValueStore>,
    pub config: Arc<EngineConfig>,
    pub experienced: Arc<ExperiencedUser>,
}

//=========================================================================================
// ExperiencedUser (One-Way Latch)
//=========================================================================================

/// A permanent, monotonic "this user has done something" flag.
///
/// Read from the store exactly once at startup; after that the in-process
/// bit is authoritative. `promote` is the only mutation and it never goes
/// back. Once true the remote existence-checks that would otherwise decide
/// it are skipped entirely.
pub struct ExperiencedUser {
    flag: AtomicBool,
    store: Arc<dyn KeyValueStore>,
}

impl ExperiencedUser {
    /// Creates the latch by reading the persisted flag. A store failure is
    /// logged and treated as "not experienced" - the safe default.
    pub async fn init(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = match store.get_item(keys::EXPERIENCED_USER).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("Failed to read experienced-user flag, defaulting to false: {}", e);
                false
            }
        };
        Self {
            flag: AtomicBool::new(initial),
            store,
        }
    }

    pub fn is_experienced(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Latches the flag and writes it through to the store. Idempotent; the
    /// write is best-effort and a failure only costs a re-check next launch.
    pub async fn promote(&self) {
        if self.flag.swap(true, Ordering::Relaxed) {
            return;
        }
        info!("User promoted to experienced");
        if let Err(e) = self.store.set_item(keys::EXPERIENCED_USER, "true").await {
            warn!("Failed to persist experienced-user flag: {}", e);
        }
    }
}
