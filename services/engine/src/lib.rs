//! services/engine/src/lib.rs
//!
//! The client-side "Today State" derivation engine for the parenting-coach
//! app. The embedding shell supplies implementations of the ports defined in
//! `parent_coach_core` (lesson catalog, recording/analysis backend, auth,
//! platform key-value storage) and renders the view-models produced here;
//! everything day-sensitive runs against one configured reference timezone.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod state;
pub mod streak;
pub mod today;

pub use cache::{CacheEntry, ContentCache, LessonLoadError, LessonLoader, LessonOpen, LessonRead};
pub use config::{ConfigError, EngineConfig};
pub use dashboard::{DashboardAggregator, DashboardViewModel, ScreenPhase};
pub use error::EngineError;
pub use state::{AppState, ExperiencedUser};
pub use today::TodayResolver;
