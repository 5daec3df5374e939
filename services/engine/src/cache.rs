//! services/engine/src/cache.rs
//!
//! The lesson content cache and the stale-then-fresh lesson loader.
//!
//! Cached content must never survive a server-side edit: every read is
//! validated against the cached structure, the whole cache is dropped when
//! the global content version advances, and a lesson the server no longer
//! knows clears both its entry and the cached catalog before the caller is
//! told to navigate away.

use std::sync::Arc;

use parent_coach_core::domain::{
    Lesson, LessonDetail, LessonProgress, LessonWithProgress, ProgressStatus, ProgressUpdate,
};
use parent_coach_core::ports::{KeyValueStore, LessonService, PortError};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::keys;

//=========================================================================================
// CacheEntry
//=========================================================================================

/// One lesson's content snapshot plus the segment the user last sat on.
/// Persisted as JSON under the lesson-cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub lesson_id: Uuid,
    pub payload: LessonDetail,
    pub saved_segment: usize,
}

impl CacheEntry {
    /// An entry is usable only while its saved segment still addresses the
    /// cached structure. `saved_segment == total` is valid (one past the
    /// last segment means the lesson was just finished).
    fn is_valid(&self) -> bool {
        self.saved_segment <= self.payload.total_segments()
    }
}

//=========================================================================================
// ContentCache
//=========================================================================================

pub struct ContentCache {
    store: Arc<dyn KeyValueStore>,
}

impl ContentCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn entry_key(lesson_id: Uuid) -> String {
        format!("{}{}", keys::LESSON_CACHE_PREFIX, lesson_id)
    }

    /// Returns the cached entry for `lesson_id`, or `None` on a miss.
    ///
    /// An unreadable, unparsable, or structurally invalid entry is discarded
    /// and reported as a miss, forcing a fresh remote fetch. That guards the
    /// presentation layer against index-out-of-bounds on edited content.
    pub async fn get(&self, lesson_id: Uuid) -> Option<CacheEntry> {
        let key = Self::entry_key(lesson_id);
        let raw = match self.store.get_item(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for lesson {}, treating as miss: {}", lesson_id, e);
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Corrupt cache entry for lesson {}, discarding: {}", lesson_id, e);
                self.remove(lesson_id).await;
                return None;
            }
        };
        if !entry.is_valid() {
            info!(
                "Cached segment {} out of range for lesson {} ({} segments), discarding",
                entry.saved_segment,
                lesson_id,
                entry.payload.total_segments()
            );
            self.remove(lesson_id).await;
            return None;
        }
        Some(entry)
    }

    /// Stores an entry. Best-effort: a store failure only costs a re-fetch.
    pub async fn set(&self, entry: &CacheEntry) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode cache entry for lesson {}: {}", entry.lesson_id, e);
                return;
            }
        };
        if let Err(e) = self.store.set_item(&Self::entry_key(entry.lesson_id), &raw).await {
            warn!("Failed to write cache entry for lesson {}: {}", entry.lesson_id, e);
        }
    }

    pub async fn remove(&self, lesson_id: Uuid) {
        if let Err(e) = self.store.remove_item(&Self::entry_key(lesson_id)).await {
            warn!("Failed to remove cache entry for lesson {}: {}", lesson_id, e);
        }
    }

    /// Drops every cached lesson payload and the cached catalog. The stored
    /// content-version marker is managed by `check_and_update_version`.
    pub async fn clear(&self) {
        match self.store.keys_with_prefix(keys::LESSON_CACHE_PREFIX).await {
            Ok(cache_keys) => {
                for key in cache_keys {
                    if let Err(e) = self.store.remove_item(&key).await {
                        warn!("Failed to remove {} while clearing cache: {}", key, e);
                    }
                }
            }
            Err(e) => warn!("Failed to list cache keys while clearing: {}", e),
        }
        if let Err(e) = self.store.remove_item(keys::LESSON_LIST_CACHE).await {
            warn!("Failed to remove cached lesson list: {}", e);
        }
    }

    /// Compares the server's monotonic content version against the stored
    /// one. A changed version clears the entire cache (coarse, whole-cache
    /// invalidation - simpler than per-lesson diffing) and stores the new
    /// version. Returns whether a clear happened.
    ///
    /// A first run with nothing stored just records the version; there is
    /// nothing to clear yet.
    pub async fn check_and_update_version(&self, server_version: u64) -> bool {
        let stored = match self.store.get_item(keys::CONTENT_VERSION).await {
            Ok(value) => value.and_then(|v| v.parse::<u64>().ok()),
            Err(e) => {
                warn!("Failed to read content version, treating as absent: {}", e);
                None
            }
        };
        match stored {
            Some(version) if version == server_version => false,
            Some(version) => {
                info!(
                    "Content version advanced {} -> {}, clearing lesson cache",
                    version, server_version
                );
                self.clear().await;
                self.store_version(server_version).await;
                true
            }
            None => {
                self.store_version(server_version).await;
                false
            }
        }
    }

    async fn store_version(&self, version: u64) {
        if let Err(e) = self
            .store
            .set_item(keys::CONTENT_VERSION, &version.to_string())
            .await
        {
            warn!("Failed to store content version {}: {}", version, e);
        }
    }

    /// Caches the catalog summaries so a cold screen can render names while
    /// the list refetches.
    pub async fn set_lesson_list(&self, lessons: &[Lesson]) {
        match serde_json::to_string(lessons) {
            Ok(raw) => {
                if let Err(e) = self.store.set_item(keys::LESSON_LIST_CACHE, &raw).await {
                    warn!("Failed to cache lesson list: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode lesson list: {}", e),
        }
    }

    pub async fn lesson_list(&self) -> Option<Vec<Lesson>> {
        let raw = self.store.get_item(keys::LESSON_LIST_CACHE).await.ok()??;
        match serde_json::from_str(&raw) {
            Ok(list) => Some(list),
            Err(e) => {
                warn!("Corrupt cached lesson list, discarding: {}", e);
                None
            }
        }
    }

    /// Startup cleanup: completed lessons do not keep their content around.
    /// Review-after-finishing only has to survive the session it happened in.
    pub async fn purge_completed(&self, lessons: &[LessonWithProgress]) {
        for entry in lessons {
            let completed = matches!(
                &entry.progress,
                Some(p) if p.status == ProgressStatus::Completed
            );
            if completed {
                self.remove(entry.lesson.id).await;
            }
        }
    }

    /// The server no longer knows this lesson: drop its entry and the cached
    /// catalog in one pass. The caller navigates away afterwards.
    pub async fn lesson_gone(&self, lesson_id: Uuid) {
        info!("Lesson {} reported gone by the server, clearing its cache", lesson_id);
        self.remove(lesson_id).await;
        if let Err(e) = self.store.remove_item(keys::LESSON_LIST_CACHE).await {
            warn!("Failed to remove cached lesson list: {}", e);
        }
    }
}

//=========================================================================================
// LessonLoader (Two-Phase Reads)
//=========================================================================================

/// One phase of a lesson read. `is_stale` marks the cached snapshot served
/// before the background refresh lands.
#[derive(Debug, Clone)]
pub struct LessonRead {
    pub detail: LessonDetail,
    pub saved_segment: usize,
    pub is_stale: bool,
}

/// The result of opening a lesson.
pub enum LessonOpen {
    /// Cache miss: the payload was fetched just now and is already fresh.
    Fresh(LessonRead),
    /// Cache hit: `read` renders immediately; `refresh` delivers the fresh
    /// phase when the background fetch completes (`None` if it failed).
    Cached {
        read: LessonRead,
        refresh: oneshot::Receiver<Option<LessonRead>>,
    },
}

/// Errors surfaced to the lesson view. `LessonGone` is the one condition the
/// presentation layer must act on (navigate away with an explanation);
/// everything else is a plain transient failure.
#[derive(Debug, thiserror::Error)]
pub enum LessonLoadError {
    #[error("Lesson {0} no longer exists on the server")]
    LessonGone(Uuid),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct LessonLoader {
    cache: Arc<ContentCache>,
    lessons: Arc<dyn LessonService>,
}

impl LessonLoader {
    pub fn new(cache: Arc<ContentCache>, lessons: Arc<dyn LessonService>) -> Self {
        Self { cache, lessons }
    }

    /// Opens a lesson for viewing.
    ///
    /// On a cache hit the stale payload is returned immediately and a
    /// background refresh silently replaces the cached entry; the fresh
    /// payload carries the new total-segment count so the consumer can
    /// re-clamp its segment index (to 0 if the structure shrank).
    pub async fn open_lesson(&self, lesson_id: Uuid) -> Result<LessonOpen, LessonLoadError> {
        if let Some(entry) = self.cache.get(lesson_id).await {
            debug!("Cache hit for lesson {}, serving stale and refreshing", lesson_id);
            let (tx, rx) = oneshot::channel();
            let cache = self.cache.clone();
            let lessons = self.lessons.clone();
            let saved_segment = entry.saved_segment;
            tokio::spawn(async move {
                let fresh = Self::refresh_entry(&cache, &lessons, lesson_id, saved_segment).await;
                // The receiver may have been dropped; that is fine.
                let _ = tx.send(fresh);
            });
            return Ok(LessonOpen::Cached {
                read: LessonRead {
                    detail: entry.payload,
                    saved_segment: entry.saved_segment,
                    is_stale: true,
                },
                refresh: rx,
            });
        }

        match self.lessons.get_lesson_detail(lesson_id).await {
            Ok(detail) => {
                self.cache
                    .set(&CacheEntry {
                        lesson_id,
                        payload: detail.clone(),
                        saved_segment: 0,
                    })
                    .await;
                Ok(LessonOpen::Fresh(LessonRead {
                    detail,
                    saved_segment: 0,
                    is_stale: false,
                }))
            }
            Err(PortError::NotFound(_)) => {
                self.cache.lesson_gone(lesson_id).await;
                Err(LessonLoadError::LessonGone(lesson_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The background half of a cache hit: refetch, replace the entry, hand
    /// the fresh read to whoever is still listening.
    async fn refresh_entry(
        cache: &ContentCache,
        lessons: &Arc<dyn LessonService>,
        lesson_id: Uuid,
        saved_segment: usize,
    ) -> Option<LessonRead> {
        match lessons.get_lesson_detail(lesson_id).await {
            Ok(detail) => {
                // Keep the user's position if the fresh structure still has
                // it; otherwise park the entry back at the start.
                let segment = if saved_segment <= detail.total_segments() {
                    saved_segment
                } else {
                    0
                };
                cache
                    .set(&CacheEntry {
                        lesson_id,
                        payload: detail.clone(),
                        saved_segment: segment,
                    })
                    .await;
                Some(LessonRead {
                    detail,
                    saved_segment: segment,
                    is_stale: false,
                })
            }
            Err(PortError::NotFound(_)) => {
                cache.lesson_gone(lesson_id).await;
                None
            }
            Err(e) => {
                // Transient: the stale payload stays on screen.
                warn!("Background refresh failed for lesson {}: {}", lesson_id, e);
                None
            }
        }
    }

    /// Pushes progress for a lesson, keeping the cache in step.
    ///
    /// A completed lesson loses its cache entry (content is not kept past
    /// the finishing session); a `NotFound` clears the entry and the cached
    /// catalog exactly once and surfaces `LessonGone` - no further writes to
    /// the stale lesson happen in this flow.
    pub async fn record_progress(
        &self,
        lesson_id: Uuid,
        update: ProgressUpdate,
    ) -> Result<LessonProgress, LessonLoadError> {
        let segment = update.current_segment;
        match self.lessons.update_progress(lesson_id, update).await {
            Ok(progress) => {
                if progress.status == ProgressStatus::Completed {
                    self.cache.remove(lesson_id).await;
                } else if let Some(entry) = self.cache.get(lesson_id).await {
                    self.cache
                        .set(&CacheEntry {
                            saved_segment: segment,
                            ..entry
                        })
                        .await;
                }
                Ok(progress)
            }
            Err(PortError::NotFound(_)) => {
                self.cache.lesson_gone(lesson_id).await;
                Err(LessonLoadError::LessonGone(lesson_id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
