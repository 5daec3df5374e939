//! services/engine/src/today.rs
//!
//! The Today-State Resolver: reconciles the lesson catalog and today's
//! recordings with the persisted report-read marker into a `TodayState`.
//!
//! The resolver never fails on the common path. Store trouble degrades to
//! the safe defaults (report unread, user not experienced) with a log line;
//! remote-fetch failures are the aggregator's problem and never reach here.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use parent_coach_core::domain::{LessonWithProgress, ProgressStatus, Recording, TodayState};
use parent_coach_core::ports::KeyValueStore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::{keys, ExperiencedUser};

//=========================================================================================
// TodayResolver
//=========================================================================================

pub struct TodayResolver {
    store: Arc<dyn KeyValueStore>,
    experienced: Arc<ExperiencedUser>,
    tz: Tz,
}

impl TodayResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, experienced: Arc<ExperiencedUser>, tz: Tz) -> Self {
        Self {
            store,
            experienced,
            tz,
        }
    }

    /// The store key holding which recording's report was read on `day`.
    fn marker_key(day: NaiveDate) -> String {
        format!("{}{}", keys::REPORT_READ_PREFIX, day.format("%Y-%m-%d"))
    }

    /// Derives today's state from the remote query results. Also latches the
    /// experienced-user flag the first time any activity is seen.
    pub async fn resolve(
        &self,
        lessons: &[LessonWithProgress],
        today_recordings: &[Recording],
    ) -> TodayState {
        self.resolve_at(lessons, today_recordings, Utc::now()).await
    }

    /// Same as `resolve` but with an explicit clock, so tests control "today".
    pub async fn resolve_at(
        &self,
        lessons: &[LessonWithProgress],
        today_recordings: &[Recording],
        now: DateTime<Utc>,
    ) -> TodayState {
        let today = now.with_timezone(&self.tz).date_naive();

        let lesson_completed_today = lessons.iter().any(|entry| {
            matches!(
                &entry.progress,
                Some(p) if p.status == ProgressStatus::Completed
                    && p.completed_at
                        .map(|ts| ts.with_timezone(&self.tz).date_naive() == today)
                        .unwrap_or(false)
            )
        });

        // The next lesson the Lesson card deep-links to: first not-completed
        // lesson in curriculum order.
        let mut ordered: Vec<&LessonWithProgress> = lessons.iter().collect();
        ordered.sort_by_key(|entry| entry.lesson.order);
        let today_lesson_id = ordered
            .iter()
            .find(|entry| {
                !matches!(&entry.progress, Some(p) if p.status == ProgressStatus::Completed)
            })
            .map(|entry| entry.lesson.id);

        // The server sends these pre-sorted descending, but nothing breaks
        // if it stops doing so: pick the max ourselves.
        let latest_recording_id = today_recordings
            .iter()
            .max_by_key(|r| r.created_at)
            .map(|r| r.id);
        let has_recorded_today = latest_recording_id.is_some();

        // A read-marker is only meaningful while it names the recording that
        // is currently latest. Any mismatch, absence, or store failure means
        // unread - showing the report twice beats hiding it.
        let is_report_read = match latest_recording_id {
            Some(latest) => match self.store.get_item(&Self::marker_key(today)).await {
                Ok(Some(marker)) => marker == latest.to_string(),
                Ok(None) => false,
                Err(e) => {
                    warn!("Failed to read report marker, defaulting to unread: {}", e);
                    false
                }
            },
            None => false,
        };

        if lesson_completed_today || has_recorded_today {
            self.experienced.promote().await;
        }

        let state = TodayState {
            lesson_completed_today,
            has_recorded_today,
            is_report_read,
            latest_recording_id,
            today_lesson_id,
        };
        debug!(
            "Resolved today-state for {}: lesson={} recorded={} read={}",
            today, state.lesson_completed_today, state.has_recorded_today, state.is_report_read
        );
        state
    }

    /// Records that the user has read the report for `recording_id`.
    /// Best-effort: a store failure is logged and the report will simply
    /// present as unread on the next resolve.
    pub async fn mark_report_read(&self, recording_id: Uuid) {
        self.mark_report_read_at(recording_id, Utc::now()).await
    }

    pub async fn mark_report_read_at(&self, recording_id: Uuid, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.tz).date_naive();
        let key = Self::marker_key(today);
        if let Err(e) = self.store.set_item(&key, &recording_id.to_string()).await {
            warn!("Failed to persist report marker {}: {}", key, e);
        }
    }

    /// Called when the user starts a new recording session (record-again).
    /// Clears today's marker so the upcoming session's report starts unread.
    pub async fn begin_recording_session(&self) {
        self.begin_recording_session_at(Utc::now()).await
    }

    pub async fn begin_recording_session_at(&self, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.tz).date_naive();
        let key = Self::marker_key(today);
        if let Err(e) = self.store.remove_item(&key).await {
            warn!("Failed to clear report marker {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use parent_coach_core::domain::{AnalysisStatus, CardState, Lesson, LessonProgress};
    use parent_coach_core::ports::{PortError, PortResult};

    const TZ: Tz = New_York;

    /// A store whose every operation fails, for the degraded-path tests.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> PortResult<Option<String>> {
            Err(PortError::Unexpected("disk on fire".into()))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> PortResult<()> {
            Err(PortError::Unexpected("disk on fire".into()))
        }
        async fn remove_item(&self, _key: &str) -> PortResult<()> {
            Err(PortError::Unexpected("disk on fire".into()))
        }
        async fn keys_with_prefix(&self, _prefix: &str) -> PortResult<Vec<String>> {
            Err(PortError::Unexpected("disk on fire".into()))
        }
    }

    fn noon_utc() -> DateTime<Utc> {
        TZ.with_ymd_and_hms(2026, 8, 26, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn lesson(order: u32, status: ProgressStatus, completed_at: Option<DateTime<Utc>>) -> LessonWithProgress {
        LessonWithProgress {
            lesson: Lesson {
                id: Uuid::new_v4(),
                title: format!("Lesson {}", order),
                order,
                module_id: None,
            },
            progress: Some(LessonProgress {
                status,
                completed_at,
                current_segment: 0,
            }),
        }
    }

    fn recording(created_at: DateTime<Utc>) -> Recording {
        Recording {
            id: Uuid::new_v4(),
            created_at,
            analysis_status: AnalysisStatus::Completed,
            permanent_failure: false,
        }
    }

    async fn resolver_with(store: Arc<dyn KeyValueStore>) -> TodayResolver {
        let experienced = Arc::new(ExperiencedUser::init(store.clone()).await);
        TodayResolver::new(store, experienced, TZ)
    }

    #[tokio::test]
    async fn empty_inputs_yield_the_default_lesson_card() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let state = resolver.resolve_at(&[], &[], noon_utc()).await;
        assert!(!state.lesson_completed_today);
        assert!(!state.has_recorded_today);
        assert!(!state.is_report_read);
        assert_eq!(state.card_state(), CardState::Lesson);
    }

    #[tokio::test]
    async fn resolving_twice_with_identical_inputs_is_idempotent() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let lessons = [lesson(1, ProgressStatus::Completed, Some(now))];
        let recordings = [recording(now)];

        let first = resolver.resolve_at(&lessons, &recordings, now).await;
        let second = resolver.resolve_at(&lessons, &recordings, now).await;
        assert_eq!(first, second);
        assert_eq!(first.card_state(), second.card_state());
    }

    #[tokio::test]
    async fn read_marker_only_counts_for_the_current_latest_recording() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let earlier = recording(now - chrono::Duration::hours(3));

        resolver.mark_report_read_at(earlier.id, now).await;
        let state = resolver.resolve_at(&[], &[earlier.clone()], now).await;
        assert!(state.is_report_read);

        // A newer recording arrives; the old marker still names the previous
        // id, so the fresh report must present as unread.
        let newer = recording(now);
        let state = resolver
            .resolve_at(&[], &[earlier, newer.clone()], now)
            .await;
        assert_eq!(state.latest_recording_id, Some(newer.id));
        assert!(!state.is_report_read);
        assert_eq!(state.card_state(), CardState::ReadReport);
    }

    #[tokio::test]
    async fn stale_marker_without_a_recording_today_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_with(store).await;
        let now = noon_utc();
        resolver.mark_report_read_at(Uuid::new_v4(), now).await;

        let state = resolver.resolve_at(&[], &[], now).await;
        assert!(!state.is_report_read);
    }

    #[tokio::test]
    async fn completion_yesterday_does_not_count_today() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let yesterday = now - chrono::Duration::days(1);
        let lessons = [lesson(1, ProgressStatus::Completed, Some(yesterday))];

        let state = resolver.resolve_at(&lessons, &[], now).await;
        assert!(!state.lesson_completed_today);
    }

    #[tokio::test]
    async fn late_evening_completion_counts_in_the_reference_timezone() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        // 03:30 UTC the next calendar day is still today in New York.
        let late = Utc.with_ymd_and_hms(2026, 8, 27, 3, 30, 0).unwrap();
        let lessons = [lesson(1, ProgressStatus::Completed, Some(late))];

        let state = resolver.resolve_at(&lessons, &[], now).await;
        assert!(state.lesson_completed_today);
        assert_eq!(state.card_state(), CardState::Record);
    }

    #[tokio::test]
    async fn next_lesson_is_the_first_incomplete_in_catalog_order() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let done = lesson(1, ProgressStatus::Completed, Some(now - chrono::Duration::days(2)));
        let next = lesson(2, ProgressStatus::InProgress, None);
        let later = lesson(3, ProgressStatus::NotStarted, None);
        // Deliberately shuffled; the resolver sorts by curriculum order.
        let lessons = [later, done, next.clone()];

        let state = resolver.resolve_at(&lessons, &[], now).await;
        assert_eq!(state.today_lesson_id, Some(next.lesson.id));
    }

    #[tokio::test]
    async fn full_day_with_read_report_asks_to_record_again() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let rec = recording(now);
        resolver.mark_report_read_at(rec.id, now).await;
        let lessons = [lesson(1, ProgressStatus::Completed, Some(now))];

        let state = resolver.resolve_at(&lessons, &[rec], now).await;
        assert_eq!(state.card_state(), CardState::RecordAgain);
    }

    #[tokio::test]
    async fn starting_a_new_session_clears_the_marker() {
        let resolver = resolver_with(Arc::new(MemoryStore::new())).await;
        let now = noon_utc();
        let rec = recording(now);
        resolver.mark_report_read_at(rec.id, now).await;

        resolver.begin_recording_session_at(now).await;
        let state = resolver.resolve_at(&[], &[rec], now).await;
        assert!(!state.is_report_read);
    }

    #[tokio::test]
    async fn broken_store_degrades_to_unread_without_failing() {
        let store: Arc<dyn KeyValueStore> = Arc::new(BrokenStore);
        let resolver = resolver_with(store).await;
        let now = noon_utc();

        let state = resolver.resolve_at(&[], &[recording(now)], now).await;
        assert!(state.has_recorded_today);
        assert!(!state.is_report_read);
        assert_eq!(state.card_state(), CardState::ReadReport);

        // Marker writes against the broken store are swallowed too.
        resolver.mark_report_read_at(Uuid::new_v4(), now).await;
        resolver.begin_recording_session_at(now).await;
    }

    #[tokio::test]
    async fn any_activity_latches_the_experienced_flag() {
        let store = Arc::new(MemoryStore::new());
        let experienced = Arc::new(ExperiencedUser::init(store.clone()).await);
        let resolver = TodayResolver::new(store, experienced.clone(), TZ);
        assert!(!experienced.is_experienced());

        let now = noon_utc();
        resolver.resolve_at(&[], &[recording(now)], now).await;
        assert!(experienced.is_experienced());
    }
}
