//! services/engine/src/dashboard.rs
//!
//! The Dashboard Aggregator: fans out the remote fetches, feeds the
//! resolver and streak calculator, and publishes one consolidated
//! view-model for the home screen.
//!
//! Lifecycle per screen: Idle -> Loading -> Ready, with Refreshing reachable
//! from Ready for silent reloads (refocus, pull-to-refresh, day rollover).
//! Results replace the snapshot atomically; a refresh that fails leaves the
//! previous snapshot on screen. The analysis poll runs behind the committed
//! snapshot and patches it in later, so the screen never waits on a report
//! that is still processing. Every cycle carries a generation number and a
//! completion behind the newest issued generation lands as a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parent_coach_core::domain::{
    AnalysisSummary, CardState, LessonWithProgress, ProgressStatus, Recording, StreakRecord,
    TodayState, User,
};
use parent_coach_core::ports::{
    AuthService, LessonService, PortError, RecordingService,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ContentCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::state::AppState;
use crate::streak;
use crate::today::TodayResolver;

//=========================================================================================
// Screen Lifecycle & View-Model
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPhase {
    Idle,
    Loading,
    Ready,
    Refreshing,
}

/// Everything the home screen renders, computed in one pass.
#[derive(Debug, Clone)]
pub struct DashboardViewModel {
    pub today: TodayState,
    pub card: CardState,
    pub streak: StreakRecord,
    /// Empty while the latest report is still processing (or failed).
    pub analysis: Option<AnalysisSummary>,
    pub user: Option<User>,
    pub experienced_user: bool,
    /// The reference-timezone day this snapshot was computed for. Used to
    /// detect rollover while the app stays foregrounded.
    pub loaded_day: NaiveDate,
}

struct Inner {
    phase: ScreenPhase,
    snapshot: Option<DashboardViewModel>,
    /// Cancels the previous cycle's analysis polling when a newer cycle starts.
    poll_cancel: CancellationToken,
}

//=========================================================================================
// DashboardAggregator
//=========================================================================================

pub struct DashboardAggregator {
    lessons: Arc<dyn LessonService>,
    recordings: Arc<dyn RecordingService>,
    auth: Arc<dyn AuthService>,
    config: Arc<EngineConfig>,
    experienced: Arc<crate::state::ExperiencedUser>,
    resolver: TodayResolver,
    cache: ContentCache,
    issued_generation: Arc<AtomicU64>,
    inner: Arc<RwLock<Inner>>,
}

impl DashboardAggregator {
    pub fn new(state: &AppState) -> Self {
        Self {
            lessons: state.lessons.clone(),
            recordings: state.recordings.clone(),
            auth: state.auth.clone(),
            config: state.config.clone(),
            experienced: state.experienced.clone(),
            resolver: TodayResolver::new(
                state.store.clone(),
                state.experienced.clone(),
                state.config.reference_tz,
            ),
            cache: ContentCache::new(state.store.clone()),
            issued_generation: Arc::new(AtomicU64::new(0)),
            inner: Arc::new(RwLock::new(Inner {
                phase: ScreenPhase::Idle,
                snapshot: None,
                poll_cancel: CancellationToken::new(),
            })),
        }
    }

    pub async fn phase(&self) -> ScreenPhase {
        self.inner.read().await.phase
    }

    pub async fn snapshot(&self) -> Option<DashboardViewModel> {
        self.inner.read().await.snapshot.clone()
    }

    /// First load for the screen. Gated on authentication; a failure before
    /// any snapshot exists is surfaced so the shell can show its error state.
    pub async fn load(&self) -> Result<(), EngineError> {
        if !self.auth.is_authenticated().await? {
            return Err(EngineError::Port(PortError::Unauthorized));
        }
        self.run_cycle(Utc::now()).await
    }

    /// Silent background reload (refocus, pull-to-refresh). Failures keep
    /// the previous snapshot on screen and are only logged.
    pub async fn refresh(&self) {
        if let Err(e) = self.run_cycle(Utc::now()).await {
            warn!("Dashboard refresh failed, keeping previous snapshot: {}", e);
        }
    }

    /// Detects a calendar-day rollover while the app stays foregrounded.
    /// All "today" computations are day-sensitive, so a detected rollover
    /// forces a refresh cycle even without user action.
    pub async fn check_day_rollover(&self) {
        let today = Utc::now().with_timezone(&self.config.reference_tz).date_naive();
        let rolled = {
            let inner = self.inner.read().await;
            inner
                .snapshot
                .as_ref()
                .map(|s| s.loaded_day != today)
                .unwrap_or(false)
        };
        if rolled {
            info!("Calendar day advanced, forcing dashboard refresh");
            self.refresh().await;
        }
    }

    /// Records the report as read and refreshes so the card advances.
    pub async fn mark_report_read(&self, recording_id: Uuid) {
        self.resolver.mark_report_read(recording_id).await;
        self.refresh().await;
    }

    /// Called when the user starts a new recording session: the prior
    /// read-marker is cleared so the new session's report starts unread.
    pub async fn begin_recording_session(&self) {
        self.resolver.begin_recording_session().await;
    }

    //-------------------------------------------------------------------------------------
    // The load/refresh cycle
    //-------------------------------------------------------------------------------------

    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let generation = self.issued_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let poll_cancel = {
            let mut inner = self.inner.write().await;
            inner.phase = if inner.snapshot.is_some() {
                ScreenPhase::Refreshing
            } else {
                ScreenPhase::Loading
            };
            // A superseded cycle must not keep polling for a report.
            inner.poll_cancel.cancel();
            inner.poll_cancel = CancellationToken::new();
            inner.poll_cancel.clone()
        };
        debug!("Dashboard cycle {} started", generation);

        let (catalog, dash, all_recordings, user) = tokio::join!(
            self.lessons.get_lessons(),
            self.recordings.get_dashboard(),
            self.recordings.get_recordings(),
            self.auth.current_user(),
        );

        let (catalog, dash, all_recordings) = match (catalog, dash, all_recordings) {
            (Ok(c), Ok(d), Ok(r)) => (c, d, r),
            (c, d, r) => {
                let e = [
                    c.err().map(|e| e.to_string()),
                    d.err().map(|e| e.to_string()),
                    r.err().map(|e| e.to_string()),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("; ");
                warn!("Dashboard cycle {} failed: {}", generation, e);
                self.restore_phase(generation).await;
                return Err(EngineError::Port(PortError::Unexpected(e)));
            }
        };
        // The user lookup only feeds the greeting; tolerate its absence.
        let user = user.ok();

        if self.is_superseded(generation) {
            return Ok(());
        }

        // Whole-cache invalidation off the catalog's content version, then
        // the routine cleanups.
        let was_cleared = self.cache.check_and_update_version(catalog.content_version).await;
        if !was_cleared {
            self.cache.purge_completed(&catalog.lessons).await;
        }
        self.cache
            .set_lesson_list(
                &catalog.lessons.iter().map(|l| l.lesson.clone()).collect::<Vec<_>>(),
            )
            .await;

        let today = self
            .resolver
            .resolve_at(&catalog.lessons, &dash.today_recordings, now)
            .await;
        let card = today.card_state();

        let recording_times: Vec<DateTime<Utc>> =
            all_recordings.iter().map(|r| r.created_at).collect();
        let completion_times: Vec<DateTime<Utc>> = completion_timestamps(&catalog.lessons);
        let reference_day = now.with_timezone(&self.config.reference_tz).date_naive();
        let streak = streak::compute(
            &recording_times,
            &completion_times,
            self.config.reference_tz,
            reference_day,
        );

        let view_model = DashboardViewModel {
            today,
            card,
            streak,
            analysis: None,
            user,
            experienced_user: self.experienced.is_experienced(),
            loaded_day: reference_day,
        };
        self.commit(generation, view_model).await;

        // The snapshot never waits on the report: the poll runs behind it
        // and patches the analysis in when (and if) it lands.
        self.spawn_analysis_poll(generation, dash.latest_with_report, poll_cancel);
        Ok(())
    }

    /// True when a newer cycle has been issued since `generation` started.
    fn is_superseded(&self, generation: u64) -> bool {
        superseded(&self.issued_generation, generation)
    }

    /// Atomically replaces the snapshot, unless a newer cycle has taken over.
    /// The generation is re-checked under the write lock: a cycle issued
    /// while this one was waiting on the lock still wins.
    async fn commit(&self, generation: u64, view_model: DashboardViewModel) {
        let mut inner = self.inner.write().await;
        if self.is_superseded(generation) {
            return;
        }
        inner.snapshot = Some(view_model);
        inner.phase = ScreenPhase::Ready;
        debug!("Dashboard cycle {} committed", generation);
    }

    /// After a failed cycle: back to Ready if something is on screen,
    /// otherwise back to Idle (the screen has never loaded). Gated on the
    /// generation so a slow-failing old cycle cannot flip the phase under
    /// a newer cycle that is still in flight.
    async fn restore_phase(&self, generation: u64) {
        let mut inner = self.inner.write().await;
        if self.is_superseded(generation) {
            return;
        }
        inner.phase = if inner.snapshot.is_some() {
            ScreenPhase::Ready
        } else {
            ScreenPhase::Idle
        };
    }

    /// The analysis summary is strictly nice-to-have, so the committed
    /// snapshot never blocks on it: the poll runs in its own task and
    /// patches the snapshot when the report arrives. Still processing,
    /// permanently failed, superseded, or plain errors all leave it empty.
    fn spawn_analysis_poll(
        &self,
        generation: u64,
        latest: Option<Recording>,
        cancel: CancellationToken,
    ) {
        let latest = match latest {
            Some(latest) => latest,
            None => return,
        };
        if latest.permanent_failure {
            info!(
                "Recording {} is permanently failed, no report will arrive",
                latest.id
            );
            return;
        }
        let recordings = self.recordings.clone();
        let issued = self.issued_generation.clone();
        let inner = self.inner.clone();
        let interval = self.config.report_poll_interval;
        let max_attempts = self.config.report_poll_max_attempts;
        tokio::spawn(async move {
            let summary = match poll_analysis(
                recordings.as_ref(),
                latest.id,
                interval,
                max_attempts,
                &cancel,
            )
            .await
            {
                Some(summary) => summary,
                None => return,
            };
            let mut inner = inner.write().await;
            if superseded(&issued, generation) {
                return;
            }
            if let Some(vm) = inner.snapshot.as_mut() {
                vm.analysis = Some(summary);
            }
        });
    }
}

fn superseded(issued: &AtomicU64, generation: u64) -> bool {
    let latest = issued.load(Ordering::SeqCst);
    if generation < latest {
        debug!(
            "Dashboard cycle {} superseded by {}, discarding",
            generation, latest
        );
        true
    } else {
        false
    }
}

/// All completion timestamps in the catalog, for the streak's lesson stream.
fn completion_timestamps(lessons: &[LessonWithProgress]) -> Vec<DateTime<Utc>> {
    lessons
        .iter()
        .filter_map(|entry| match &entry.progress {
            Some(p) if p.status == ProgressStatus::Completed => p.completed_at,
            _ => None,
        })
        .collect()
}

/// Polls for one recording's analysis on a fixed interval with a bounded
/// attempt budget. Exhausting the budget means "taking longer than
/// expected": give up rather than retry forever. Cancellation (a newer
/// dashboard cycle) stops the poll between attempts.
pub async fn poll_analysis(
    recordings: &dyn RecordingService,
    recording_id: Uuid,
    interval: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Option<AnalysisSummary> {
    for attempt in 1..=max_attempts {
        match recordings.get_analysis(recording_id).await {
            Ok(summary) => return Some(summary),
            Err(PortError::Processing(_)) => {
                if attempt == max_attempts {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Analysis poll for {} cancelled", recording_id);
                        return None;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(e) => {
                warn!("Analysis fetch for {} failed: {}", recording_id, e);
                return None;
            }
        }
    }
    warn!(
        "Analysis for {} still processing after {} attempts, giving up",
        recording_id, max_attempts
    );
    None
}
