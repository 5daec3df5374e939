//! crates/parent_coach_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Remote entities are owned by the backend; the client only ever holds
//! read-only copies of them. Serde derives exist because lesson content is
//! snapshotted into the local key-value store as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Recording-side Entities
//=========================================================================================

/// Server-side lifecycle of an audio-session analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A single audio-session recording. Immutable once created except for
/// server-side status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub analysis_status: AnalysisStatus,
    /// True when the server has given up on analysing this recording.
    /// A permanently failed recording will never produce a report.
    pub permanent_failure: bool,
}

/// The AI-generated report for one recording: score plus coaching copy.
/// Fields stay `None` while the analysis is still being produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub recording_id: Uuid,
    pub score: Option<f32>,
    pub encouragement: Option<String>,
    pub coaching_tip: Option<String>,
}

//=========================================================================================
// Lesson-side Entities
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Per-user progress attached to a lesson. Mutated by the lesson-viewing
/// flow via remote calls; read here to determine today's completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgress {
    pub status: ProgressStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_segment: usize,
}

/// A catalog-level lesson summary (no content body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    /// Position within the curriculum; the catalog is served in this order.
    pub order: u32,
    pub module_id: Option<Uuid>,
}

/// A lesson together with the caller's progress, as returned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonWithProgress {
    pub lesson: Lesson,
    pub progress: Option<LessonProgress>,
}

/// One readable segment of lesson content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
}

/// The full content payload of a single lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonDetail {
    pub id: Uuid,
    pub title: String,
    pub segments: Vec<Segment>,
    pub quiz: Vec<QuizQuestion>,
}

impl LessonDetail {
    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }
}

/// A curriculum module grouping several lessons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    pub lesson_ids: Vec<Uuid>,
}

/// The lesson-list response: the catalog plus the server's monotonic
/// content version, used for whole-cache invalidation.
#[derive(Debug, Clone)]
pub struct LessonCatalog {
    pub lessons: Vec<LessonWithProgress>,
    pub content_version: u64,
}

/// The fields a client may push when reporting lesson progress.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub current_segment: usize,
    pub time_spent_seconds: u32,
    pub status: Option<ProgressStatus>,
}

//=========================================================================================
// Recording Dashboard
//=========================================================================================

/// The recording service's dashboard payload. `today_recordings` is already
/// filtered to the caller's local calendar day by the server.
#[derive(Debug, Clone)]
pub struct RecordingDashboard {
    pub today_recordings: Vec<Recording>,
    pub this_week_recordings: Vec<Recording>,
    pub latest_with_report: Option<Recording>,
}

//=========================================================================================
// Derived, Ephemeral State
//=========================================================================================

/// The reconciled picture of "what has the user done today". Recomputed on
/// every resolver invocation and never persisted as a unit.
///
/// Invariant: `is_report_read` may only be true while a recording exists
/// today AND the persisted read-marker names exactly the recording that is
/// currently latest. A marker naming any other recording means unread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayState {
    pub lesson_completed_today: bool,
    pub has_recorded_today: bool,
    pub is_report_read: bool,
    pub latest_recording_id: Option<Uuid>,
    pub today_lesson_id: Option<Uuid>,
}

/// The single next action shown on the home screen. Purely a function of
/// `TodayState`; recomputed per render, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Lesson,
    Record,
    ReadReport,
    RecordAgain,
}

impl TodayState {
    /// Maps the three booleans to a card. Priority order, first match wins.
    /// Rows 2 and 4 overlap under naive re-derivations, so the precedence
    /// here is load-bearing.
    pub fn card_state(&self) -> CardState {
        let lesson = self.lesson_completed_today;
        let recorded = self.has_recorded_today;
        let read = self.is_report_read;

        if !lesson && recorded && read {
            // Force a lesson before allowing another recording.
            CardState::Lesson
        } else if recorded && !read {
            CardState::ReadReport
        } else if lesson && recorded && read {
            CardState::RecordAgain
        } else if lesson && !recorded {
            CardState::Record
        } else {
            CardState::Lesson
        }
    }
}

/// Rolling-activity summary for the streak widget.
///
/// A day counts toward the streak only if it has BOTH a recording and a
/// completed lesson; the week mask counts any day with a recording. The
/// asymmetry is deliberate: the mask visualizes "showed up", the streak
/// rewards full completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakRecord {
    pub current_streak: u32,
    /// Monday = index 0 through Sunday = index 6, current week.
    pub week_mask: [bool; 7],
}

//=========================================================================================
// Users
//=========================================================================================

/// Represents a user - used throughout the app.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(lesson: bool, recorded: bool, read: bool) -> TodayState {
        TodayState {
            lesson_completed_today: lesson,
            has_recorded_today: recorded,
            is_report_read: read,
            latest_recording_id: None,
            today_lesson_id: None,
        }
    }

    /// Every combination of the three booleans against the five-rule table.
    /// `read` without `recorded` cannot be produced by the resolver, but the
    /// mapping must still be total; those rows fall through to Lesson.
    #[test]
    fn card_state_matches_decision_table_exhaustively() {
        let expectations = [
            ((false, false, false), CardState::Lesson),
            ((false, false, true), CardState::Lesson),
            ((false, true, false), CardState::ReadReport),
            ((false, true, true), CardState::Lesson),
            ((true, false, false), CardState::Record),
            ((true, false, true), CardState::Record),
            ((true, true, false), CardState::ReadReport),
            ((true, true, true), CardState::RecordAgain),
        ];
        for ((lesson, recorded, read), expected) in expectations {
            assert_eq!(
                state(lesson, recorded, read).card_state(),
                expected,
                "lesson={lesson} recorded={recorded} read={read}"
            );
        }
    }

    #[test]
    fn read_report_wins_over_record_when_both_rows_match() {
        // lesson done + recorded + unread matches both "read report" and a
        // naive "record again"; the table says the report comes first.
        assert_eq!(state(true, true, false).card_state(), CardState::ReadReport);
    }
}
