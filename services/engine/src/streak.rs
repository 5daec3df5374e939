//! services/engine/src/streak.rs
//!
//! The streak calculator: pure functions from two timestamp streams
//! (recordings, lesson completions) to the streak widget's data.
//!
//! All timestamps are normalized to calendar days in the configured
//! reference timezone before any comparison. Device-local midnight is never
//! used; a phone crossing a timezone boundary must not rewrite history.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use parent_coach_core::domain::StreakRecord;

/// Buckets timestamps into distinct reference-timezone calendar days.
/// Duplicate events on the same day collapse to one.
fn day_set(timestamps: &[DateTime<Utc>], tz: Tz) -> BTreeSet<NaiveDate> {
    timestamps
        .iter()
        .map(|ts| ts.with_timezone(&tz).date_naive())
        .collect()
}

/// The Monday of the week containing `day`.
fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Computes the Mon..Sun mask for the week containing `today`.
///
/// Only recordings light up the mask - it visualizes "showed up", not
/// "fully completed", so lesson completions are deliberately ignored here.
pub fn week_mask(recordings: &[DateTime<Utc>], tz: Tz, today: NaiveDate) -> [bool; 7] {
    let monday = week_start(today);
    let mut mask = [false; 7];
    for day in day_set(recordings, tz) {
        let offset = (day - monday).num_days();
        if (0..7).contains(&offset) {
            mask[offset as usize] = true;
        }
    }
    mask
}

/// Computes the consecutive-day streak ending today (or yesterday).
///
/// A day counts only if BOTH a recording and a lesson completion landed on
/// it (per-day logical AND). If the most recent such day is neither today
/// nor yesterday the streak is already broken - there is no grace period.
pub fn current_streak(
    recordings: &[DateTime<Utc>],
    completions: &[DateTime<Utc>],
    tz: Tz,
    today: NaiveDate,
) -> u32 {
    let recording_days = day_set(recordings, tz);
    let completion_days = day_set(completions, tz);
    let both: BTreeSet<NaiveDate> = recording_days
        .intersection(&completion_days)
        .copied()
        .collect();

    let most_recent = match both.iter().next_back() {
        Some(day) => *day,
        None => return 0,
    };
    let yesterday = today - Duration::days(1);
    if most_recent != today && most_recent != yesterday {
        return 0;
    }

    let mut streak = 1;
    let mut cursor = most_recent - Duration::days(1);
    while both.contains(&cursor) {
        streak += 1;
        cursor = cursor - Duration::days(1);
    }
    streak
}

/// Convenience wrapper producing the whole widget payload at once.
pub fn compute(
    recordings: &[DateTime<Utc>],
    completions: &[DateTime<Utc>],
    tz: Tz,
    today: NaiveDate,
) -> StreakRecord {
    StreakRecord {
        current_streak: current_streak(recordings, completions, tz, today),
        week_mask: week_mask(recordings, tz, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    const TZ: Tz = New_York;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        TZ.with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2026-08-24 is a Monday.

    #[test]
    fn gap_in_intersection_stops_the_streak_at_today() {
        // Recordings Mon/Tue/Wed, completions Mon/Wed, today = Wed.
        // Intersection {Mon, Wed} is non-contiguous (Tue missing), so only
        // Wednesday counts: Monday is unreachable without Tuesday.
        let recordings = [at(2026, 8, 24, 9), at(2026, 8, 25, 9), at(2026, 8, 26, 9)];
        let completions = [at(2026, 8, 24, 20), at(2026, 8, 26, 20)];
        let today = date(2026, 8, 26);

        let record = compute(&recordings, &completions, TZ, today);
        assert_eq!(record.current_streak, 1);
        assert_eq!(
            record.week_mask,
            [true, true, true, false, false, false, false]
        );
    }

    #[test]
    fn full_match_counts_every_consecutive_day() {
        let recordings = [
            at(2026, 8, 24, 9),
            at(2026, 8, 25, 9),
            at(2026, 8, 26, 9),
            at(2026, 8, 27, 9),
        ];
        let completions = [
            at(2026, 8, 24, 21),
            at(2026, 8, 25, 21),
            at(2026, 8, 26, 21),
            at(2026, 8, 27, 21),
        ];
        assert_eq!(
            current_streak(&recordings, &completions, TZ, date(2026, 8, 27)),
            4
        );
    }

    #[test]
    fn both_streams_required_not_either() {
        // Plenty of recordings but zero completions: streak is trivially 0,
        // even though the week mask still lights up.
        let recordings = [at(2026, 8, 24, 9), at(2026, 8, 25, 9)];
        let record = compute(&recordings, &[], TZ, date(2026, 8, 25));
        assert_eq!(record.current_streak, 0);
        assert_eq!(
            record.week_mask,
            [true, true, false, false, false, false, false]
        );
    }

    #[test]
    fn streak_ending_yesterday_still_counts() {
        let recordings = [at(2026, 8, 24, 9), at(2026, 8, 25, 9)];
        let completions = [at(2026, 8, 24, 20), at(2026, 8, 25, 20)];
        assert_eq!(
            current_streak(&recordings, &completions, TZ, date(2026, 8, 26)),
            2
        );
    }

    #[test]
    fn streak_ending_two_days_ago_is_broken() {
        let recordings = [at(2026, 8, 24, 9)];
        let completions = [at(2026, 8, 24, 20)];
        assert_eq!(
            current_streak(&recordings, &completions, TZ, date(2026, 8, 26)),
            0
        );
    }

    #[test]
    fn duplicate_recordings_on_one_day_count_once() {
        let recordings = [at(2026, 8, 26, 9), at(2026, 8, 26, 11), at(2026, 8, 26, 15)];
        let completions = [at(2026, 8, 26, 20)];
        assert_eq!(
            current_streak(&recordings, &completions, TZ, date(2026, 8, 26)),
            1
        );
    }

    #[test]
    fn days_bucket_in_reference_timezone_not_utc() {
        // 03:30 UTC on Aug 27 is still the evening of Aug 26 in New York.
        let late_evening = Utc.with_ymd_and_hms(2026, 8, 27, 3, 30, 0).unwrap();
        let completions = [at(2026, 8, 26, 12)];
        assert_eq!(
            current_streak(&[late_evening], &completions, TZ, date(2026, 8, 26)),
            1
        );

        let mask = week_mask(&[late_evening], TZ, date(2026, 8, 26));
        assert_eq!(mask, [false, false, true, false, false, false, false]);
    }

    #[test]
    fn recordings_from_other_weeks_never_reach_the_mask() {
        let recordings = [at(2026, 8, 21, 9), at(2026, 8, 31, 9)];
        let mask = week_mask(&recordings, TZ, date(2026, 8, 26));
        assert_eq!(mask, [false; 7]);
    }
}
