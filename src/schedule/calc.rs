//! Pure next-run time math.
//!
//! No I/O here: everything is a function of the schedule configuration and a
//! supplied "now", which keeps the weekday/timezone arithmetic independently
//! testable.

use super::Frequency;
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Outcome of computing a schedule's next run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextRun {
    /// Next valid instant, strictly after the supplied "now".
    At(DateTime<Utc>),
    /// The computed instant would exceed the schedule's end bound; the
    /// caller should disable the schedule.
    PastEndBound,
}

/// Compute the next run strictly after `now`.
///
/// The candidate is today's occurrence of `time_of_day` in the schedule's
/// timezone, advanced to the next occurrence of `day_of_week`. A candidate
/// that is not strictly in the future moves out a full week; biweekly
/// schedules move out one additional week.
pub fn next_run(
    frequency: Frequency,
    day_of_week: u8,
    time_of_day: NaiveTime,
    tz: Tz,
    ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> NextRun {
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();
    let today_dow = local_now.weekday().num_days_from_sunday() as i64;

    let mut offset = (i64::from(day_of_week) - today_dow).rem_euclid(7);
    if offset == 0 && resolve_local(tz, today, time_of_day) <= now {
        offset = 7;
    }
    if frequency == Frequency::Biweekly {
        offset += 7;
    }

    let candidate = resolve_local(tz, today + Duration::days(offset), time_of_day);
    match ends_at {
        Some(end) if candidate > end => NextRun::PastEndBound,
        _ => NextRun::At(candidate),
    }
}

/// Map a local wall-clock time to a UTC instant. Times swallowed by a DST
/// spring-forward gap resolve to the first valid hour after the gap;
/// ambiguous fall-back times resolve to the earlier instant.
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut naive = date.and_time(time);
    for _ in 0..3 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _) => return earlier.with_timezone(&Utc),
            LocalResult::None => naive = naive + Duration::hours(1),
        }
    }
    // DST gaps are at most two hours, so this is unreachable in practice
    Utc.from_utc_datetime(&naive)
}
