//! Run-window key derivation.
//!
//! A window key names one scheduled execution slot. Retried or overlapping
//! trigger invocations for the same slot must derive the same key, so the
//! unique (schedule_id, window_key) constraint in the store can guarantee
//! at-most-once execution.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// Derive the canonical window key for a claimed run slot.
///
/// The claimed `next_run_at` is rendered in the schedule's own timezone at
/// minute granularity; the timezone name is appended so a timezone edit
/// cannot silently alias an older slot.
pub fn window_key(schedule_id: Uuid, next_run_at: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{}:{}@{}",
        schedule_id,
        next_run_at.with_timezone(&tz).format("%Y-%m-%dT%H:%M"),
        tz.name()
    )
}
