//! Schedule persistence: CRUD, due-work selection, run-state advancement.

use super::Pool;
use crate::schedule::{Frequency, MonitoredSchedule, ScheduleError};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

/// Uniform timestamp rendering so stored strings compare lexicographically.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn conv<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

const SCHEDULE_COLUMNS: &str = "id, url, frequency, day_of_week, time_of_day, timezone, \
     starts_at, ends_at, score_threshold, recipients_json, enabled, \
     last_run_at, next_run_at, consecutive_failures";

/// Map a row selected with [`SCHEDULE_COLUMNS`]. Stored enum strings are
/// validated here, at the store boundary; a corrupt row surfaces as a
/// conversion error rather than leaking raw strings into the domain.
fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredSchedule> {
    let id: String = row.get(0)?;
    let frequency: String = row.get(2)?;
    let time_of_day: String = row.get(4)?;
    let timezone: String = row.get(5)?;
    let starts_at: Option<String> = row.get(6)?;
    let ends_at: Option<String> = row.get(7)?;
    let recipients_json: String = row.get(9)?;
    let last_run_at: Option<String> = row.get(11)?;
    let next_run_at: Option<String> = row.get(12)?;

    let parse_opt_ts = |idx: usize, v: Option<String>| {
        v.map(|s| parse_ts(&s).map_err(|e| conv(idx, e))).transpose()
    };

    Ok(MonitoredSchedule {
        id: Uuid::parse_str(&id).map_err(|e| conv(0, e))?,
        url: row.get(1)?,
        frequency: frequency
            .parse::<Frequency>()
            .map_err(|e| conv(2, e))?,
        day_of_week: row.get::<_, i64>(3)? as u8,
        time_of_day: NaiveTime::parse_from_str(&time_of_day, "%H:%M")
            .map_err(|e| conv(4, e))?,
        timezone: timezone
            .parse::<Tz>()
            .map_err(|_| conv(5, ScheduleError::InvalidTimezone(timezone.clone())))?,
        starts_at: parse_opt_ts(6, starts_at)?,
        ends_at: parse_opt_ts(7, ends_at)?,
        score_threshold: row.get(8)?,
        recipients: serde_json::from_str(&recipients_json).map_err(|e| conv(9, e))?,
        enabled: row.get::<_, i64>(10)? != 0,
        last_run_at: parse_opt_ts(11, last_run_at)?,
        next_run_at: parse_opt_ts(12, next_run_at)?,
        consecutive_failures: row.get::<_, i64>(13)? as u32,
    })
}

/// Persist a new schedule.
pub fn insert_schedule(pool: &Pool, schedule: &MonitoredSchedule) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO schedules (
            id, url, frequency, day_of_week, time_of_day, timezone,
            starts_at, ends_at, score_threshold, recipients_json, enabled,
            last_run_at, next_run_at, consecutive_failures
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            schedule.id.to_string(),
            schedule.url,
            schedule.frequency.to_string(),
            i64::from(schedule.day_of_week),
            schedule.time_of_day.format("%H:%M").to_string(),
            schedule.timezone.name(),
            schedule.starts_at.map(ts),
            schedule.ends_at.map(ts),
            schedule.score_threshold,
            serde_json::to_string(&schedule.recipients)?,
            schedule.enabled as i64,
            schedule.last_run_at.map(ts),
            schedule.next_run_at.map(ts),
            i64::from(schedule.consecutive_failures),
        ],
    )
    .context("Failed to insert schedule")?;
    Ok(())
}

/// List all schedules, newest first.
pub fn list_schedules(pool: &Pool) -> Result<Vec<MonitoredSchedule>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], schedule_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Fetch one schedule by id.
pub fn get_schedule(pool: &Pool, id: Uuid) -> Result<Option<MonitoredSchedule>> {
    let conn = pool.get()?;
    let schedule = conn
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
            params![id.to_string()],
            schedule_from_row,
        )
        .optional()?;
    Ok(schedule)
}

/// Due-work selection: enabled schedules whose next run has elapsed and
/// whose end bound (if any) is still in the future, oldest due first,
/// capped at `limit`. Read-only.
pub fn due_schedules(pool: &Pool, now: DateTime<Utc>, limit: usize) -> Result<Vec<MonitoredSchedule>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules
         WHERE enabled = 1
           AND next_run_at IS NOT NULL
           AND next_run_at <= ?1
           AND (ends_at IS NULL OR ends_at > ?1)
         ORDER BY next_run_at ASC
         LIMIT ?2",
    ))?;
    let rows = stmt.query_map(params![ts(now), limit as i64], schedule_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Move a schedule's `next_run_at` forward so the batch never reselects the
/// same due item.
pub fn advance_next_run(pool: &Pool, id: Uuid, next_run_at: DateTime<Utc>) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE schedules SET next_run_at = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), ts(next_run_at), ts(Utc::now())],
    )
    .context("Failed to advance next_run_at")?;
    Ok(())
}

/// Record a successful run: stamp `last_run_at` and reset the failure
/// counter.
pub fn record_success(pool: &Pool, id: Uuid, ran_at: DateTime<Utc>) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE schedules
         SET last_run_at = ?2, consecutive_failures = 0, updated_at = ?3
         WHERE id = ?1",
        params![id.to_string(), ts(ran_at), ts(Utc::now())],
    )
    .context("Failed to record successful run")?;
    Ok(())
}

/// Count one more consecutive failure; clears the enabled flag once the
/// ceiling is reached. Returns (new failure count, still enabled).
pub fn record_failure(pool: &Pool, id: Uuid, ceiling: u32) -> Result<(u32, bool)> {
    let conn = pool.get()?;
    let (failures, enabled): (i64, i64) = conn.query_row(
        "UPDATE schedules
         SET consecutive_failures = consecutive_failures + 1,
             enabled = CASE
                 WHEN consecutive_failures + 1 >= ?2 THEN 0
                 ELSE enabled
             END,
             updated_at = ?3
         WHERE id = ?1
         RETURNING consecutive_failures, enabled",
        params![id.to_string(), i64::from(ceiling), ts(Utc::now())],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((failures as u32, enabled != 0))
}

/// Flip the enabled flag (end-bound expiry, manual disable).
pub fn set_enabled(pool: &Pool, id: Uuid, enabled: bool) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE schedules SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), enabled as i64, ts(Utc::now())],
    )?;
    Ok(())
}

/// Delete a schedule. Returns false when the id is unknown.
pub fn remove_schedule(pool: &Pool, id: Uuid) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "DELETE FROM schedules WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}
