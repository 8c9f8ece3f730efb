//! Run records: the idempotency claim and its terminal transitions.

use super::schedules::{parse_ts, ts};
use super::Pool;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, ErrorCode};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error messages recorded on a failed run are truncated to this length.
pub const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Error)]
#[error("unknown run status '{0}'")]
pub struct InvalidRunStatus(String);

/// Lifecycle of one claimed run window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = InvalidRunStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "skipped" => Ok(RunStatus::Skipped),
            other => Err(InvalidRunStatus(other.to_string())),
        }
    }
}

/// One execution attempt for a schedule's run window.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub window_key: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of attempting to claim a run window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This invocation owns the window and must run the scan.
    Claimed(Uuid),
    /// Another invocation already claimed or completed the window.
    AlreadyClaimed,
}

/// Claim a run window by inserting a `running` record.
///
/// The unique (schedule_id, window_key) index is the only synchronization
/// primitive in the system: losing the insert race is a normal skip, not an
/// error.
pub fn claim_run(pool: &Pool, schedule_id: Uuid, window_key: &str) -> Result<ClaimOutcome> {
    let conn = pool.get()?;
    let run_id = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO run_records (id, schedule_id, window_key, status, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id.to_string(),
            schedule_id.to_string(),
            window_key,
            RunStatus::Running.to_string(),
            ts(Utc::now()),
        ],
    );

    match inserted {
        Ok(_) => Ok(ClaimOutcome::Claimed(run_id)),
        // Only the unique (schedule_id, window_key) violation means a lost
        // race; other constraint failures are genuine errors.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Ok(ClaimOutcome::AlreadyClaimed)
        }
        Err(e) => Err(e).context("Failed to claim run window"),
    }
}

/// Terminal transition for a claimed run. Error text is truncated so a
/// pathological upstream message cannot bloat the store.
pub fn finalize_run(
    pool: &Pool,
    run_id: Uuid,
    status: RunStatus,
    error: Option<&str>,
    score: Option<f64>,
) -> Result<()> {
    let conn = pool.get()?;
    let error = error.map(truncate_error);
    conn.execute(
        "UPDATE run_records
         SET status = ?2, error = ?3, score = ?4, finished_at = ?5
         WHERE id = ?1 AND status = ?6",
        params![
            run_id.to_string(),
            status.to_string(),
            error,
            score,
            ts(Utc::now()),
            RunStatus::Running.to_string(),
        ],
    )
    .context("Failed to finalize run record")?;
    Ok(())
}

fn truncate_error(msg: &str) -> String {
    if msg.len() <= MAX_ERROR_LEN {
        return msg.to_string();
    }
    let mut cut = MAX_ERROR_LEN;
    while !msg.is_char_boundary(cut) {
        cut -= 1;
    }
    msg[..cut].to_string()
}

/// Run history for one schedule, newest first.
pub fn list_runs(pool: &Pool, schedule_id: Uuid, limit: usize) -> Result<Vec<RunRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, schedule_id, window_key, status, error, score, started_at, finished_at
         FROM run_records
         WHERE schedule_id = ?1
         ORDER BY started_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![schedule_id.to_string(), limit as i64], |row| {
        let id: String = row.get(0)?;
        let sid: String = row.get(1)?;
        let status: String = row.get(3)?;
        let started_at: String = row.get(6)?;
        let finished_at: Option<String> = row.get(7)?;
        let conv = |idx, e: Box<dyn std::error::Error + Send + Sync>| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e)
        };
        Ok(RunRecord {
            id: Uuid::parse_str(&id).map_err(|e| conv(0, Box::new(e)))?,
            schedule_id: Uuid::parse_str(&sid).map_err(|e| conv(1, Box::new(e)))?,
            window_key: row.get(2)?,
            status: status
                .parse::<RunStatus>()
                .map_err(|e| conv(3, Box::new(e)))?,
            error: row.get(4)?,
            score: row.get(5)?,
            started_at: parse_ts(&started_at).map_err(|e| conv(6, Box::new(e)))?,
            finished_at: finished_at
                .map(|s| parse_ts(&s).map_err(|e| conv(7, Box::new(e))))
                .transpose()?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
