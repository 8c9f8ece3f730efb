//! Scan result persistence and history queries.

use super::schedules::{parse_ts, ts};
use super::Pool;
use crate::scan::ScanResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const RESULT_COLUMNS: &str = "id, schedule_id, score, issue_count, critical_count, serious_count, \
     moderate_count, minor_count, aa_compliance, aaa_compliance, \
     performance_score, previous_id, score_delta, created_at";

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ScanResult> {
    let conv = |idx, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e)
    };
    let id: String = row.get(0)?;
    let schedule_id: String = row.get(1)?;
    let previous_id: Option<String> = row.get(11)?;
    let created_at: String = row.get(13)?;
    Ok(ScanResult {
        id: Uuid::parse_str(&id).map_err(|e| conv(0, Box::new(e)))?,
        schedule_id: Uuid::parse_str(&schedule_id).map_err(|e| conv(1, Box::new(e)))?,
        score: row.get(2)?,
        issue_count: row.get::<_, i64>(3)? as u32,
        critical_count: row.get::<_, i64>(4)? as u32,
        serious_count: row.get::<_, i64>(5)? as u32,
        moderate_count: row.get::<_, i64>(6)? as u32,
        minor_count: row.get::<_, i64>(7)? as u32,
        aa_compliance: row.get(8)?,
        aaa_compliance: row.get(9)?,
        performance_score: row.get(10)?,
        previous_id: previous_id
            .map(|s| Uuid::parse_str(&s).map_err(|e| conv(11, Box::new(e))))
            .transpose()?,
        score_delta: row.get(12)?,
        created_at: parse_ts(&created_at).map_err(|e| conv(13, Box::new(e)))?,
    })
}

/// Persist one immutable scan result.
pub fn insert_result(pool: &Pool, result: &ScanResult) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO scan_results (
            id, schedule_id, score, issue_count, critical_count, serious_count,
            moderate_count, minor_count, aa_compliance, aaa_compliance,
            performance_score, previous_id, score_delta, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            result.id.to_string(),
            result.schedule_id.to_string(),
            result.score,
            i64::from(result.issue_count),
            i64::from(result.critical_count),
            i64::from(result.serious_count),
            i64::from(result.moderate_count),
            i64::from(result.minor_count),
            result.aa_compliance,
            result.aaa_compliance,
            result.performance_score,
            result.previous_id.map(|id| id.to_string()),
            result.score_delta,
            ts(result.created_at),
        ],
    )
    .context("Failed to insert scan result")?;
    Ok(())
}

/// Most recent result for a schedule, if any.
pub fn latest_result(pool: &Pool, schedule_id: Uuid) -> Result<Option<ScanResult>> {
    let conn = pool.get()?;
    let result = conn
        .query_row(
            &format!(
                "SELECT {RESULT_COLUMNS} FROM scan_results
                 WHERE schedule_id = ?1
                 ORDER BY created_at DESC
                 LIMIT 1"
            ),
            params![schedule_id.to_string()],
            result_from_row,
        )
        .optional()?;
    Ok(result)
}

/// Time-bounded result series for one schedule, oldest first. This is the
/// input shape the trend analyzer expects.
pub fn result_series(
    pool: &Pool,
    schedule_id: Uuid,
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ScanResult>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESULT_COLUMNS} FROM scan_results
         WHERE schedule_id = ?1 AND created_at >= ?2
         ORDER BY created_at ASC
         LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![schedule_id.to_string(), ts(since), limit as i64],
        result_from_row,
    )?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Mean score per schedule over a window, for best/worst-performer ranking.
pub fn mean_scores_by_schedule(
    pool: &Pool,
    since: DateTime<Utc>,
) -> Result<Vec<(Uuid, f64)>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT schedule_id, AVG(score) FROM scan_results
         WHERE created_at >= ?1
         GROUP BY schedule_id",
    )?;
    let rows = stmt.query_map(params![ts(since)], |row| {
        let id: String = row.get(0)?;
        let mean: f64 = row.get(1)?;
        Ok((id, mean))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (id, mean) = r?;
        let id = Uuid::parse_str(&id).context("corrupt schedule id in scan_results")?;
        out.push((id, mean));
    }
    Ok(out)
}
