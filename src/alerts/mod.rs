//! Alert types and the deduplicating alert engine.

use crate::regress::AlertCandidate;
use crate::storage::schedules::{parse_ts, ts};
use crate::storage::Pool;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A second event of the same (type, schedule) within this window is
/// suppressed as a duplicate.
pub const DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum AlertParseError {
    #[error("unknown alert type '{0}'")]
    Type(String),
    #[error("unknown alert severity '{0}'")]
    Severity(String),
}

/// What kind of regression or failure an alert describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ScoreDrop,
    NewViolations,
    ComplianceBreach,
    PerformanceImpact,
    ScanFailed,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::ScoreDrop => write!(f, "score_drop"),
            AlertType::NewViolations => write!(f, "new_violations"),
            AlertType::ComplianceBreach => write!(f, "compliance_breach"),
            AlertType::PerformanceImpact => write!(f, "performance_impact"),
            AlertType::ScanFailed => write!(f, "scan_failed"),
        }
    }
}

impl FromStr for AlertType {
    type Err = AlertParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score_drop" => Ok(AlertType::ScoreDrop),
            "new_violations" => Ok(AlertType::NewViolations),
            "compliance_breach" => Ok(AlertType::ComplianceBreach),
            "performance_impact" => Ok(AlertType::PerformanceImpact),
            "scan_failed" => Ok(AlertType::ScanFailed),
            other => Err(AlertParseError::Type(other.to_string())),
        }
    }
}

/// Four-tier alert severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = AlertParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(AlertParseError::Severity(other.to_string())),
        }
    }
}

/// A persisted alert. Never deleted; resolution is an explicit action.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub current_value: Option<f64>,
    pub previous_value: Option<f64>,
    pub threshold: Option<f64>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let conv = |idx, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e)
    };
    let id: String = row.get(0)?;
    let schedule_id: String = row.get(1)?;
    let alert_type: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let resolved_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Alert {
        id: Uuid::parse_str(&id).map_err(|e| conv(0, Box::new(e)))?,
        schedule_id: Uuid::parse_str(&schedule_id).map_err(|e| conv(1, Box::new(e)))?,
        alert_type: alert_type
            .parse::<AlertType>()
            .map_err(|e| conv(2, Box::new(e)))?,
        severity: severity
            .parse::<Severity>()
            .map_err(|e| conv(3, Box::new(e)))?,
        message: row.get(4)?,
        current_value: row.get(5)?,
        previous_value: row.get(6)?,
        threshold: row.get(7)?,
        resolved: row.get::<_, i64>(8)? != 0,
        resolved_at: resolved_at
            .map(|s| parse_ts(&s).map_err(|e| conv(9, Box::new(e))))
            .transpose()?,
        created_at: parse_ts(&created_at).map_err(|e| conv(10, Box::new(e)))?,
    })
}

const ALERT_COLUMNS: &str = "id, schedule_id, alert_type, severity, message, current_value, \
     previous_value, threshold, resolved, resolved_at, created_at";

/// Persists classified events as alerts, suppressing duplicates.
#[derive(Clone)]
pub struct AlertEngine {
    pool: Pool,
}

impl AlertEngine {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Persist each candidate unless an unresolved alert of the same
    /// (type, schedule) already exists inside the dedup window. Returns
    /// the ids of alerts actually created.
    pub fn record_candidates(
        &self,
        schedule_id: Uuid,
        candidates: &[AlertCandidate],
    ) -> Result<Vec<Uuid>> {
        let mut created = Vec::new();
        for candidate in candidates {
            if self.has_recent_unresolved(schedule_id, candidate.alert_type)? {
                tracing::debug!(
                    schedule_id = %schedule_id,
                    alert_type = %candidate.alert_type,
                    "Duplicate alert suppressed"
                );
                continue;
            }
            created.push(self.persist(schedule_id, candidate)?);
        }
        Ok(created)
    }

    fn has_recent_unresolved(&self, schedule_id: Uuid, alert_type: AlertType) -> Result<bool> {
        let conn = self.pool.get()?;
        let cutoff = Utc::now() - Duration::hours(DEDUP_WINDOW_HOURS);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts
             WHERE schedule_id = ?1 AND alert_type = ?2
               AND resolved = 0 AND created_at > ?3",
            params![schedule_id.to_string(), alert_type.to_string(), ts(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn persist(&self, schedule_id: Uuid, candidate: &AlertCandidate) -> Result<Uuid> {
        let conn = self.pool.get()?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO alerts (
                id, schedule_id, alert_type, severity, message,
                current_value, previous_value, threshold, resolved, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            params![
                id.to_string(),
                schedule_id.to_string(),
                candidate.alert_type.to_string(),
                candidate.severity.to_string(),
                candidate.message,
                candidate.current,
                candidate.previous,
                candidate.threshold,
                ts(Utc::now()),
            ],
        )
        .context("Failed to insert alert")?;
        tracing::warn!(
            schedule_id = %schedule_id,
            alert_type = %candidate.alert_type,
            severity = %candidate.severity,
            "{}", candidate.message
        );
        Ok(id)
    }

    /// List alerts, newest first.
    pub fn list(&self, unresolved_only: bool, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.pool.get()?;
        let sql = if unresolved_only {
            format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE resolved = 0
                 ORDER BY created_at DESC LIMIT ?1"
            )
        } else {
            format!("SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC LIMIT ?1")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], alert_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Explicitly resolve an alert. Returns false for unknown or
    /// already-resolved ids.
    pub fn resolve(&self, id: Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE alerts SET resolved = 1, resolved_at = ?2
             WHERE id = ?1 AND resolved = 0",
            params![id.to_string(), ts(Utc::now())],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testutil::{seeded_schedule, temp_pool};

    fn candidate(alert_type: AlertType, severity: Severity) -> AlertCandidate {
        AlertCandidate {
            alert_type,
            severity,
            message: format!("{alert_type} detected"),
            current: Some(55.0),
            previous: Some(90.0),
            threshold: Some(30.0),
        }
    }

    #[test]
    fn test_duplicate_within_window_suppressed() {
        let (_dir, pool) = temp_pool();
        let schedule_id = seeded_schedule(&pool).id;
        let engine = AlertEngine::new(pool);
        let c = candidate(AlertType::ScoreDrop, Severity::Critical);

        let first = engine.record_candidates(schedule_id, &[c.clone()]).unwrap();
        assert_eq!(first.len(), 1);

        let second = engine.record_candidates(schedule_id, &[c]).unwrap();
        assert!(second.is_empty());

        assert_eq!(engine.list(false, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_distinct_types_both_persist() {
        let (_dir, pool) = temp_pool();
        let schedule_id = seeded_schedule(&pool).id;
        let engine = AlertEngine::new(pool);
        let created = engine
            .record_candidates(
                schedule_id,
                &[
                    candidate(AlertType::ScoreDrop, Severity::High),
                    candidate(AlertType::ComplianceBreach, Severity::Critical),
                ],
            )
            .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn test_distinct_schedules_not_deduplicated() {
        let (_dir, pool) = temp_pool();
        let first = seeded_schedule(&pool).id;
        let second = seeded_schedule(&pool).id;
        let engine = AlertEngine::new(pool);
        let c = candidate(AlertType::ScoreDrop, Severity::High);
        engine.record_candidates(first, &[c.clone()]).unwrap();
        let created = engine.record_candidates(second, &[c]).unwrap();
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn test_resolution_reopens_dedup_window() {
        let (_dir, pool) = temp_pool();
        let schedule_id = seeded_schedule(&pool).id;
        let engine = AlertEngine::new(pool);
        let c = candidate(AlertType::NewViolations, Severity::Medium);

        let first = engine.record_candidates(schedule_id, &[c.clone()]).unwrap();
        assert!(engine.resolve(first[0]).unwrap());
        // Resolving twice is a no-op
        assert!(!engine.resolve(first[0]).unwrap());

        // Dedup only consults unresolved alerts
        let second = engine.record_candidates(schedule_id, &[c]).unwrap();
        assert_eq!(second.len(), 1);

        assert_eq!(engine.list(true, 10).unwrap().len(), 1);
        assert_eq!(engine.list(false, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_round_trip_preserves_context() {
        let (_dir, pool) = temp_pool();
        let schedule_id = seeded_schedule(&pool).id;
        let engine = AlertEngine::new(pool);
        engine
            .record_candidates(schedule_id, &[candidate(AlertType::ScoreDrop, Severity::Critical)])
            .unwrap();
        let alert = &engine.list(false, 1).unwrap()[0];
        assert_eq!(alert.alert_type, AlertType::ScoreDrop);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.current_value, Some(55.0));
        assert_eq!(alert.previous_value, Some(90.0));
        assert!(!alert.resolved);
    }
}
