//! The monitoring batch driver.
//!
//! Each externally-triggered invocation processes one bounded batch of due
//! schedules sequentially: claim the run window, scan, classify, alert,
//! advance. Failures are isolated per item; a schedule that keeps failing
//! is disabled at the backoff ceiling rather than retried forever.

use crate::alerts::AlertEngine;
use crate::notify::NotificationSender;
use crate::regress;
use crate::scan::orchestrator::{ExecutedScan, ScanOrchestrator};
use crate::scan::{ScanEngine, ScanResult};
use crate::schedule::calc::NextRun;
use crate::schedule::{window, MonitoredSchedule};
use crate::storage::runs::{claim_run, finalize_run, ClaimOutcome, RunStatus};
use crate::storage::schedules::{
    advance_next_run, due_schedules, get_schedule, record_failure, record_success, set_enabled,
};
use crate::storage::Pool;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Consecutive failures after which a schedule is auto-disabled.
pub const FAILURE_CEILING: u32 = 5;
/// Default cap on due items per invocation.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default wall-clock budget per invocation.
pub const DEFAULT_BATCH_BUDGET: Duration = Duration::from_secs(300);
/// Default deadline for a single scan engine call.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Terminal state of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Skipped,
    Failed,
}

/// Per-item entry in a batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub schedule_id: Uuid,
    pub window_key: String,
    pub status: ItemStatus,
    pub score: Option<f64>,
    pub alerts_created: usize,
    pub error: Option<String>,
}

/// What one trigger invocation did.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub results: Vec<ItemReport>,
}

/// Result of a manual, out-of-schedule scan.
#[derive(Debug, Serialize)]
pub struct ManualScanReport {
    pub result: ScanResult,
    pub alerts_created: usize,
}

/// Tunables for the batch driver.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub batch_size: usize,
    pub batch_budget: Duration,
    pub scan_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_budget: DEFAULT_BATCH_BUDGET,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

pub struct MonitorRunner {
    pool: Pool,
    orchestrator: ScanOrchestrator,
    alerts: AlertEngine,
    options: RunnerOptions,
}

impl MonitorRunner {
    pub fn new(
        pool: Pool,
        engine: Arc<dyn ScanEngine>,
        sender: Arc<dyn NotificationSender>,
        options: RunnerOptions,
    ) -> Self {
        let orchestrator =
            ScanOrchestrator::new(pool.clone(), engine, sender, options.scan_timeout);
        let alerts = AlertEngine::new(pool.clone());
        Self {
            pool,
            orchestrator,
            alerts,
            options,
        }
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Process one bounded batch of due schedules, oldest due first.
    /// One failing schedule never prevents processing of the others.
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        let started = Instant::now();
        let due = due_schedules(&self.pool, Utc::now(), self.options.batch_size)?;
        info!(due = due.len(), "Processing due schedules");

        let mut results = Vec::new();
        for schedule in &due {
            if started.elapsed() >= self.options.batch_budget {
                warn!(
                    processed = results.len(),
                    deferred = due.len() - results.len(),
                    "Batch budget exhausted; remaining items wait for the next trigger"
                );
                break;
            }
            results.push(self.process_item(schedule).await);
        }

        Ok(BatchSummary {
            processed: results.len(),
            results,
        })
    }

    /// Process one due schedule end to end. Never returns an error: every
    /// outcome, including persistence failures, becomes an item report so
    /// the rest of the batch continues.
    async fn process_item(&self, schedule: &MonitoredSchedule) -> ItemReport {
        // Due selection guarantees a next_run_at; a missing one is a
        // corrupt row and counts as a failed item.
        let Some(claimed_slot) = schedule.next_run_at else {
            error!(schedule_id = %schedule.id, "Due schedule has no next_run_at");
            return ItemReport {
                schedule_id: schedule.id,
                window_key: String::new(),
                status: ItemStatus::Failed,
                score: None,
                alerts_created: 0,
                error: Some("schedule has no next_run_at".into()),
            };
        };
        let window_key = window::window_key(schedule.id, claimed_slot, schedule.timezone);

        let run_id = match claim_run(&self.pool, schedule.id, &window_key) {
            Ok(ClaimOutcome::Claimed(run_id)) => run_id,
            Ok(ClaimOutcome::AlreadyClaimed) => {
                // Another invocation owns this window. Still advance, so
                // the selector does not reoffer the same slot forever.
                info!(schedule_id = %schedule.id, %window_key, "Window already claimed; skipping");
                self.advance(schedule);
                return ItemReport {
                    schedule_id: schedule.id,
                    window_key,
                    status: ItemStatus::Skipped,
                    score: None,
                    alerts_created: 0,
                    error: None,
                };
            }
            Err(e) => {
                error!(schedule_id = %schedule.id, "Failed to claim run window: {e:#}");
                return ItemReport {
                    schedule_id: schedule.id,
                    window_key,
                    status: ItemStatus::Failed,
                    score: None,
                    alerts_created: 0,
                    error: Some(format!("{e:#}")),
                };
            }
        };

        let report = match self.attempt(schedule).await {
            Ok((executed, alerts_created)) => {
                let score = executed.result.score;
                self.finalize(run_id, RunStatus::Success, None, Some(score));
                if let Err(e) = record_success(&self.pool, schedule.id, Utc::now()) {
                    error!(schedule_id = %schedule.id, "Failed to record success: {e:#}");
                }
                ItemReport {
                    schedule_id: schedule.id,
                    window_key,
                    status: ItemStatus::Completed,
                    score: Some(score),
                    alerts_created,
                    error: None,
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(schedule_id = %schedule.id, url = %schedule.url, "Scan failed: {message}");
                self.finalize(run_id, RunStatus::Failed, Some(&message), None);
                let alerts_created = self.record_scan_failure(schedule, &message);
                ItemReport {
                    schedule_id: schedule.id,
                    window_key,
                    status: ItemStatus::Failed,
                    score: None,
                    alerts_created,
                    error: Some(message),
                }
            }
        };

        // Success or failure, the slot moves forward.
        self.advance(schedule);
        report
    }

    /// The fallible middle of an item: scan, classify, persist alerts.
    async fn attempt(&self, schedule: &MonitoredSchedule) -> Result<(ExecutedScan, usize)> {
        let executed = self.orchestrator.execute(schedule).await?;
        let candidates = regress::classify(&executed.result, executed.previous.as_ref());
        let created = self.alerts.record_candidates(schedule.id, &candidates)?;
        Ok((executed, created.len()))
    }

    fn finalize(&self, run_id: Uuid, status: RunStatus, error: Option<&str>, score: Option<f64>) {
        if let Err(e) = finalize_run(&self.pool, run_id, status, error, score) {
            error!(run_id = %run_id, "Failed to finalize run record: {e:#}");
        }
    }

    /// Count the failure toward backoff and raise a scan-failed alert.
    fn record_scan_failure(&self, schedule: &MonitoredSchedule, message: &str) -> usize {
        match record_failure(&self.pool, schedule.id, FAILURE_CEILING) {
            Ok((failures, still_enabled)) => {
                if !still_enabled {
                    warn!(
                        schedule_id = %schedule.id,
                        url = %schedule.url,
                        failures,
                        "Schedule disabled after reaching the failure ceiling"
                    );
                }
            }
            Err(e) => error!(schedule_id = %schedule.id, "Failed to count failure: {e:#}"),
        }

        let candidate = regress::scan_failed_candidate(&schedule.url, message);
        match self.alerts.record_candidates(schedule.id, &[candidate]) {
            Ok(created) => created.len(),
            Err(e) => {
                error!(schedule_id = %schedule.id, "Failed to record scan-failed alert: {e:#}");
                0
            }
        }
    }

    /// Advance `next_run_at`, or disable the schedule once past its end
    /// bound.
    fn advance(&self, schedule: &MonitoredSchedule) {
        match schedule.next_run_after(Utc::now()) {
            NextRun::At(next) => {
                if let Err(e) = advance_next_run(&self.pool, schedule.id, next) {
                    error!(schedule_id = %schedule.id, "Failed to advance next_run_at: {e:#}");
                }
            }
            NextRun::PastEndBound => {
                info!(schedule_id = %schedule.id, "End bound reached; disabling schedule");
                if let Err(e) = set_enabled(&self.pool, schedule.id, false) {
                    error!(schedule_id = %schedule.id, "Failed to disable schedule: {e:#}");
                }
            }
        }
    }

    /// Force an immediate out-of-schedule scan for one schedule, reusing
    /// the orchestrator directly. Bypasses due selection and the
    /// idempotency claim; leaves `next_run_at`, run records, and failure
    /// counters untouched. Returns None for an unknown id.
    pub async fn manual_scan(&self, schedule_id: Uuid) -> Result<Option<ManualScanReport>> {
        let Some(schedule) = get_schedule(&self.pool, schedule_id)? else {
            return Ok(None);
        };
        let executed = self.orchestrator.execute(&schedule).await?;
        let candidates = regress::classify(&executed.result, executed.previous.as_ref());
        let created = self.alerts.record_candidates(schedule.id, &candidates)?;
        Ok(Some(ManualScanReport {
            result: executed.result,
            alerts_created: created.len(),
        }))
    }
}
