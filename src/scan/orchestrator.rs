//! Scan orchestration: engine invocation, metric derivation, persistence,
//! best-effort report delivery.

use super::{ScanEngine, ScanResult};
use crate::notify::NotificationSender;
use crate::schedule::MonitoredSchedule;
use crate::storage::{results, Pool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    /// The engine call exceeded its deadline. A hung headless browser must
    /// not consume the rest of the batch budget.
    #[error("scan timed out after {0:?}")]
    Timeout(Duration),
    #[error("scan engine failed: {0}")]
    Engine(#[source] anyhow::Error),
    #[error("failed to persist scan result: {0}")]
    Store(#[source] anyhow::Error),
}

/// A persisted scan result together with the prior result it was compared
/// against, for downstream regression classification.
#[derive(Debug)]
pub struct ExecutedScan {
    pub result: ScanResult,
    pub previous: Option<ScanResult>,
}

pub struct ScanOrchestrator {
    pool: Pool,
    engine: Arc<dyn ScanEngine>,
    sender: Arc<dyn NotificationSender>,
    scan_timeout: Duration,
}

impl ScanOrchestrator {
    pub fn new(
        pool: Pool,
        engine: Arc<dyn ScanEngine>,
        sender: Arc<dyn NotificationSender>,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            engine,
            sender,
            scan_timeout,
        }
    }

    /// Run one scan for a schedule: invoke the engine under a deadline,
    /// derive compliance metrics, persist the result linked to its
    /// predecessor, then deliver the report best-effort.
    pub async fn execute(&self, schedule: &MonitoredSchedule) -> Result<ExecutedScan, ScanError> {
        let outcome = tokio::time::timeout(self.scan_timeout, self.engine.scan(&schedule.url))
            .await
            .map_err(|_| ScanError::Timeout(self.scan_timeout))?
            .map_err(ScanError::Engine)?;

        let previous = results::latest_result(&self.pool, schedule.id).map_err(ScanError::Store)?;
        let result = ScanResult::from_outcome(schedule.id, &outcome, previous.as_ref());
        results::insert_result(&self.pool, &result).map_err(ScanError::Store)?;

        info!(
            schedule_id = %schedule.id,
            url = %schedule.url,
            score = result.score,
            issues = result.issue_count,
            aa = result.aa_compliance,
            "Scan complete"
        );

        self.deliver_report(schedule, &result).await;

        Ok(ExecutedScan { result, previous })
    }

    /// Report delivery is a side effect: failures are logged, never fatal.
    async fn deliver_report(&self, schedule: &MonitoredSchedule, result: &ScanResult) {
        if schedule.recipients.is_empty() {
            return;
        }
        let subject = format!("Accessibility scan report: {}", schedule.url);
        let body = render_report(schedule, result);
        match self
            .sender
            .send(&schedule.recipients, &subject, &body)
            .await
        {
            Ok(delivery_id) => {
                info!(schedule_id = %schedule.id, %delivery_id, "Scan report delivered");
            }
            Err(e) => {
                warn!(schedule_id = %schedule.id, "Report delivery failed: {e:#}");
            }
        }
    }
}

fn render_report(schedule: &MonitoredSchedule, result: &ScanResult) -> String {
    let delta = match result.score_delta {
        Some(d) => format!("{d:+.0} vs previous scan"),
        None => "first scan".to_string(),
    };
    format!(
        "Scan of {url}\n\
         Score: {score:.0}/100 ({delta})\n\
         Issues: {issues} (critical {critical}, serious {serious}, moderate {moderate}, minor {minor})\n\
         WCAG AA compliance: {aa:.0}%  AAA: {aaa:.0}%\n",
        url = schedule.url,
        score = result.score,
        issues = result.issue_count,
        critical = result.critical_count,
        serious = result.serious_count,
        moderate = result.moderate_count,
        minor = result.minor_count,
        aa = result.aa_compliance,
        aaa = result.aaa_compliance,
    )
}
