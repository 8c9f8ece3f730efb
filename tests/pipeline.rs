//! End-to-end pipeline tests: due selection through claiming, scanning,
//! classification, alerting, and trend reporting against a real SQLite file.

use accesswatch::monitor::{ItemStatus, MonitorRunner, RunnerOptions};
use accesswatch::notify::NoopSender;
use accesswatch::scan::{ImpactTier, ScanEngine, ScanOutcome, Violation};
use accesswatch::schedule::{window, Frequency, MonitoredSchedule, ScheduleSpec};
use accesswatch::storage::{self, runs, schedules, Pool};
use accesswatch::{alerts, trend};
use anyhow::anyhow;
use chrono::{Duration, NaiveTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedEngine {
    responses: Mutex<VecDeque<anyhow::Result<ScanOutcome>>>,
}

impl ScriptedEngine {
    fn new(responses: Vec<anyhow::Result<ScanOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait::async_trait]
impl ScanEngine for ScriptedEngine {
    async fn scan(&self, _url: &str) -> anyhow::Result<ScanOutcome> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("script exhausted")))
    }
}

fn outcome(score: f64, issues: usize) -> ScanOutcome {
    ScanOutcome {
        score,
        violations: (0..issues)
            .map(|_| Violation {
                impact: ImpactTier::Serious,
                tags: vec!["wcag2aa".into()],
            })
            .collect(),
        performance_score: None,
    }
}

fn open_fixture() -> (tempfile::TempDir, Pool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
    (dir, pool)
}

fn due_schedule(pool: &Pool, hours_overdue: i64) -> MonitoredSchedule {
    let spec = ScheduleSpec {
        url: "https://shop.example.com".into(),
        frequency: Frequency::Weekly,
        day_of_week: 3,
        time_of_day: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        timezone: chrono_tz::UTC,
        starts_at: None,
        ends_at: None,
        score_threshold: 80.0,
        recipients: vec![],
    };
    let mut schedule = MonitoredSchedule::from_spec(spec, Utc::now()).unwrap();
    schedule.next_run_at = Some(Utc::now() - Duration::hours(hours_overdue));
    schedules::insert_schedule(pool, &schedule).unwrap();
    schedule
}

fn runner(pool: &Pool, engine: Arc<ScriptedEngine>) -> MonitorRunner {
    MonitorRunner::new(
        pool.clone(),
        engine,
        Arc::new(NoopSender),
        RunnerOptions::default(),
    )
}

#[tokio::test]
async fn test_regression_raises_one_deduplicated_alert() {
    let (_dir, pool) = open_fixture();
    let schedule = due_schedule(&pool, 1);

    // Baseline scan, then two heavy regressions in a row
    let engine = ScriptedEngine::new(vec![
        Ok(outcome(90.0, 2)),
        Ok(outcome(55.0, 2)),
        Ok(outcome(20.0, 2)),
    ]);
    let runner = runner(&pool, engine);

    for overdue in [1, 2, 3] {
        schedules::advance_next_run(&pool, schedule.id, Utc::now() - Duration::hours(overdue))
            .unwrap();
        let summary = runner.run_batch().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.results[0].status, ItemStatus::Completed);
    }

    // The second regression within 24h of the first is suppressed
    let alerts = runner.alerts().list(true, 50).unwrap();
    let score_drops: Vec<_> = alerts
        .iter()
        .filter(|a| a.alert_type == alerts::AlertType::ScoreDrop)
        .collect();
    assert_eq!(score_drops.len(), 1);
    assert_eq!(score_drops[0].severity, alerts::Severity::Critical);

    // All three runs recorded and chained
    let history = runs::list_runs(&pool, schedule.id, 10).unwrap();
    assert_eq!(history.len(), 3);
    let latest = storage::results::latest_result(&pool, schedule.id)
        .unwrap()
        .unwrap();
    assert_eq!(latest.score, 20.0);
    assert!(latest.previous_id.is_some());
}

#[tokio::test]
async fn test_overlapping_invocations_execute_once() {
    let (_dir, pool) = open_fixture();
    let schedule = due_schedule(&pool, 1);
    let slot = schedule.next_run_at.unwrap();
    let key = window::window_key(schedule.id, slot, schedule.timezone);

    // Two runners share the store, as two overlapping trigger invocations
    // would. The first claims the window up front.
    let first = runner(&pool, ScriptedEngine::new(vec![Ok(outcome(88.0, 0))]));
    let second = runner(&pool, ScriptedEngine::new(vec![Ok(outcome(88.0, 0))]));

    assert!(matches!(
        runs::claim_run(&pool, schedule.id, &key).unwrap(),
        runs::ClaimOutcome::Claimed(_)
    ));
    let summary = second.run_batch().await.unwrap();
    assert_eq!(summary.results[0].status, ItemStatus::Skipped);

    // The loser advanced the slot, so nothing is due any more
    let summary = first.run_batch().await.unwrap();
    assert_eq!(summary.processed, 0);

    // Exactly zero scans executed (the pre-claim never ran one)
    assert!(storage::results::latest_result(&pool, schedule.id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_persistent_failure_disables_schedule() {
    let (_dir, pool) = open_fixture();
    let schedule = due_schedule(&pool, 1);
    let engine = ScriptedEngine::new((0..6).map(|i| Err(anyhow!("timeout {i}"))).collect());
    let runner = runner(&pool, engine);

    for overdue in [1, 2, 3, 4, 5] {
        schedules::advance_next_run(&pool, schedule.id, Utc::now() - Duration::hours(overdue))
            .unwrap();
        runner.run_batch().await.unwrap();
    }

    let reloaded = schedules::get_schedule(&pool, schedule.id).unwrap().unwrap();
    assert!(!reloaded.enabled);
    assert_eq!(reloaded.consecutive_failures, 5);

    // No further selection even when overdue
    schedules::advance_next_run(&pool, schedule.id, Utc::now() - Duration::hours(9)).unwrap();
    let summary = runner.run_batch().await.unwrap();
    assert_eq!(summary.processed, 0);

    // Scan-failed alerts were deduplicated, not stacked five deep
    let scan_failed: Vec<_> = runner
        .alerts()
        .list(true, 50)
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type == alerts::AlertType::ScanFailed)
        .collect();
    assert_eq!(scan_failed.len(), 1);
}

#[tokio::test]
async fn test_trend_report_over_scan_history() {
    let (_dir, pool) = open_fixture();
    let schedule = due_schedule(&pool, 1);

    let scores = [70.0, 73.0, 76.0, 79.0, 82.0];
    let engine = ScriptedEngine::new(scores.iter().map(|&s| Ok(outcome(s, 0))).collect());
    let runner = runner(&pool, engine);

    for overdue in 1..=scores.len() as i64 {
        schedules::advance_next_run(&pool, schedule.id, Utc::now() - Duration::hours(overdue))
            .unwrap();
        runner.run_batch().await.unwrap();
    }

    let report = trend::report_for_schedule(&pool, schedule.id, 30)
        .unwrap()
        .unwrap();
    assert_eq!(report.samples, scores.len());
    assert_eq!(report.direction, trend::TrendDirection::Improving);
    assert!((report.fit.slope - 3.0).abs() < 1e-6);
    assert!(report.confidence > 80.0);
    // Forecast extrapolates the same slope
    assert!((report.forecast[0] - 85.0).abs() < 0.5);
    assert!((report.forecast[6] - 103.0).abs() < 0.5);
}
