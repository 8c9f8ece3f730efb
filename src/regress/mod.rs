//! Regression & risk classification.
//!
//! Pure comparison of a new scan result against the prior one for the same
//! schedule. Emits alert candidates only; persistence and deduplication
//! belong to the alert engine.

use crate::alerts::{AlertType, Severity};
use crate::scan::ScanResult;
use serde::Serialize;

/// Score drops smaller than this are not regressions.
pub const MIN_SCORE_DROP: f64 = 10.0;
/// New-violation deltas smaller than this are not regressions.
pub const MIN_NEW_VIOLATIONS: i64 = 5;
/// AA compliance at or above this produces no breach alert.
pub const COMPLIANCE_BREACH_FLOOR: f64 = 70.0;
/// Performance drops beyond this many points flag a regression.
pub const PERFORMANCE_DROP_LIMIT: f64 = 20.0;

/// A classified event, not yet persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub threshold: Option<f64>,
}

/// Classify a new result against its predecessor. A single scan may trigger
/// several distinct alert types at once.
pub fn classify(current: &ScanResult, previous: Option<&ScanResult>) -> Vec<AlertCandidate> {
    let mut candidates = Vec::new();

    if let Some(prev) = previous {
        let drop = prev.score - current.score;
        if let Some((severity, tier)) = score_drop_severity(drop) {
            candidates.push(AlertCandidate {
                alert_type: AlertType::ScoreDrop,
                severity,
                message: format!(
                    "Accessibility score dropped {drop:.0} points ({:.0} -> {:.0})",
                    prev.score, current.score
                ),
                current: Some(current.score),
                previous: Some(prev.score),
                threshold: Some(tier),
            });
        }

        let new_issues = i64::from(current.issue_count) - i64::from(prev.issue_count);
        if let Some((severity, tier)) = new_violation_severity(new_issues) {
            candidates.push(AlertCandidate {
                alert_type: AlertType::NewViolations,
                severity,
                message: format!(
                    "{new_issues} new violations since the previous scan ({} -> {})",
                    prev.issue_count, current.issue_count
                ),
                current: Some(current.issue_count.into()),
                previous: Some(prev.issue_count.into()),
                threshold: Some(tier as f64),
            });
        }

        if let (Some(cur_perf), Some(prev_perf)) =
            (current.performance_score, prev.performance_score)
        {
            let perf_drop = prev_perf - cur_perf;
            if perf_drop > PERFORMANCE_DROP_LIMIT {
                candidates.push(AlertCandidate {
                    alert_type: AlertType::PerformanceImpact,
                    severity: Severity::Medium,
                    message: format!(
                        "Performance score dropped {perf_drop:.0} points ({prev_perf:.0} -> {cur_perf:.0})"
                    ),
                    current: Some(cur_perf),
                    previous: Some(prev_perf),
                    threshold: Some(PERFORMANCE_DROP_LIMIT),
                });
            }
        }
    }

    if let Some((severity, tier)) = compliance_breach_severity(current.aa_compliance) {
        candidates.push(AlertCandidate {
            alert_type: AlertType::ComplianceBreach,
            severity,
            message: format!(
                "WCAG AA compliance at {:.0}%, below the {tier:.0}% floor",
                current.aa_compliance
            ),
            current: Some(current.aa_compliance),
            previous: previous.map(|p| p.aa_compliance),
            threshold: Some(tier),
        });
    }

    candidates
}

/// Candidate raised when the scan itself failed, routed through the same
/// dedup path as regression alerts.
pub fn scan_failed_candidate(url: &str, error: &str) -> AlertCandidate {
    AlertCandidate {
        alert_type: AlertType::ScanFailed,
        severity: Severity::Medium,
        message: format!("Scan of {url} failed: {error}"),
        current: None,
        previous: None,
        threshold: None,
    }
}

/// Severity tier for a score drop, with the tier boundary that fired.
fn score_drop_severity(drop: f64) -> Option<(Severity, f64)> {
    if drop >= 30.0 {
        Some((Severity::Critical, 30.0))
    } else if drop >= 20.0 {
        Some((Severity::High, 20.0))
    } else if drop >= 15.0 {
        Some((Severity::Medium, 15.0))
    } else if drop >= MIN_SCORE_DROP {
        Some((Severity::Low, MIN_SCORE_DROP))
    } else {
        None
    }
}

fn new_violation_severity(delta: i64) -> Option<(Severity, i64)> {
    if delta >= 50 {
        Some((Severity::Critical, 50))
    } else if delta >= 20 {
        Some((Severity::High, 20))
    } else if delta >= 10 {
        Some((Severity::Medium, 10))
    } else if delta >= MIN_NEW_VIOLATIONS {
        Some((Severity::Low, MIN_NEW_VIOLATIONS))
    } else {
        None
    }
}

fn compliance_breach_severity(aa_compliance: f64) -> Option<(Severity, f64)> {
    if aa_compliance < 40.0 {
        Some((Severity::Critical, 40.0))
    } else if aa_compliance < 55.0 {
        Some((Severity::High, 55.0))
    } else if aa_compliance < COMPLIANCE_BREACH_FLOOR {
        Some((Severity::Medium, COMPLIANCE_BREACH_FLOOR))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(score: f64, issues: u32, aa: f64, perf: Option<f64>) -> ScanResult {
        ScanResult {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            score,
            issue_count: issues,
            critical_count: 0,
            serious_count: issues,
            moderate_count: 0,
            minor_count: 0,
            aa_compliance: aa,
            aaa_compliance: aa,
            performance_score: perf,
            previous_id: None,
            score_delta: None,
            created_at: Utc::now(),
        }
    }

    fn find(candidates: &[AlertCandidate], alert_type: AlertType) -> Option<&AlertCandidate> {
        candidates.iter().find(|c| c.alert_type == alert_type)
    }

    #[test]
    fn test_score_drop_of_35_is_critical() {
        let prev = result(90.0, 0, 100.0, None);
        let cur = result(55.0, 0, 100.0, None);
        let candidates = classify(&cur, Some(&prev));
        let drop = find(&candidates, AlertType::ScoreDrop).unwrap();
        assert_eq!(drop.severity, Severity::Critical);
        assert_eq!(drop.current, Some(55.0));
        assert_eq!(drop.previous, Some(90.0));
    }

    #[test]
    fn test_score_drop_of_12_is_low() {
        let prev = result(80.0, 0, 100.0, None);
        let cur = result(68.0, 0, 100.0, None);
        let candidates = classify(&cur, Some(&prev));
        assert_eq!(
            find(&candidates, AlertType::ScoreDrop).unwrap().severity,
            Severity::Low
        );
    }

    #[test]
    fn test_score_drop_tier_boundaries() {
        let cases = [
            (30.0, Some(Severity::Critical)),
            (25.0, Some(Severity::High)),
            (20.0, Some(Severity::High)),
            (15.0, Some(Severity::Medium)),
            (10.0, Some(Severity::Low)),
            (9.0, None),
            (0.0, None),
        ];
        for (drop, expected) in cases {
            let prev = result(100.0, 0, 100.0, None);
            let cur = result(100.0 - drop, 0, 100.0, None);
            let candidates = classify(&cur, Some(&prev));
            assert_eq!(
                find(&candidates, AlertType::ScoreDrop).map(|c| c.severity),
                expected,
                "drop {drop}"
            );
        }
    }

    #[test]
    fn test_score_improvement_is_not_a_regression() {
        let prev = result(60.0, 0, 100.0, None);
        let cur = result(95.0, 0, 100.0, None);
        assert!(find(&classify(&cur, Some(&prev)), AlertType::ScoreDrop).is_none());
    }

    #[test]
    fn test_new_violation_tiers() {
        let cases = [
            (55, Some(Severity::Critical)),
            (20, Some(Severity::High)),
            (12, Some(Severity::Medium)),
            (5, Some(Severity::Low)),
            (4, None),
        ];
        for (delta, expected) in cases {
            let prev = result(90.0, 10, 100.0, None);
            let cur = result(90.0, 10 + delta, 100.0, None);
            let candidates = classify(&cur, Some(&prev));
            assert_eq!(
                find(&candidates, AlertType::NewViolations).map(|c| c.severity),
                expected,
                "delta {delta}"
            );
        }
    }

    #[test]
    fn test_fewer_violations_is_not_a_regression() {
        let prev = result(90.0, 30, 100.0, None);
        let cur = result(90.0, 5, 100.0, None);
        assert!(find(&classify(&cur, Some(&prev)), AlertType::NewViolations).is_none());
    }

    #[test]
    fn test_compliance_breach_tiers() {
        let cases = [
            (35.0, Some(Severity::Critical)),
            (50.0, Some(Severity::High)),
            (60.0, Some(Severity::Medium)),
            (72.0, None),
        ];
        for (aa, expected) in cases {
            let cur = result(90.0, 0, aa, None);
            // Breach is absolute: it fires even without a previous result
            let candidates = classify(&cur, None);
            assert_eq!(
                find(&candidates, AlertType::ComplianceBreach).map(|c| c.severity),
                expected,
                "aa {aa}"
            );
        }
    }

    #[test]
    fn test_performance_regression() {
        let prev = result(90.0, 0, 100.0, Some(85.0));
        let cur = result(90.0, 0, 100.0, Some(60.0));
        let candidates = classify(&cur, Some(&prev));
        let perf = find(&candidates, AlertType::PerformanceImpact).unwrap();
        assert_eq!(perf.severity, Severity::Medium);

        // Exactly 20 points is not "more than 20"
        let cur_at_limit = result(90.0, 0, 100.0, Some(65.0));
        assert!(
            find(&classify(&cur_at_limit, Some(&prev)), AlertType::PerformanceImpact).is_none()
        );
    }

    #[test]
    fn test_single_scan_can_trigger_multiple_types() {
        let prev = result(95.0, 2, 100.0, Some(90.0));
        let cur = result(60.0, 30, 50.0, Some(55.0));
        let candidates = classify(&cur, Some(&prev));
        let types: Vec<AlertType> = candidates.iter().map(|c| c.alert_type).collect();
        assert!(types.contains(&AlertType::ScoreDrop));
        assert!(types.contains(&AlertType::NewViolations));
        assert!(types.contains(&AlertType::ComplianceBreach));
        assert!(types.contains(&AlertType::PerformanceImpact));
    }

    #[test]
    fn test_first_scan_only_checks_absolutes() {
        let cur = result(40.0, 100, 80.0, Some(10.0));
        let candidates = classify(&cur, None);
        assert!(candidates.is_empty());
    }
}
