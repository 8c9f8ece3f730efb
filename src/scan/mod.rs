//! Scan engine interface and derived compliance metrics.

pub mod orchestrator;
pub mod remote;
pub mod wcag;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown violation impact '{0}'")]
pub struct InvalidImpact(String);

/// Severity bucket the scan engine assigns to an individual issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactTier {
    Critical,
    Serious,
    Moderate,
    Minor,
}

impl std::fmt::Display for ImpactTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpactTier::Critical => write!(f, "critical"),
            ImpactTier::Serious => write!(f, "serious"),
            ImpactTier::Moderate => write!(f, "moderate"),
            ImpactTier::Minor => write!(f, "minor"),
        }
    }
}

impl FromStr for ImpactTier {
    type Err = InvalidImpact;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(ImpactTier::Critical),
            "serious" => Ok(ImpactTier::Serious),
            "moderate" => Ok(ImpactTier::Moderate),
            "minor" => Ok(ImpactTier::Minor),
            other => Err(InvalidImpact(other.to_string())),
        }
    }
}

/// One accessibility issue reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub impact: ImpactTier,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Raw result of one engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// Overall accessibility score, 0-100.
    pub score: f64,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub performance_score: Option<f64>,
}

/// The external accessibility rule engine, treated as opaque. It may be a
/// headless browser behind an HTTP service; failures propagate to the
/// orchestrator.
#[async_trait::async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(&self, url: &str) -> Result<ScanOutcome>;
}

/// Compliance metrics derived from one executed scan. Immutable once
/// persisted; one per run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub score: f64,
    pub issue_count: u32,
    pub critical_count: u32,
    pub serious_count: u32,
    pub moderate_count: u32,
    pub minor_count: u32,
    pub aa_compliance: f64,
    pub aaa_compliance: f64,
    pub performance_score: Option<f64>,
    pub previous_id: Option<Uuid>,
    pub score_delta: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ScanResult {
    /// Derive a result from a raw engine outcome, linked to the previous
    /// result for the same schedule when one exists.
    pub fn from_outcome(
        schedule_id: Uuid,
        outcome: &ScanOutcome,
        previous: Option<&ScanResult>,
    ) -> Self {
        let breakdown = wcag::impact_breakdown(&outcome.violations);
        let (aa, aaa) = wcag::compliance_percentages(&outcome.violations);
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            score: outcome.score,
            issue_count: outcome.violations.len() as u32,
            critical_count: breakdown.critical,
            serious_count: breakdown.serious,
            moderate_count: breakdown.moderate,
            minor_count: breakdown.minor,
            aa_compliance: aa,
            aaa_compliance: aaa,
            performance_score: outcome.performance_score,
            previous_id: previous.map(|p| p.id),
            score_delta: previous.map(|p| outcome.score - p.score),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(impact: ImpactTier) -> Violation {
        Violation {
            impact,
            tags: vec!["wcag2aa".into()],
        }
    }

    #[test]
    fn test_impact_round_trip() {
        for s in ["critical", "serious", "moderate", "minor"] {
            assert_eq!(s.parse::<ImpactTier>().unwrap().to_string(), s);
        }
        assert!("cosmic".parse::<ImpactTier>().is_err());
    }

    #[test]
    fn test_from_outcome_links_previous() {
        let schedule_id = Uuid::new_v4();
        let first = ScanResult::from_outcome(
            schedule_id,
            &ScanOutcome {
                score: 90.0,
                violations: vec![violation(ImpactTier::Minor)],
                performance_score: None,
            },
            None,
        );
        assert_eq!(first.issue_count, 1);
        assert!(first.previous_id.is_none());
        assert!(first.score_delta.is_none());

        let second = ScanResult::from_outcome(
            schedule_id,
            &ScanOutcome {
                score: 75.0,
                violations: vec![violation(ImpactTier::Critical), violation(ImpactTier::Serious)],
                performance_score: Some(60.0),
            },
            Some(&first),
        );
        assert_eq!(second.previous_id, Some(first.id));
        assert_eq!(second.score_delta, Some(-15.0));
        assert_eq!(second.critical_count, 1);
        assert_eq!(second.serious_count, 1);
        assert_eq!(second.issue_count, 2);
    }
}
