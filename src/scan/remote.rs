//! Remote scan engine over HTTP.
//!
//! The rule engine (typically a headless-browser service) is opaque to this
//! crate: we post a target URL and read back a score plus violation list.

use super::{ScanEngine, ScanOutcome};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

pub struct RemoteScanEngine {
    client: Client,
    endpoint: String,
}

impl RemoteScanEngine {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build scan engine HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl ScanEngine for RemoteScanEngine {
    async fn scan(&self, url: &str) -> Result<ScanOutcome> {
        let outcome = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .context("Scan engine request failed")?
            .error_for_status()
            .context("Scan engine returned an error status")?
            .json::<ScanOutcome>()
            .await
            .context("Scan engine returned malformed JSON")?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ImpactTier;

    #[test]
    fn test_outcome_deserializes_engine_payload() {
        let json = r#"{
            "score": 87.5,
            "violations": [
                { "impact": "critical", "tags": ["wcag2aa", "cat.forms"] },
                { "impact": "minor" }
            ],
            "performanceScore": 73.0
        }"#;
        let outcome: ScanOutcome = serde_json::from_str(json).unwrap();
        assert_eq!(outcome.score, 87.5);
        assert_eq!(outcome.violations.len(), 2);
        assert_eq!(outcome.violations[0].impact, ImpactTier::Critical);
        assert!(outcome.violations[1].tags.is_empty());
        assert_eq!(outcome.performance_score, Some(73.0));
    }

    #[test]
    fn test_performance_score_is_optional() {
        let json = r#"{ "score": 90.0, "violations": [] }"#;
        let outcome: ScanOutcome = serde_json::from_str(json).unwrap();
        assert!(outcome.performance_score.is_none());
    }
}
