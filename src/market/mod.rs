//! Market data provider
//!
//! Optional advisory context (savings rates, inflation, index levels).
//! No calculation ever reads from here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::AdvisorError;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub as_of: DateTime<Utc>,
    /// Annual high-yield savings rate, as a fraction
    #[serde(default)]
    pub savings_rate: Option<f64>,
    #[serde(default)]
    pub inflation_rate: Option<f64>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub index_level: Option<f64>,
    #[serde(default)]
    pub source: String,
}

impl MarketSnapshot {
    /// One-paragraph summary for a language-model prompt
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("Market data as of {}", self.as_of.format("%Y-%m-%d"))];
        if let Some(rate) = self.savings_rate {
            parts.push(format!("savings accounts pay about {:.2}%", rate * 100.0));
        }
        if let Some(rate) = self.inflation_rate {
            parts.push(format!("inflation is running near {:.1}%", rate * 100.0));
        }
        if let (Some(name), Some(level)) = (&self.index_name, self.index_level) {
            parts.push(format!("the {} is at {:.0}", name, level));
        }
        format!("{}.", parts.join("; "))
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self) -> Result<MarketSnapshot>;

    fn name(&self) -> &'static str;
}

/// Fetches `GET {base_url}/snapshot`
pub struct HttpMarketData {
    client: Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketData {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        let url = format!("{}/snapshot", self.base_url);
        debug!(%url, "Fetching market snapshot");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AdvisorError::MarketData(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let mut snapshot: MarketSnapshot = response
            .json()
            .await
            .map_err(|e| AdvisorError::MarketData(format!("invalid snapshot: {}", e)))?;
        if snapshot.source.is_empty() {
            snapshot.source = self.base_url.clone();
        }
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fixed snapshot, for offline runs and tests
pub struct StaticMarketData {
    snapshot: MarketSnapshot,
}

impl StaticMarketData {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn snapshot(&self) -> Result<MarketSnapshot> {
        Ok(self.snapshot.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            as_of: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            savings_rate: Some(0.042),
            inflation_rate: Some(0.029),
            index_name: Some("S&P 500".to_string()),
            index_level: Some(5_800.0),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_summary() {
        let summary = snapshot().summary();
        assert!(summary.starts_with("Market data as of 2026-03-02"));
        assert!(summary.contains("4.20%"));
        assert!(summary.contains("S&P 500 is at 5800"));
    }

    #[test]
    fn test_partial_payload_deserializes() {
        let snapshot: MarketSnapshot =
            serde_json::from_str(r#"{"as_of":"2026-03-02T00:00:00Z","savings_rate":0.04}"#).unwrap();
        assert_eq!(snapshot.savings_rate, Some(0.04));
        assert!(snapshot.index_level.is_none());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticMarketData::new(snapshot());
        assert_eq!(provider.snapshot().await.unwrap().source, "test");
    }
}
