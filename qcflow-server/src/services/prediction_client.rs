//! External prediction service client
//!
//! The prediction service is a black box answering `GET {base}/{batch}` with a
//! [`PredictionResult`] and a handful of aggregate endpoints used by the
//! dashboards. Handlers depend on the [`PredictionService`] trait so tests can
//! substitute a stub.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::PredictionResult;

/// Prediction service errors
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Prediction service is not configured")]
    NotConfigured,

    #[error("Prediction service unreachable: {0}")]
    Network(String),

    #[error("Prediction service returned HTTP {0}: {1}")]
    Api(u16, String),

    #[error("Malformed prediction response: {0}")]
    Parse(String),

    #[error("Rejected prediction: {0}")]
    Invalid(String),
}

/// Aggregate views proxied for the dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    Average,
    HplcPerformance,
    ControlChart,
    QualityTrends,
    RootCauses,
}

impl InsightKind {
    /// Path on the prediction service
    pub fn upstream_path(&self) -> &'static str {
        match self {
            InsightKind::Average => "average",
            InsightKind::HplcPerformance => "lab/hplc_performance",
            InsightKind::ControlChart => "lab/control_chart",
            InsightKind::QualityTrends => "quality_trends",
            InsightKind::RootCauses => "root_cause",
        }
    }

    /// Slug used in `/api/insights/{kind}`
    pub fn slug(&self) -> &'static str {
        match self {
            InsightKind::Average => "average",
            InsightKind::HplcPerformance => "hplc-performance",
            InsightKind::ControlChart => "control-chart",
            InsightKind::QualityTrends => "quality-trends",
            InsightKind::RootCauses => "root-causes",
        }
    }
}

impl FromStr for InsightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(InsightKind::Average),
            "hplc-performance" => Ok(InsightKind::HplcPerformance),
            "control-chart" => Ok(InsightKind::ControlChart),
            "quality-trends" => Ok(InsightKind::QualityTrends),
            "root-causes" => Ok(InsightKind::RootCauses),
            other => Err(format!("Unknown insight: {}", other)),
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Ask for the root-cause prediction of one batch
    async fn predict(&self, batch_number: &str) -> Result<PredictionResult, PredictionError>;

    /// Fetch an aggregate view, passed through unchanged
    async fn insight(&self, kind: InsightKind) -> Result<Value, PredictionError>;
}

/// reqwest-backed client
pub struct HttpPredictionClient {
    http_client: Client,
    base_url: String,
}

impl HttpPredictionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PredictionError> {
        let http_client = Client::builder()
            .user_agent(concat!("qcflow-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PredictionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, PredictionError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Prediction service request: GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| PredictionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Prediction service GET {} returned {}", url, status);
            return Err(PredictionError::Api(status.as_u16(), body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PredictionError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PredictionService for HttpPredictionClient {
    async fn predict(&self, batch_number: &str) -> Result<PredictionResult, PredictionError> {
        let path = urlencode_segment(batch_number);
        let body = self.get_json(&path).await?;
        serde_json::from_value(body).map_err(|e| PredictionError::Parse(e.to_string()))
    }

    async fn insight(&self, kind: InsightKind) -> Result<Value, PredictionError> {
        self.get_json(kind.upstream_path()).await
    }
}

/// Stand-in used when no prediction URL is configured
pub struct UnconfiguredPredictionService;

#[async_trait]
impl PredictionService for UnconfiguredPredictionService {
    async fn predict(&self, _batch_number: &str) -> Result<PredictionResult, PredictionError> {
        Err(PredictionError::NotConfigured)
    }

    async fn insight(&self, _kind: InsightKind) -> Result<Value, PredictionError> {
        Err(PredictionError::NotConfigured)
    }
}

/// Percent-encode a batch number for use as one path segment
fn urlencode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}
