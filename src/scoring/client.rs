//! Client for the external scoring service.
//!
//! `GET /score?id=<identifier>` answers with `{score, badge, ...}` on success
//! or `{error}` otherwise. Consumed by UI code; the coordination layer never
//! calls it.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with `{ "error": ... }`.
    #[error("scoring service error: {0}")]
    Service(String),

    #[error("scoring service returned status {0}")]
    Status(u16),

    #[error("failed to parse score response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub score: f64,
    pub badge: String,
    /// Any additional fields the service includes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either shape the service may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreResponse {
    Score(Score),
    Error { error: String },
}

pub struct ScoreClient {
    client: Client,
    base_url: String,
}

impl ScoreClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch(&self, id: &str) -> Result<Score, ScoreError> {
        let res = self
            .client
            .get(format!("{}/score", self.base_url))
            .query(&[("id", id)])
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;

        match serde_json::from_str::<ScoreResponse>(&body) {
            Ok(ScoreResponse::Error { error }) => Err(ScoreError::Service(error)),
            _ if !status.is_success() => Err(ScoreError::Status(status.as_u16())),
            Ok(ScoreResponse::Score(score)) => Ok(score),
            Err(e) => Err(ScoreError::Parse(e.to_string())),
        }
    }
}
