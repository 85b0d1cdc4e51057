//! Client for the external recommendation-text service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::RecommendationRequest;
use crate::error::ClientError;

pub const NO_RECOMMENDATION: &str = "No recommendation available.";

/// Response body of the recommendation service. Every field is optional; the
/// raw body is kept alongside for the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationReply {
    pub recommendation: String,
    pub raw: serde_json::Value,
}

impl RecommendationReply {
    /// Interpret a successful response body.
    pub fn from_body(raw: serde_json::Value) -> Result<Self, ClientError> {
        let response: RecommendationResponse = serde_json::from_value(raw.clone())
            .map_err(|err| ClientError::Decode(err.to_string()))?;

        Ok(Self {
            recommendation: response
                .recommendation
                .unwrap_or_else(|| NO_RECOMMENDATION.to_string()),
            raw,
        })
    }
}

#[async_trait]
pub trait RecommendationClient: Send + Sync {
    /// Ask the service for recommendation text for the given context.
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationReply, ClientError>;
}

pub struct HttpRecommendationClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRecommendationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build recommendation HTTP client")?;

        Ok(Self {
            http,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_transport(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RecommendationClient for HttpRecommendationClient {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationReply, ClientError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response.json().await.map_err(|err| {
            if err.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Decode(err.to_string())
            }
        })?;

        RecommendationReply::from_body(raw)
    }
}
