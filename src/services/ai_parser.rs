use crate::config::AiParserConfig;
use crate::error::{AppError, AppResult};
use crate::services::http::{build_client, describe_failure, endpoint_url};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait ParsingService: Send + Sync {
    /// Readiness check. Fails with `ServiceUnavailable`.
    async fn ping(&self) -> AppResult<()>;

    /// Parses one document. Fails with `ParseFailure`.
    async fn parse(
        &self,
        content: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<serde_json::Value>;
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    content: &'a str,
    metadata: &'a HashMap<String, String>,
}

/// HTTP client for the downstream AI parsing service.
pub struct AiParsingClient {
    http: reqwest::Client,
    api_key: String,
    status_url: Url,
    parse_url: Url,
}

impl AiParsingClient {
    pub fn new(config: &AiParserConfig) -> AppResult<Self> {
        Ok(Self {
            http: build_client(config.timeout()?)?,
            api_key: config.api_key.clone(),
            status_url: endpoint_url(&config.endpoint, "/status", "ai_parser.endpoint")?,
            parse_url: endpoint_url(&config.endpoint, "/parse", "ai_parser.endpoint")?,
        })
    }
}

#[async_trait]
impl ParsingService for AiParsingClient {
    async fn ping(&self) -> AppResult<()> {
        debug!("Validating AI parser readiness");

        let response = self
            .http
            .get(self.status_url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                AppError::ServiceUnavailable(format!("AI parser status check failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = describe_failure(response).await;
            return Err(AppError::ServiceUnavailable(format!(
                "AI parser status check failed {message}"
            )));
        }

        Ok(())
    }

    async fn parse(
        &self,
        content: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<serde_json::Value> {
        let response = self
            .http
            .post(self.parse_url.clone())
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&ParseRequest { content, metadata })
            .send()
            .await
            .map_err(|e| AppError::ParseFailure(format!("AI parser request failed: {e}")))?;

        if !response.status().is_success() {
            let message = describe_failure(response).await;
            return Err(AppError::ParseFailure(format!("AI parser request failed {message}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ParseFailure(format!("AI parser returned malformed JSON: {e}")))
    }
}
