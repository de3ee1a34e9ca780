use crate::config::PdfCoConfig;
use crate::error::{AppError, AppResult};
use crate::services::http::{build_client, describe_failure, endpoint_url};
use async_trait::async_trait;
use tracing::{debug, error};
use url::Url;

/// Account balance check run before a batch is started.
#[async_trait]
pub trait CreditService: Send + Sync {
    async fn credit_balance(&self) -> AppResult<f64>;
}

/// Thin wrapper over the PDF.co REST API.
pub struct PdfCoClient {
    http: reqwest::Client,
    api_key: String,
    credits_url: Url,
}

impl PdfCoClient {
    pub fn new(config: &PdfCoConfig) -> AppResult<Self> {
        Ok(Self {
            http: build_client(config.timeout()?)?,
            api_key: config.api_key.clone(),
            credits_url: endpoint_url(
                &config.base_url,
                "/v1/account/credits",
                "pdfco.base_url",
            )?,
        })
    }
}

#[async_trait]
impl CreditService for PdfCoClient {
    async fn credit_balance(&self) -> AppResult<f64> {
        debug!("Requesting PDF.co credit balance from {}", self.credits_url);

        let response = self
            .http
            .get(self.credits_url.clone())
            .header("x-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("PDF.co request failed: {e}")))?;

        if !response.status().is_success() {
            let message = describe_failure(response).await;
            error!("PDF.co API error {}", message);
            return Err(AppError::ServiceUnavailable(format!("PDF.co API error {message}")));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ServiceUnavailable(format!("Unexpected response from PDF.co: {e}"))
        })?;

        credits_from_payload(&payload)
    }
}

fn credits_from_payload(payload: &serde_json::Value) -> AppResult<f64> {
    let credits = payload.get("Credits").ok_or_else(|| {
        AppError::ServiceUnavailable(
            "Unexpected response from PDF.co: 'Credits' field missing".to_string(),
        )
    })?;

    let balance = match credits {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    balance.ok_or_else(|| {
        AppError::ServiceUnavailable(format!(
            "Unexpected response from PDF.co: 'Credits' is not numeric ({credits})"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::test_support::StubServer;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::time::Duration;

    fn client_for(base_url: &str) -> PdfCoClient {
        client_with_timeout(base_url, 5.0)
    }

    fn client_with_timeout(base_url: &str, timeout_seconds: f64) -> PdfCoClient {
        PdfCoClient::new(&PdfCoConfig {
            api_key: "key".to_string(),
            base_url: base_url.to_string(),
            timeout_seconds,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn balance_is_read_from_credits_field() {
        let app = Router::new().route(
            "/v1/account/credits",
            get(|headers: axum::http::HeaderMap| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "key");
                Json(json!({"Credits": 123.0}))
            }),
        );
        let server = StubServer::spawn(app).await;

        let balance = client_for(&server.base_url).credit_balance().await.unwrap();
        assert_eq!(balance, 123.0);
    }

    #[tokio::test]
    async fn non_success_status_is_service_unavailable() {
        let app = Router::new().route(
            "/v1/account/credits",
            get(|| async { (StatusCode::NOT_FOUND, "Not found") }),
        );
        let server = StubServer::spawn(app).await;

        let err = client_for(&server.base_url)
            .credit_balance()
            .await
            .unwrap_err();
        match err {
            AppError::ServiceUnavailable(msg) => {
                assert!(msg.contains("404") && msg.contains("Not found"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credits_field_is_service_unavailable() {
        let app = Router::new().route(
            "/v1/account/credits",
            get(|| async { Json(json!({"status": "ok"})) }),
        );
        let server = StubServer::spawn(app).await;

        let err = client_for(&server.base_url)
            .credit_balance()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_service_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}"))
            .credit_balance()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_service_unavailable() {
        let app = Router::new().route(
            "/v1/account/credits",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"Credits": 1}))
            }),
        );
        let server = StubServer::spawn(app).await;

        let started = std::time::Instant::now();
        let err = client_with_timeout(&server.base_url, 0.2)
            .credit_balance()
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ServiceUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn string_credits_are_accepted() {
        assert_eq!(credits_from_payload(&json!({"Credits": "42.5"})).unwrap(), 42.5);
        assert!(credits_from_payload(&json!({"Credits": [1]})).is_err());
    }
}
