use crate::error::{AppError, AppResult};
use std::time::Duration;
use url::Url;

/// Builds the HTTP client up front so a missing TLS backend surfaces at
/// construction, not halfway through a batch.
pub fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            AppError::MissingDependency(format!("Failed to initialise HTTP client: {e}"))
        })
}

/// Joins `path` onto a configured base URL, tolerating a trailing slash.
pub fn endpoint_url(base: &str, path: &str, setting: &str) -> AppResult<Url> {
    let base = base.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(AppError::Config(format!("{setting} is not configured")));
    }
    Url::parse(&format!("{base}{path}"))
        .map_err(|e| AppError::Config(format!("{setting} is not a valid URL ({base}): {e}")))
}

/// Status plus body text (or the canonical reason when the body is empty).
pub async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body
    };
    format!("({}): {message}", status.as_u16())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    pub struct StubServer {
        pub base_url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    impl StubServer {
        pub async fn spawn(app: Router) -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind ephemeral port");
            let addr = listener.local_addr().unwrap();
            let base_url = format!("http://{addr}");

            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self { base_url, handle }
        }
    }

    impl Drop for StubServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }
}
