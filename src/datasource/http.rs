//! JSON over HTTP with exponential-backoff retry.

use super::DataSourceError;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// Give up retrying transient failures after this long.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(30);

/// Shared HTTP client used by every remote data source.
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: Client,
    bearer_token: Option<String>,
}

impl JsonClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            bearer_token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }

    /// GET `url` with query parameters and decode the body as JSON.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, DataSourceError> {
        self.send_with_retry(|| self.authorize(self.client.get(url).query(query)))
            .await
    }

    /// POST a JSON payload to `url` and decode the body as JSON.
    pub async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        self.send_with_retry(|| self.authorize(self.client.post(url).json(payload)))
            .await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Network errors, 429 and 5xx are retried; other statuses and
    /// undecodable bodies fail immediately.
    async fn send_with_retry<F>(&self, build: F) -> Result<serde_json::Value, DataSourceError>
    where
        F: Fn() -> RequestBuilder,
    {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = build().send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
            })?;
            let response = check_status(response).await?;

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

async fn check_status(response: Response) -> Result<Response, backoff::Error<DataSourceError>> {
    let status = response.status();
    if status == 429 {
        return Err(backoff::Error::transient(DataSourceError::RateLimited));
    }
    if status.is_server_error() {
        return Err(backoff::Error::transient(DataSourceError::HttpError {
            status: status.as_u16(),
            message: "Server error".to_string(),
        }));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(backoff::Error::permanent(DataSourceError::HttpError {
            status: status.as_u16(),
            message: if body.is_empty() {
                "Client error".to_string()
            } else {
                truncate(&body, 200)
            },
        }));
    }
    Ok(response)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
