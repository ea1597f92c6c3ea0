//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ProviderError;

/// Seconds to wait for a rate-limited call when `retry-after` is absent.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

/// Classify a transport failure.
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: NestedError },
    Flat { error: String },
}

#[derive(Deserialize)]
struct NestedError {
    message: String,
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn error_message(body: String) -> String {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Err(_) => body,
    }
}

/// Map a non-success HTTP status into a [`ProviderError`].
///
/// Returns the response untouched when the status is below 400.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        401 | 403 => Err(ProviderError::AuthenticationFailed(error_message(body))),
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        _ => Err(ProviderError::ApiError {
            status,
            message: error_message(body),
        }),
    }
}

/// Decode a success body, reporting decode failures as an API error.
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    response.json().await.map_err(|e| ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    })
}
