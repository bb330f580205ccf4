use crate::error::{ApiError, AuthError};
use crate::oauth::{OAuthManager, TokenExchange};
use anyhow::Context;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client for both integrations and their token endpoints.
pub fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(concat!("stet/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Sends an authenticated request. A 401 triggers one token refresh and one
/// retry with the new token; nothing is retried a second time. 403 and 429
/// are classified rather than retried.
pub(crate) async fn send_authorized<E, F>(
    auth: &OAuthManager<E>,
    build: F,
) -> Result<Response, ApiError>
where
    E: TokenExchange,
    F: Fn(&Client, &str) -> RequestBuilder,
{
    let token = auth
        .get_valid_token()
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    let response = build(auth.http(), &token.bearer()).send().await?;
    if response.status() != StatusCode::UNAUTHORIZED {
        return classify(response);
    }

    debug!(service = auth.service(), "Access token rejected, refreshing once");
    let _ = response.bytes().await;
    let fresh = match auth.force_refresh().await {
        Ok(fresh) => fresh,
        Err(err) => {
            warn!(service = auth.service(), error = %err, "Refresh after 401 failed");
            return Err(ApiError::Unauthenticated);
        }
    };
    let retried = build(auth.http(), &fresh.bearer()).send().await?;
    classify(retried)
}

fn classify(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
        StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited {
            retry_after: retry_delay_from_headers(response.headers()),
        }),
        other => Err(ApiError::Status(other.as_u16())),
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

/// Posts to a token endpoint and decodes the JSON body.
pub(crate) async fn token_request<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, AuthError> {
    let response = request
        .send()
        .await
        .map_err(|err| AuthError::TokenRequest(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::TokenRequest(format!("status {}", status.as_u16())));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| AuthError::TokenRequest(format!("decode token response: {err}")))
}

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<u64> {
    retry_after_seconds(headers).or_else(|| ratelimit_reset_seconds(headers))
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn ratelimit_reset_seconds(headers: &HeaderMap) -> Option<u64> {
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    reset.checked_sub(now).filter(|delay| *delay > 0)
}
