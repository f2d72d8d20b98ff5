//! AirVisual (IQAir) air quality client
//!
//! Fetches the current US AQI for a city from the AirVisual `v2/city` endpoint.
//! Rate-limited requests (HTTP 429) are retried with a growing wait.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::ApiConfig;

/// Base URL for the AirVisual city endpoint
const AIRVISUAL_BASE_URL: &str = "http://api.airvisual.com/v2/city";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when fetching air quality data
#[derive(Debug, Error)]
pub enum AirQualityError {
    /// HTTP request failed or returned an error status
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API answered with `"status": "fail"`
    #[error("AirVisual rejected the request: {0}")]
    ApiFailure(String),

    /// Still rate limited after every retry
    #[error("AirVisual rate limit still in effect after retrying")]
    RateLimited,

    /// No AirVisual key was configured
    #[error("No AirVisual key configured (set AIRVISUAL_KEY)")]
    MissingApiKey,
}

/// Wait schedule used when the API answers 429
///
/// The first retry waits `initial`, each further retry waits `step` longer,
/// and retrying stops once the next wait would exceed `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial: Duration,
    step: Duration,
    max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            step: Duration::from_secs(10),
            max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; a zero `step` is bumped to one millisecond so the schedule ends
    pub fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        Self {
            initial,
            step: step.max(Duration::from_millis(1)),
            max,
        }
    }

    /// The successive waits before each retry
    pub fn waits(&self) -> impl Iterator<Item = Duration> {
        let step = self.step;
        let max = self.max;
        std::iter::successors(Some(self.initial), move |wait| Some(*wait + step))
            .take_while(move |wait| *wait <= max)
    }
}

/// Client for fetching air quality data from AirVisual
#[derive(Debug, Clone)]
pub struct AirQualityClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
}

impl AirQualityClient {
    /// Creates a new AirQualityClient from the API configuration
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.airvisual_key.clone(),
            base_url: AIRVISUAL_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replace the 429 retry schedule
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetches the current US AQI for a city
    ///
    /// # Arguments
    /// * `city` - City name
    /// * `state` - State or district the city belongs to
    /// * `country` - Country name
    ///
    /// # Returns
    /// * `Ok(u32)` - Current US AQI of the city
    /// * `Err(AirQualityError)` - If no key is configured, the request fails,
    ///   the API rejects the city, or the rate limit outlasts the retry schedule
    pub async fn aqi(&self, city: &str, state: &str, country: &str) -> Result<u32, AirQualityError> {
        let api_key = self.api_key.as_deref().ok_or(AirQualityError::MissingApiKey)?;
        let mut waits = self.retry.waits();

        loop {
            let response = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("city", city),
                    ("state", state),
                    ("country", country),
                    ("key", api_key),
                ])
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let Some(wait) = waits.next() else {
                    return Err(AirQualityError::RateLimited);
                };
                warn!(
                    "AirVisual rate limit reached, waiting {}s before retrying {}",
                    wait.as_secs_f64(),
                    city
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                // AirVisual explains failures in the body, e.g. "city_not_found"
                return Err(match parse_response(&text) {
                    Err(AirQualityError::ApiFailure(message)) => AirQualityError::ApiFailure(message),
                    _ => AirQualityError::ApiFailure(format!("HTTP {}", status)),
                });
            }

            return parse_response(&text);
        }
    }
}

/// Parse an AirVisual `v2/city` response body
fn parse_response(body: &str) -> Result<u32, AirQualityError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;

    if envelope.status != "success" {
        let message = envelope
            .data
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or(envelope.status.as_str())
            .to_string();
        return Err(AirQualityError::ApiFailure(message));
    }

    let data: CityData = serde_json::from_value(envelope.data)?;
    Ok(data.current.pollution.aqius)
}

/// Top-level AirVisual response
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// `data` block of a successful response
#[derive(Debug, Deserialize)]
struct CityData {
    current: CurrentData,
}

#[derive(Debug, Deserialize)]
struct CurrentData {
    pollution: Pollution,
}

#[derive(Debug, Deserialize)]
struct Pollution {
    aqius: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Sample valid AirVisual response
    const VALID_RESPONSE: &str = r#"{
        "status": "success",
        "data": {
            "city": "Sao Paulo",
            "state": "Sao Paulo",
            "country": "Brazil",
            "location": {"type": "Point", "coordinates": [-46.6, -23.5]},
            "current": {
                "pollution": {"ts": "2024-07-15T14:00:00.000Z", "aqius": 57, "mainus": "p2", "aqicn": 20, "maincn": "p2"},
                "weather": {"ts": "2024-07-15T14:00:00.000Z", "tp": 21, "pr": 1018, "hu": 64, "ws": 3.6, "wd": 140, "ic": "04d"}
            }
        }
    }"#;

    const CITY_NOT_FOUND: &str = r#"{"status": "fail", "data": {"message": "city_not_found"}}"#;

    /// Serves each canned `(status line, body)` to one connection, in order
    async fn serve(responses: Vec<(&'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let reply = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{}/v2/city", addr)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
    }

    fn test_client(base_url: String) -> AirQualityClient {
        AirQualityClient::new(&ApiConfig::new(None, Some("test-key".to_string())))
            .with_base_url(base_url)
            .with_retry_policy(fast_retry())
    }

    #[test]
    fn test_parse_valid_response() {
        let aqi = parse_response(VALID_RESPONSE).expect("Failed to parse air quality");
        assert_eq!(aqi, 57);
    }

    #[test]
    fn test_parse_failure_status() {
        match parse_response(CITY_NOT_FOUND) {
            Err(AirQualityError::ApiFailure(message)) => assert_eq!(message, "city_not_found"),
            other => panic!("Expected ApiFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_pollution() {
        let body = r#"{"status": "success", "data": {"current": {"weather": {"tp": 20}}}}"#;
        assert!(matches!(parse_response(body), Err(AirQualityError::ParseError(_))));
    }

    #[test]
    fn test_default_retry_schedule() {
        let waits: Vec<u64> = RetryPolicy::default().waits().map(|w| w.as_secs()).collect();
        assert_eq!(waits, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_retry_schedule_empty_when_initial_exceeds_max() {
        let policy = RetryPolicy::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(policy.waits().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = AirQualityClient::new(&ApiConfig::default());
        let result = client.aqi("Sao Paulo", "Sao Paulo", "Brazil").await;
        assert!(matches!(result, Err(AirQualityError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve(vec![("200 OK", VALID_RESPONSE)]).await;
        let aqi = test_client(url).aqi("Sao Paulo", "Sao Paulo", "Brazil").await;
        assert_eq!(aqi.unwrap(), 57);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let url = serve(vec![
            ("429 Too Many Requests", r#"{"status":"fail","data":{"message":"call_limit_reached"}}"#),
            ("200 OK", VALID_RESPONSE),
        ])
        .await;

        let aqi = test_client(url).aqi("Sao Paulo", "Sao Paulo", "Brazil").await;
        assert_eq!(aqi.unwrap(), 57);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_schedule() {
        let limited = ("429 Too Many Requests", r#"{"status":"fail","data":{}}"#);
        // fast_retry allows two retries, so three 429s exhaust it
        let url = serve(vec![limited, limited, limited]).await;

        let result = test_client(url).aqi("Sao Paulo", "Sao Paulo", "Brazil").await;
        assert!(matches!(result, Err(AirQualityError::RateLimited)));
    }

    #[tokio::test]
    async fn test_http_error_reports_api_message() {
        let url = serve(vec![("400 Bad Request", CITY_NOT_FOUND)]).await;

        match test_client(url).aqi("Atlantis", "Nowhere", "Brazil").await {
            Err(AirQualityError::ApiFailure(message)) => assert_eq!(message, "city_not_found"),
            other => panic!("Expected ApiFailure, got {:?}", other),
        }
    }
}
