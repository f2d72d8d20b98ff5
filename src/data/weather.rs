//! WeatherAPI client
//!
//! This module fetches the current temperature of a city from WeatherAPI
//! (`api.weatherapi.com`) and parses it out of the JSON response.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;

/// Base URL for the WeatherAPI current conditions endpoint
const WEATHER_API_BASE_URL: &str = "https://api.weatherapi.com/v1/current.json";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed or returned an error status
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// No WeatherAPI key was configured
    #[error("No WeatherAPI key configured (set WEATHER_KEY)")]
    MissingApiKey,
}

/// Client for fetching current conditions from WeatherAPI
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    language: String,
}

impl WeatherClient {
    /// Create a new WeatherClient from the API configuration
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.weather_key.clone(),
            base_url: WEATHER_API_BASE_URL.to_string(),
            language: "pt".to_string(),
        }
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the current temperature for a city
    ///
    /// # Arguments
    /// * `city` - City name as stored in the rental database
    ///
    /// # Returns
    /// * `Ok(f64)` - Current temperature in Celsius
    /// * `Err(WeatherError)` - If no key is configured, or the request or parsing fails
    pub async fn current_temperature(&self, city: &str) -> Result<f64, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", api_key), ("q", city), ("lang", self.language.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;

        parse_temperature(&text)
    }
}

/// Extract `current.temp_c` from a WeatherAPI response body
fn parse_temperature(body: &str) -> Result<f64, WeatherError> {
    let response: WeatherApiResponse = serde_json::from_str(body)?;
    Ok(response.current.temp_c)
}

/// WeatherAPI response structure
#[derive(Debug, Deserialize)]
struct WeatherApiResponse {
    current: CurrentConditions,
}

/// Current conditions block; only the temperature is used
#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp_c: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample valid WeatherAPI response
    const VALID_RESPONSE: &str = r#"{
        "location": {
            "name": "Cajuru",
            "region": "Sao Paulo",
            "country": "Brazil",
            "lat": -21.28,
            "lon": -47.3,
            "tz_id": "America/Sao_Paulo",
            "localtime": "2024-07-15 14:00"
        },
        "current": {
            "last_updated": "2024-07-15 13:45",
            "temp_c": 23.4,
            "temp_f": 74.1,
            "is_day": 1,
            "condition": {
                "text": "Parcialmente nublado",
                "code": 1003
            },
            "wind_kph": 11.2,
            "humidity": 48
        }
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let temperature = parse_temperature(VALID_RESPONSE).expect("Failed to parse temperature");
        assert!((temperature - 23.4).abs() < 0.01);
    }

    #[test]
    fn test_parse_negative_integer_temperature() {
        let body = r#"{"current": {"temp_c": -4}}"#;
        let temperature = parse_temperature(body).expect("Failed to parse temperature");
        assert!((temperature + 4.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_missing_current() {
        let body = r#"{"error": {"code": 1006, "message": "No matching location found."}}"#;
        assert!(matches!(parse_temperature(body), Err(WeatherError::ParseError(_))));
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(parse_temperature("{ invalid json }").is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = WeatherClient::new(&ApiConfig::default());
        let result = client.current_temperature("Cajuru").await;
        assert!(matches!(result, Err(WeatherError::MissingApiKey)));
    }

    #[test]
    fn test_weather_client_defaults() {
        let client = WeatherClient::new(&ApiConfig::new(Some("k".to_string()), None));
        assert_eq!(client.base_url, WEATHER_API_BASE_URL);
        assert_eq!(client.language, "pt");
        assert_eq!(client.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_weather_client_with_base_url() {
        let client = WeatherClient::new(&ApiConfig::default()).with_base_url("http://localhost:1");
        assert_eq!(client.base_url, "http://localhost:1");
    }
}
