//! Explicit configuration for the API clients
//!
//! Keys are resolved once at startup (flags, environment, `.env`) and handed to
//! each client constructor. Nothing below the CLI layer reads the environment.

/// Credentials for the third-party APIs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfig {
    /// WeatherAPI key
    pub weather_key: Option<String>,
    /// AirVisual (IQAir) key
    pub airvisual_key: Option<String>,
}

impl ApiConfig {
    pub fn new(weather_key: Option<String>, airvisual_key: Option<String>) -> Self {
        Self {
            weather_key: non_empty(weather_key),
            airvisual_key: non_empty(airvisual_key),
        }
    }
}

/// Treats blank keys (e.g. `WEATHER_KEY=` in a `.env`) as absent
fn non_empty(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}
