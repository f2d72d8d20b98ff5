//! Cached per-row lookups
//!
//! The `Enricher` answers the per-row questions the reports ask (temperature,
//! AQI, population, continent) by routing each one through the `CacheStore`.
//! Values are stored as text under namespaced keys such as `temperature:<city>`. A
//! failed lookup is logged and reported as `None` for that row; it is never
//! written to the cache.

use chrono::{Local, NaiveDateTime};
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::cache::{CacheError, CacheStore};
use crate::config::ApiConfig;
use crate::data::{AirQualityClient, CountriesClient, WeatherClient};

/// API clients plus the cache that fronts them
#[derive(Debug)]
pub struct Enricher {
    weather: WeatherClient,
    air_quality: AirQualityClient,
    countries: CountriesClient,
    cache: CacheStore,
    cache_path: PathBuf,
}

impl Enricher {
    /// Builds clients from `config` and loads the cache snapshot at `cache_path`
    pub fn new(config: &ApiConfig, cache_path: PathBuf) -> Result<Self, CacheError> {
        let cache = CacheStore::load(&cache_path)?;
        Ok(Self::with_parts(
            WeatherClient::new(config),
            AirQualityClient::new(config),
            CountriesClient::new(),
            cache,
            cache_path,
        ))
    }

    /// Assembles an enricher from already-built parts
    pub fn with_parts(
        weather: WeatherClient,
        air_quality: AirQualityClient,
        countries: CountriesClient,
        cache: CacheStore,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            weather,
            air_quality,
            countries,
            cache,
            cache_path,
        }
    }

    /// Current temperature of `city` in Celsius
    pub async fn temperature(&mut self, city: &str) -> Option<f64> {
        let weather = &self.weather;
        lookup(&mut self.cache, &format!("temperature:{}", city), || async move {
            weather.current_temperature(city).await.map(|t| t.to_string())
        })
        .await
    }

    /// Current US AQI of `city`
    ///
    /// Cities sharing a name (London, England and London, Ontario) are
    /// cached separately.
    pub async fn aqi(&mut self, city: &str, district: &str, country: &str) -> Option<u32> {
        let air_quality = &self.air_quality;
        lookup(&mut self.cache, &aqi_key(city, district, country), || async move {
            air_quality
                .aqi(city, district, country)
                .await
                .map(|aqi| aqi.to_string())
        })
        .await
    }

    /// Population of the country best matching `country`
    pub async fn population(&mut self, country: &str) -> Option<u64> {
        let countries = &self.countries;
        lookup(&mut self.cache, &format!("population:{}", country), || async move {
            countries.population(country).await.map(|p| p.to_string())
        })
        .await
    }

    /// Continent of the country best matching `country`
    pub async fn continent(&mut self, country: &str) -> Option<String> {
        let countries = &self.countries;
        lookup(&mut self.cache, &format!("continent:{}", country), || async move {
            countries.continent(country).await
        })
        .await
    }

    /// Writes the cache snapshot back to disk
    pub fn save(&self) -> Result<(), CacheError> {
        self.cache.save(&self.cache_path)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

/// Local wall-clock time, the same clock the snapshot timestamps use
fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Cache key of an AQI reading
pub fn aqi_key(city: &str, district: &str, country: &str) -> String {
    format!("aqi:{}|{}|{}", city, district, country)
}

/// Reads `key` from the cache as a `T`, fetching on a miss
///
/// A fresh entry that does not parse as `T` is dropped and fetched again.
/// Fetch failures are logged and yield `None`.
async fn lookup<T, F, Fut, E>(cache: &mut CacheStore, key: &str, fetch: F) -> Option<T>
where
    T: FromStr,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, E>>,
    E: Display,
{
    if let Some(text) = cache.get(key, now()) {
        if let Ok(value) = text.parse() {
            return Some(value);
        }
        warn!("Cached value '{}' for '{}' is not usable, fetching again", text, key);
        cache.remove(key);
    }

    match cache.get_or_fetch_async(key, now(), fetch).await {
        Ok(text) => match text.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Fetched value '{}' for '{}' is not usable", text, key);
                None
            }
        },
        Err(e) => {
            warn!("Lookup for '{}' failed: {}", key, e);
            None
        }
    }
}
