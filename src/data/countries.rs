//! REST Countries client with fuzzy name matching
//!
//! Country names in the rental database do not always match the names used by
//! `restcountries.com` ("Brasil", "Korea, Republic of"). The whole country list
//! is downloaded once per client and each query is matched against every common
//! and official name.

use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Endpoint returning every country with only the fields we use
const REST_COUNTRIES_URL: &str =
    "https://restcountries.com/v3.1/all?fields=name,population,continents";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum similarity (0-100) for a name to count as a match
pub const MATCH_SCORE_CUTOFF: f64 = 70.0;

/// Errors that can occur when looking up country data
#[derive(Debug, Error)]
pub enum CountryError {
    /// HTTP request failed or returned an error status
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// No country name scored above the cutoff
    #[error("No close match for country '{0}'")]
    NotFound(String),

    /// The matched country lacks the requested field
    #[error("No {field} listed for '{country}'")]
    MissingField { country: String, field: &'static str },
}

/// Country record from REST Countries
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Country {
    pub name: CountryName,
    #[serde(default)]
    pub population: Option<u64>,
    #[serde(default)]
    pub continents: Vec<String>,
}

/// Common and official names of a country
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountryName {
    pub common: String,
    #[serde(default)]
    pub official: Option<String>,
}

impl Country {
    /// Common name followed by the official name, when present
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.common.as_str()).chain(self.name.official.as_deref())
    }
}

/// Client for REST Countries lookups
#[derive(Debug, Clone)]
pub struct CountriesClient {
    client: Client,
    url: String,
    countries: OnceCell<Vec<Country>>,
}

impl Default for CountriesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CountriesClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            url: REST_COUNTRIES_URL.to_string(),
            countries: OnceCell::new(),
        }
    }

    /// Creates a client that never hits the network and matches against `countries`
    pub fn with_countries(countries: Vec<Country>) -> Self {
        Self {
            client: Client::new(),
            url: REST_COUNTRIES_URL.to_string(),
            countries: OnceCell::new_with(Some(countries)),
        }
    }

    /// Returns the full country list, downloading it on first use
    async fn all_countries(&self) -> Result<&[Country], CountryError> {
        self.countries
            .get_or_try_init(|| self.fetch_all())
            .await
            .map(Vec::as_slice)
    }

    async fn fetch_all(&self) -> Result<Vec<Country>, CountryError> {
        debug!("Downloading country list from {}", self.url);
        let text = self
            .client
            .get(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Finds the country whose name best matches `name`
    pub async fn find(&self, name: &str) -> Result<Country, CountryError> {
        let countries = self.all_countries().await?;
        best_match(countries, name)
            .cloned()
            .ok_or_else(|| CountryError::NotFound(name.to_string()))
    }

    /// Population of the country best matching `name`
    pub async fn population(&self, name: &str) -> Result<u64, CountryError> {
        let country = self.find(name).await?;
        country.population.ok_or(CountryError::MissingField {
            country: country.name.common,
            field: "population",
        })
    }

    /// First continent listed for the country best matching `name`
    pub async fn continent(&self, name: &str) -> Result<String, CountryError> {
        let country = self.find(name).await?;
        country
            .continents
            .into_iter()
            .next()
            .ok_or(CountryError::MissingField {
                country: country.name.common,
                field: "continent",
            })
    }
}

/// Picks the country with the highest-scoring name at or above the cutoff
///
/// Ties keep the earlier country.
pub fn best_match<'a>(countries: &'a [Country], query: &str) -> Option<&'a Country> {
    let mut best: Option<(&Country, f64)> = None;

    for country in countries {
        for name in country.names() {
            let score = similarity(query, name);
            if score < MATCH_SCORE_CUTOFF {
                continue;
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((country, score));
            }
        }
    }

    if let Some((country, score)) = best {
        debug!("Matched '{}' to '{}' ({:.1})", query, country.name.common, score);
    }
    best.map(|(country, _)| country)
}

/// Weight applied to token-based scores
const TOKEN_SCALE: f64 = 0.95;

/// Similarity of two names on a 0-100 scale
///
/// A weighted ratio in the style of rapidfuzz's `WRatio`. Both names are
/// lowercased and stripped of punctuation. Names of similar length are compared
/// whole and by their words (sorted, and as sets). When one name is at least
/// half again as long as the other, the shorter one is also compared against
/// every same-length window of the longer, so "Vatican City State" scores
/// high against "Holy See (Vatican City State)".
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (len_a, len_b) = (a.chars().count() as f64, b.chars().count() as f64);
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);
    let plain = ratio(&a, &b);

    if len_ratio < 1.5 {
        let tokens = token_sort_ratio(&a, &b).max(token_set_ratio(&a, &b));
        return plain.max(tokens * TOKEN_SCALE);
    }

    let partial_scale = if len_ratio <= 8.0 { 0.9 } else { 0.6 };
    plain
        .max(partial_ratio(&a, &b) * partial_scale)
        .max(partial_token_ratio(&a, &b) * TOKEN_SCALE * partial_scale)
}

/// Lowercase words separated by single spaces
fn normalize(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_words(a), &sorted_words(b))
}

/// Compares the shared words against each name's shared-plus-own words
///
/// A name whose words are all contained in the other scores 100.
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let words_a: BTreeSet<&str> = a.split_whitespace().collect();
    let words_b: BTreeSet<&str> = b.split_whitespace().collect();

    let common: Vec<&str> = words_a.intersection(&words_b).copied().collect();
    let only_a: Vec<&str> = words_a.difference(&words_b).copied().collect();
    let only_b: Vec<&str> = words_b.difference(&words_a).copied().collect();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let common = common.join(" ");
    let with_a = join_words(&common, &only_a);
    let with_b = join_words(&common, &only_b);

    ratio(&common, &with_a)
        .max(ratio(&common, &with_b))
        .max(ratio(&with_a, &with_b))
}

fn join_words(common: &str, rest: &[&str]) -> String {
    if common.is_empty() {
        rest.join(" ")
    } else {
        format!("{} {}", common, rest.join(" "))
    }
}

/// Best ratio of the shorter name against any same-length window of the longer
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let longer: Vec<char> = longer.chars().collect();
    let width = shorter.chars().count();

    longer
        .windows(width)
        .map(|window| ratio(shorter, &window.iter().collect::<String>()))
        .fold(0.0, f64::max)
}

/// Any shared word scores 100, otherwise the partial ratio of the sorted words
fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let words_a: BTreeSet<&str> = a.split_whitespace().collect();
    let words_b: BTreeSet<&str> = b.split_whitespace().collect();

    if !words_a.is_disjoint(&words_b) {
        return 100.0;
    }
    partial_ratio(&sorted_words(a), &sorted_words(b))
}

fn sorted_words(s: &str) -> String {
    let mut words: Vec<&str> = s.split_whitespace().collect();
    words.sort_unstable();
    words.join(" ")
}
