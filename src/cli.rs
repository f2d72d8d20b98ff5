//! Command-line interface parsing for rentalenrich
//!
//! This module handles parsing of CLI arguments using clap: global API keys and
//! cache location, one subcommand per report, and cache inspection commands.

use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ApiConfig;

/// File name of the cache snapshot inside the cache directory
const CACHE_FILE_NAME: &str = "cache.csv";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// No --cache-file was given and no cache directory could be determined
    #[error("Could not determine a cache directory; pass --cache-file")]
    NoCacheDirectory,

    /// A ranking size of zero was requested
    #[error("Invalid --top value: must be at least 1")]
    InvalidTop,
}

/// Enrich movie-rental query results with weather, air quality and country data
#[derive(Parser, Debug)]
#[command(name = "rentalenrich")]
#[command(about = "Enrich movie-rental query results with weather, air quality and country data")]
#[command(version)]
pub struct Cli {
    /// WeatherAPI key
    #[arg(long, env = "WEATHER_KEY", hide_env_values = true, global = true)]
    pub weather_key: Option<String>,

    /// AirVisual (IQAir) key
    #[arg(long, env = "AIRVISUAL_KEY", hide_env_values = true, global = true)]
    pub airvisual_key: Option<String>,

    /// Cache snapshot file (defaults to the user cache directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub cache_file: Option<PathBuf>,

    /// Maximum number of rows to process, like a query LIMIT (0 = all rows)
    #[arg(long, default_value_t = 10, global = true)]
    pub limit: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// The report or cache operation to run
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Weighted mean temperature of the cities of the most active customers
    Temperature(RowsArgs),
    /// Gross revenue from cities with a mild climate (18-24 °C)
    MildRevenue(RowsArgs),
    /// Countries with most rentals per thousand inhabitants
    Cinephiles {
        #[command(flatten)]
        rows: RowsArgs,
        /// How many countries to rank
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Cities whose AQI exceeds a threshold
    Polluted {
        #[command(flatten)]
        rows: RowsArgs,
        /// AQI threshold (exclusive)
        #[arg(long, default_value_t = 150)]
        threshold: u32,
        /// JSON file with the most-rented films per city, to list those of the polluted cities
        #[arg(long, value_name = "FILE")]
        films: Option<PathBuf>,
        /// How many films to list
        #[arg(long, default_value_t = 10)]
        top_films: usize,
    },
    /// Customers living in areas with AQI above 130
    Critical(RowsArgs),
    /// Revenue grouped by continent
    ContinentRevenue(RowsArgs),
    /// Correlation between temperature and average rental duration
    RentalDuration(RowsArgs),
    /// Climate and consumption profile by age band
    ClimateProfile(RowsArgs),
    /// Customers in cold, polluted areas spending above average
    Alerts(RowsArgs),
    /// AQI per city through the cache, saving after every city
    CachedAqi(RowsArgs),
    /// Inspect the cache snapshot without calling any API
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Input rows for a report
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RowsArgs {
    /// JSON file with the query result rows
    #[arg(long, value_name = "FILE")]
    pub rows: PathBuf,
}

/// Cache inspection commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CacheCommand {
    /// List every entry with its age and freshness
    Show,
    /// Print the fresh value stored under KEY, or "no data"
    Get {
        /// Cache key, e.g. "temperature:Sasebo"
        key: String,
    },
}

/// Configuration derived from CLI arguments for a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Credentials handed to the API clients
    pub api: ApiConfig,
    /// Where the cache snapshot lives
    pub cache_path: PathBuf,
    /// Row limit; `None` processes every row
    pub limit: Option<usize>,
}

/// Default location of the cache snapshot (`~/.cache/rentalenrich/cache.csv` on Linux)
pub fn default_cache_path() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "rentalenrich")?;
    Some(project_dirs.cache_dir().join(CACHE_FILE_NAME))
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with the resolved cache path and keys
    /// * `Err(CliError)` if no cache location can be found or an argument is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if let Command::Cinephiles { top: 0, .. } = cli.command {
            return Err(CliError::InvalidTop);
        }

        let cache_path = match &cli.cache_file {
            Some(path) => path.clone(),
            None => default_cache_path().ok_or(CliError::NoCacheDirectory)?,
        };

        Ok(RunConfig {
            api: ApiConfig::new(cli.weather_key.clone(), cli.airvisual_key.clone()),
            cache_path,
            limit: (cli.limit > 0).then_some(cli.limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parse_report_with_rows() {
        let cli = Cli::parse_from(["rentalenrich", "temperature", "--rows", "cities.json"]);
        assert_eq!(
            cli.command,
            Command::Temperature(RowsArgs {
                rows: PathBuf::from("cities.json")
            })
        );
        assert_eq!(cli.limit, 10);
    }

    #[test]
    fn test_cli_parse_cinephiles_top() {
        let cli = Cli::parse_from(["rentalenrich", "cinephiles", "--rows", "c.json", "--top", "3"]);
        match cli.command {
            Command::Cinephiles { rows, top } => {
                assert_eq!(rows.rows, PathBuf::from("c.json"));
                assert_eq!(top, 3);
            }
            other => panic!("Expected Cinephiles, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_polluted_default_threshold() {
        let cli = Cli::parse_from(["rentalenrich", "polluted", "--rows", "c.json"]);
        assert!(matches!(cli.command, Command::Polluted { threshold: 150, .. }));
    }

    #[test]
    fn test_cli_parse_polluted_with_films() {
        let cli = Cli::parse_from([
            "rentalenrich",
            "polluted",
            "--rows",
            "c.json",
            "--films",
            "films.json",
            "--top-films",
            "3",
        ]);
        match cli.command {
            Command::Polluted { films, top_films, .. } => {
                assert_eq!(films, Some(PathBuf::from("films.json")));
                assert_eq!(top_films, 3);
            }
            other => panic!("Expected Polluted, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_cache_get() {
        let cli = Cli::parse_from(["rentalenrich", "cache", "get", "aqi:Sasebo"]);
        assert_eq!(
            cli.command,
            Command::Cache(CacheCommand::Get {
                key: "aqi:Sasebo".to_string()
            })
        );
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "rentalenrich",
            "cache",
            "show",
            "--cache-file",
            "/tmp/c.csv",
            "--limit",
            "0",
        ]);
        assert_eq!(cli.cache_file.as_deref(), Some(Path::new("/tmp/c.csv")));
        assert_eq!(cli.limit, 0);
    }

    #[test]
    fn test_cli_requires_rows_for_reports() {
        assert!(Cli::try_parse_from(["rentalenrich", "alerts"]).is_err());
    }

    #[test]
    fn test_run_config_from_cli() {
        let cli = Cli::parse_from([
            "rentalenrich",
            "--cache-file",
            "data/cache/aqi.csv",
            "--weather-key",
            "w",
            "--limit",
            "40",
            "cached-aqi",
            "--rows",
            "cities.json",
        ]);
        let config = RunConfig::from_cli(&cli).expect("Config should resolve");

        assert_eq!(config.cache_path, PathBuf::from("data/cache/aqi.csv"));
        assert_eq!(config.api.weather_key.as_deref(), Some("w"));
        assert_eq!(config.limit, Some(40));
    }

    #[test]
    fn test_run_config_zero_limit_means_all() {
        let cli = Cli::parse_from([
            "rentalenrich",
            "--cache-file",
            "c.csv",
            "--limit",
            "0",
            "cache",
            "show",
        ]);
        let config = RunConfig::from_cli(&cli).unwrap();
        assert!(config.limit.is_none());
    }

    #[test]
    fn test_run_config_rejects_zero_top() {
        let cli = Cli::parse_from([
            "rentalenrich",
            "--cache-file",
            "c.csv",
            "cinephiles",
            "--rows",
            "c.json",
            "--top",
            "0",
        ]);
        assert!(matches!(RunConfig::from_cli(&cli), Err(CliError::InvalidTop)));
    }

    #[test]
    fn test_default_cache_path_names_project() {
        if let Some(path) = default_cache_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("rentalenrich"));
            assert!(path_str.ends_with("cache.csv"));
        }
        // Test passes if no home directory is available (e.g. CI)
    }
}
