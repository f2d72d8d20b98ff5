//! Integration tests for the rentalenrich binary
//!
//! Drives the built binary against temporary cache and rows files. Every
//! lookup is served from a fresh cache so no test touches the network.

use chrono::{Duration, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_rentalenrich"))
        .args(args)
        .env_remove("WEATHER_KEY")
        .env_remove("AIRVISUAL_KEY")
        .output()
        .expect("Failed to execute rentalenrich")
}

/// Writes a cache snapshot whose entries were fetched `age_hours` ago
fn write_cache(dir: &Path, entries: &[(&str, &str)], age_hours: i64) -> PathBuf {
    let fetched = (Local::now().naive_local() - Duration::hours(age_hours))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let mut content = String::from("key,result,timestamp\n");
    for (key, result) in entries {
        content.push_str(&format!("{},{},{}\n", key, result, fetched));
    }
    let path = dir.join("cache.csv");
    fs::write(&path, content).expect("Failed to write cache");
    path
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = stdout(&output);
    assert!(stdout.contains("temperature"), "Help should list the reports");
    assert!(stdout.contains("cache"), "Help should list the cache commands");
}

#[test]
fn test_unknown_command_fails() {
    let output = run_cli(&["forecast"]);
    assert!(!output.status.success(), "Expected unknown command to fail");
}

#[test]
fn test_missing_rows_file_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = temp_dir.path().join("cache.csv");
    let rows = temp_dir.path().join("missing.json");

    let output = run_cli(&[
        "--cache-file",
        cache.to_str().unwrap(),
        "temperature",
        "--rows",
        rows.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.json"), "Should name the rows file: {}", stderr);
}

#[test]
fn test_cache_get_fresh_value() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = write_cache(temp_dir.path(), &[("aqi:Sasebo", "42")], 1);

    let output = run_cli(&["--cache-file", cache.to_str().unwrap(), "cache", "get", "aqi:Sasebo"]);

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "42");
}

#[test]
fn test_cache_get_missing_and_expired_print_no_data() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = write_cache(temp_dir.path(), &[("aqi:Oslo", "3")], 11);
    let before = fs::read_to_string(&cache).unwrap();

    for key in ["aqi:Oslo", "aqi:Lima"] {
        let output = run_cli(&["--cache-file", cache.to_str().unwrap(), "cache", "get", key]);
        assert!(output.status.success());
        assert_eq!(stdout(&output).trim(), "no data");
    }
    assert_eq!(fs::read_to_string(&cache).unwrap(), before, "Lookups must not rewrite the cache");
}

#[test]
fn test_cache_show_lists_entries() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = write_cache(temp_dir.path(), &[("aqi:Sasebo", "42"), ("temperature:Ede", "21.5")], 2);

    let output = run_cli(&["--cache-file", cache.to_str().unwrap(), "cache", "show"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("aqi:Sasebo"));
    assert!(stdout.contains("temperature:Ede"));
    assert!(stdout.contains("fresh"));
    assert!(stdout.contains("2 entries"));
}

#[test]
fn test_temperature_report_from_cache() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = write_cache(
        temp_dir.path(),
        &[("temperature:Aurora", "10"), ("temperature:London", "30")],
        1,
    );
    let rows = temp_dir.path().join("rows.json");
    fs::write(
        &rows,
        r#"[{"city": "Aurora", "num_customers": 3}, {"city": "London", "num_customers": 1}]"#,
    )
    .unwrap();

    let output = run_cli(&[
        "--cache-file",
        cache.to_str().unwrap(),
        "temperature",
        "--rows",
        rows.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Weighted mean temperature: 15.00 °C"));
}

#[test]
fn test_limit_truncates_rows() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache = write_cache(
        temp_dir.path(),
        &[
            ("aqi:Sasebo|Nagasaki|Japan", "42"),
            ("aqi:Ede|Gelderland|Netherlands", "7"),
        ],
        1,
    );
    let rows = temp_dir.path().join("rows.json");
    fs::write(
        &rows,
        r#"[{"city": "Sasebo", "district": "Nagasaki", "country": "Japan"},
            {"city": "Ede", "district": "Gelderland", "country": "Netherlands"}]"#,
    )
    .unwrap();

    let output = run_cli(&[
        "--cache-file",
        cache.to_str().unwrap(),
        "--limit",
        "1",
        "cached-aqi",
        "--rows",
        rows.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Result for Sasebo: 42"));
    assert!(!stdout.contains("Ede"));
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use rentalenrich::cli::{CacheCommand, Cli, Command, RunConfig};

    #[test]
    fn test_cli_cache_show() {
        let cli = Cli::parse_from(["rentalenrich", "cache", "show"]);
        assert_eq!(cli.command, Command::Cache(CacheCommand::Show));
    }

    #[test]
    fn test_cli_rejects_missing_subcommand() {
        assert!(Cli::try_parse_from(["rentalenrich"]).is_err());
    }

    #[test]
    fn test_run_config_uses_cache_file_flag() {
        let cli = Cli::parse_from(["rentalenrich", "--cache-file", "x.csv", "cache", "show"]);
        let config = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(config.cache_path, std::path::PathBuf::from("x.csv"));
        assert_eq!(config.limit, Some(10));
    }
}
