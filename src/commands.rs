//! Report runners behind each CLI subcommand
//!
//! Each report loads its query rows, annotates them through the `Enricher`,
//! runs the matching aggregate from `analysis` and renders plain-text tables.
//! The cache snapshot is saved once a report finishes (after every row for
//! `cached-aqi`).

use chrono::{Local, NaiveDateTime};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::analysis::{self, Annotated, CustomerClimate};
use crate::cache::{CacheError, CacheStore, TIMESTAMP_FORMAT};
use crate::cli::{CacheCommand, Command, RunConfig};
use crate::data::{
    load_rows, CityCustomers, CityFilmRentals, CityLocation, CityRentalDuration, CityRevenue,
    CountryRentals, CountryRevenue, CustomerProfile, RowsError,
};
use crate::enrich::Enricher;

/// Errors that can stop a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Rows(#[from] RowsError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Runs `command` and prints its report to stdout
pub async fn run(command: &Command, config: &RunConfig) -> Result<(), CommandError> {
    let mut enricher = Enricher::new(&config.api, config.cache_path.clone())?;
    let limit = config.limit;

    let output = match command {
        Command::Cache(cache_command) => {
            let now = Local::now().naive_local();
            print!("{}", cache_report(cache_command, enricher.cache(), now));
            return Ok(());
        }
        Command::Temperature(args) => temperature(&mut enricher, report_rows(&args.rows, limit)?).await,
        Command::MildRevenue(args) => mild_revenue(&mut enricher, report_rows(&args.rows, limit)?).await,
        Command::Cinephiles { rows: args, top } => {
            cinephiles(&mut enricher, report_rows(&args.rows, limit)?, *top).await
        }
        Command::Polluted {
            rows: args,
            threshold,
            films,
            top_films,
        } => {
            let films: Option<Vec<CityFilmRentals>> = match films {
                Some(path) => Some(report_rows(path, None)?),
                None => None,
            };
            let cities = report_rows(&args.rows, limit)?;
            polluted(&mut enricher, cities, *threshold, films.as_deref(), *top_films).await
        }
        Command::Critical(args) => critical(&mut enricher, report_rows(&args.rows, limit)?).await,
        Command::ContinentRevenue(args) => {
            continent_revenue(&mut enricher, report_rows(&args.rows, limit)?).await
        }
        Command::RentalDuration(args) => {
            rental_duration(&mut enricher, report_rows(&args.rows, limit)?).await
        }
        Command::ClimateProfile(args) => {
            climate_profile(&mut enricher, report_rows(&args.rows, limit)?).await
        }
        Command::Alerts(args) => alerts(&mut enricher, report_rows(&args.rows, limit)?).await,
        Command::CachedAqi(args) => cached_aqi(&mut enricher, report_rows(&args.rows, limit)?).await?,
    };

    enricher.save()?;
    info!("Cache saved to {}", enricher.cache_path().display());
    print!("{}", output);
    Ok(())
}

fn report_rows<T: serde::de::DeserializeOwned>(path: &Path, limit: Option<usize>) -> Result<Vec<T>, RowsError> {
    let rows = load_rows(path, limit)?;
    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Customer temperature report
pub async fn temperature(enricher: &mut Enricher, rows: Vec<CityCustomers>) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let temperature = enricher.temperature(&row.city).await;
        annotated.push(Annotated::new(row, temperature));
    }

    let mut out = section("Current temperature per city");
    out.push_str(&render_table(
        &["city", "customers", "temperature_c"],
        annotated
            .iter()
            .map(|r| vec![r.row.city.clone(), r.row.num_customers.to_string(), opt_f64(r.value, 1)])
            .collect(),
    ));

    out.push_str(&section("Weighted mean temperature by customer count"));
    match analysis::weighted_mean_temperature(&annotated) {
        Some(mean) => writeln!(out, "Weighted mean temperature: {:.2} °C", mean).ok(),
        None => writeln!(out, "Weighted mean temperature: not available").ok(),
    };

    if let Some(h) = analysis::temperature_highlights(&annotated) {
        out.push_str(&section("Highlights"));
        writeln!(
            out,
            "Hottest city: {} at {} °C with {} customers",
            h.hottest.row.city,
            opt_f64(h.hottest.value, 1),
            h.hottest.row.num_customers
        )
        .ok();
        writeln!(
            out,
            "Coldest city: {} at {} °C with {} customers",
            h.coldest.row.city,
            opt_f64(h.coldest.value, 1),
            h.coldest.row.num_customers
        )
        .ok();
        writeln!(
            out,
            "Most customers: {} with {} customers at {} °C",
            h.most_customers.row.city,
            h.most_customers.row.num_customers,
            opt_f64(h.most_customers.value, 1)
        )
        .ok();
    }
    out
}

/// Mild-climate revenue report
pub async fn mild_revenue(enricher: &mut Enricher, rows: Vec<CityRevenue>) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let temperature = enricher.temperature(&row.city).await;
        annotated.push(Annotated::new(row, temperature));
    }

    let table = |rows: &[&Annotated<CityRevenue, f64>]| {
        render_table(
            &["city", "gross_revenue", "temperature_c"],
            rows.iter()
                .map(|r| vec![r.row.city.clone(), format!("{:.2}", r.row.gross_revenue), opt_f64(r.value, 1)])
                .collect(),
        )
    };

    let mild = analysis::mild_climate(&annotated);
    let mut out = section("Gross revenue and temperature per city");
    out.push_str(&table(&annotated.iter().collect::<Vec<_>>()));
    out.push_str(&section(&format!(
        "Cities with a mild climate ({}-{} °C)",
        analysis::MILD_MIN_TEMPERATURE,
        analysis::MILD_MAX_TEMPERATURE
    )));
    out.push_str(&table(&mild));
    writeln!(
        out,
        "\nTotal revenue from mild-climate cities: {:.2}",
        analysis::total_revenue(mild)
    )
    .ok();
    out
}

/// Rentals per thousand inhabitants report
pub async fn cinephiles(enricher: &mut Enricher, rows: Vec<CountryRentals>, top: usize) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let population = enricher.population(&row.country).await;
        annotated.push(Annotated::new(row, population));
    }

    let mut out = section("Rentals per thousand inhabitants");
    out.push_str(&render_table(
        &["country", "total_rentals", "population", "rentals_per_1000"],
        annotated
            .iter()
            .map(|r| {
                vec![
                    r.row.country.clone(),
                    r.row.total_rentals.to_string(),
                    opt(r.value),
                    opt_f64(analysis::rentals_per_thousand(r), 5),
                ]
            })
            .collect(),
    ));

    out.push_str(&section(&format!("Top {} cinephile countries", top)));
    for (row, rate) in analysis::top_cinephiles(&annotated, top) {
        writeln!(
            out,
            "- {}: population = {}, rentals per thousand inhabitants = {:.5}",
            row.row.country,
            opt(row.value),
            rate
        )
        .ok();
    }
    out
}

/// Polluted cities report, optionally with the most-rented films of those cities
pub async fn polluted(
    enricher: &mut Enricher,
    rows: Vec<CityLocation>,
    threshold: u32,
    films: Option<&[CityFilmRentals]>,
    top_films: usize,
) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let aqi = enricher.aqi(&row.city, &row.district, &row.country).await;
        annotated.push(Annotated::new(row, aqi));
    }

    let table = |rows: &[&Annotated<CityLocation, u32>]| {
        render_table(
            &["city", "district", "country", "customers", "aqi"],
            rows.iter()
                .map(|r| {
                    vec![
                        r.row.city.clone(),
                        r.row.district.clone(),
                        r.row.country.clone(),
                        opt(r.row.num_customers),
                        opt(r.value),
                    ]
                })
                .collect(),
        )
    };

    let mut out = section("AQI per city");
    out.push_str(&table(&annotated.iter().collect::<Vec<_>>()));
    let polluted = analysis::above_aqi(&annotated, threshold);
    out.push_str(&section(&format!("Cities with AQI above {}", threshold)));
    out.push_str(&table(&polluted));

    if let Some(films) = films {
        out.push_str(&section(&format!("Most rented films in cities with AQI above {}", threshold)));
        out.push_str(&render_table(
            &["film", "city", "rentals"],
            analysis::films_in_cities(films, &polluted, top_films)
                .into_iter()
                .map(|f| vec![f.film.clone(), f.city.clone(), f.rentals.to_string()])
                .collect(),
        ));
    }
    out
}

/// Critical-area customers report
pub async fn critical(enricher: &mut Enricher, rows: Vec<CustomerProfile>) -> String {
    let customers = with_climate(enricher, rows).await;

    let mut out = section("Customers with temperature and AQI");
    out.push_str(&climate_table(&customers.iter().collect::<Vec<_>>()));

    out.push_str(&section(&format!(
        "Customers in critical areas (AQI above {})",
        analysis::ATTENTION_AQI
    )));
    out.push_str(&render_table(
        &["name", "city", "country", "aqi", "classification"],
        analysis::critical_customers(&customers)
            .into_iter()
            .map(|(c, zone)| {
                vec![
                    c.profile.name.clone(),
                    c.profile.city.clone(),
                    c.profile.country.clone(),
                    opt(c.aqi),
                    zone.to_string(),
                ]
            })
            .collect(),
    ));
    out
}

/// Revenue by continent report
pub async fn continent_revenue(enricher: &mut Enricher, rows: Vec<CountryRevenue>) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let continent = enricher.continent(&row.country).await;
        annotated.push(Annotated::new(row, continent));
    }

    let mut out = section("Revenue and continent per country");
    out.push_str(&render_table(
        &["country", "amount", "continent"],
        annotated
            .iter()
            .map(|r| vec![r.row.country.clone(), format!("{:.2}", r.row.amount), opt(r.value.as_ref())])
            .collect(),
    ));

    let grouped = analysis::revenue_by_continent(&annotated);
    let shares = analysis::revenue_shares(&grouped);
    out.push_str(&section("Revenue by continent"));
    out.push_str(&render_table(
        &["continent", "total_amount", "share"],
        grouped
            .iter()
            .zip(shares)
            .map(|(g, (_, share))| {
                vec![g.continent.clone(), format!("{:.2}", g.total_amount), format!("{:.1}%", share)]
            })
            .collect(),
    ));
    out
}

/// Rental duration vs temperature report
pub async fn rental_duration(enricher: &mut Enricher, rows: Vec<CityRentalDuration>) -> String {
    let mut annotated = Vec::with_capacity(rows.len());
    for row in rows {
        let temperature = enricher.temperature(&row.city).await;
        annotated.push(Annotated::new(row, temperature));
    }

    let mut out = section("Average rental duration and temperature per city");
    out.push_str(&render_table(
        &["city", "avg_rental_days", "temperature_c"],
        annotated
            .iter()
            .map(|r| vec![r.row.city.clone(), format!("{:.2}", r.row.avg_rental_days), opt_f64(r.value, 1)])
            .collect(),
    ));

    out.push_str(&section("Correlation between temperature and rental duration"));
    match analysis::duration_temperature_correlation(&annotated) {
        Some(c) => {
            writeln!(out, "Pearson r = {:.2} over {} cities", c.r, c.points).ok();
            writeln!(
                out,
                "Trend: avg_rental_days = {:.3} * temperature_c + {:.3}",
                c.slope, c.intercept
            )
            .ok();
        }
        None => {
            writeln!(out, "Not enough data to correlate").ok();
        }
    }
    out
}

/// Climate profile by age band report
pub async fn climate_profile(enricher: &mut Enricher, rows: Vec<CustomerProfile>) -> String {
    let customers = with_climate(enricher, rows).await;

    let mut out = section("Customer climate profiles");
    out.push_str(&climate_table(&customers.iter().collect::<Vec<_>>()));

    out.push_str(&section("Averages by age band"));
    out.push_str(&render_table(
        &["age_band", "customers", "mean_temperature", "mean_aqi", "mean_rentals", "mean_spent"],
        analysis::profile_by_age_band(&customers)
            .into_iter()
            .map(|p| {
                vec![
                    p.band.label().to_string(),
                    p.customers.to_string(),
                    opt_f64(p.mean_temperature, 1),
                    opt_f64(p.mean_aqi, 1),
                    opt_f64(p.mean_rentals, 1),
                    opt_f64(p.mean_spent, 2),
                ]
            })
            .collect(),
    ));
    out
}

/// Alerts report
pub async fn alerts(enricher: &mut Enricher, rows: Vec<CustomerProfile>) -> String {
    let customers = with_climate(enricher, rows).await;

    let mut out = section("Customers");
    out.push_str(&climate_table(&customers.iter().collect::<Vec<_>>()));

    out.push_str(&section(&format!(
        "Alerts (temperature below {} °C, AQI above {}, spend above average)",
        analysis::ALERT_MAX_TEMPERATURE,
        analysis::ALERT_MIN_AQI
    )));
    out.push_str(&climate_table(&analysis::alerts(&customers)));
    out
}

/// AQI per city through the cache, saving the snapshot after every city
pub async fn cached_aqi(
    enricher: &mut Enricher,
    rows: Vec<CityLocation>,
) -> Result<String, CommandError> {
    let mut out = section("AQI per city (cached)");
    for row in rows {
        let aqi = enricher.aqi(&row.city, &row.district, &row.country).await;
        enricher.save()?;
        writeln!(out, "Result for {}: {}", row.city, opt(aqi)).ok();
    }
    Ok(out)
}

/// Renders `cache show` or `cache get` against a loaded store
pub fn cache_report(command: &CacheCommand, store: &CacheStore, now: NaiveDateTime) -> String {
    match command {
        CacheCommand::Show => {
            let mut out = render_table(
                &["key", "result", "timestamp", "age_h", "status"],
                store
                    .iter()
                    .map(|(key, entry)| {
                        let age = (now - entry.fetched_at).num_minutes() as f64 / 60.0;
                        vec![
                            key.to_string(),
                            entry.result.clone(),
                            entry.fetched_at.format(TIMESTAMP_FORMAT).to_string(),
                            format!("{:.1}", age),
                            if entry.is_fresh(now) { "fresh" } else { "expired" }.to_string(),
                        ]
                    })
                    .collect(),
            );
            writeln!(out, "{} entries", store.len()).ok();
            out
        }
        CacheCommand::Get { key } => match store.get(key, now) {
            Some(result) => format!("{}\n", result),
            None => "no data\n".to_string(),
        },
    }
}

async fn with_climate(enricher: &mut Enricher, rows: Vec<CustomerProfile>) -> Vec<CustomerClimate> {
    let mut customers = Vec::with_capacity(rows.len());
    for profile in rows {
        let temperature = enricher.temperature(&profile.city).await;
        let aqi = enricher
            .aqi(&profile.city, &profile.district, &profile.country)
            .await;
        customers.push(CustomerClimate {
            profile,
            temperature,
            aqi,
        });
    }
    customers
}

fn climate_table(rows: &[&CustomerClimate]) -> String {
    render_table(
        &["name", "city", "country", "age", "rentals", "spent", "temperature_c", "aqi"],
        rows.iter()
            .map(|c| {
                vec![
                    c.profile.name.clone(),
                    c.profile.city.clone(),
                    c.profile.country.clone(),
                    opt(c.profile.age),
                    c.profile.total_rentals.to_string(),
                    format!("{:.2}", c.profile.total_spent),
                    opt_f64(c.temperature, 1),
                    opt(c.aqi),
                ]
            })
            .collect(),
    )
}

fn section(title: &str) -> String {
    format!("\n{}\n{}\n", title, "=".repeat(title.chars().count()))
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn opt_f64(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", decimals, v))
}

/// Left-aligned plain-text table with a dashed rule under the header
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = table_line(headers.iter().copied(), &widths);
    out.push_str(&table_line(rule.iter().map(String::as_str), &widths));
    for row in &rows {
        out.push_str(&table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}
