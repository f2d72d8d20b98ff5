//! Row models and third-party data clients
//!
//! This module contains the typed rows produced by the rental-database queries
//! and the clients for the weather, air quality and country APIs used to
//! annotate them.

pub mod air_quality;
pub mod countries;
pub mod rows;
pub mod weather;

pub use air_quality::{AirQualityClient, AirQualityError, RetryPolicy};
pub use countries::{CountriesClient, Country, CountryError};
pub use rows::{load_rows, RowsError};
pub use weather::{WeatherClient, WeatherError};

use serde::{Deserialize, Serialize};

/// Customers per city (customers with more than 10 rentals)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCustomers {
    pub city: String,
    pub num_customers: u32,
}

/// Gross revenue collected in a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRevenue {
    pub city: String,
    pub gross_revenue: f64,
}

/// Rentals made by customers of a country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRentals {
    pub country: String,
    pub total_rentals: u64,
}

/// Revenue collected in a country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRevenue {
    pub country: String,
    pub amount: f64,
}

/// Average days between rental and return for a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRentalDuration {
    pub city: String,
    pub avg_rental_days: f64,
}

/// A city with enough location detail for an air quality lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityLocation {
    pub city: String,
    /// State, province or district
    pub district: String,
    pub country: String,
    /// Number of customers living there, when the query reports it
    #[serde(default)]
    pub num_customers: Option<u32>,
}

/// Rentals of a film in a city, most rented first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityFilmRentals {
    pub film: String,
    pub city: String,
    pub rentals: u32,
}

/// A customer with address and consumption totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    pub city: String,
    pub district: String,
    pub country: String,
    /// Age in years, if the query provides one
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub total_rentals: u32,
    #[serde(default)]
    pub total_spent: f64,
}
