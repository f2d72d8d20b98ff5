//! rentalenrich library
//!
//! Exposes the cache, the API clients, the enrichment layer and the reports
//! for use by the binary and the integration tests.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod enrich;
