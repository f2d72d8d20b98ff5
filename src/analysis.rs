//! Aggregates computed over enriched rows
//!
//! Every function here is pure: rows come in already annotated with their
//! temperature, AQI, population or continent (`None` where the lookup failed)
//! and the function filters, ranks or summarises them.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::data::{
    CityCustomers, CityFilmRentals, CityLocation, CityRentalDuration, CityRevenue, CountryRentals,
    CountryRevenue, CustomerProfile,
};

/// Lower bound (inclusive) of the mild-climate band, in Celsius
pub const MILD_MIN_TEMPERATURE: f64 = 18.0;

/// Upper bound (inclusive) of the mild-climate band, in Celsius
pub const MILD_MAX_TEMPERATURE: f64 = 24.0;

/// AQI above which a city counts as polluted
pub const POLLUTED_AQI: u32 = 150;

/// AQI above which a customer's area needs attention
pub const ATTENTION_AQI: u32 = 130;

/// Alert thresholds: colder than this
pub const ALERT_MAX_TEMPERATURE: f64 = 15.0;

/// Alert thresholds: AQI above this
pub const ALERT_MIN_AQI: u32 = 100;

/// A row paired with the value looked up for it
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated<R, V> {
    pub row: R,
    pub value: Option<V>,
}

impl<R, V> Annotated<R, V> {
    pub fn new(row: R, value: Option<V>) -> Self {
        Self { row, value }
    }
}

/// A customer with both climate readings
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerClimate {
    pub profile: CustomerProfile,
    pub temperature: Option<f64>,
    pub aqi: Option<u32>,
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Like `Iterator::max_by`, but ties keep the earliest element
fn first_max_by<'a, T>(
    items: impl Iterator<Item = &'a T>,
    mut cmp: impl FnMut(&T, &T) -> Ordering,
) -> Option<&'a T>
where
    T: 'a,
{
    items.fold(None, |best, item| match best {
        Some(b) if cmp(item, b) != Ordering::Greater => Some(b),
        _ => Some(item),
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

// ---------------------------------------------------------------------------
// Customer temperature
// ---------------------------------------------------------------------------

/// Mean temperature weighted by customer count
///
/// Rows without a temperature are left out of both the numerator and the
/// weights. Returns `None` when no weighted row remains.
pub fn weighted_mean_temperature(rows: &[Annotated<CityCustomers, f64>]) -> Option<f64> {
    let (weighted, weights) = rows
        .iter()
        .filter_map(|r| r.value.map(|t| (t, f64::from(r.row.num_customers))))
        .fold((0.0, 0.0), |(sum, total), (t, n)| (sum + t * n, total + n));

    (weights > 0.0).then(|| weighted / weights)
}

/// Cities standing out in the temperature report
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureHighlights<'a> {
    pub hottest: &'a Annotated<CityCustomers, f64>,
    pub coldest: &'a Annotated<CityCustomers, f64>,
    pub most_customers: &'a Annotated<CityCustomers, f64>,
}

/// Hottest and coldest city (among those with a temperature) and the city with most customers
pub fn temperature_highlights(
    rows: &[Annotated<CityCustomers, f64>],
) -> Option<TemperatureHighlights<'_>> {
    let with_temperature = || rows.iter().filter(|r| r.value.is_some());
    let by_temperature = |a: &Annotated<CityCustomers, f64>, b: &Annotated<CityCustomers, f64>| {
        cmp_f64(a.value.unwrap_or_default(), b.value.unwrap_or_default())
    };

    let hottest = first_max_by(with_temperature(), by_temperature)?;
    let coldest = with_temperature().min_by(|a, b| by_temperature(*a, *b))?;
    let most_customers = first_max_by(rows.iter(), |a, b| {
        a.row.num_customers.cmp(&b.row.num_customers)
    })?;

    Some(TemperatureHighlights {
        hottest,
        coldest,
        most_customers,
    })
}

// ---------------------------------------------------------------------------
// Mild-climate revenue
// ---------------------------------------------------------------------------

/// Cities whose temperature lies within the mild band (inclusive)
pub fn mild_climate(rows: &[Annotated<CityRevenue, f64>]) -> Vec<&Annotated<CityRevenue, f64>> {
    rows.iter()
        .filter(|r| {
            r.value
                .is_some_and(|t| (MILD_MIN_TEMPERATURE..=MILD_MAX_TEMPERATURE).contains(&t))
        })
        .collect()
}

pub fn total_revenue<'a>(rows: impl IntoIterator<Item = &'a Annotated<CityRevenue, f64>>) -> f64 {
    rows.into_iter().map(|r| r.row.gross_revenue).sum()
}

// ---------------------------------------------------------------------------
// Cinephile countries
// ---------------------------------------------------------------------------

/// Rentals per thousand inhabitants; `None` without a (non-zero) population
pub fn rentals_per_thousand(row: &Annotated<CountryRentals, u64>) -> Option<f64> {
    row.value
        .filter(|&population| population > 0)
        .map(|population| row.row.total_rentals as f64 / population as f64 * 1000.0)
}

/// The `n` countries with most rentals per thousand inhabitants, highest first
pub fn top_cinephiles(
    rows: &[Annotated<CountryRentals, u64>],
    n: usize,
) -> Vec<(&Annotated<CountryRentals, u64>, f64)> {
    let mut ranked: Vec<_> = rows
        .iter()
        .filter_map(|r| rentals_per_thousand(r).map(|rate| (r, rate)))
        .collect();
    ranked.sort_by(|a, b| cmp_f64(b.1, a.1));
    ranked.truncate(n);
    ranked
}

// ---------------------------------------------------------------------------
// Polluted cities and critical customers
// ---------------------------------------------------------------------------

/// Cities with an AQI strictly above `threshold`; rows without AQI are dropped
pub fn above_aqi(
    rows: &[Annotated<CityLocation, u32>],
    threshold: u32,
) -> Vec<&Annotated<CityLocation, u32>> {
    rows.iter()
        .filter(|r| r.value.is_some_and(|aqi| aqi > threshold))
        .collect()
}

/// Film rentals from the given cities, keeping the input order, at most `limit` rows
pub fn films_in_cities<'a>(
    films: &'a [CityFilmRentals],
    cities: &[&Annotated<CityLocation, u32>],
    limit: usize,
) -> Vec<&'a CityFilmRentals> {
    let names: HashSet<&str> = cities.iter().map(|c| c.row.city.as_str()).collect();
    films
        .iter()
        .filter(|f| names.contains(f.city.as_str()))
        .take(limit)
        .collect()
}

/// Environmental classification of a customer's area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Attention,
    Safe,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Attention => write!(f, "attention zone"),
            Zone::Safe => write!(f, "safe"),
        }
    }
}

pub fn classify_zone(aqi: u32) -> Zone {
    if aqi > ATTENTION_AQI {
        Zone::Attention
    } else {
        Zone::Safe
    }
}

/// Customers living where the AQI exceeds the attention threshold, with their zone
pub fn critical_customers(rows: &[CustomerClimate]) -> Vec<(&CustomerClimate, Zone)> {
    rows.iter()
        .filter_map(|r| r.aqi.filter(|&aqi| aqi > ATTENTION_AQI).map(|aqi| (r, classify_zone(aqi))))
        .collect()
}

// ---------------------------------------------------------------------------
// Revenue by continent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ContinentRevenue {
    pub continent: String,
    pub total_amount: f64,
}

/// Sums revenue per continent, largest first; rows without a continent are skipped
pub fn revenue_by_continent(rows: &[Annotated<CountryRevenue, String>]) -> Vec<ContinentRevenue> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for row in rows {
        if let Some(continent) = row.value.as_deref() {
            *totals.entry(continent).or_default() += row.row.amount;
        }
    }

    let mut grouped: Vec<ContinentRevenue> = totals
        .into_iter()
        .map(|(continent, total_amount)| ContinentRevenue {
            continent: continent.to_string(),
            total_amount,
        })
        .collect();
    grouped.sort_by(|a, b| {
        cmp_f64(b.total_amount, a.total_amount).then_with(|| a.continent.cmp(&b.continent))
    });
    grouped
}

/// Share of the total per continent, in percent
pub fn revenue_shares(grouped: &[ContinentRevenue]) -> Vec<(&str, f64)> {
    let total: f64 = grouped.iter().map(|g| g.total_amount).sum();
    grouped
        .iter()
        .map(|g| {
            let share = if total > 0.0 { g.total_amount / total * 100.0 } else { 0.0 };
            (g.continent.as_str(), share)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rental duration vs temperature
// ---------------------------------------------------------------------------

/// Pearson correlation and least-squares trend of rental days on temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Pearson correlation coefficient
    pub r: f64,
    /// Trend line slope, days per degree
    pub slope: f64,
    /// Trend line intercept, days at 0 °C
    pub intercept: f64,
    /// Number of cities used
    pub points: usize,
}

/// Correlates average rental days with temperature over rows that have one
///
/// Needs at least two points and variance in both variables.
pub fn duration_temperature_correlation(
    rows: &[Annotated<CityRentalDuration, f64>],
) -> Option<Correlation> {
    let points: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| r.value.map(|t| (t, r.row.avg_rental_days)))
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some(Correlation {
        r: sxy / (sxx * syy).sqrt(),
        slope,
        intercept: mean_y - slope * mean_x,
        points: points.len(),
    })
}

// ---------------------------------------------------------------------------
// Climate profile by age band
// ---------------------------------------------------------------------------

/// Age bands, lower bound inclusive and upper bound exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBand {
    Under18,
    From18To25,
    From26To35,
    From36To45,
    From46To60,
    Over60,
}

impl AgeBand {
    pub const ALL: [AgeBand; 6] = [
        AgeBand::Under18,
        AgeBand::From18To25,
        AgeBand::From26To35,
        AgeBand::From36To45,
        AgeBand::From46To60,
        AgeBand::Over60,
    ];

    /// Band containing `age`; ages of 200 or more fall outside every band
    pub fn for_age(age: u32) -> Option<AgeBand> {
        match age {
            0..=17 => Some(AgeBand::Under18),
            18..=24 => Some(AgeBand::From18To25),
            25..=34 => Some(AgeBand::From26To35),
            35..=44 => Some(AgeBand::From36To45),
            45..=59 => Some(AgeBand::From46To60),
            60..=199 => Some(AgeBand::Over60),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::Under18 => "<18",
            AgeBand::From18To25 => "18-25",
            AgeBand::From26To35 => "26-35",
            AgeBand::From36To45 => "36-45",
            AgeBand::From46To60 => "46-60",
            AgeBand::Over60 => "60+",
        }
    }
}

/// Averages for one age band; every mean is `None` when the band has no data for it
#[derive(Debug, Clone, PartialEq)]
pub struct AgeBandProfile {
    pub band: AgeBand,
    pub customers: usize,
    pub mean_temperature: Option<f64>,
    pub mean_aqi: Option<f64>,
    pub mean_rentals: Option<f64>,
    pub mean_spent: Option<f64>,
}

/// Groups customers by age band and averages their climate and consumption
///
/// Every band is listed, including empty ones. Customers without an age are
/// left out; missing temperatures and AQIs are skipped in the means.
pub fn profile_by_age_band(rows: &[CustomerClimate]) -> Vec<AgeBandProfile> {
    AgeBand::ALL
        .iter()
        .map(|&band| {
            let members: Vec<&CustomerClimate> = rows
                .iter()
                .filter(|r| r.profile.age.and_then(AgeBand::for_age) == Some(band))
                .collect();

            AgeBandProfile {
                band,
                customers: members.len(),
                mean_temperature: mean(members.iter().filter_map(|m| m.temperature)),
                mean_aqi: mean(members.iter().filter_map(|m| m.aqi.map(f64::from))),
                mean_rentals: mean(members.iter().map(|m| f64::from(m.profile.total_rentals))),
                mean_spent: mean(members.iter().map(|m| m.profile.total_spent)),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Customers in cold, polluted areas who spend more than the average customer
///
/// The average is taken over every row. Rows missing a temperature or AQI
/// never alert.
pub fn alerts(rows: &[CustomerClimate]) -> Vec<&CustomerClimate> {
    let Some(mean_spent) = mean(rows.iter().map(|r| r.profile.total_spent)) else {
        return Vec::new();
    };

    rows.iter()
        .filter(|r| {
            r.temperature.is_some_and(|t| t < ALERT_MAX_TEMPERATURE)
                && r.aqi.is_some_and(|aqi| aqi > ALERT_MIN_AQI)
                && r.profile.total_spent > mean_spent
        })
        .collect()
}
