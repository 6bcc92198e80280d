// Structural and price filters over normalized itineraries
// Both passes are stable, never mutate their input and return a new collection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{AirBound, CabinClass};

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter bounds: {0}")]
    InvalidBounds(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirBoundFilter {
    pub max_stops: Option<usize>,
    pub airline_include: BTreeSet<String>,
    pub airline_exclude: BTreeSet<String>,
}

impl AirBoundFilter {
    pub fn validate(&self) -> Result<(), FilterError> {
        let include = normalize_codes(&self.airline_include);
        let exclude = normalize_codes(&self.airline_exclude);
        if include.iter().chain(exclude.iter()).any(|code| code.is_empty()) {
            return Err(FilterError::InvalidBounds(
                "airline codes must not be empty".to_string(),
            ));
        }

        let both: Vec<&String> = include.intersection(&exclude).collect();
        if !both.is_empty() {
            return Err(FilterError::InvalidBounds(format!(
                "airlines both included and excluded: {:?}",
                both
            )));
        }
        Ok(())
    }
}

// How the preferred-cabin share of an itinerary is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinShareUnit {
    // Share of flown time, layovers excluded
    #[default]
    Duration,
    SegmentCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceFilter {
    pub min_quota: Option<u32>,
    pub max_miles_per_person: Option<u64>,
    pub max_cash_per_person: Option<f64>,
    pub preferred_classes: Vec<CabinClass>,
    pub mixed_cabin_accepted: bool,
    pub min_cabin_class_pct: Option<f64>,
    pub cabin_share_unit: CabinShareUnit,
}

impl Default for PriceFilter {
    fn default() -> Self {
        Self {
            min_quota: Some(1),
            max_miles_per_person: None,
            max_cash_per_person: None,
            preferred_classes: Vec::new(),
            mixed_cabin_accepted: false,
            min_cabin_class_pct: None,
            cabin_share_unit: CabinShareUnit::default(),
        }
    }
}

impl PriceFilter {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.min_quota == Some(0) {
            return Err(FilterError::InvalidBounds(
                "min_quota must be at least 1".to_string(),
            ));
        }

        if let Some(cash) = self.max_cash_per_person {
            if !cash.is_finite() || cash < 0.0 {
                return Err(FilterError::InvalidBounds(format!(
                    "max_cash_per_person must be a non-negative number, got {}",
                    cash
                )));
            }
        }

        if let Some(pct) = self.min_cabin_class_pct {
            if !(0.0..=100.0).contains(&pct) {
                return Err(FilterError::InvalidBounds(format!(
                    "min_cabin_class_pct must be within 0-100, got {}",
                    pct
                )));
            }
        }

        let distinct: BTreeSet<&CabinClass> = self.preferred_classes.iter().collect();
        if distinct.len() != self.preferred_classes.len() {
            return Err(FilterError::InvalidBounds(
                "preferred_classes contains duplicates".to_string(),
            ));
        }

        Ok(())
    }

    /// Percentage (0-100) of the itinerary flown in a preferred cabin.
    ///
    /// Measured in `cabin_share_unit`; an itinerary whose legs have no flown
    /// time falls back to counting segments.
    pub fn preferred_share(&self, airbound: &AirBound) -> f64 {
        let segments = airbound.segments();
        if segments.is_empty() {
            return 0.0;
        }
        let preferred = |cabin: CabinClass| self.preferred_classes.contains(&cabin);

        if self.cabin_share_unit == CabinShareUnit::Duration {
            let total: i64 = segments.iter().map(|s| s.flight_duration().num_minutes()).sum();
            if total > 0 {
                let in_preferred: i64 = segments
                    .iter()
                    .filter(|s| preferred(s.cabin))
                    .map(|s| s.flight_duration().num_minutes())
                    .sum();
                return in_preferred as f64 * 100.0 / total as f64;
            }
        }

        let in_preferred = segments.iter().filter(|s| preferred(s.cabin)).count();
        in_preferred as f64 * 100.0 / segments.len() as f64
    }

    // Single-cabin itineraries need a preferred cabin; mixed ones need either
    // acceptance plus a preferred leg, or a met minimum share
    pub fn cabin_policy_allows(&self, airbound: &AirBound) -> bool {
        if self.preferred_classes.is_empty() {
            return true;
        }

        if !airbound.is_mixed_cabin() {
            let all_preferred = airbound
                .cabins()
                .iter()
                .all(|cabin| self.preferred_classes.contains(cabin));
            return all_preferred;
        }

        // The minimum share only widens acceptance, it never narrows it
        let share = self.preferred_share(airbound);
        if self.mixed_cabin_accepted {
            share > 0.0
        } else {
            self.min_cabin_class_pct.map_or(false, |pct| share >= pct)
        }
    }
}

fn normalize_codes(codes: &BTreeSet<String>) -> BTreeSet<String> {
    codes.iter().map(|c| c.trim().to_ascii_uppercase()).collect()
}

// Drops (and logs) itineraries whose derived fields disagree with their segments
fn is_trustworthy(airbound: &AirBound) -> bool {
    match airbound.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(
                origin = airbound.origin(),
                destination = airbound.destination(),
                error = %e,
                "dropping inconsistent itinerary"
            );
            false
        }
    }
}

pub fn filter_airbounds(airbounds: &[AirBound], filter: &AirBoundFilter) -> Vec<AirBound> {
    let include = normalize_codes(&filter.airline_include);
    let exclude = normalize_codes(&filter.airline_exclude);
    let mut filtered = Vec::new();

    for airbound in airbounds {
        if !is_trustworthy(airbound) {
            continue;
        }

        if !filter.max_stops.map_or(true, |max| airbound.stops() <= max) {
            continue;
        }

        let carriers: Vec<String> = airbound
            .carriers()
            .map(|c| c.trim().to_ascii_uppercase())
            .collect();

        if !include.is_empty() && !carriers.iter().any(|c| include.contains(c)) {
            continue;
        }

        if carriers.iter().any(|c| exclude.contains(c)) {
            continue;
        }

        filtered.push(airbound.clone());
    }

    filtered
}

pub fn filter_prices(airbounds: &[AirBound], filter: &PriceFilter) -> Vec<AirBound> {
    let mut filtered = Vec::new();

    for airbound in airbounds {
        if !is_trustworthy(airbound) {
            continue;
        }

        if !filter
            .min_quota
            .map_or(true, |min| airbound.segments().iter().all(|s| s.quota >= min))
        {
            continue;
        }

        if !filter
            .max_miles_per_person
            .map_or(true, |max| airbound.miles() <= max)
        {
            continue;
        }

        if !filter
            .max_cash_per_person
            .map_or(true, |max| airbound.cash() <= max)
        {
            continue;
        }

        if !filter.cabin_policy_allows(airbound) {
            continue;
        }

        filtered.push(airbound.clone());
    }

    filtered
}
