// Award itinerary domain model
// AirBound is what every normalizer produces and what the filter/sort engines consume

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Itinerary has no segments")]
    EmptyItinerary,

    #[error("Itinerary arrives at {arrival} before it departs at {departure}")]
    NegativeDuration {
        departure: NaiveDateTime,
        arrival: NaiveDateTime,
    },

    #[error("Unknown cabin class: {0}")]
    UnknownCabinClass(String),

    #[error("Inconsistent itinerary: {0}")]
    Inconsistent(String),
}

// Ordered from cheapest to most premium cabin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CabinClass {
    #[serde(rename = "Y", alias = "Economy", alias = "ECO")]
    Economy,
    #[serde(rename = "W", alias = "PremiumEconomy", alias = "PY")]
    PremiumEconomy,
    #[serde(rename = "J", alias = "Business", alias = "BUS")]
    Business,
    #[serde(rename = "F", alias = "First", alias = "FIR")]
    First,
}

impl CabinClass {
    pub fn code(&self) -> &'static str {
        match self {
            CabinClass::Economy => "Y",
            CabinClass::PremiumEconomy => "W",
            CabinClass::Business => "J",
            CabinClass::First => "F",
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CabinClass {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Y" | "ECO" | "ECONOMY" => Ok(CabinClass::Economy),
            "W" | "PY" | "PREMIUMECONOMY" | "PREMIUM_ECONOMY" => Ok(CabinClass::PremiumEconomy),
            "J" | "BUS" | "BUSINESS" => Ok(CabinClass::Business),
            "F" | "FIR" | "FIRST" => Ok(CabinClass::First),
            _ => Err(ModelError::UnknownCabinClass(s.to_string())),
        }
    }
}

// One flown leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub cabin: CabinClass,
    pub booking_class: String,
    pub quota: u32,
    pub miles: u64,
    pub cash: f64,
    pub currency: String,
}

impl Segment {
    pub fn flight_duration(&self) -> Duration {
        self.arrival - self.departure
    }
}

/// One bookable itinerary option for a single origin/destination/date query.
///
/// Derived attributes (stops, duration, overall times, mixed cabin) are computed
/// from the segments on construction. `miles` and `cash` are per-passenger totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirBound {
    segments: Vec<Segment>,
    miles: u64,
    cash: f64,
    currency: String,
    stops: usize,
    duration_minutes: i64,
    departure_time: NaiveDateTime,
    arrival_time: NaiveDateTime,
    mixed_cabin: bool,
}

impl AirBound {
    pub fn new(
        segments: Vec<Segment>,
        miles: u64,
        cash: f64,
        currency: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let (first, last) = match (segments.first(), segments.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ModelError::EmptyItinerary),
        };

        let departure_time = first.departure;
        let arrival_time = last.arrival;
        if arrival_time < departure_time {
            return Err(ModelError::NegativeDuration {
                departure: departure_time,
                arrival: arrival_time,
            });
        }

        Ok(Self {
            stops: segments.len() - 1,
            duration_minutes: (arrival_time - departure_time).num_minutes(),
            mixed_cabin: distinct_cabins(&segments).len() > 1,
            departure_time,
            arrival_time,
            miles,
            cash,
            currency: currency.into(),
            segments,
        })
    }

    // Totals are summed from the per-leg costs
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, ModelError> {
        let miles = segments.iter().map(|s| s.miles).sum();
        let cash = segments.iter().map(|s| s.cash).sum();
        let currency = segments
            .first()
            .map(|s| s.currency.clone())
            .unwrap_or_default();
        Self::new(segments, miles, cash, currency)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn miles(&self) -> u64 {
        self.miles
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn stops(&self) -> usize {
        self.stops
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }

    pub fn departure_time(&self) -> NaiveDateTime {
        self.departure_time
    }

    pub fn arrival_time(&self) -> NaiveDateTime {
        self.arrival_time
    }

    pub fn is_mixed_cabin(&self) -> bool {
        self.mixed_cabin
    }

    pub fn origin(&self) -> &str {
        self.segments.first().map_or("", |s| s.origin.as_str())
    }

    pub fn destination(&self) -> &str {
        self.segments.last().map_or("", |s| s.destination.as_str())
    }

    pub fn cabins(&self) -> BTreeSet<CabinClass> {
        distinct_cabins(&self.segments)
    }

    pub fn carriers(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().map(|s| s.carrier.as_str())
    }

    pub fn min_quota(&self) -> u32 {
        self.segments.iter().map(|s| s.quota).min().unwrap_or(0)
    }

    // Re-checks the derived fields, which can drift when an AirBound is deserialized
    pub fn validate(&self) -> Result<(), ModelError> {
        let (first, last) = match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ModelError::EmptyItinerary),
        };

        if self.stops != self.segments.len() - 1 {
            return Err(ModelError::Inconsistent(format!(
                "{} stops for {} segments",
                self.stops,
                self.segments.len()
            )));
        }

        let mixed = distinct_cabins(&self.segments).len() > 1;
        if self.mixed_cabin != mixed {
            return Err(ModelError::Inconsistent(format!(
                "mixed cabin flag is {} but segments say {}",
                self.mixed_cabin, mixed
            )));
        }

        if self.departure_time != first.departure || self.arrival_time != last.arrival {
            return Err(ModelError::Inconsistent(
                "itinerary times do not match segment times".to_string(),
            ));
        }

        if self.duration_minutes != (self.arrival_time - self.departure_time).num_minutes() {
            return Err(ModelError::Inconsistent(format!(
                "duration of {} minutes does not match segment times",
                self.duration_minutes
            )));
        }

        Ok(())
    }

    pub fn to_flattened_rows(&self, granularity: RowGranularity) -> FlattenedRows<'_> {
        FlattenedRows {
            airbound: self,
            granularity,
            next: 0,
        }
    }
}

fn distinct_cabins(segments: &[Segment]) -> BTreeSet<CabinClass> {
    segments.iter().map(|s| s.cabin).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowGranularity {
    #[default]
    PerSegment,
    PerItinerary,
}

// Export row: itinerary aggregates next to one segment's own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub origin: String,
    pub destination: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    pub duration_in_all: i64,
    pub stops: usize,
    pub miles: u64,
    pub cash: f64,
    pub currency: String,
    pub mixed_cabin: bool,
    pub segment_index: Option<usize>,
    pub carrier: String,
    pub flight_number: String,
    pub segment_origin: String,
    pub segment_destination: String,
    pub segment_departure: NaiveDateTime,
    pub segment_arrival: NaiveDateTime,
    pub cabin: String,
    pub booking_class: String,
    pub quota: u32,
}

/// Lazy row iterator returned by [`AirBound::to_flattened_rows`].
///
/// Calling `to_flattened_rows` again restarts the sequence.
#[derive(Debug, Clone)]
pub struct FlattenedRows<'a> {
    airbound: &'a AirBound,
    granularity: RowGranularity,
    next: usize,
}

impl<'a> FlattenedRows<'a> {
    fn aggregate_row(&self) -> FlatRow {
        let ab = self.airbound;
        FlatRow {
            origin: ab.origin().to_string(),
            destination: ab.destination().to_string(),
            departure_time: ab.departure_time,
            arrival_time: ab.arrival_time,
            duration_in_all: ab.duration_minutes,
            stops: ab.stops,
            miles: ab.miles,
            cash: ab.cash,
            currency: ab.currency.clone(),
            mixed_cabin: ab.mixed_cabin,
            segment_index: None,
            carrier: String::new(),
            flight_number: String::new(),
            segment_origin: ab.origin().to_string(),
            segment_destination: ab.destination().to_string(),
            segment_departure: ab.departure_time,
            segment_arrival: ab.arrival_time,
            cabin: String::new(),
            booking_class: String::new(),
            quota: ab.min_quota(),
        }
    }

    fn segment_row(&self, index: usize, segment: &Segment) -> FlatRow {
        FlatRow {
            segment_index: Some(index),
            carrier: segment.carrier.clone(),
            flight_number: segment.flight_number.clone(),
            segment_origin: segment.origin.clone(),
            segment_destination: segment.destination.clone(),
            segment_departure: segment.departure,
            segment_arrival: segment.arrival,
            cabin: segment.cabin.to_string(),
            booking_class: segment.booking_class.clone(),
            quota: segment.quota,
            ..self.aggregate_row()
        }
    }

    fn summary_row(&self) -> FlatRow {
        let segments = self.airbound.segments();

        FlatRow {
            carrier: join_segments(segments, |s| s.carrier.clone()),
            flight_number: join_segments(segments, |s| s.flight_number.clone()),
            cabin: join_segments(segments, |s| s.cabin.to_string()),
            booking_class: join_segments(segments, |s| s.booking_class.clone()),
            ..self.aggregate_row()
        }
    }
}

fn join_segments(segments: &[Segment], field: impl Fn(&Segment) -> String) -> String {
    segments.iter().map(field).collect::<Vec<_>>().join(" / ")
}

impl<'a> Iterator for FlattenedRows<'a> {
    type Item = FlatRow;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.granularity {
            RowGranularity::PerSegment => {
                let segment = self.airbound.segments.get(self.next)?;
                self.segment_row(self.next, segment)
            }
            RowGranularity::PerItinerary => {
                if self.next > 0 {
                    return None;
                }
                self.summary_row()
            }
        };
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = match self.granularity {
            RowGranularity::PerSegment => self.airbound.segments.len(),
            RowGranularity::PerItinerary => 1,
        };
        let remaining = total.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn at(date: &str, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    pub fn segment(
        carrier: &str,
        origin: &str,
        destination: &str,
        departure: NaiveDateTime,
        hours: i64,
        cabin: CabinClass,
    ) -> Segment {
        Segment {
            carrier: carrier.to_string(),
            flight_number: format!("{}{}", carrier, 100),
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure,
            arrival: departure + Duration::hours(hours),
            cabin,
            booking_class: "I".to_string(),
            quota: 2,
            miles: 0,
            cash: 0.0,
            currency: "CAD".to_string(),
        }
    }

    // Direct itinerary departing at 10:00 on the given date
    pub fn direct(carrier: &str, hours: i64, miles: u64, cash: f64) -> AirBound {
        let seg = segment(
            carrier,
            "YVR",
            "HKG",
            at("2024-05-01", 10, 0),
            hours,
            CabinClass::Business,
        );
        AirBound::new(vec![seg], miles, cash, "CAD").unwrap()
    }
}
