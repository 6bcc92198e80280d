// Multi-key stable sort over itineraries and flattened rows
// Keys are a closed set resolved when the options are built, so sorting itself never fails.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AirBound, FlatRow};

#[derive(Error, Debug, PartialEq)]
pub enum SortError {
    #[error("Unknown sort key: {0}")]
    UnknownKey(String),

    #[error("Unknown sort preset: {0}")]
    UnknownPreset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    DurationInAll,
    Stops,
    DepartureTime,
    ArrivalTime,
    Miles,
    Cash,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::DurationInAll => "duration_in_all",
            SortKey::Stops => "stops",
            SortKey::DepartureTime => "departure_time",
            SortKey::ArrivalTime => "arrival_time",
            SortKey::Miles => "miles",
            SortKey::Cash => "cash",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duration_in_all" => Ok(SortKey::DurationInAll),
            "stops" => Ok(SortKey::Stops),
            "departure_time" => Ok(SortKey::DepartureTime),
            "arrival_time" => Ok(SortKey::ArrivalTime),
            "miles" => Ok(SortKey::Miles),
            "cash" => Ok(SortKey::Cash),
            _ => Err(SortError::UnknownKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

/// Anything the sort engine can rank.
///
/// Implemented for whole itineraries and for export rows, which carry the
/// itinerary aggregates on every row.
pub trait Rankable {
    fn duration_minutes(&self) -> i64;
    fn stops(&self) -> usize;
    fn departure_time(&self) -> NaiveDateTime;
    fn arrival_time(&self) -> NaiveDateTime;
    fn miles(&self) -> u64;
    fn cash(&self) -> f64;
}

impl Rankable for AirBound {
    fn duration_minutes(&self) -> i64 {
        AirBound::duration_minutes(self)
    }

    fn stops(&self) -> usize {
        AirBound::stops(self)
    }

    fn departure_time(&self) -> NaiveDateTime {
        AirBound::departure_time(self)
    }

    fn arrival_time(&self) -> NaiveDateTime {
        AirBound::arrival_time(self)
    }

    fn miles(&self) -> u64 {
        AirBound::miles(self)
    }

    fn cash(&self) -> f64 {
        AirBound::cash(self)
    }
}

impl Rankable for FlatRow {
    fn duration_minutes(&self) -> i64 {
        self.duration_in_all
    }

    fn stops(&self) -> usize {
        self.stops
    }

    fn departure_time(&self) -> NaiveDateTime {
        self.departure_time
    }

    fn arrival_time(&self) -> NaiveDateTime {
        self.arrival_time
    }

    fn miles(&self) -> u64 {
        self.miles
    }

    fn cash(&self) -> f64 {
        self.cash
    }
}

fn compare_by_key<T: Rankable>(a: &T, b: &T, key: SortKey) -> Ordering {
    match key {
        SortKey::DurationInAll => a.duration_minutes().cmp(&b.duration_minutes()),
        SortKey::Stops => a.stops().cmp(&b.stops()),
        SortKey::DepartureTime => a.departure_time().cmp(&b.departure_time()),
        SortKey::ArrivalTime => a.arrival_time().cmp(&b.arrival_time()),
        SortKey::Miles => a.miles().cmp(&b.miles()),
        SortKey::Cash => a.cash().total_cmp(&b.cash()),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortOptions {
    keys: Vec<(SortKey, SortDirection)>,
}

impl SortOptions {
    pub fn new(keys: Vec<(SortKey, SortDirection)>) -> Self {
        Self { keys }
    }

    // Resolves key names up front; an unknown name fails here, never while sorting
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, SortDirection)]) -> Result<Self, SortError> {
        let keys = pairs
            .iter()
            .map(|(name, direction)| Ok((name.as_ref().parse::<SortKey>()?, *direction)))
            .collect::<Result<Vec<_>, SortError>>()?;
        Ok(Self { keys })
    }

    pub fn preset(name: &str) -> Result<Self, SortError> {
        use SortDirection::Ascending as Asc;

        let keys = match name.trim().to_ascii_lowercase().as_str() {
            "shortest trip" => vec![(SortKey::DurationInAll, Asc)],
            "fewest stops" => vec![(SortKey::Stops, Asc), (SortKey::DurationInAll, Asc)],
            "earliest departure" => vec![(SortKey::DepartureTime, Asc)],
            "cheapest miles" => vec![(SortKey::Miles, Asc), (SortKey::Cash, Asc)],
            "cheapest cash" => vec![(SortKey::Cash, Asc), (SortKey::Miles, Asc)],
            _ => return Err(SortError::UnknownPreset(name.to_string())),
        };
        Ok(Self { keys })
    }

    // Ordering applied to export rows
    pub fn row_default() -> Self {
        use SortDirection::Ascending as Asc;

        Self::new(vec![
            (SortKey::Miles, Asc),
            (SortKey::Cash, Asc),
            (SortKey::DepartureTime, Asc),
            (SortKey::DurationInAll, Asc),
        ])
    }

    pub fn keys(&self) -> &[(SortKey, SortDirection)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare<T: Rankable>(&self, a: &T, b: &T) -> Ordering {
        for (key, direction) in &self.keys {
            let ordering = match direction {
                SortDirection::Ascending => compare_by_key(a, b, *key),
                SortDirection::Descending => compare_by_key(a, b, *key).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

// Sort configuration as written in a search plan: a preset name or explicit keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Preset(String),
    Fields(Vec<SortField>),
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::Preset("Shortest trip".to_string())
    }
}

impl SortSpec {
    pub fn resolve(&self) -> Result<SortOptions, SortError> {
        match self {
            SortSpec::Preset(name) => SortOptions::preset(name),
            SortSpec::Fields(fields) => {
                let pairs: Vec<(&str, SortDirection)> = fields
                    .iter()
                    .map(|field| (field.key.as_str(), field.direction))
                    .collect();
                SortOptions::from_pairs(&pairs)
            }
        }
    }
}

fn sort_stable<T: Rankable>(mut items: Vec<T>, options: &SortOptions) -> Vec<T> {
    // slice::sort_by is stable, equal elements keep their input order
    items.sort_by(|a, b| options.compare(a, b));
    items
}

pub fn sort_airbounds(airbounds: Vec<AirBound>, options: &SortOptions) -> Vec<AirBound> {
    sort_stable(airbounds, options)
}

pub fn sort_rows(rows: Vec<FlatRow>, options: &SortOptions) -> Vec<FlatRow> {
    sort_stable(rows, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, direct, segment};
    use crate::models::{CabinClass, RowGranularity};
    use chrono::Duration;
    use test_case::test_case;

    fn departing(hour: u32, hours: i64, miles: u64, cash: f64) -> AirBound {
        let seg = segment("AC", "YVR", "HKG", at("2024-05-01", hour, 0), hours, CabinClass::Business);
        AirBound::new(vec![seg], miles, cash, "CAD").unwrap()
    }

    fn with_stop(hours: i64, miles: u64) -> AirBound {
        let leg1 = segment("CX", "YVR", "TPE", at("2024-05-01", 1, 0), hours - 3, CabinClass::Business);
        let leg2 = segment("CX", "TPE", "HKG", leg1.arrival + Duration::hours(1), 2, CabinClass::Business);
        AirBound::new(vec![leg1, leg2], miles, 50.0, "CAD").unwrap()
    }

    #[test]
    fn test_stable_sort_keeps_tie_order() {
        // Durations 5h, 3h, 5h: the two 5h itineraries are told apart by miles
        let input = vec![direct("AC", 5, 1, 0.0), direct("AC", 3, 2, 0.0), direct("AC", 5, 3, 0.0)];
        let sorted = sort_airbounds(input, &SortOptions::preset("Shortest trip").unwrap());

        let miles: Vec<u64> = sorted.iter().map(|ab| ab.miles()).collect();
        assert_eq!(miles, vec![2, 1, 3]);
    }

    #[test]
    fn test_ties_broken_by_next_key() {
        let input = vec![
            departing(9, 5, 70000, 20.0),
            departing(8, 5, 70000, 10.0),
            departing(7, 5, 60000, 99.0),
        ];
        let sorted = sort_airbounds(input, &SortOptions::preset("Cheapest miles").unwrap());
        let hours: Vec<NaiveDateTime> = sorted.iter().map(|ab| ab.departure_time()).collect();
        assert_eq!(
            hours,
            vec![at("2024-05-01", 7, 0), at("2024-05-01", 8, 0), at("2024-05-01", 9, 0)]
        );
    }

    #[test]
    fn test_descending_direction() {
        let input = vec![direct("AC", 3, 1, 0.0), direct("AC", 9, 2, 0.0), direct("AC", 6, 3, 0.0)];
        let options = SortOptions::new(vec![(SortKey::DurationInAll, SortDirection::Descending)]);
        let sorted = sort_airbounds(input, &options);
        let durations: Vec<i64> = sorted.iter().map(|ab| ab.duration_minutes()).collect();
        assert_eq!(durations, vec![540, 360, 180]);
    }

    #[test]
    fn test_empty_options_preserve_order() {
        let input = vec![direct("AC", 9, 1, 0.0), direct("AC", 3, 2, 0.0)];
        let sorted = sort_airbounds(input.clone(), &SortOptions::default());
        assert_eq!(sorted, input);
    }

    #[test]
    fn test_row_default_is_non_decreasing() {
        let airbounds = vec![
            with_stop(16, 85000),
            departing(12, 14, 70000, 100.0),
            departing(6, 14, 70000, 100.0),
            with_stop(20, 60000),
            departing(6, 10, 70000, 100.0),
        ];
        let rows: Vec<FlatRow> = airbounds
            .iter()
            .flat_map(|ab| ab.to_flattened_rows(RowGranularity::PerSegment))
            .collect();

        let sorted = sort_rows(rows, &SortOptions::row_default());
        assert_eq!(sorted.len(), 7);
        for pair in sorted.windows(2) {
            let key = |r: &FlatRow| (r.miles, r.cash, r.departure_time, r.duration_in_all);
            let (a, b) = (key(&pair[0]), key(&pair[1]));
            assert!(a.0 <= b.0);
            if a.0 == b.0 {
                assert!(a.1 <= b.1);
                if a.1 == b.1 {
                    assert!((a.2, a.3) <= (b.2, b.3));
                }
            }
        }

        // Rows of one itinerary stay adjacent and in segment order
        assert_eq!(sorted[0].segment_index, Some(0));
        assert_eq!(sorted[1].segment_index, Some(1));
        assert_eq!(sorted[0].miles, 60000);
        assert_eq!(sorted[2].departure_time, at("2024-05-01", 6, 0));
        assert_eq!(sorted[2].duration_in_all, 10 * 60);
    }

    #[test_case("Shortest trip", &[SortKey::DurationInAll]; "shortest trip")]
    #[test_case("fewest stops", &[SortKey::Stops, SortKey::DurationInAll]; "fewest stops")]
    #[test_case("Earliest departure", &[SortKey::DepartureTime]; "earliest departure")]
    #[test_case("Cheapest miles", &[SortKey::Miles, SortKey::Cash]; "cheapest miles")]
    #[test_case(" Cheapest cash ", &[SortKey::Cash, SortKey::Miles]; "cheapest cash")]
    fn test_presets(name: &str, expected: &[SortKey]) {
        let options = SortOptions::preset(name).unwrap();
        let keys: Vec<SortKey> = options.keys().iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, expected);
        assert!(options
            .keys()
            .iter()
            .all(|(_, direction)| *direction == SortDirection::Ascending));
    }

    #[test]
    fn test_unknown_key_and_preset_are_rejected() {
        let result = SortOptions::from_pairs(&[("miles", SortDirection::Ascending), ("price", SortDirection::Ascending)]);
        assert_eq!(result, Err(SortError::UnknownKey("price".to_string())));
        assert_eq!(
            SortOptions::preset("Best value"),
            Err(SortError::UnknownPreset("Best value".to_string()))
        );
    }

    #[test]
    fn test_sort_spec_from_json() {
        let preset: SortSpec = serde_json::from_str(r#""Fewest stops""#).unwrap();
        assert_eq!(preset.resolve().unwrap(), SortOptions::preset("Fewest stops").unwrap());

        let fields: SortSpec = serde_json::from_str(
            r#"[{"key": "cash", "direction": "desc"}, {"key": "arrival_time"}]"#,
        )
        .unwrap();
        assert_eq!(
            fields.resolve().unwrap().keys(),
            &[
                (SortKey::Cash, SortDirection::Descending),
                (SortKey::ArrivalTime, SortDirection::Ascending)
            ]
        );

        let unknown: SortSpec = serde_json::from_str(r#"[{"key": "comfort"}]"#).unwrap();
        assert!(matches!(unknown.resolve(), Err(SortError::UnknownKey(_))));
    }
}
