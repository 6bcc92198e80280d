// Reference normalizer for a generic JSON award-availability payload
// Vendor-specific normalizers follow the same shape: serde structs for the wire
// format plus a conversion into AirBound that drops anything it cannot read.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{AirBound, CabinClass, Segment};
use crate::searcher::{Normalizer, SearchResponse};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid itinerary: {0}")]
    InvalidItinerary(String),
}

// Data structures for the vendor JSON response
#[derive(Debug, Deserialize, Serialize)]
pub struct VendorResponse {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub air_bounds: Vec<VendorAirBound>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VendorAirBound {
    pub segments: Vec<VendorSegment>,
    // Totals fall back to the sum of the per-leg prices when missing
    #[serde(default)]
    pub miles: Option<u64>,
    #[serde(default)]
    pub cash: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VendorSegment {
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure: String,
    pub arrival: String,
    pub cabin: CabinClass,
    #[serde(default)]
    pub booking_class: String,
    #[serde(default)]
    pub quota: u32,
    #[serde(default)]
    pub miles: u64,
    #[serde(default)]
    pub cash: f64,
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, NormalizeError> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| NormalizeError::InvalidTimestamp(value.to_string()))
}

impl VendorAirBound {
    fn into_model(self, default_currency: &str) -> Result<AirBound, NormalizeError> {
        let currency = self
            .currency
            .unwrap_or_else(|| default_currency.to_string());

        let segments = self
            .segments
            .into_iter()
            .map(|seg| -> Result<Segment, NormalizeError> {
                Ok(Segment {
                    departure: parse_timestamp(&seg.departure)?,
                    arrival: parse_timestamp(&seg.arrival)?,
                    carrier: seg.carrier,
                    flight_number: seg.flight_number,
                    origin: seg.origin,
                    destination: seg.destination,
                    cabin: seg.cabin,
                    booking_class: seg.booking_class,
                    quota: seg.quota,
                    miles: seg.miles,
                    cash: seg.cash,
                    currency: currency.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let miles = self
            .miles
            .unwrap_or_else(|| segments.iter().map(|s| s.miles).sum());
        let cash = self
            .cash
            .unwrap_or_else(|| segments.iter().map(|s| s.cash).sum());

        AirBound::new(segments, miles, cash, currency)
            .map_err(|e| NormalizeError::InvalidItinerary(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct JsonNormalizer {
    default_currency: String,
}

impl Default for JsonNormalizer {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl JsonNormalizer {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    // Strict variant: fails on a body that is not valid JSON, skips bad itineraries
    pub fn parse(&self, body: &str) -> Result<Vec<AirBound>, NormalizeError> {
        let response: VendorResponse = serde_json::from_str(body)
            .map_err(|e| NormalizeError::JsonParseError(e.to_string()))?;

        let currency = response
            .currency
            .unwrap_or_else(|| self.default_currency.clone());

        let mut airbounds = Vec::with_capacity(response.air_bounds.len());
        for vendor_bound in response.air_bounds {
            match vendor_bound.into_model(&currency) {
                Ok(airbound) => airbounds.push(airbound),
                Err(e) => debug!(error = %e, "skipping unreadable itinerary"),
            }
        }
        Ok(airbounds)
    }
}

impl Normalizer for JsonNormalizer {
    fn convert_response_to_models(&self, response: &SearchResponse) -> Vec<AirBound> {
        if !response.is_ok() || response.body.trim().is_empty() {
            return Vec::new();
        }

        match self.parse(&response.body) {
            Ok(airbounds) => airbounds,
            Err(e) => {
                warn!(url = %response.url, error = %e, "could not normalize response");
                Vec::new()
            }
        }
    }
}
