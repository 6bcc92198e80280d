// Instrumented searcher stub shared by the orchestrator and pipeline tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::json;

use crate::searcher::{SearchError, SearchResponse, Searcher};

type Respond = dyn Fn(&str, &str, NaiveDate) -> Result<SearchResponse, SearchError> + Send + Sync;

pub struct StubSearcher {
    respond: Box<Respond>,
    delay: Duration,
    prepare_budget: Option<usize>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    prepare_calls: AtomicUsize,
    calls: Mutex<Vec<(String, String, NaiveDate, u32)>>,
}

impl StubSearcher {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, &str, NaiveDate) -> Result<SearchResponse, SearchError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: Duration::ZERO,
            prepare_budget: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            prepare_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    // prepare_batch succeeds this many times, then reports an invalid session
    pub fn failing_prepare_after(mut self, successes: usize) -> Self {
        self.prepare_budget = Some(successes);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, String, NaiveDate, u32)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Searcher for StubSearcher {
    fn name(&self) -> &str {
        "stub"
    }

    async fn search_for(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<SearchResponse, SearchError> {
        self.calls
            .lock()
            .push((origin.to_string(), destination.to_string(), date, passengers));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.respond)(origin, destination, date)
    }

    async fn prepare_batch(&self) -> Result<(), SearchError> {
        let done = self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        match self.prepare_budget {
            Some(budget) if done >= budget => {
                Err(SearchError::InvalidSession("session refresh rejected".to_string()))
            }
            _ => Ok(()),
        }
    }
}

// Vendor JSON with one two-leg itinerary via TPE, departing 01:00 on `date`
pub fn award_body(origin: &str, destination: &str, date: NaiveDate, miles: u64, cabin: &str) -> String {
    json!({
        "currency": "CAD",
        "air_bounds": [{
            "miles": miles,
            "cash": 50.0,
            "segments": [
                {
                    "carrier": "CX",
                    "flight_number": "CX865",
                    "origin": origin,
                    "destination": "TPE",
                    "departure": format!("{}T01:00:00", date),
                    "arrival": format!("{}T13:00:00", date),
                    "cabin": cabin,
                    "booking_class": "I",
                    "quota": 2
                },
                {
                    "carrier": "CX",
                    "flight_number": "CX495",
                    "origin": "TPE",
                    "destination": destination,
                    "departure": format!("{}T15:00:00", date),
                    "arrival": format!("{}T17:00:00", date),
                    "cabin": cabin,
                    "booking_class": "I",
                    "quota": 2
                }
            ]
        }]
    })
    .to_string()
}
