// Fetch orchestration
// Runs every (origin, destination, date) query against one Searcher in sequential
// batches, with a semaphore capping how many requests are in flight at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::models::AirBound;
use crate::searcher::{Normalizer, SearchError, Searcher};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Searcher {searcher} cannot continue: {source}")]
    Fatal {
        searcher: String,
        #[source]
        source: SearchError,
    },
}

// Orchestrator configuration, built once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub passengers: u32,
    pub concurrency_limit: usize,
    pub batch_size: usize,
    // Fixed pause after a non-ok response; the request is not reissued
    pub failure_pause_ms: u64,
    pub skip_same_airport: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            passengers: 1,
            concurrency_limit: 10,
            batch_size: 100,
            failure_pause_ms: 5000,
            skip_same_airport: true,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.passengers == 0 {
            return Err(FetchError::InvalidConfig(
                "passengers must be at least 1".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(FetchError::InvalidConfig(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(FetchError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_millis(self.failure_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTriple {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
}

// Cross product in origin, destination, date nesting order
pub fn build_triples<S: AsRef<str>>(
    origins: &[S],
    destinations: &[S],
    dates: &[NaiveDate],
    skip_same_airport: bool,
) -> Vec<QueryTriple> {
    let mut triples = Vec::with_capacity(origins.len() * destinations.len() * dates.len());
    for origin in origins {
        for destination in destinations {
            let (origin, destination) = (origin.as_ref(), destination.as_ref());
            if skip_same_airport && origin.eq_ignore_ascii_case(destination) {
                continue;
            }
            for date in dates {
                triples.push(QueryTriple {
                    origin: origin.to_string(),
                    destination: destination.to_string(),
                    date: *date,
                });
            }
        }
    }
    triples
}

#[derive(Debug, Default)]
pub struct FetchStats {
    pub requests_sent: AtomicUsize,
    pub responses_ok: AtomicUsize,
    pub responses_not_ok: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub itineraries_collected: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchStatsReport {
    pub requests_sent: usize,
    pub responses_ok: usize,
    pub responses_not_ok: usize,
    pub requests_failed: usize,
    pub itineraries_collected: usize,
    pub peak_in_flight: usize,
}

// Decrements the in-flight count on drop, including when the searcher panics
struct InFlight<'a>(&'a FetchStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchStats {
    fn track_request(&self) -> InFlight<'_> {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }

    fn reset(&self) {
        for counter in [
            &self.requests_sent,
            &self.responses_ok,
            &self.responses_not_ok,
            &self.requests_failed,
            &self.itineraries_collected,
            &self.in_flight,
            &self.peak_in_flight,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn report(&self) -> FetchStatsReport {
        FetchStatsReport {
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            responses_ok: self.responses_ok.load(Ordering::SeqCst),
            responses_not_ok: self.responses_not_ok.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            itineraries_collected: self.itineraries_collected.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Responded(u16),
    Failed(String),
    Panicked,
}

// What happened to one triple
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub triple: QueryTriple,
    pub status: OutcomeStatus,
    pub itineraries: usize,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub airbounds: Vec<AirBound>,
    pub outcomes: Vec<RequestOutcome>,
}

struct OrchestratorInner<S, N> {
    searcher: S,
    normalizer: N,
    config: FetchConfig,
    stats: FetchStats,
}

pub struct FetchOrchestrator<S, N> {
    inner: Arc<OrchestratorInner<S, N>>,
}

impl<S: Searcher, N: Normalizer> FetchOrchestrator<S, N> {
    pub fn new(searcher: S, normalizer: N, config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                searcher,
                normalizer,
                config,
                stats: FetchStats::default(),
            }),
        })
    }

    pub fn searcher(&self) -> &S {
        &self.inner.searcher
    }

    pub fn config(&self) -> &FetchConfig {
        &self.inner.config
    }

    // Counters of the most recent fetch; every fetch starts from zero
    pub fn stats(&self) -> FetchStatsReport {
        self.inner.stats.report()
    }

    pub async fn fetch_all<T: AsRef<str>>(
        &self,
        origins: &[T],
        destinations: &[T],
        dates: &[NaiveDate],
    ) -> Result<FetchReport, FetchError> {
        let config = &self.inner.config;
        let triples = build_triples(origins, destinations, dates, config.skip_same_airport);
        self.fetch_triples(triples).await
    }

    pub async fn fetch_triples(&self, triples: Vec<QueryTriple>) -> Result<FetchReport, FetchError> {
        let config = &self.inner.config;
        let searcher_name = self.inner.searcher.name().to_string();
        let batch_count = triples.len().div_ceil(config.batch_size);
        info!(
            searcher = %searcher_name,
            triples = triples.len(),
            batches = batch_count,
            concurrency_limit = config.concurrency_limit,
            "starting award search"
        );

        self.inner.stats.reset();
        let semaphore = Arc::new(Semaphore::new(config.concurrency_limit));
        self.run_batches(triples, semaphore, &searcher_name).await
    }

    async fn run_batches(
        &self,
        triples: Vec<QueryTriple>,
        semaphore: Arc<Semaphore>,
        searcher_name: &str,
    ) -> Result<FetchReport, FetchError> {
        let config = &self.inner.config;
        let batch_count = triples.len().div_ceil(config.batch_size);
        let mut report = FetchReport::default();

        for (index, batch) in triples.chunks(config.batch_size).enumerate() {
            debug!(batch = index + 1, of = batch_count, size = batch.len(), "starting batch");

            self.inner
                .searcher
                .prepare_batch()
                .await
                .map_err(|source| FetchError::Fatal {
                    searcher: searcher_name.to_string(),
                    source,
                })?;

            let handles = batch.iter().map(|triple| {
                let inner = Arc::clone(&self.inner);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(inner.search_triple(triple.clone(), semaphore))
            });
            let results = join_all(handles).await;

            // Join point: the only place results are collected. search_triple
            // returns Err for fatal searcher errors only
            let mut fatal = None;
            for (triple, result) in batch.iter().zip(results) {
                let (status, airbounds) = match result {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        error!(
                            origin = %triple.origin,
                            destination = %triple.destination,
                            date = %triple.date,
                            error = %e,
                            "fatal searcher error"
                        );
                        let status = OutcomeStatus::Failed(e.to_string());
                        fatal.get_or_insert(e);
                        (status, Vec::new())
                    }
                    Err(join_error) => {
                        error!(
                            origin = %triple.origin,
                            destination = %triple.destination,
                            date = %triple.date,
                            error = %join_error,
                            "search task aborted"
                        );
                        self.inner.stats.requests_failed.fetch_add(1, Ordering::SeqCst);
                        (OutcomeStatus::Panicked, Vec::new())
                    }
                };

                report.outcomes.push(RequestOutcome {
                    triple: triple.clone(),
                    status,
                    itineraries: airbounds.len(),
                });
                report.airbounds.extend(airbounds);
            }

            if let Some(source) = fatal {
                return Err(FetchError::Fatal {
                    searcher: searcher_name.to_string(),
                    source,
                });
            }
        }

        info!(
            searcher = %searcher_name,
            itineraries = report.airbounds.len(),
            "award search finished"
        );
        Ok(report)
    }
}

impl<S: Searcher, N: Normalizer> OrchestratorInner<S, N> {
    // Err only for fatal searcher errors; everything else becomes an outcome
    async fn search_triple(
        self: Arc<Self>,
        triple: QueryTriple,
        semaphore: Arc<Semaphore>,
    ) -> Result<(OutcomeStatus, Vec<AirBound>), SearchError> {
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(
                    origin = %triple.origin,
                    destination = %triple.destination,
                    date = %triple.date,
                    error = %e,
                    "no request slot"
                );
                self.stats.requests_failed.fetch_add(1, Ordering::SeqCst);
                return Ok((OutcomeStatus::Failed(e.to_string()), Vec::new()));
            }
        };

        let result = {
            let _in_flight = self.stats.track_request();
            self.searcher
                .search_for(
                    &triple.origin,
                    &triple.destination,
                    triple.date,
                    self.config.passengers,
                )
                .await
        };

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    origin = %triple.origin,
                    destination = %triple.destination,
                    date = %triple.date,
                    error = %e,
                    "search failed"
                );
                self.stats.requests_failed.fetch_add(1, Ordering::SeqCst);
                return Ok((OutcomeStatus::Failed(e.to_string()), Vec::new()));
            }
        };

        info!(
            origin = %triple.origin,
            destination = %triple.destination,
            date = %triple.date,
            status = response.status,
            "search for {} to {} on {} - {}",
            triple.origin,
            triple.destination,
            triple.date,
            response.status
        );

        if response.is_ok() {
            self.stats.responses_ok.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.responses_not_ok.fetch_add(1, Ordering::SeqCst);
            warn!(status = response.status, url = %response.url, body = %response.body, "non-ok response");
            // Still holding the permit, so this also throttles the next request
            tokio::time::sleep(self.config.failure_pause()).await;
        }

        let airbounds = self.normalizer.convert_response_to_models(&response);
        self.stats
            .itineraries_collected
            .fetch_add(airbounds.len(), Ordering::SeqCst);

        Ok((OutcomeStatus::Responded(response.status), airbounds))
    }
}
