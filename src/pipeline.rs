// One search run: plan -> dates -> orchestrator -> filters -> sort -> rows -> exporter
// A plan is loaded and validated once; everything downstream receives it immutably.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dates::{date_range, DateRangeError};
use crate::export::{result_file_name, Exporter};
use crate::filter::{filter_airbounds, filter_prices, AirBoundFilter, FilterError, PriceFilter};
use crate::models::{AirBound, FlatRow, RowGranularity};
use crate::orchestrator::{FetchConfig, FetchError, FetchOrchestrator, FetchStatsReport};
use crate::searcher::{Normalizer, Searcher};
use crate::sort::{sort_airbounds, sort_rows, SortError, SortOptions, SortSpec};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid search plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Dates(#[from] DateRangeError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Sort(#[from] SortError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// Run configuration as written by the user, typically loaded from JSON.
///
/// Only `carrier`, `origins`, `destinations`, `start_date` and `end_date` are
/// required; every other section falls back to its `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub carrier: String,
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub airbound_filter: AirBoundFilter,
    #[serde(default)]
    pub price_filter: PriceFilter,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub granularity: RowGranularity,
    // Rank the flattened rows by (miles, cash, departure_time, duration_in_all)
    #[serde(default)]
    pub row_level_sort: bool,
}

// A plan whose dates, filters, sort keys and fetch config have all been checked
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    pub carrier: String,
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub fetch: FetchConfig,
    pub airbound_filter: AirBoundFilter,
    pub price_filter: PriceFilter,
    pub sort: SortOptions,
    pub granularity: RowGranularity,
    pub row_level_sort: bool,
}

fn airport_codes(field: &str, codes: &[String]) -> Result<Vec<String>, PipelineError> {
    if codes.is_empty() {
        return Err(PipelineError::InvalidPlan(format!("{} must not be empty", field)));
    }
    codes
        .iter()
        .map(|code| {
            let code = code.trim().to_ascii_uppercase();
            if code.is_empty() {
                Err(PipelineError::InvalidPlan(format!("blank airport code in {}", field)))
            } else {
                Ok(code)
            }
        })
        .collect()
}

impl SearchPlan {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| PipelineError::InvalidPlan(e.to_string()))
    }

    pub fn resolve(&self) -> Result<ResolvedPlan, PipelineError> {
        let carrier = self.carrier.trim().to_ascii_uppercase();
        if carrier.is_empty() {
            return Err(PipelineError::InvalidPlan("carrier must not be empty".to_string()));
        }

        let origins = airport_codes("origins", &self.origins)?;
        let destinations = airport_codes("destinations", &self.destinations)?;
        let dates = date_range(&self.start_date, &self.end_date)?;

        self.fetch.validate()?;
        self.airbound_filter.validate()?;
        self.price_filter.validate()?;
        let sort = self.sort.resolve()?;

        Ok(ResolvedPlan {
            carrier,
            origins,
            destinations,
            dates,
            fetch: self.fetch.clone(),
            airbound_filter: self.airbound_filter.clone(),
            price_filter: self.price_filter.clone(),
            sort,
            granularity: self.granularity,
            row_level_sort: self.row_level_sort,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    // Surviving itineraries in ranked order
    pub airbounds: Vec<AirBound>,
    pub rows: Vec<FlatRow>,
    pub fetched: usize,
    pub stats: FetchStatsReport,
}

pub async fn run_search<S: Searcher, N: Normalizer>(
    plan: &ResolvedPlan,
    searcher: S,
    normalizer: N,
) -> Result<SearchOutcome, PipelineError> {
    let orchestrator = FetchOrchestrator::new(searcher, normalizer, plan.fetch.clone())?;
    let report = orchestrator
        .fetch_all(&plan.origins, &plan.destinations, &plan.dates)
        .await?;
    let fetched = report.airbounds.len();

    let airbounds = filter_airbounds(&report.airbounds, &plan.airbound_filter);
    let after_structure = airbounds.len();
    let airbounds = filter_prices(&airbounds, &plan.price_filter);
    info!(
        carrier = %plan.carrier,
        fetched,
        after_structure,
        after_price = airbounds.len(),
        "filters applied"
    );

    let airbounds = sort_airbounds(airbounds, &plan.sort);
    let rows: Vec<FlatRow> = airbounds
        .iter()
        .flat_map(|airbound| airbound.to_flattened_rows(plan.granularity))
        .collect();
    let rows = if plan.row_level_sort {
        sort_rows(rows, &SortOptions::row_default())
    } else {
        rows
    };

    Ok(SearchOutcome {
        airbounds,
        rows,
        fetched,
        stats: orchestrator.stats(),
    })
}

// Writes the rows even when the run found nothing; returns the file name used
pub async fn run_and_export<S: Searcher, N: Normalizer, E: Exporter + ?Sized>(
    plan: &ResolvedPlan,
    searcher: S,
    normalizer: N,
    exporter: &E,
    extension: &str,
    timestamp: NaiveDateTime,
) -> Result<(SearchOutcome, String), PipelineError> {
    let outcome = run_search(plan, searcher, normalizer).await?;

    let file_name = result_file_name(
        &plan.carrier,
        timestamp,
        &plan.origins,
        &plan.destinations,
        extension,
    );
    exporter.results_to_file(&outcome.rows, &file_name)?;
    info!(file = %file_name, rows = outcome.rows.len(), "search run exported");

    Ok((outcome, file_name))
}
