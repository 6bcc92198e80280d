// Main library file for the award flight search engine

// Domain model and the pure building blocks
pub mod dates;
pub mod models;

// Searching: airline capabilities, bundled normalizer and the fetch orchestrator
pub mod orchestrator;
pub mod searcher;
pub mod vendor;

// Filtering, ranking and output
pub mod export;
pub mod filter;
pub mod pipeline;
pub mod sort;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use dates::{date_range, date_range_between, DateRangeError};
pub use export::{result_file_name, Exporter, JsonExporter};
pub use filter::{
    filter_airbounds, filter_prices, AirBoundFilter, CabinShareUnit, FilterError, PriceFilter,
};
pub use models::{AirBound, CabinClass, FlatRow, ModelError, RowGranularity, Segment};
pub use orchestrator::{
    FetchConfig, FetchError, FetchOrchestrator, FetchReport, FetchStatsReport, QueryTriple,
};
pub use pipeline::{run_and_export, run_search, PipelineError, ResolvedPlan, SearchOutcome, SearchPlan};
pub use searcher::{Normalizer, SearchError, SearchResponse, Searcher};
pub use sort::{
    sort_airbounds, sort_rows, Rankable, SortDirection, SortError, SortKey, SortOptions, SortSpec,
};
pub use vendor::JsonNormalizer;
