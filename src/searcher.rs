// Searcher and Normalizer capabilities
// Each airline plugs in its own Searcher (request construction, session handling)
// and Normalizer (vendor response parsing); the orchestrator only sees these traits.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::AirBound;

// Error types for a single search request
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // Fatal: the searcher itself is unusable
    #[error("Searcher configuration error: {0}")]
    Configuration(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl SearchError {
    // Fatal errors abort the whole run, everything else only loses one triple
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::Configuration(_) | SearchError::InvalidSession(_)
        )
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SearchError::Timeout(error.to_string())
        } else if error.is_builder() {
            SearchError::Configuration(error.to_string())
        } else if error.is_decode() || error.is_body() {
            SearchError::MalformedResponse(error.to_string())
        } else {
            SearchError::NetworkError(error.to_string())
        }
    }
}

// Raw vendor response, opaque beyond status, body and resolved URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub status: u16,
    pub body: String,
    pub url: String,
}

impl SearchResponse {
    pub fn new(status: u16, body: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            url: url.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    // Reads the whole body so the connection goes back to the pool
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, SearchError> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;
        Ok(Self { status, body, url })
    }
}

/// Per-airline search capability.
///
/// Implementations own their HTTP client, session and timeouts. Returning a
/// non-2xx `SearchResponse` is not an error; `Err` is reserved for requests
/// that produced no response at all, or for a searcher that cannot continue.
#[async_trait]
pub trait Searcher: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn search_for(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        passengers: u32,
    ) -> Result<SearchResponse, SearchError>;

    // Called before every batch, e.g. to refresh a vendor session
    async fn prepare_batch(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

// Converts a raw vendor response into itineraries; malformed input yields none
pub trait Normalizer: Send + Sync + 'static {
    fn convert_response_to_models(&self, response: &SearchResponse) -> Vec<AirBound>;
}
