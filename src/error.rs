//! Error types shared by the fetch pipeline, the asset scraper and the
//! settings store.

use thiserror::Error;

/// Everything that can go wrong while talking to the observation API or
/// scraping a species page.
///
/// Payloads are plain strings so the error can be cloned and handed to every
/// caller waiting on a coalesced request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BirdError {
    /// A base endpoint could not be parsed as a URL.
    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Latitude or longitude is NaN or infinite.
    #[error("Invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// A species code that cannot be placed in a URL path.
    #[error("Invalid species code: {0:?}")]
    InvalidSpeciesCode(String),

    /// Network unreachable, timeout, connection reset.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected JSON shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The species page yielded field arrays of differing lengths.
    #[error("Misaligned asset fields for {species_code}: {counts:?}")]
    Misaligned {
        species_code: String,
        counts: [usize; 5],
    },

    /// The settings store could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),
}

impl BirdError {
    /// Transport, status and decode failures are retried by the sighting
    /// fetch pipeline. Everything else is a programming error or a scrape
    /// problem that a retry would not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BirdError::Transport(_) | BirdError::Status { .. } | BirdError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for BirdError {
    fn from(err: reqwest::Error) -> Self {
        BirdError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BirdError {
    fn from(err: serde_json::Error) -> Self {
        BirdError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BirdError>;
