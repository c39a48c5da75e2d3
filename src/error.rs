//! Error taxonomy shared by adapters and backend caches.

use crate::exchange::Venue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// A required REST call or the stream handshake failed during `init()`.
    #[error("{venue} init failed: {source}")]
    Init {
        venue: Venue,
        #[source]
        source: Box<ExchangeError>,
    },

    /// The venue answered 200 but its status field reported a failure.
    #[error("{venue} API error {code}: {msg}")]
    Protocol { venue: Venue, code: String, msg: String },

    /// A per-symbol record needed to build a row or cache entry is missing.
    #[error("{venue} has no {field} for {symbol}")]
    DataGap {
        venue: Venue,
        symbol: String,
        field: &'static str,
    },

    /// The push stream failed to open or was closed.
    #[error("{venue} stream error: {reason}")]
    Stream { venue: Venue, reason: String },

    /// The venue refused a stream subscription request.
    #[error("{venue} rejected subscription ({code}): {msg}")]
    Subscription { venue: Venue, code: String, msg: String },

    /// A stream message referenced a symbol the adapter never subscribed to.
    #[error("{venue} pushed unexpected symbol {symbol}")]
    UnexpectedSymbol { venue: Venue, symbol: String },

    #[error("{venue} returned HTTP {status} for {url}: {body}")]
    Status {
        venue: Venue,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{venue} request to {url} failed: {source}")]
    Http {
        venue: Venue,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{venue} sent an undecodable payload from {url}: {source}")]
    Decode {
        venue: Venue,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ExchangeError {
    /// Wrap a startup failure as an [`ExchangeError::Init`].
    pub fn init(venue: Venue, source: ExchangeError) -> Self {
        match source {
            already @ ExchangeError::Init { .. } => already,
            other => ExchangeError::Init {
                venue,
                source: Box::new(other),
            },
        }
    }

    pub fn stream(venue: Venue, reason: impl Into<String>) -> Self {
        ExchangeError::Stream {
            venue,
            reason: reason.into(),
        }
    }

    pub fn data_gap(venue: Venue, symbol: impl Into<String>, field: &'static str) -> Self {
        ExchangeError::DataGap {
            venue,
            symbol: symbol.into(),
            field,
        }
    }

    /// Whether this error should terminate a push stream.
    pub fn is_fatal_to_stream(&self) -> bool {
        matches!(
            self,
            ExchangeError::UnexpectedSymbol { .. }
                | ExchangeError::Subscription { .. }
                | ExchangeError::Stream { .. }
        )
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
