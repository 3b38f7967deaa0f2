use std::io;

use thiserror::Error;

/// Failure fetching one page. Transient errors have already been retried to
/// the fetcher's ceiling; terminal statuses are never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed after retries: {reason}")]
    Transient { url: String, reason: String },
    #[error("{url} returned status {status}")]
    Terminal { url: String, status: u16 },
}

/// A required field's selector matched nothing on a detail page. The affected
/// app is skipped; no partial record reaches the sink.
#[derive(Debug, Error)]
#[error("required field `{field}` missing from {url}")]
pub struct ExtractionError {
    pub url: String,
    pub field: &'static str,
}

/// Sink-level failure: a destination could not be created, read, or rewritten.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("csv error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}
