// src/core/error.rs

use std::time::Duration;
use thiserror::Error;

/// Rejection of a submitted URL before any scan is created.
///
/// The only failure class surfaced to callers as their own fault; everything
/// past validation degrades the result instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not a parseable URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme '{0}', only http and https are scanned")]
    UnsupportedScheme(String),

    #[error("URL has no host component")]
    MissingHost,
}

/// Failure of the scan as a whole.
///
/// `InvalidUrl` means no scan was created. `Fatal` is orchestrator
/// bookkeeping only (identity allocation, cache persistence) and is expected
/// to be rare: every inner stage is fail-soft by design.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] ValidationError),

    #[error("scan bookkeeping failed: {0}")]
    Fatal(String),
}

/// Failure of a single reputation source call. Recovered locally: the source
/// is recorded with an `error` verdict and excluded from the aggregate.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("source timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed source response: {0}")]
    Protocol(String),
}

/// Failure of a single advisory model call. Recovered locally: the model is
/// omitted and the remaining responder weights are renormalized.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed model response: {0}")]
    Protocol(String),
}

/// Failure to fetch the target content. Never propagated as an error: the
/// fetcher contract is a tagged result, and a total fetch failure downgrades
/// the pipeline mode instead of failing the scan.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("could not read response body: {0}")]
    Body(String),
}
