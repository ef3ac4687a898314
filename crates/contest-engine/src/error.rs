//! Collaborator error types.
//!
//! Only [`FetchError`] is fatal to a run. The other three are caught at their
//! stage boundary and turned into an [`ErrorRecord`](crate::model::ErrorRecord).

use thiserror::Error;

/// Invalid date range bounds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("start date {start} is after end date {end}")]
    Inverted { start: String, end: String },

    #[error("cannot go back {0} days from the given date")]
    OutOfRange(u32),
}

/// Errors from populating the order queue.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure (connection refused, DNS, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Credentials rejected by the case-management API.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-success status other than an auth failure.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from resolving a single order's details.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the generative-text provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider rejected or failed the request.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Rate limit or quota exhausted.
    #[error("Quota exceeded: {0}")]
    Quota(String),

    /// Request exceeded the provider timeout.
    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    /// Provider answered but produced no usable text.
    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from submitting an appeal.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("HTTP error: {0}")]
    Http(String),

    /// The case-management API refused the appeal.
    #[error("Appeal rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
