use thiserror::Error;

/// Errors raised by the lookup layer.
///
/// Parsing never fails and file I/O is handled by the binary, so everything here
/// is recoverable: the resolver downgrades these to empty metadata.
#[derive(Debug, Error)]
pub enum BibFillError {
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
