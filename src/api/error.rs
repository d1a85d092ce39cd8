use thiserror::Error;

/// Transport failure for one request.
///
/// Cloneable so the query cache can keep it alongside the entry it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  #[error("server returned {status}: {message}")]
  Server { status: u16, message: String },
  #[error("failed to decode response: {0}")]
  Decode(String),
  #[error("invalid request URL: {0}")]
  InvalidUrl(String),
  #[error("no endpoint serves {0}")]
  NoEndpoint(String),
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Timeout
    } else if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::Server {
        status: status.as_u16(),
        message: err.to_string(),
      }
    } else {
      ApiError::Network(err.to_string())
    }
  }
}
