use thiserror::Error;

/// Failure of a single backend call.
///
/// The orchestration layer never surfaces
/// these to the interface: callers log them
/// and skip reconciliation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
  #[error("backend unavailable: {0}")]
  Unavailable(String),

  #[error("failed to decode backend response: {0}")]
  Decode(String),

  #[error("{kind} not found: {id}")]
  NotFound {
    kind: &'static str,
    id:   String
  },

  #[error("backend rejected request: {0}")]
  Rejected(String)
}

impl GatewayError {
  pub fn not_found(
    kind: &'static str,
    id: impl Into<String>
  ) -> Self {
    GatewayError::NotFound {
      kind,
      id: id.into()
    }
  }
}

impl From<serde_json::Error> for GatewayError {
  fn from(err: serde_json::Error) -> Self {
    GatewayError::Decode(err.to_string())
  }
}

pub type GatewayResult<T> =
  Result<T, GatewayError>;
