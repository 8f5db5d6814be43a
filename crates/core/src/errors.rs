use thiserror::Error;

/// Failures surfaced by the persistent store collaborators. The dialogue
/// controller propagates these; advisor failures never become errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
}
