use cassie_core::GatewayError;
use thiserror::Error;

pub mod faq;
pub mod manual;
pub mod support;

pub use faq::SqlFaqStore;
pub use manual::SqlManualStore;
pub use support::SqlSupportGateway;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for GatewayError {
    fn from(error: RepositoryError) -> Self {
        GatewayError::Query(error.to_string())
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db_error) if db_error.message().contains("UNIQUE constraint failed")
    )
}
