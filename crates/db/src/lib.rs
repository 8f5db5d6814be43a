pub mod connection;
pub mod migrations;
pub mod reports;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{RepositoryError, SqlFaqStore, SqlManualStore, SqlSupportGateway};
