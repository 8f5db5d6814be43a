use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use cassie_advisor::{ChatClient, ChatClientError, RemoteAdvisor};
use cassie_core::advisor::{Advisor, NoopAdvisor};
use cassie_core::config::AppConfig;
use cassie_core::{DialogueController, InMemorySessionStore};
use cassie_db::repositories::{SqlFaqStore, SqlSupportGateway};
use cassie_db::{connect_with_settings, migrations, DbPool};

pub type ChatService = DialogueController<
    SqlSupportGateway,
    SqlFaqStore,
    Arc<dyn Advisor>,
    InMemorySessionStore,
>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub chat: Arc<ChatService>,
    pub advisor: Arc<dyn Advisor>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("advisor client could not be built: {0}")]
    AdvisorClient(#[source] ChatClientError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let advisor: Arc<dyn Advisor> = if config.advisor.has_credentials() {
        let client =
            ChatClient::from_config(&config.advisor).map_err(BootstrapError::AdvisorClient)?;
        Arc::new(RemoteAdvisor::new(client, config.brand.clone()))
    } else {
        Arc::new(NoopAdvisor)
    };
    info!(
        event_name = "system.bootstrap.advisor_selected",
        correlation_id = "bootstrap",
        remote = config.advisor.has_credentials(),
        "advisor capability resolved"
    );

    let chat = Arc::new(DialogueController::new(
        SqlSupportGateway::new(db_pool.clone()),
        SqlFaqStore::new(db_pool.clone()),
        advisor.clone(),
        InMemorySessionStore::new(),
        config.brand.clone(),
    ));

    Ok(Application { config, db_pool, chat, advisor })
}
