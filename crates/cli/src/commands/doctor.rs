use cassie_db::repositories::SqlSupportGateway;
use serde_json::json;

use crate::commands::{block_on_with_pool, CommandResult};

pub fn run() -> CommandResult {
    block_on_with_pool("doctor", |config, pool| async move {
        let gateway = SqlSupportGateway::new(pool);
        let database = match gateway.list_tickets(None).await {
            Ok(tickets) => json!({ "status": "ok", "tickets": tickets.len() }),
            Err(error) => json!({ "status": "error", "detail": error.to_string() }),
        };

        let advisor = json!({
            "status": "ok",
            "remote_enabled": config.advisor.has_credentials(),
            "model": config.advisor.model,
        });

        let output = serde_json::to_string_pretty(&json!({
            "command": "doctor",
            "database_url": config.database.url,
            "checks": { "database": database, "advisor": advisor },
        }))
        .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
        Ok(CommandResult { exit_code: 0, output })
    })
}
