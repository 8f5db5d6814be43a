use cassie_core::domain::ticket::TicketStatus;
use cassie_db::repositories::SqlSupportGateway;
use serde_json::json;

use crate::commands::{block_on_with_pool, CommandResult};

pub fn run(status: Option<String>) -> CommandResult {
    let status = match status {
        Some(raw) => match TicketStatus::parse(&raw) {
            Some(status) => Some(status),
            None => {
                return CommandResult::failure(
                    "tickets",
                    "invalid_argument",
                    format!("invalid status `{raw}` (expected open|in_progress|resolved|closed)"),
                    2,
                );
            }
        },
        None => None,
    };

    block_on_with_pool("tickets", |_config, pool| async move {
        let gateway = SqlSupportGateway::new(pool);
        let tickets = gateway
            .list_tickets(status)
            .await
            .map_err(|error| ("db_query", error.to_string(), 4u8))?;

        let rows: Vec<serde_json::Value> = tickets
            .iter()
            .map(|ticket| {
                json!({
                    "id": ticket.id.0,
                    "order_id": ticket.order_id,
                    "issue_code": ticket.issue_code.as_str(),
                    "status": ticket.status.as_str(),
                    "last_message": ticket.last_message,
                    "source": ticket.source,
                    "created_at": ticket.created_at.to_rfc3339(),
                })
            })
            .collect();

        let output = serde_json::to_string_pretty(&json!({ "tickets": rows }))
            .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
        Ok(CommandResult { exit_code: 0, output })
    })
}
