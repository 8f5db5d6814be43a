pub mod chat;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod tickets;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared startup for the async commands: config, runtime, pool, schema.
pub(crate) fn block_on_with_pool<F, Fut>(command: &'static str, body: F) -> CommandResult
where
    F: FnOnce(cassie_core::AppConfig, cassie_db::DbPool) -> Fut,
    Fut: std::future::Future<Output = Result<CommandResult, (&'static str, String, u8)>>,
{
    let config = match cassie_core::AppConfig::load(cassie_core::LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = cassie_db::connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        cassie_db::migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        body(config, pool).await
    });

    match result {
        Ok(result) => result,
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CommandResult;

    #[test]
    fn success_envelope_is_json() {
        let result = CommandResult::success("migrate", "0 pending migrations applied");
        assert_eq!(result.exit_code, 0);
        let value: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid json");
        assert_eq!(value["command"], "migrate");
        assert_eq!(value["status"], "ok");
        assert!(value["error_class"].is_null());
    }

    #[test]
    fn failure_envelope_carries_class_and_exit_code() {
        let result = CommandResult::failure("seed", "db_connectivity", "no database", 4);
        assert_eq!(result.exit_code, 4);
        let value: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid json");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error_class"], "db_connectivity");
    }
}
