use std::io::{BufRead, Write};
use std::sync::Arc;

use cassie_advisor::{ChatClient, RemoteAdvisor};
use cassie_core::advisor::{Advisor, NoopAdvisor};
use cassie_core::intent::{self, Intent};
use cassie_core::{DialogueController, InMemorySessionStore};
use cassie_db::repositories::{SqlFaqStore, SqlSupportGateway};
use uuid::Uuid;

use crate::commands::{block_on_with_pool, CommandResult};

pub fn run(
    session: Option<String>,
    email: Option<String>,
    name: Option<String>,
) -> CommandResult {
    block_on_with_pool("chat", |config, pool| async move {
        let advisor: Arc<dyn Advisor> = if config.advisor.has_credentials() {
            match ChatClient::from_config(&config.advisor) {
                Ok(client) => Arc::new(RemoteAdvisor::new(client, config.brand.clone())),
                Err(error) => return Err(("advisor_client", error.to_string(), 6u8)),
            }
        } else {
            Arc::new(NoopAdvisor)
        };

        let controller = DialogueController::new(
            SqlSupportGateway::new(pool.clone()),
            SqlFaqStore::new(pool),
            advisor,
            InMemorySessionStore::new(),
            config.brand.clone(),
        );

        let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
        println!(
            "{} support chat (session {session_id}). Type 'bye' to end.",
            config.brand.name
        );

        let stdin = std::io::stdin();
        let mut turns = 0usize;
        loop {
            print!("you> ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) => return Err(("stdin", error.to_string(), 7u8)),
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            let outcome = controller
                .process_turn(&session_id, text, email.as_deref(), name.as_deref())
                .await
                .map_err(|error| ("dialogue", error.to_string(), 8u8))?;
            turns += 1;
            println!("cassie> {}", outcome.reply);

            if intent::detect(text).intent == Intent::Bye {
                break;
            }
        }

        Ok(CommandResult::success("chat", format!("session ended after {turns} turns")))
    })
}
