use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::customer::CustomerId;
use crate::policy::IssueCode;

/// Per-session conversational memory. Losing a session is harmless: the
/// controller just re-asks for the order id or contact email.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionFacts {
    pub order_id: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub pending_offer: Option<PendingTicketOffer>,
    pub last_issue_code: Option<IssueCode>,
    pub last_issue_message: Option<String>,
    pub awaiting_human_email: bool,
    pub awaiting_closure: bool,
    pub repeat: RepeatGuard,
}

/// Recorded when the assistant asked "shall I raise a ticket?" and is
/// waiting for a yes/no (or an order id, which counts as a yes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTicketOffer {
    pub issue_label: String,
    pub first_message: String,
}

/// Tracks how many consecutive turns produced the same canned reply so the
/// controller can break dialogue loops. The only anti-loop mechanism.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepeatGuard {
    key: Option<&'static str>,
    count: u32,
}

impl RepeatGuard {
    /// Registers one more occurrence of `key` and returns the consecutive
    /// count including this one. A different key resets the streak.
    pub fn register(&mut self, key: &'static str) -> u32 {
        if self.key == Some(key) {
            self.count += 1;
        } else {
            self.key = Some(key);
            self.count = 1;
        }
        self.count
    }

    pub fn reset(&mut self) {
        self.key = None;
        self.count = 0;
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> SessionFacts;
    async fn save(&self, session_id: &str, facts: SessionFacts);
    async fn remove(&self, session_id: &str);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionFacts>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionFacts>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> SessionFacts {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    async fn save(&self, session_id: &str, facts: SessionFacts) {
        self.lock().insert(session_id.to_string(), facts);
    }

    async fn remove(&self, session_id: &str) {
        self.lock().remove(session_id);
    }
}
