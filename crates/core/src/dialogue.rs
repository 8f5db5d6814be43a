use thiserror::Error;
use tracing::{debug, info};

use crate::advisor::Advisor;
use crate::config::BrandConfig;
use crate::domain::customer::CustomerId;
use crate::domain::order::OrderStatus;
use crate::domain::ticket::{MessageRole, TicketId};
use crate::errors::GatewayError;
use crate::faq::{builtin_answer, FaqCache};
use crate::gateway::{FaqSource, SupportGateway};
use crate::intent::{self, DetectedIntent, Intent};
use crate::policy::{infer_issue_label, is_allowed, normalize_issue, IssueCode};
use crate::session::{PendingTicketOffer, SessionFacts, SessionStore};

const SOURCE_CHAT: &str = "chat";

const TICKET_OFFER_SUFFIX: &str =
    "\n\nWould you like me to raise a support ticket for this? (yes/no)";

const FAREWELL: &str =
    "Thanks for chatting with us! If anything else comes up, just message me again. Take care!";

const ASK_EMAIL: &str =
    "I can loop in a human agent. What email address should our team use to reach you?";

const BAD_EMAIL: &str =
    "I'll need a valid email address (like name@example.com) to connect you with our team.";

const ASK_ORDER_ID: &str = "Please share your Order ID (starts with ORDL), e.g., ORDL12345.";

const ASK_ORDER_ID_ESCALATION: &str =
    "I still need an Order ID (starts with ORDL) to file this. If you can't find it, say 'talk \
     to a human' and our team will dig it up.";

const OFFER_DECLINED: &str = "Okay, I won't raise a ticket. Anything else I can help with?";

const OFFER_NEEDS_ORDER: &str =
    "Sure - please share your Order ID (starts with ORDL) to raise the ticket.";

const OFFER_REMINDER: &str =
    "If you'd like me to raise a ticket, say yes or share your ORDL Order ID.";

const ORDER_FORMAT_NUDGE: &str = "Share the Order ID in the format: Order ID: ORDL12345";

const GENERIC_HELP: &str =
    "I can answer questions (payment, returns, delivery, tracking, etc.) and raise tickets for \
     any issue. Tell me your issue, and if it's about a specific order, share the Order ID \
     (e.g., ORDL12345).";

const GENERIC_ESCALATION: &str =
    "I might not be getting this right. Say 'talk to a human' to have our support team take \
     over, or share your ORDL Order ID and I'll pull up the order.";

/// One processed turn: the reply to show, plus the ticket touched (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub ticket_id: Option<TicketId>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// The named modes of the per-turn state machine. Evaluated strictly in
/// `STAGE_ORDER`; each stage either handles the turn or passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ClosurePending,
    HumanEmailCapture,
    ByeShortCircuit,
    BareOrderId,
    PendingOffer,
    HumanIntent,
    Greeting,
    FaqMatch,
    OrderIdBridge,
    Ticketable,
    ExplicitTicketRequest,
    AdvisorFallback,
    GenericFallback,
}

pub const STAGE_ORDER: &[Stage] = &[
    Stage::ClosurePending,
    Stage::HumanEmailCapture,
    Stage::ByeShortCircuit,
    Stage::BareOrderId,
    Stage::PendingOffer,
    Stage::HumanIntent,
    Stage::Greeting,
    Stage::FaqMatch,
    Stage::OrderIdBridge,
    Stage::Ticketable,
    Stage::ExplicitTicketRequest,
    Stage::AdvisorFallback,
    Stage::GenericFallback,
];

struct Turn<'a> {
    session_id: &'a str,
    text: &'a str,
    lower: String,
    contact_email: Option<&'a str>,
    contact_name: Option<&'a str>,
    detected: DetectedIntent,
    facts: SessionFacts,
    end_session: bool,
}

enum Filed {
    Created(TicketId),
    Appended(TicketId),
}

impl Filed {
    fn id(&self) -> TicketId {
        match self {
            Self::Created(id) | Self::Appended(id) => *id,
        }
    }
}

/// Per-session conversational controller. Holds no per-turn state itself:
/// everything mutable lives in the injected session store, so turns for
/// different sessions are fully independent.
pub struct DialogueController<G, F, A, S> {
    gateway: G,
    faqs: FaqCache<F>,
    advisor: A,
    sessions: S,
    brand: BrandConfig,
}

impl<G, F, A, S> DialogueController<G, F, A, S>
where
    G: SupportGateway,
    F: FaqSource,
    A: Advisor,
    S: SessionStore,
{
    pub fn new(gateway: G, faq_source: F, advisor: A, sessions: S, brand: BrandConfig) -> Self {
        Self { gateway, faqs: FaqCache::new(faq_source), advisor, sessions, brand }
    }

    /// Invalidates the FAQ cache after external edits to the knowledge base.
    pub fn refresh_faqs(&self) {
        self.faqs.invalidate();
    }

    pub async fn process_turn(
        &self,
        session_id: &str,
        text: &str,
        contact_email: Option<&str>,
        contact_name: Option<&str>,
    ) -> Result<TurnOutcome, DialogueError> {
        let mut turn = Turn {
            session_id,
            text,
            lower: text.to_lowercase(),
            contact_email,
            contact_name,
            detected: intent::detect(text),
            facts: self.sessions.load(session_id).await,
            end_session: false,
        };

        // A freshly supplied order id always wins over the remembered one.
        if let Some(order_id) = turn.detected.order_id.clone() {
            turn.facts.order_id = Some(order_id);
        }

        let mut outcome = None;
        for stage in STAGE_ORDER {
            if let Some(result) = self.run_stage(*stage, &mut turn).await? {
                debug!(
                    event_name = "dialogue.stage_handled",
                    session_id,
                    stage = ?stage,
                    "turn resolved"
                );
                outcome = Some(result);
                break;
            }
        }
        let outcome =
            outcome.unwrap_or_else(|| reply(GENERIC_HELP));

        if turn.end_session {
            self.sessions.remove(session_id).await;
        } else {
            self.sessions.save(session_id, turn.facts).await;
        }
        Ok(outcome)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        match stage {
            Stage::ClosurePending => self.closure_pending(turn).await,
            Stage::HumanEmailCapture => self.human_email_capture(turn).await,
            Stage::ByeShortCircuit => self.bye_short_circuit(turn).await,
            Stage::BareOrderId => self.bare_order_id(turn).await,
            Stage::PendingOffer => self.pending_offer(turn).await,
            Stage::HumanIntent => self.human_intent(turn).await,
            Stage::Greeting => self.greeting(turn).await,
            Stage::FaqMatch => self.faq_match(turn).await,
            Stage::OrderIdBridge => self.order_id_bridge(turn).await,
            Stage::Ticketable => self.ticketable(turn).await,
            Stage::ExplicitTicketRequest => self.explicit_ticket_request(turn).await,
            Stage::AdvisorFallback => self.advisor_fallback(turn).await,
            Stage::GenericFallback => self.generic_fallback(turn).await,
        }
    }

    async fn closure_pending(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if !turn.facts.awaiting_closure {
            return Ok(None);
        }
        turn.facts.awaiting_closure = false;
        if turn.text.trim().is_empty()
            || intent::is_no(turn.text)
            || intent::contains_goodbye_token(turn.text)
            || intent::contains_thanks_token(turn.text)
        {
            turn.end_session = true;
            return Ok(Some(reply(FAREWELL)));
        }
        // Anything else is a new request; fall through with the flag cleared.
        Ok(None)
    }

    async fn human_email_capture(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if !turn.facts.awaiting_human_email {
            return Ok(None);
        }
        let Some(email) = intent::extract_email(turn.text) else {
            // Re-prompt without side effects.
            return Ok(Some(reply(BAD_EMAIL)));
        };
        self.connect_human(turn, &email).await.map(Some)
    }

    async fn bye_short_circuit(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if turn.detected.intent == Intent::Bye
            || intent::contains_goodbye_token(turn.text)
            || intent::contains_thanks_token(turn.text)
        {
            turn.end_session = true;
            return Ok(Some(reply(FAREWELL)));
        }
        Ok(None)
    }

    async fn bare_order_id(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if !intent::is_bare_order_id(turn.text) {
            return Ok(None);
        }
        // The token was already merged into facts before dispatch.
        if let Some(code) = turn.facts.last_issue_code.clone() {
            let customer_id = self.resolve_customer(turn, None).await?;
            if let Some(blocked) = self.eligibility_block(turn, &code).await? {
                turn.facts.pending_offer = None;
                return Ok(Some(blocked));
            }
            let message = turn
                .facts
                .last_issue_message
                .clone()
                .unwrap_or_else(|| turn.text.to_string());
            let order_id = turn.facts.order_id.clone();
            let filed = self
                .file_ticket(turn.session_id, order_id.as_deref(), customer_id, &code, &message)
                .await?;
            turn.facts.pending_offer = None;
            turn.facts.repeat.reset();
            return Ok(Some(filed_outcome(filed, order_id.as_deref())));
        }

        let order_id = turn.facts.order_id.clone().unwrap_or_default();
        let count = turn.facts.repeat.register("ask_issue_for_order");
        let text = if count >= 3 {
            format!(
                "I still couldn't work out the issue for Order {order_id}. Say 'talk to a \
                 human' and our support team will take over, or describe the problem in a few \
                 words."
            )
        } else {
            ask_issue_prompt(&order_id)
        };
        Ok(Some(reply(text)))
    }

    async fn pending_offer(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        let Some(offer) = turn.facts.pending_offer.clone() else {
            return Ok(None);
        };

        if intent::is_no(turn.text) {
            turn.facts.pending_offer = None;
            turn.facts.awaiting_closure = true;
            return Ok(Some(reply(OFFER_DECLINED)));
        }

        // An order id, carried over or supplied this turn, counts as a yes.
        if intent::is_yes(turn.text) || turn.facts.order_id.is_some() {
            let customer_id = self.resolve_customer(turn, None).await?;
            let Some(order_id) = turn.facts.order_id.clone() else {
                return Ok(Some(reply(OFFER_NEEDS_ORDER)));
            };
            let code = normalize_issue(&offer.issue_label);
            if let Some(blocked) = self.eligibility_block(turn, &code).await? {
                turn.facts.pending_offer = None;
                return Ok(Some(blocked));
            }
            let filed = self
                .file_ticket(
                    turn.session_id,
                    Some(&order_id),
                    customer_id,
                    &code,
                    &offer.first_message,
                )
                .await?;
            turn.facts.pending_offer = None;
            turn.facts.repeat.reset();
            return Ok(Some(filed_outcome(filed, Some(&order_id))));
        }

        Ok(Some(reply(OFFER_REMINDER)))
    }

    async fn human_intent(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if turn.detected.intent != Intent::Human {
            return Ok(None);
        }
        self.handle_human(turn).await.map(Some)
    }

    async fn greeting(&self, turn: &mut Turn<'_>) -> Result<Option<TurnOutcome>, DialogueError> {
        if turn.detected.intent != Intent::Greet {
            return Ok(None);
        }
        let welcome = self
            .advisor
            .welcome_message()
            .await
            .unwrap_or_else(|| default_welcome(&self.brand));
        turn.facts.repeat.reset();
        Ok(Some(reply(welcome)))
    }

    async fn faq_match(&self, turn: &mut Turn<'_>) -> Result<Option<TurnOutcome>, DialogueError> {
        // Hard ticketable intents outrank an FAQ answer.
        if matches!(
            turn.detected.intent,
            Intent::Defect | Intent::WrongItem | Intent::MissingItem
        ) {
            return Ok(None);
        }

        let matcher = self.faqs.matcher().await?;
        if let Some(matched) = matcher.best_match(turn.text) {
            let answer = self
                .advisor
                .rewrite(turn.text, &matched.answer)
                .await
                .unwrap_or(matched.answer);
            self.remember_offer(turn, matched.label);
            return Ok(Some(reply(format!("{answer}{TICKET_OFFER_SUFFIX}"))));
        }

        if turn.detected.intent == Intent::Faq {
            return self.answer_faq_inline(turn).await.map(Some);
        }
        Ok(None)
    }

    async fn order_id_bridge(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if turn.detected.intent == Intent::Fallback
            && turn.facts.order_id.is_some()
            && !intent::has_issue_hint(turn.text)
        {
            let order_id = turn.facts.order_id.clone().unwrap_or_default();
            return Ok(Some(reply(ask_issue_prompt(&order_id))));
        }
        Ok(None)
    }

    async fn ticketable(&self, turn: &mut Turn<'_>) -> Result<Option<TurnOutcome>, DialogueError> {
        let label = match turn.detected.intent {
            Intent::Defect => "defect",
            Intent::WrongItem => "wrong_item",
            Intent::MissingItem => "missing_item",
            _ => return Ok(None),
        };
        self.handle_ticketable(turn, label).await.map(Some)
    }

    async fn explicit_ticket_request(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if !intent::wants_ticket(turn.text) {
            return Ok(None);
        }
        let code = turn.facts.last_issue_code.clone().unwrap_or_else(IssueCode::other);
        let customer_id = self.resolve_customer(turn, None).await?;
        let order_id = turn.facts.order_id.clone();
        let filed = self
            .file_ticket(turn.session_id, order_id.as_deref(), customer_id, &code, turn.text)
            .await?;
        turn.facts.repeat.reset();
        Ok(Some(filed_outcome(filed, order_id.as_deref())))
    }

    async fn advisor_fallback(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        let verdict = self.advisor.classify(turn.text).await;
        let threshold = match verdict.intent {
            Intent::Defect | Intent::WrongItem | Intent::MissingItem | Intent::Human
            | Intent::Bye => 0.7f32,
            Intent::Faq => 0.6f32,
            _ => return Ok(None),
        };
        if verdict.confidence < threshold {
            return Ok(None);
        }
        debug!(
            event_name = "dialogue.advisor_accepted",
            session_id = turn.session_id,
            intent = ?verdict.intent,
            confidence = verdict.confidence,
            "advisor verdict cleared its threshold"
        );
        if let Some(order_id) = verdict.order_id.clone() {
            turn.facts.order_id = Some(order_id);
        }

        match verdict.intent {
            Intent::Bye => {
                turn.end_session = true;
                Ok(Some(reply(FAREWELL)))
            }
            Intent::Human => self.handle_human(turn).await.map(Some),
            Intent::Defect => self.handle_ticketable(turn, "defect").await.map(Some),
            Intent::WrongItem => self.handle_ticketable(turn, "wrong_item").await.map(Some),
            Intent::MissingItem => self.handle_ticketable(turn, "missing_item").await.map(Some),
            Intent::Faq => match verdict.issue_label {
                Some(label) => {
                    let base = builtin_answer(turn.text);
                    let answer =
                        self.advisor.rewrite(turn.text, &base).await.unwrap_or(base);
                    self.remember_offer(turn, label);
                    Ok(Some(reply(format!("{answer}{TICKET_OFFER_SUFFIX}"))))
                }
                None => self.answer_faq_inline(turn).await.map(Some),
            },
            _ => Ok(None),
        }
    }

    async fn generic_fallback(
        &self,
        turn: &mut Turn<'_>,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        if turn.lower.contains("order")
            && turn.lower.contains("id")
            && turn.facts.order_id.is_none()
        {
            return Ok(Some(reply(ORDER_FORMAT_NUDGE)));
        }
        let count = turn.facts.repeat.register("generic_help");
        let text = if count >= 3 { GENERIC_ESCALATION } else { GENERIC_HELP };
        Ok(Some(reply(text)))
    }

    async fn handle_human(&self, turn: &mut Turn<'_>) -> Result<TurnOutcome, DialogueError> {
        let email = turn
            .contact_email
            .map(str::to_string)
            .or_else(|| intent::extract_email(turn.text));
        let Some(email) = email else {
            turn.facts.awaiting_human_email = true;
            return Ok(reply(ASK_EMAIL));
        };
        self.connect_human(turn, &email).await
    }

    async fn connect_human(
        &self,
        turn: &mut Turn<'_>,
        email: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        let customer_id = self.resolve_customer(turn, Some(email)).await?;
        let order_id = turn.facts.order_id.clone();
        let filed = self
            .file_ticket(
                turn.session_id,
                order_id.as_deref(),
                customer_id,
                &IssueCode::human_assistance(),
                turn.text,
            )
            .await?;
        turn.facts.awaiting_human_email = false;
        turn.facts.repeat.reset();
        let text = match &filed {
            Filed::Created(id) => format!(
                "Done! I've asked a human agent to follow up - ticket #{id}. Our team will \
                 reach out to you at {email}."
            ),
            Filed::Appended(id) => format!(
                "Got it. I've added your request to your open ticket #{id}; our team will \
                 reach out at {email}."
            ),
        };
        Ok(TurnOutcome { reply: text, ticket_id: Some(filed.id()) })
    }

    async fn handle_ticketable(
        &self,
        turn: &mut Turn<'_>,
        label: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        let code = normalize_issue(label);
        turn.facts.last_issue_code = Some(code.clone());
        turn.facts.last_issue_message = Some(turn.text.to_string());

        let Some(order_id) = turn.facts.order_id.clone() else {
            let count = turn.facts.repeat.register("ask_order_id");
            let text = if count >= 3 { ASK_ORDER_ID_ESCALATION } else { ASK_ORDER_ID };
            return Ok(reply(text));
        };

        let customer_id = self.resolve_customer(turn, None).await?;
        if let Some(blocked) = self.eligibility_block(turn, &code).await? {
            return Ok(blocked);
        }
        let filed = self
            .file_ticket(turn.session_id, Some(&order_id), customer_id, &code, turn.text)
            .await?;
        turn.facts.repeat.reset();
        Ok(filed_outcome(filed, Some(&order_id)))
    }

    async fn answer_faq_inline(&self, turn: &mut Turn<'_>) -> Result<TurnOutcome, DialogueError> {
        let base = builtin_answer(turn.text);
        let answer = self.advisor.rewrite(turn.text, &base).await.unwrap_or(base);
        let label = infer_issue_label(turn.text);
        self.remember_offer(turn, label.to_string());
        Ok(reply(format!("{answer}{TICKET_OFFER_SUFFIX}")))
    }

    /// Records the ticket offer together with the remembered issue, so a
    /// later bare order-id turn can file the same complaint.
    fn remember_offer(&self, turn: &mut Turn<'_>, issue_label: String) {
        turn.facts.last_issue_code = Some(normalize_issue(&issue_label));
        turn.facts.last_issue_message = Some(turn.text.to_string());
        turn.facts.pending_offer =
            Some(PendingTicketOffer { issue_label, first_message: turn.text.to_string() });
        turn.facts.repeat.reset();
    }

    /// Resolved lazily, once per session; a fresh email re-resolves.
    async fn resolve_customer(
        &self,
        turn: &mut Turn<'_>,
        email_override: Option<&str>,
    ) -> Result<CustomerId, DialogueError> {
        if email_override.is_none() {
            if let Some(id) = turn.facts.customer_id {
                return Ok(id);
            }
        }
        let email = email_override.or(turn.contact_email);
        let id = self.gateway.get_or_create_customer(email, turn.contact_name).await?;
        turn.facts.customer_id = Some(id);
        Ok(id)
    }

    /// `None` means go ahead; `Some` carries the refusal to send instead.
    async fn eligibility_block(
        &self,
        turn: &Turn<'_>,
        code: &IssueCode,
    ) -> Result<Option<TurnOutcome>, DialogueError> {
        let Some(order_id) = turn.facts.order_id.as_deref() else {
            return Ok(None);
        };
        match self.gateway.get_order_status(order_id).await? {
            None => Ok(Some(reply(format!(
                "I couldn't find an order with ID {order_id}. Please double-check it (it \
                 starts with ORDL) and send it again."
            )))),
            Some(raw_status) => {
                if is_allowed(code, OrderStatus::parse(&raw_status)) {
                    Ok(None)
                } else {
                    Ok(Some(reply(format!(
                        "I can't register a {} request while the order is {}. If you think \
                         this is wrong, say 'talk to a human' and our team will take a look.",
                        code.describe(),
                        raw_status
                    ))))
                }
            }
        }
    }

    async fn file_ticket(
        &self,
        session_id: &str,
        order_id: Option<&str>,
        customer_id: CustomerId,
        code: &IssueCode,
        message: &str,
    ) -> Result<Filed, DialogueError> {
        if let Some(order_id) = order_id {
            if let Some(existing) = self.gateway.find_open_ticket(customer_id, order_id).await? {
                self.gateway.append_message(existing, MessageRole::User, message).await?;
                info!(
                    event_name = "dialogue.ticket_appended",
                    session_id,
                    ticket_id = existing.0,
                    order_id,
                    "appended to the open ticket for this order"
                );
                return Ok(Filed::Appended(existing));
            }
        }
        let ticket_id = self
            .gateway
            .create_ticket(customer_id, order_id, code, message, SOURCE_CHAT)
            .await?;
        info!(
            event_name = "dialogue.ticket_created",
            session_id,
            ticket_id = ticket_id.0,
            issue_code = %code,
            "created ticket"
        );
        Ok(Filed::Created(ticket_id))
    }
}

fn reply(text: impl Into<String>) -> TurnOutcome {
    TurnOutcome { reply: text.into(), ticket_id: None }
}

fn ask_issue_prompt(order_id: &str) -> String {
    format!(
        "Got your Order ID {order_id}. Tell me the issue (e.g., payment issue, return/refund, \
         delivery/tracking, cancellation, address change, warranty, sizing, or \
         defective/wrong/missing item)."
    )
}

fn filed_outcome(filed: Filed, order_id: Option<&str>) -> TurnOutcome {
    let text = match (&filed, order_id) {
        (Filed::Appended(id), Some(order)) => {
            format!("Got it. I've added this to your existing ticket #{id} for Order {order}.")
        }
        (Filed::Appended(id), None) => {
            format!("Got it. I've added this to your existing ticket #{id}.")
        }
        (Filed::Created(id), Some(order)) => format!(
            "Thanks! I've created ticket #{id} for Order {order}. Our team will reach out \
             with next steps."
        ),
        (Filed::Created(id), None) => format!(
            "Thanks! I've created ticket #{id}. Our team will reach out with next steps."
        ),
    };
    TurnOutcome { reply: text, ticket_id: Some(filed.id()) }
}

fn default_welcome(brand: &BrandConfig) -> String {
    format!(
        "Hey there! I'm {}. I can help with orders, returns/exchanges, delivery & tracking, \
         payments and invoices. If it's about a specific order, please share your Order ID \
         (e.g., ORDL12345). We're around {}. How can I help today?",
        brand.name, brand.support_hours
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{DialogueController, Stage, STAGE_ORDER};
    use crate::advisor::{Advisor, AdvisorVerdict, NoopAdvisor};
    use crate::config::BrandConfig;
    use crate::domain::customer::CustomerId;
    use crate::domain::faq::FaqEntry;
    use crate::domain::ticket::{MessageRole, TicketId};
    use crate::errors::GatewayError;
    use crate::faq::seed_entries;
    use crate::gateway::{FaqSource, SupportGateway};
    use crate::intent::Intent;
    use crate::session::{InMemorySessionStore, SessionStore};

    #[derive(Clone, Debug)]
    struct StubTicket {
        id: i64,
        customer_id: i64,
        order_id: Option<String>,
        issue_code: String,
        status: String,
        messages: Vec<String>,
    }

    #[derive(Default)]
    struct StubState {
        next_customer: i64,
        next_ticket: i64,
        tickets: Vec<StubTicket>,
        orders: HashMap<String, String>,
    }

    #[derive(Default)]
    struct StubGateway {
        state: Mutex<StubState>,
    }

    impl StubGateway {
        fn with_order(order_id: &str, status: &str) -> Self {
            let gateway = Self::default();
            gateway.lock().orders.insert(order_id.to_string(), status.to_string());
            gateway
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn ticket_count(&self) -> usize {
            self.lock().tickets.len()
        }

        fn ticket(&self, id: TicketId) -> StubTicket {
            self.lock().tickets.iter().find(|t| t.id == id.0).cloned().expect("ticket exists")
        }
    }

    #[async_trait]
    impl SupportGateway for StubGateway {
        async fn get_or_create_customer(
            &self,
            _email: Option<&str>,
            _name: Option<&str>,
        ) -> Result<CustomerId, GatewayError> {
            let mut state = self.lock();
            state.next_customer += 1;
            Ok(CustomerId(state.next_customer))
        }

        async fn create_ticket(
            &self,
            customer_id: CustomerId,
            order_id: Option<&str>,
            issue_code: &crate::policy::IssueCode,
            first_message: &str,
            _source: &str,
        ) -> Result<TicketId, GatewayError> {
            let mut state = self.lock();
            state.next_ticket += 1;
            let id = state.next_ticket;
            state.tickets.push(StubTicket {
                id,
                customer_id: customer_id.0,
                order_id: order_id.map(str::to_string),
                issue_code: issue_code.as_str().to_string(),
                status: "open".to_string(),
                messages: vec![first_message.to_string()],
            });
            Ok(TicketId(id))
        }

        async fn append_message(
            &self,
            ticket_id: TicketId,
            _role: MessageRole,
            text: &str,
        ) -> Result<(), GatewayError> {
            let mut state = self.lock();
            let ticket = state
                .tickets
                .iter_mut()
                .find(|t| t.id == ticket_id.0)
                .ok_or_else(|| GatewayError::Query("no such ticket".to_string()))?;
            ticket.messages.push(text.to_string());
            Ok(())
        }

        async fn find_open_ticket(
            &self,
            customer_id: CustomerId,
            order_id: &str,
        ) -> Result<Option<TicketId>, GatewayError> {
            let state = self.lock();
            Ok(state
                .tickets
                .iter()
                .find(|t| {
                    t.customer_id == customer_id.0
                        && t.order_id.as_deref() == Some(order_id)
                        && t.status != "closed"
                })
                .map(|t| TicketId(t.id)))
        }

        async fn get_order_status(&self, order_id: &str) -> Result<Option<String>, GatewayError> {
            Ok(self.lock().orders.get(order_id).cloned())
        }
    }

    #[derive(Default)]
    struct StaticFaqs {
        entries: Vec<FaqEntry>,
    }

    impl StaticFaqs {
        fn seeded() -> Self {
            let entries = seed_entries()
                .into_iter()
                .enumerate()
                .map(|(index, (question, answer, keywords))| FaqEntry {
                    id: index as i64 + 1,
                    question: question.to_string(),
                    answer: answer.to_string(),
                    keywords: keywords.into_iter().map(str::to_string).collect(),
                })
                .collect();
            Self { entries }
        }
    }

    #[async_trait]
    impl FaqSource for StaticFaqs {
        async fn list_faqs(&self) -> Result<Vec<FaqEntry>, GatewayError> {
            Ok(self.entries.clone())
        }
    }

    struct ScriptedAdvisor {
        verdict: AdvisorVerdict,
    }

    #[async_trait]
    impl Advisor for ScriptedAdvisor {
        async fn classify(&self, _text: &str) -> AdvisorVerdict {
            self.verdict.clone()
        }

        async fn rewrite(&self, _user_text: &str, _base_answer: &str) -> Option<String> {
            None
        }

        async fn welcome_message(&self) -> Option<String> {
            None
        }

        async fn generate_manual(
            &self,
            _product: &str,
            _facts: &serde_json::Value,
        ) -> Option<String> {
            None
        }
    }

    type TestController<A = NoopAdvisor> =
        DialogueController<StubGateway, StaticFaqs, A, InMemorySessionStore>;

    fn controller(gateway: StubGateway) -> TestController {
        DialogueController::new(
            gateway,
            StaticFaqs::default(),
            NoopAdvisor,
            InMemorySessionStore::new(),
            BrandConfig::default(),
        )
    }

    fn controller_with_faqs(gateway: StubGateway) -> TestController {
        DialogueController::new(
            gateway,
            StaticFaqs::seeded(),
            NoopAdvisor,
            InMemorySessionStore::new(),
            BrandConfig::default(),
        )
    }

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(
            STAGE_ORDER,
            &[
                Stage::ClosurePending,
                Stage::HumanEmailCapture,
                Stage::ByeShortCircuit,
                Stage::BareOrderId,
                Stage::PendingOffer,
                Stage::HumanIntent,
                Stage::Greeting,
                Stage::FaqMatch,
                Stage::OrderIdBridge,
                Stage::Ticketable,
                Stage::ExplicitTicketRequest,
                Stage::AdvisorFallback,
                Stage::GenericFallback,
            ]
        );
    }

    #[tokio::test]
    async fn defective_item_with_delivered_order_creates_one_ticket() {
        let controller = controller(StubGateway::with_order("ORDL123", "DELIVERED"));

        let outcome = controller
            .process_turn("s1", "I got a defective item, order ORDL123", None, None)
            .await
            .expect("turn");

        let ticket_id = outcome.ticket_id.expect("ticket created");
        assert_eq!(controller.gateway.ticket_count(), 1);
        let ticket = controller.gateway.ticket(ticket_id);
        assert_eq!(ticket.issue_code, "DEFECTIVE_ITEM");
        assert_eq!(ticket.order_id.as_deref(), Some("ORDL123"));
        assert!(outcome.reply.contains("created ticket"));
    }

    #[tokio::test]
    async fn repeat_of_the_same_complaint_appends_instead_of_duplicating() {
        let controller = controller(StubGateway::with_order("ORDL123", "DELIVERED"));

        let first = controller
            .process_turn("s1", "defective item, order ORDL123", None, None)
            .await
            .expect("turn");
        let second = controller
            .process_turn("s1", "defective item, order ORDL123", None, None)
            .await
            .expect("turn");

        assert_eq!(controller.gateway.ticket_count(), 1);
        assert_eq!(first.ticket_id, second.ticket_id);
        assert!(second.reply.contains("existing ticket"));
        let ticket = controller.gateway.ticket(first.ticket_id.expect("id"));
        assert_eq!(ticket.messages.len(), 2);
    }

    #[tokio::test]
    async fn policy_rejection_blocks_ticket_and_explains_the_stage() {
        let controller = controller(StubGateway::with_order("ORDL9", "PACKING"));

        let outcome = controller
            .process_turn("s1", "defective item ORDL9", None, None)
            .await
            .expect("turn");

        assert_eq!(outcome.ticket_id, None);
        assert_eq!(controller.gateway.ticket_count(), 0);
        assert!(outcome.reply.contains("PACKING"));
        assert!(outcome.reply.contains("talk to a human"));
    }

    #[tokio::test]
    async fn unknown_order_id_is_surfaced_without_a_ticket() {
        let controller = controller(StubGateway::default());

        let outcome = controller
            .process_turn("s1", "wrong item, order id: ORDL404", None, None)
            .await
            .expect("turn");

        assert_eq!(outcome.ticket_id, None);
        assert_eq!(controller.gateway.ticket_count(), 0);
        assert!(outcome.reply.contains("ORDL404"));
        assert!(outcome.reply.contains("couldn't find"));
    }

    #[tokio::test]
    async fn missing_order_id_prompts_then_escalates_on_the_third_ask() {
        let controller = controller(StubGateway::default());

        let first = controller
            .process_turn("s1", "my mixer arrived broken", None, None)
            .await
            .expect("turn");
        let second = controller
            .process_turn("s1", "it is really broken", None, None)
            .await
            .expect("turn");
        let third = controller
            .process_turn("s1", "still broken, what now", None, None)
            .await
            .expect("turn");

        assert_eq!(first.reply, second.reply);
        assert_ne!(third.reply, second.reply);
        assert!(third.reply.contains("talk to a human"));
        assert_eq!(controller.gateway.ticket_count(), 0);
    }

    #[tokio::test]
    async fn bare_order_id_after_an_issue_files_the_remembered_complaint() {
        let controller = controller(StubGateway::with_order("ORDL77", "DELIVERED"));

        let prompt = controller
            .process_turn("s1", "my package arrived broken", None, None)
            .await
            .expect("turn");
        assert!(prompt.reply.contains("Order ID"));

        let outcome =
            controller.process_turn("s1", "ORDL77", None, None).await.expect("turn");

        let ticket = controller.gateway.ticket(outcome.ticket_id.expect("ticket"));
        assert_eq!(ticket.issue_code, "DEFECTIVE_ITEM");
        assert_eq!(ticket.messages, vec!["my package arrived broken".to_string()]);
    }

    #[tokio::test]
    async fn bare_order_id_without_prior_issue_asks_what_went_wrong() {
        let controller = controller(StubGateway::with_order("ORDL55", "DELIVERED"));

        let outcome =
            controller.process_turn("s1", "ORDL55", None, None).await.expect("turn");

        assert_eq!(outcome.ticket_id, None);
        assert!(outcome.reply.contains("Got your Order ID ORDL55"));
    }

    #[tokio::test]
    async fn faq_answer_offers_a_ticket_and_decline_then_thanks_closes() {
        let controller = controller_with_faqs(StubGateway::default());

        let answer = controller
            .process_turn("s1", "when refund will I get my money back", None, None)
            .await
            .expect("turn");
        assert!(answer.reply.contains("raise a support ticket"));

        let declined = controller.process_turn("s1", "no", None, None).await.expect("turn");
        assert!(declined.reply.contains("won't raise a ticket"));
        assert_eq!(controller.gateway.ticket_count(), 0);

        let closed = controller.process_turn("s1", "thanks", None, None).await.expect("turn");
        assert!(closed.reply.contains("Take care"));
        // Session is destroyed: the facts are gone.
        assert_eq!(
            controller.sessions.load("s1").await,
            crate::session::SessionFacts::default()
        );
    }

    #[tokio::test]
    async fn accepted_offer_with_order_id_creates_the_ticket() {
        let controller = controller_with_faqs(StubGateway::with_order("ORDL555", "PACKING"));

        let _ = controller
            .process_turn("s1", "my payment failed but money was debited", None, None)
            .await
            .expect("turn");
        let outcome = controller
            .process_turn("s1", "yes, order id: ORDL555", None, None)
            .await
            .expect("turn");

        let ticket = controller.gateway.ticket(outcome.ticket_id.expect("ticket"));
        assert_eq!(ticket.issue_code, "PAYMENT_ISSUES");
        assert_eq!(
            ticket.messages,
            vec!["my payment failed but money was debited".to_string()]
        );
    }

    #[tokio::test]
    async fn offer_without_order_id_keeps_asking_for_it() {
        let controller = controller_with_faqs(StubGateway::default());

        let _ = controller
            .process_turn("s1", "how do I change the delivery address", None, None)
            .await
            .expect("turn");
        let outcome = controller.process_turn("s1", "yes", None, None).await.expect("turn");

        assert_eq!(outcome.ticket_id, None);
        assert!(outcome.reply.contains("share your Order ID"));
    }

    #[tokio::test]
    async fn human_intent_captures_an_email_then_files_the_handoff() {
        let controller = controller(StubGateway::default());

        let ask = controller
            .process_turn("s1", "I want to talk to a human", None, None)
            .await
            .expect("turn");
        assert!(ask.reply.contains("email"));
        assert_eq!(controller.gateway.ticket_count(), 0);

        let nagged = controller
            .process_turn("s1", "why do you need that", None, None)
            .await
            .expect("turn");
        assert!(nagged.reply.contains("valid email"));

        let done = controller
            .process_turn("s1", "sam@example.com", None, None)
            .await
            .expect("turn");
        let ticket = controller.gateway.ticket(done.ticket_id.expect("ticket"));
        assert_eq!(ticket.issue_code, "HUMAN_ASSISTANCE");
        assert!(done.reply.contains("sam@example.com"));
    }

    #[tokio::test]
    async fn human_intent_with_a_contact_email_skips_the_capture_step() {
        let controller = controller(StubGateway::default());

        let outcome = controller
            .process_turn("s1", "please escalate this", Some("jo@example.com"), Some("Jo"))
            .await
            .expect("turn");

        assert!(outcome.ticket_id.is_some());
        assert!(outcome.reply.contains("jo@example.com"));
    }

    #[tokio::test]
    async fn bye_destroys_the_session_immediately() {
        let controller = controller(StubGateway::with_order("ORDL1", "DELIVERED"));

        let _ = controller.process_turn("s1", "ORDL1", None, None).await.expect("turn");
        let farewell = controller.process_turn("s1", "bye", None, None).await.expect("turn");
        assert!(farewell.reply.contains("Take care"));

        // The remembered order id is gone with the session.
        let outcome =
            controller.process_turn("s1", "what about my order id", None, None).await.expect("turn");
        assert!(outcome.reply.contains("Order ID: ORDL12345"));
    }

    #[tokio::test]
    async fn unanswerable_messages_escalate_on_the_third_repeat() {
        let controller = controller(StubGateway::default());

        let first = controller.process_turn("s1", "blorp", None, None).await.expect("turn");
        let second = controller.process_turn("s1", "blorp", None, None).await.expect("turn");
        let third = controller.process_turn("s1", "blorp", None, None).await.expect("turn");

        assert_eq!(first.reply, second.reply);
        assert_ne!(third.reply, second.reply);
        assert!(third.reply.contains("talk to a human"));
    }

    #[tokio::test]
    async fn explicit_ticket_request_defaults_to_a_generic_code() {
        let controller = controller(StubGateway::default());

        let outcome = controller
            .process_turn("s1", "just open a ticket for me", None, None)
            .await
            .expect("turn");

        let ticket = controller.gateway.ticket(outcome.ticket_id.expect("ticket"));
        assert_eq!(ticket.issue_code, "OTHER");
        assert_eq!(ticket.order_id, None);
    }

    #[tokio::test]
    async fn confident_advisor_verdict_is_acted_on() {
        let gateway = StubGateway::with_order("ORDL31", "DELIVERED");
        let controller: TestController<ScriptedAdvisor> = DialogueController::new(
            gateway,
            StaticFaqs::default(),
            ScriptedAdvisor {
                verdict: AdvisorVerdict {
                    intent: Intent::Defect,
                    order_id: Some("ORDL31".to_string()),
                    issue_label: None,
                    confidence: 0.9,
                },
            },
            InMemorySessionStore::new(),
            BrandConfig::default(),
        );

        let outcome = controller
            .process_turn("s1", "it arrived in a sorry state", None, None)
            .await
            .expect("turn");

        let ticket = controller.gateway.ticket(outcome.ticket_id.expect("ticket"));
        assert_eq!(ticket.issue_code, "DEFECTIVE_ITEM");
        assert_eq!(ticket.order_id.as_deref(), Some("ORDL31"));
    }

    #[tokio::test]
    async fn low_confidence_advisor_verdict_falls_through_to_generic_help() {
        let controller: TestController<ScriptedAdvisor> = DialogueController::new(
            StubGateway::default(),
            StaticFaqs::default(),
            ScriptedAdvisor {
                verdict: AdvisorVerdict {
                    intent: Intent::Defect,
                    order_id: None,
                    issue_label: None,
                    confidence: 0.5,
                },
            },
            InMemorySessionStore::new(),
            BrandConfig::default(),
        );

        let outcome = controller
            .process_turn("s1", "it arrived in a sorry state", None, None)
            .await
            .expect("turn");

        assert_eq!(outcome.ticket_id, None);
        assert!(outcome.reply.contains("I can answer questions"));
    }

    #[tokio::test]
    async fn greeting_gets_the_brand_welcome() {
        let controller = controller(StubGateway::default());

        let outcome = controller.process_turn("s1", "hello", None, None).await.expect("turn");
        assert!(outcome.reply.contains("Cassie"));
        assert!(outcome.reply.contains("ORDL12345"));
    }
}
