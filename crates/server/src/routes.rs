use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use cassie_advisor::{extract_section, fallback_manual};
use cassie_core::advisor::Advisor;
use cassie_core::dialogue::DialogueError;
use cassie_core::domain::ticket::{Ticket, TicketId, TicketMessage, TicketStatus};
use cassie_db::repositories::{RepositoryError, SqlFaqStore, SqlManualStore, SqlSupportGateway};
use cassie_db::{reports, DbPool};

use crate::bootstrap::{Application, ChatService};
use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub gateway: SqlSupportGateway,
    pub faqs: SqlFaqStore,
    pub manuals: SqlManualStore,
    pub advisor: Arc<dyn Advisor>,
    pub pool: DbPool,
    session_locks: Arc<SessionLocks>,
}

impl AppState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            chat: app.chat.clone(),
            gateway: SqlSupportGateway::new(app.db_pool.clone()),
            faqs: SqlFaqStore::new(app.db_pool.clone()),
            manuals: SqlManualStore::new(app.db_pool.clone()),
            advisor: app.advisor.clone(),
            pool: app.db_pool.clone(),
            session_locks: Arc::new(SessionLocks::default()),
        }
    }
}

/// One in-flight turn per session id; turns for different sessions run in
/// parallel. The controller relies on this serialization.
#[derive(Default)]
struct SessionLocks {
    locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn handle(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health::health))
        .route("/chat", post(chat))
        .route("/tickets", get(list_tickets))
        .route("/tickets/{id}", get(get_ticket).patch(update_ticket))
        .route("/faq/upsert", post(upsert_faqs))
        .route("/reports/summary", get(reports_summary))
        .route("/manual/generate", post(generate_manual))
        .route("/manual/get", get(get_manual))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DialogueError> for ApiError {
    fn from(error: DialogueError) -> Self {
        Self { status: StatusCode::SERVICE_UNAVAILABLE, message: error.to_string() }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        Self { status: StatusCode::SERVICE_UNAVAILABLE, message: error.to_string() }
    }
}

async fn home() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Cassie API running",
        "endpoints": [
            "GET  /health",
            "POST /chat",
            "GET  /tickets",
            "GET  /tickets/{id}",
            "PATCH /tickets/{id}",
            "POST /faq/upsert",
            "GET  /reports/summary?range=today|this_week|this_month|last7|last30 or from/to",
            "POST /manual/generate",
            "GET  /manual/get?product=...&section=...",
        ],
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub text: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub ticket_id: Option<i64>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }
    let session_id = request
        .session_id
        .filter(|session_id| !session_id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let lock = state.session_locks.handle(&session_id).await;
    let _guard = lock.lock().await;

    let outcome = state
        .chat
        .process_turn(
            &session_id,
            text,
            request.email.as_deref().filter(|email| !email.trim().is_empty()),
            request.name.as_deref().filter(|name| !name.trim().is_empty()),
        )
        .await?;

    info!(
        event_name = "api.chat.turn_processed",
        session_id = %session_id,
        ticket_id = outcome.ticket_id.map(|id| id.0).unwrap_or(-1),
        "chat turn processed"
    );
    Ok(Json(ChatResponse {
        session_id,
        reply: outcome.reply,
        ticket_id: outcome.ticket_id.map(|id| id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TicketsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<Ticket>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketsQuery>,
) -> Result<Json<TicketListResponse>, ApiError> {
    let status = query
        .status
        .map(|raw| {
            TicketStatus::parse(&raw)
                .ok_or_else(|| ApiError::bad_request(format!("invalid status `{raw}`")))
        })
        .transpose()?;
    let tickets = state.gateway.list_tickets(status).await?;
    Ok(Json(TicketListResponse { tickets }))
}

#[derive(Debug, Serialize)]
pub struct TicketDetailResponse {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TicketDetailResponse>, ApiError> {
    let ticket = state
        .gateway
        .get_ticket(TicketId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("ticket not found"))?;
    let messages = state.gateway.ticket_messages(TicketId(id)).await?;
    Ok(Json(TicketDetailResponse { ticket, messages }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: String,
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = TicketStatus::parse(&request.status)
        .ok_or_else(|| ApiError::bad_request("invalid status"))?;
    let updated = state.gateway.set_status(TicketId(id), status).await?;
    if !updated {
        return Err(ApiError::not_found("ticket not found"));
    }
    Ok(Json(json!({ "ok": true, "ticket_id": id, "status": status.as_str() })))
}

#[derive(Debug, Deserialize)]
pub struct FaqUpsertRequest {
    pub faqs: FaqItems,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FaqItems {
    One(FaqItem),
    Many(Vec<FaqItem>),
}

#[derive(Debug, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

pub async fn upsert_faqs(
    State(state): State<AppState>,
    Json(request): Json<FaqUpsertRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = match request.faqs {
        FaqItems::One(item) => vec![item],
        FaqItems::Many(items) => items,
    };
    if items.is_empty() {
        return Err(ApiError::bad_request(
            "body must include 'faqs': [ {question, answer, keywords?} ]",
        ));
    }

    let mut ids = Vec::new();
    let mut skipped = 0usize;
    for item in items {
        let question = item.question.trim();
        let answer = item.answer.trim();
        if question.is_empty() || answer.is_empty() {
            skipped += 1;
            continue;
        }
        let id = state.faqs.upsert(question, answer, &item.keywords).await?;
        ids.push(id);
    }

    // Edited entries must be visible to the next turn.
    state.chat.refresh_faqs();

    Ok(Json(json!({ "ok": true, "ids": ids, "skipped": skipped })))
}

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    pub range: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

pub async fn reports_summary(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (from_utc, to_utc) = match (query.range, query.from, query.to) {
        (Some(preset), _, _) if !preset.trim().is_empty() => {
            reports::utc_range_for(preset.trim())
        }
        (_, Some(from), Some(to)) => (from, to),
        _ => reports::utc_range_for("last7"),
    };
    let summary = reports::summary(&state.pool, &from_utc, &to_utc).await?;
    Ok(Json(json!({
        "range": { "from_utc": from_utc, "to_utc": to_utc },
        "summary": summary,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ManualGenerateRequest {
    pub product: String,
    #[serde(default)]
    pub facts: serde_json::Value,
    pub section: Option<String>,
}

pub async fn generate_manual(
    State(state): State<AppState>,
    Json(request): Json<ManualGenerateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let product = request.product.trim();
    if product.is_empty() {
        return Err(ApiError::bad_request("product is required"));
    }
    let section = request.section.unwrap_or_else(|| "full".to_string());

    let markdown = state
        .advisor
        .generate_manual(product, &request.facts)
        .await
        .unwrap_or_else(|| fallback_manual(product));
    let output = extract_section(&markdown, &section);

    let id = state
        .manuals
        .upsert(product, &section, &output, Some(&request.facts.to_string()))
        .await?;

    Ok(Json(json!({
        "product": product,
        "section": section,
        "markdown": output,
        "id": id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ManualQuery {
    pub product: String,
    pub section: Option<String>,
}

pub async fn get_manual(
    State(state): State<AppState>,
    Query(query): Query<ManualQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let product = query.product.trim();
    if product.is_empty() {
        return Err(ApiError::bad_request("product query param is required"));
    }
    let section = query.section.unwrap_or_else(|| "full".to_string());
    let manual = state
        .manuals
        .get(product, &section)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))?;
    Ok(Json(json!({
        "product": manual.product,
        "section": manual.section,
        "markdown": manual.markdown,
    })))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::Json;

    use cassie_core::advisor::NoopAdvisor;
    use cassie_core::{BrandConfig, DialogueController, InMemorySessionStore};
    use cassie_db::repositories::{SqlFaqStore, SqlManualStore, SqlSupportGateway};
    use cassie_db::{connect_with_settings, migrations};

    use super::{
        chat, generate_manual, get_ticket, list_tickets, update_ticket, AppState, ChatRequest,
        ManualGenerateRequest, SessionLocks, TicketsQuery, UpdateTicketRequest,
    };

    pub(crate) async fn test_state() -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let faqs = SqlFaqStore::new(pool.clone());
        faqs.seed_defaults().await.expect("seed faqs");

        let chat = Arc::new(DialogueController::new(
            SqlSupportGateway::new(pool.clone()),
            SqlFaqStore::new(pool.clone()),
            Arc::new(NoopAdvisor) as Arc<dyn cassie_core::advisor::Advisor>,
            InMemorySessionStore::new(),
            BrandConfig::default(),
        ));

        AppState {
            chat,
            gateway: SqlSupportGateway::new(pool.clone()),
            faqs,
            manuals: SqlManualStore::new(pool.clone()),
            advisor: Arc::new(NoopAdvisor),
            pool,
            session_locks: Arc::new(SessionLocks::default()),
        }
    }

    #[tokio::test]
    async fn chat_route_runs_a_full_ticket_flow() {
        let state = test_state().await;
        state.gateway.upsert_order("ORDL123", "DELIVERED").await.expect("order");

        let response = chat(
            State(state.clone()),
            Json(ChatRequest {
                session_id: Some("api-1".to_string()),
                text: "defective item, order ORDL123".to_string(),
                email: Some("api@example.com".to_string()),
                name: None,
            }),
        )
        .await
        .expect("chat");

        assert_eq!(response.0.session_id, "api-1");
        let ticket_id = response.0.ticket_id.expect("ticket");

        let detail = get_ticket(State(state.clone()), Path(ticket_id)).await.expect("detail");
        assert_eq!(detail.0.ticket.issue_code.as_str(), "DEFECTIVE_ITEM");
        assert_eq!(detail.0.messages.len(), 1);
    }

    #[tokio::test]
    async fn chat_route_rejects_empty_text() {
        let state = test_state().await;
        let result = chat(
            State(state),
            Json(ChatRequest {
                session_id: None,
                text: "   ".to_string(),
                email: None,
                name: None,
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_session_ids_are_generated() {
        let state = test_state().await;
        let response = chat(
            State(state),
            Json(ChatRequest {
                session_id: None,
                text: "hello".to_string(),
                email: None,
                name: None,
            }),
        )
        .await
        .expect("chat");
        assert!(!response.0.session_id.is_empty());
        assert!(response.0.reply.contains("Cassie"));
    }

    #[tokio::test]
    async fn ticket_status_updates_and_filters() {
        let state = test_state().await;
        state.gateway.upsert_order("ORDL5", "DELIVERED").await.expect("order");

        let created = chat(
            State(state.clone()),
            Json(ChatRequest {
                session_id: Some("api-2".to_string()),
                text: "wrong item, order ORDL5".to_string(),
                email: None,
                name: None,
            }),
        )
        .await
        .expect("chat");
        let ticket_id = created.0.ticket_id.expect("ticket");

        update_ticket(
            State(state.clone()),
            Path(ticket_id),
            Json(UpdateTicketRequest { status: "closed".to_string() }),
        )
        .await
        .expect("update");

        let open = list_tickets(
            State(state.clone()),
            Query(TicketsQuery { status: Some("open".to_string()) }),
        )
        .await
        .expect("list");
        assert!(open.0.tickets.is_empty());

        let invalid = list_tickets(
            State(state),
            Query(TicketsQuery { status: Some("archived".to_string()) }),
        )
        .await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn manual_generation_falls_back_without_an_advisor() {
        let state = test_state().await;

        let generated = generate_manual(
            State(state.clone()),
            Json(ManualGenerateRequest {
                product: "Blender X".to_string(),
                facts: serde_json::Value::Null,
                section: Some("quick_start".to_string()),
            }),
        )
        .await
        .expect("generate");
        assert!(generated.0["markdown"]
            .as_str()
            .expect("markdown")
            .starts_with("## Quick Start"));

        let stored = state
            .manuals
            .get("blender x", "quick_start")
            .await
            .expect("get")
            .expect("exists");
        assert!(stored.markdown.contains("Quick Start"));
    }
}
