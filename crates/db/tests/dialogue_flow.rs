use cassie_core::{BrandConfig, DialogueController, InMemorySessionStore, NoopAdvisor};
use cassie_db::repositories::{SqlFaqStore, SqlSupportGateway};
use cassie_db::{connect_with_settings, migrations, DbPool};

type Controller =
    DialogueController<SqlSupportGateway, SqlFaqStore, NoopAdvisor, InMemorySessionStore>;

async fn setup() -> (Controller, SqlSupportGateway, DbPool) {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");

    let gateway = SqlSupportGateway::new(pool.clone());
    let faqs = SqlFaqStore::new(pool.clone());
    faqs.seed_defaults().await.expect("seed faqs");

    let controller = DialogueController::new(
        SqlSupportGateway::new(pool.clone()),
        faqs,
        NoopAdvisor,
        InMemorySessionStore::new(),
        BrandConfig::default(),
    );
    (controller, gateway, pool)
}

#[tokio::test]
async fn defective_item_turn_creates_exactly_one_ticket() {
    let (controller, gateway, _pool) = setup().await;
    gateway.upsert_order("ORDL123", "DELIVERED").await.expect("order");

    let outcome = controller
        .process_turn("chat-1", "I got a defective item, order ORDL123", None, None)
        .await
        .expect("turn");

    let ticket_id = outcome.ticket_id.expect("ticket created");
    let ticket = gateway.get_ticket(ticket_id).await.expect("get").expect("exists");
    assert_eq!(ticket.issue_code.as_str(), "DEFECTIVE_ITEM");
    assert_eq!(ticket.order_id.as_deref(), Some("ORDL123"));
    assert_eq!(gateway.list_tickets(None).await.expect("list").len(), 1);
}

#[tokio::test]
async fn repeated_complaints_append_to_the_open_ticket() {
    let (controller, gateway, _pool) = setup().await;
    gateway.upsert_order("ORDL123", "DELIVERED").await.expect("order");

    let first = controller
        .process_turn("chat-1", "defective item, order ORDL123", None, None)
        .await
        .expect("turn");
    let second = controller
        .process_turn("chat-1", "defective item, order ORDL123", None, None)
        .await
        .expect("turn");

    assert_eq!(first.ticket_id, second.ticket_id);
    assert_eq!(gateway.list_tickets(None).await.expect("list").len(), 1);
    let messages = gateway
        .ticket_messages(first.ticket_id.expect("id"))
        .await
        .expect("messages");
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn faq_offer_accepted_with_an_order_files_the_labelled_issue() {
    let (controller, gateway, _pool) = setup().await;
    gateway.upsert_order("ORDL88", "ORDER_PLACED").await.expect("order");

    let answer = controller
        .process_turn("chat-2", "my payment failed but money was debited", None, None)
        .await
        .expect("turn");
    assert!(answer.reply.contains("raise a support ticket"));
    assert_eq!(answer.ticket_id, None);

    let outcome = controller
        .process_turn("chat-2", "yes, order id: ORDL88", None, None)
        .await
        .expect("turn");
    let ticket = gateway
        .get_ticket(outcome.ticket_id.expect("ticket"))
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(ticket.issue_code.as_str(), "PAYMENT_ISSUES");
    assert_eq!(ticket.last_message, "my payment failed but money was debited");
}

#[tokio::test]
async fn declined_offer_never_touches_the_store() {
    let (controller, gateway, _pool) = setup().await;

    let _ = controller
        .process_turn("chat-3", "what is your return policy", None, None)
        .await
        .expect("turn");
    let declined = controller.process_turn("chat-3", "no", None, None).await.expect("turn");

    assert!(declined.reply.contains("won't raise a ticket"));
    assert!(gateway.list_tickets(None).await.expect("list").is_empty());
}

#[tokio::test]
async fn cancelled_orders_block_every_ticket() {
    let (controller, gateway, _pool) = setup().await;
    gateway.upsert_order("ORDL500", "CANCELLED").await.expect("order");

    let outcome = controller
        .process_turn("chat-4", "wrong item in order ORDL500", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.ticket_id, None);
    assert!(outcome.reply.contains("CANCELLED"));
    assert!(gateway.list_tickets(None).await.expect("list").is_empty());
}
