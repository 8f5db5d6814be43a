use async_trait::async_trait;

use crate::domain::customer::CustomerId;
use crate::domain::faq::FaqEntry;
use crate::domain::ticket::{MessageRole, TicketId};
use crate::errors::GatewayError;
use crate::policy::IssueCode;

/// Customer/ticket/order store as the dialogue controller needs it. The
/// backing store must make create-or-append atomic: two concurrent turns
/// may not produce duplicate open tickets for the same customer+order.
#[async_trait]
pub trait SupportGateway: Send + Sync {
    async fn get_or_create_customer(
        &self,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<CustomerId, GatewayError>;

    async fn create_ticket(
        &self,
        customer_id: CustomerId,
        order_id: Option<&str>,
        issue_code: &IssueCode,
        first_message: &str,
        source: &str,
    ) -> Result<TicketId, GatewayError>;

    async fn append_message(
        &self,
        ticket_id: TicketId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), GatewayError>;

    async fn find_open_ticket(
        &self,
        customer_id: CustomerId,
        order_id: &str,
    ) -> Result<Option<TicketId>, GatewayError>;

    async fn get_order_status(&self, order_id: &str) -> Result<Option<String>, GatewayError>;
}

/// Read-only FAQ collection, refreshable on demand via `FaqCache`.
#[async_trait]
pub trait FaqSource: Send + Sync {
    async fn list_faqs(&self) -> Result<Vec<FaqEntry>, GatewayError>;
}
