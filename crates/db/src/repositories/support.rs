use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cassie_core::domain::customer::CustomerId;
use cassie_core::domain::ticket::{MessageRole, Ticket, TicketId, TicketMessage, TicketStatus};
use cassie_core::gateway::SupportGateway;
use cassie_core::policy::IssueCode;
use cassie_core::GatewayError;

use super::{is_unique_violation, RepositoryError};
use crate::DbPool;

/// sqlx/SQLite implementation of the controller's store seam, plus the
/// ticket listing/status operations the transports need.
#[derive(Clone)]
pub struct SqlSupportGateway {
    pool: DbPool,
}

impl SqlSupportGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_tickets(
        &self,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, customer_id, order_id, issue_code, status, last_message, \
                     source, created_at, updated_at FROM tickets WHERE status = ?1 \
                     ORDER BY id DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, customer_id, order_id, issue_code, status, last_message, \
                     source, created_at, updated_at FROM tickets ORDER BY id DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_ticket).collect()
    }

    pub async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, order_id, issue_code, status, last_message, source, \
             created_at, updated_at FROM tickets WHERE id = ?1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_ticket).transpose()
    }

    pub async fn ticket_messages(
        &self,
        id: TicketId,
    ) -> Result<Vec<TicketMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, role, text, created_at FROM messages WHERE ticket_id = ?1 \
             ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Returns false when the ticket does not exist.
    pub async fn set_status(
        &self,
        id: TicketId,
        status: TicketStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        )
        .bind(status.as_str())
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_order(
        &self,
        order_id: &str,
        status: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO orders (order_id, status) VALUES (?1, ?2) \
             ON CONFLICT (order_id) DO UPDATE SET status = excluded.status",
        )
        .bind(order_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_or_create_customer_inner(
        &self,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<CustomerId, RepositoryError> {
        let Some(email) = email else {
            // Anonymous chat customer.
            let result = sqlx::query("INSERT INTO customers (email, name) VALUES (NULL, ?1)")
                .bind(name)
                .execute(&self.pool)
                .await?;
            return Ok(CustomerId(result.last_insert_rowid()));
        };

        if let Some(id) = self.find_customer_by_email(email).await? {
            return Ok(id);
        }
        let insert = sqlx::query("INSERT INTO customers (email, name) VALUES (?1, ?2)")
            .bind(email)
            .bind(name)
            .execute(&self.pool)
            .await;
        match insert {
            Ok(result) => Ok(CustomerId(result.last_insert_rowid())),
            Err(error) if is_unique_violation(&error) => self
                .find_customer_by_email(email)
                .await?
                .ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "customer with email `{email}` vanished after unique violation"
                    ))
                }),
            Err(error) => Err(error.into()),
        }
    }

    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM customers WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(CustomerId))
    }

    async fn create_ticket_inner(
        &self,
        customer_id: CustomerId,
        order_id: Option<&str>,
        issue_code: &IssueCode,
        first_message: &str,
        source: &str,
    ) -> Result<TicketId, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            "INSERT INTO tickets (customer_id, order_id, issue_code, status, last_message, \
             source) VALUES (?1, ?2, ?3, 'open', ?4, ?5)",
        )
        .bind(customer_id.0)
        .bind(order_id)
        .bind(issue_code.as_str())
        .bind(first_message)
        .bind(source)
        .execute(&mut *tx)
        .await;

        let ticket_id = match insert {
            Ok(result) => result.last_insert_rowid(),
            Err(error) if is_unique_violation(&error) => {
                // Lost the create-or-append race: fold the message into the
                // open ticket the other turn just created.
                drop(tx);
                let Some(order_id) = order_id else { return Err(error.into()) };
                let existing = self
                    .find_open_ticket_inner(customer_id, order_id)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::Decode(
                            "open ticket vanished after unique violation".to_string(),
                        )
                    })?;
                self.append_message_inner(existing, MessageRole::User, first_message).await?;
                return Ok(existing);
            }
            Err(error) => return Err(error.into()),
        };

        sqlx::query("INSERT INTO messages (ticket_id, role, text) VALUES (?1, 'user', ?2)")
            .bind(ticket_id)
            .bind(first_message)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(TicketId(ticket_id))
    }

    async fn append_message_inner(
        &self,
        ticket_id: TicketId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO messages (ticket_id, role, text) VALUES (?1, ?2, ?3)")
            .bind(ticket_id.0)
            .bind(role.as_str())
            .bind(text)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE tickets SET last_message = ?1, updated_at = datetime('now') WHERE id = ?2",
        )
        .bind(text)
        .bind(ticket_id.0)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_open_ticket_inner(
        &self,
        customer_id: CustomerId,
        order_id: &str,
    ) -> Result<Option<TicketId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM tickets WHERE customer_id = ?1 AND order_id = ?2 AND \
             status != 'closed'",
        )
        .bind(customer_id.0)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(TicketId))
    }
}

#[async_trait]
impl SupportGateway for SqlSupportGateway {
    async fn get_or_create_customer(
        &self,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<CustomerId, GatewayError> {
        self.get_or_create_customer_inner(email, name).await.map_err(Into::into)
    }

    async fn create_ticket(
        &self,
        customer_id: CustomerId,
        order_id: Option<&str>,
        issue_code: &IssueCode,
        first_message: &str,
        source: &str,
    ) -> Result<TicketId, GatewayError> {
        self.create_ticket_inner(customer_id, order_id, issue_code, first_message, source)
            .await
            .map_err(Into::into)
    }

    async fn append_message(
        &self,
        ticket_id: TicketId,
        role: MessageRole,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.append_message_inner(ticket_id, role, text).await.map_err(Into::into)
    }

    async fn find_open_ticket(
        &self,
        customer_id: CustomerId,
        order_id: &str,
    ) -> Result<Option<TicketId>, GatewayError> {
        self.find_open_ticket_inner(customer_id, order_id).await.map_err(Into::into)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Option<String>, GatewayError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM orders WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)
        .map_err(GatewayError::from)?;
        Ok(status)
    }
}

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = TicketStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown ticket status `{status_raw}`")))?;
    Ok(Ticket {
        id: TicketId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        order_id: row.try_get("order_id")?,
        issue_code: IssueCode(row.try_get("issue_code")?),
        status,
        last_message: row.try_get("last_message")?,
        source: row.try_get("source")?,
        created_at: row.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
        updated_at: row.try_get::<NaiveDateTime, _>("updated_at")?.and_utc(),
    })
}

fn row_to_message(row: &SqliteRow) -> Result<TicketMessage, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    let role = MessageRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;
    Ok(TicketMessage {
        id: row.try_get("id")?,
        ticket_id: TicketId(row.try_get("ticket_id")?),
        role,
        text: row.try_get("text")?,
        created_at: row.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
    })
}
