use async_trait::async_trait;
use busline_core::repository::{TicketFilter, TicketRepository};
use busline_core::{CoreError, CoreResult, Ticket, TicketStatus};
use busline_shared::Masked;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::map_db_error;

pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    trip_id: Uuid,
    seat_id: Uuid,
    user_id: String,
    status: String,
    mode: String,
    price: i64,
    buyer_name: Option<String>,
    buyer_phone: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            trip_id: row.trip_id,
            seat_id: row.seat_id,
            user_id: row.user_id,
            status: row.status.parse()?,
            mode: row.mode.parse()?,
            price: row.price,
            buyer_name: row.buyer_name,
            buyer_phone: row.buyer_phone.map(Masked),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TICKET_COLUMNS: &str =
    "id, trip_id, seat_id, user_id, status, mode, price, buyer_name, buyer_phone, created_at, updated_at";

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn insert_if_seat_free(&self, ticket: &Ticket) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Holds off a concurrent seat delete until this sale commits.
        let seat: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM seats WHERE id = $1 FOR SHARE")
            .bind(ticket.seat_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;

        if seat.is_none() {
            return Err(CoreError::NotFound(format!("seat {}", ticket.seat_id)));
        }

        // tickets_one_active_per_seat turns a double sale into a unique violation.
        sqlx::query(
            r#"
            INSERT INTO tickets
                (id, trip_id, seat_id, user_id, status, mode, price, buyer_name, buyer_phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.trip_id)
        .bind(ticket.seat_id)
        .bind(&ticket.user_id)
        .bind(ticket.status.as_str())
        .bind(ticket.mode.as_str())
        .bind(ticket.price)
        .bind(&ticket.buyer_name)
        .bind(ticket.buyer_phone.as_ref().map(|phone| phone.expose()))
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> CoreResult<Vec<Ticket>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tickets WHERE TRUE", TICKET_COLUMNS));

        if let Some(trip_id) = filter.trip_id {
            query.push(" AND trip_id = ").push_bind(trip_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at, id");

        let rows: Vec<TicketRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn transition(&self, id: Uuid, expected: TicketStatus, next: TicketStatus) -> CoreResult<Ticket> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "UPDATE tickets SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get_ticket(id).await? {
                Some(current) => Err(CoreError::Conflict(format!(
                    "ticket {} is {}, expected {}",
                    id, current.status, expected
                ))),
                None => Err(CoreError::NotFound(format!("ticket {}", id))),
            },
        }
    }

    async fn delete_ticket(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }
}
