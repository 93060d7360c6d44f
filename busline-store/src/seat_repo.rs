use async_trait::async_trait;
use busline_core::repository::{LayoutRepository, SeatDeletion, SeatRepository};
use busline_core::{CoreError, CoreResult, FloorLayout, Seat, SeatLayoutConfig};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_error;

pub struct PgSeatRepository {
    pool: PgPool,
}

impl PgSeatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    bus_id: Uuid,
    seat_number: String,
    seat_type: String,
    is_hidden: bool,
    price_override: Option<i64>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = CoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            bus_id: row.bus_id,
            seat_number: row.seat_number,
            seat_type: row.seat_type.parse()?,
            is_hidden: row.is_hidden,
            price_override: row.price_override,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SEAT_COLUMNS: &str =
    "id, bus_id, seat_number, seat_type, is_hidden, price_override, created_at, updated_at";

#[async_trait]
impl SeatRepository for PgSeatRepository {
    async fn list_seats(&self, bus_id: Uuid) -> CoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE bus_id = $1 ORDER BY seat_number",
            SEAT_COLUMNS
        ))
        .bind(bus_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn get_seat(&self, id: Uuid) -> CoreResult<Option<Seat>> {
        let row: Option<SeatRow> = sqlx::query_as(&format!("SELECT {} FROM seats WHERE id = $1", SEAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(Seat::try_from).transpose()
    }

    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO seats (id, bus_id, seat_number, seat_type, is_hidden, price_override, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(seat.id)
            .bind(seat.bus_id)
            .bind(&seat.seat_number)
            .bind(seat.seat_type.as_str())
            .bind(seat.is_hidden)
            .bind(seat.price_override)
            .bind(seat.created_at)
            .bind(seat.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn update_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        for seat in seats {
            let result = sqlx::query(
                r#"
                UPDATE seats
                SET seat_type = $2, is_hidden = $3, price_override = $4, updated_at = $5
                WHERE id = $1
                "#,
            )
            .bind(seat.id)
            .bind(seat.seat_type.as_str())
            .bind(seat.is_hidden)
            .bind(seat.price_override)
            .bind(seat.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the earlier rows.
                return Err(CoreError::NotFound(format!("seat {}", seat.id)));
            }
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn delete_seat_if_unreferenced(&self, id: Uuid) -> CoreResult<SeatDeletion> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Ticket inserts take FOR SHARE on the seat row, so this lock orders
        // the active-ticket check against any concurrent sale.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM seats WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;

        if locked.is_none() {
            return Ok(SeatDeletion::Missing);
        }

        let (in_use,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM tickets WHERE seat_id = $1 AND status IN ('PENDING', 'COMPLETED'))",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if in_use {
            return Ok(SeatDeletion::InUse);
        }

        sqlx::query("DELETE FROM seats WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(SeatDeletion::Deleted)
    }
}

#[async_trait]
impl LayoutRepository for PgSeatRepository {
    async fn get_layout(&self, bus_id: Uuid) -> CoreResult<Option<SeatLayoutConfig>> {
        let row: Option<(Uuid, Json<Vec<FloorLayout>>)> =
            sqlx::query_as("SELECT bus_id, floors FROM seat_layouts WHERE bus_id = $1")
                .bind(bus_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        Ok(row.map(|(bus_id, Json(floors))| SeatLayoutConfig { bus_id, floors }))
    }

    async fn save_layout(&self, config: &SeatLayoutConfig) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO seat_layouts (bus_id, floors, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (bus_id) DO UPDATE SET floors = EXCLUDED.floors, updated_at = NOW()
            "#,
        )
        .bind(config.bus_id)
        .bind(Json(&config.floors))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}
