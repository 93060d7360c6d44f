use async_trait::async_trait;
use busline_core::hints::{SeatHintSource, TripSeatHints};
use busline_core::repository::CatalogService;
use busline_core::{Bus, CoreError, CoreResult, Route, SeatTypePrice, Trip};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_error;

/// Read side of the catalog tables, plus the one counter this service writes.
pub struct PgCatalogService {
    pool: PgPool,
}

impl PgCatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    capacity: i32,
    floor_count: i16,
    company_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    route_id: Uuid,
    bus_id: Uuid,
    departure_time: chrono::DateTime<chrono::Utc>,
    arrival_time: chrono::DateTime<chrono::Utc>,
    total_seats: i32,
    available_seats: i32,
}

#[async_trait]
impl CatalogService for PgCatalogService {
    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        let row: Option<BusRow> =
            sqlx::query_as("SELECT id, capacity, floor_count, company_id FROM buses WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        row.map(|r| {
            let floor_count = u8::try_from(r.floor_count)
                .map_err(|_| CoreError::StorageError(format!("bus {} has floor_count {}", r.id, r.floor_count)))?;
            Ok(Bus { id: r.id, capacity: r.capacity, floor_count, company_id: r.company_id })
        })
        .transpose()
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(
            r#"
            SELECT id, route_id, bus_id, departure_time, arrival_time, total_seats, available_seats
            FROM trips WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(|r| Trip {
            id: r.id,
            route_id: r.route_id,
            bus_id: r.bus_id,
            departure_time: r.departure_time,
            arrival_time: r.arrival_time,
            total_seats: r.total_seats,
            available_seats: r.available_seats,
        }))
    }

    async fn get_route(&self, id: Uuid) -> CoreResult<Option<Route>> {
        let row: Option<(Uuid, String, i64)> =
            sqlx::query_as("SELECT id, name, base_price FROM routes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        Ok(row.map(|(id, name, base_price)| Route { id, name, base_price }))
    }

    async fn seat_type_prices(&self, route_id: Uuid) -> CoreResult<Vec<SeatTypePrice>> {
        let rows: Vec<(Uuid, String, i64)> = sqlx::query_as(
            "SELECT route_id, seat_type, surcharge FROM seat_type_prices WHERE route_id = $1 ORDER BY seat_type",
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter()
            .map(|(route_id, seat_type, surcharge)| {
                Ok(SeatTypePrice { route_id, seat_type: seat_type.parse()?, surcharge })
            })
            .collect()
    }

    async fn adjust_available_seats(&self, trip_id: Uuid, delta: i32) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE trips
            SET available_seats = LEAST(total_seats, GREATEST(0, available_seats + $2))
            WHERE id = $1
            "#,
        )
        .bind(trip_id)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("trip {}", trip_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SeatHintSource for PgCatalogService {
    // Seat rows in Postgres are trip-agnostic, so there is nothing to hint.
    async fn hints_for_trip(&self, _trip_id: Uuid) -> CoreResult<Option<TripSeatHints>> {
        Ok(None)
    }
}
