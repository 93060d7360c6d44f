use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use busline_catalog::{resolve_position, BulkDeleteReport, NewSeat, SeatPosition, SeatUpdate};
use busline_core::{FloorLayout, Seat, SeatLayoutConfig, SeatType};
use busline_order::SeatStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::StaffClaims;
use crate::response::{created, ok, ApiResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatListQuery {
    pub trip_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub id: Uuid,
    pub seat_number: String,
    pub seat_type: SeatType,
    pub is_hidden: bool,
    pub price_override: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SeatStatus>,
    pub position: SeatPosition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatListing {
    pub bus_id: Uuid,
    pub seats: Vec<SeatView>,
    pub layout_config: Option<SeatLayoutConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeatsRequest {
    pub seats: Vec<NewSeat>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSeatsRequest {
    pub seats: Vec<SeatUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    pub floors: Vec<FloorLayout>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSeatsRequest {
    pub floors: Vec<FloorLayout>,
    #[serde(default)]
    pub seat_type: SeatType,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/buses/{id}/seats", get(list_bus_seats).delete(delete_bus_seats))
        .route("/buses/{id}/layout", get(get_layout).put(save_layout))
        .route("/buses/{id}/layout/generate", post(generate_seats))
        .route("/seats/bulk", post(create_seats).put(update_seats))
        .route("/seats/{id}", delete(delete_seat))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /buses/{id}/seats?tripId=
/// Seats with grid positions; with a trip, each seat also carries its status.
async fn list_bus_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(bus_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<SeatListQuery>,
) -> Result<Json<ApiResponse<SeatListing>>, AppError> {
    state.authorize_bus(&claims, bus_id).await?;

    let seats = state.seat_catalog.list_seats(bus_id).await?;
    let layout = state.seat_catalog.layout(bus_id).await?;

    let snapshot = match query.trip_id {
        Some(trip_id) => {
            let snapshot = state.reconciliation.compute_status(trip_id).await?;
            if snapshot.bus_id != bus_id {
                return Err(AppError::Validation(format!("trip {} does not run on bus {}", trip_id, bus_id)));
            }
            Some(snapshot)
        }
        None => None,
    };

    let seats = seats
        .into_iter()
        .map(|seat| SeatView {
            position: resolve_position(&seat.seat_number, layout.as_ref()),
            status: snapshot.as_ref().and_then(|s| s.status_of(&seat.id)),
            id: seat.id,
            seat_number: seat.seat_number,
            seat_type: seat.seat_type,
            is_hidden: seat.is_hidden,
            price_override: seat.price_override,
        })
        .collect();

    Ok(ok(SeatListing { bus_id, seats, layout_config: layout }))
}

/// POST /seats/bulk
async fn create_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiJson(req): ApiJson<CreateSeatsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Seat>>>), AppError> {
    let bus_ids: BTreeSet<Uuid> = req.seats.iter().map(|s| s.bus_id).collect();
    for bus_id in bus_ids {
        state.authorize_bus(&claims, bus_id).await?;
    }

    let seats = state.seat_catalog.create_seats(req.seats).await?;
    Ok(created(seats))
}

/// PUT /seats/bulk
async fn update_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiJson(req): ApiJson<UpdateSeatsRequest>,
) -> Result<Json<ApiResponse<Vec<Seat>>>, AppError> {
    let mut bus_ids = BTreeSet::new();
    for update in &req.seats {
        bus_ids.insert(state.seat_catalog.get_seat(update.id).await?.bus_id);
    }
    for bus_id in bus_ids {
        state.authorize_bus(&claims, bus_id).await?;
    }

    let seats = state.seat_catalog.update_seats(req.seats).await?;
    Ok(ok(seats))
}

/// DELETE /seats/{id}
async fn delete_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(seat_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    let seat = state.seat_catalog.get_seat(seat_id).await?;
    state.authorize_bus(&claims, seat.bus_id).await?;

    state.seat_catalog.delete_seat(seat_id).await?;
    Ok(Json(ApiResponse::success(seat_id).with_message("Seat deleted")))
}

/// DELETE /buses/{id}/seats
async fn delete_bus_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(bus_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BulkDeleteReport>>, AppError> {
    state.authorize_bus(&claims, bus_id).await?;

    let report = state.seat_catalog.delete_all_seats_for_bus(bus_id).await?;
    Ok(ok(report))
}

/// GET /buses/{id}/layout
async fn get_layout(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(bus_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Option<SeatLayoutConfig>>>, AppError> {
    state.authorize_bus(&claims, bus_id).await?;
    Ok(ok(state.seat_catalog.layout(bus_id).await?))
}

/// PUT /buses/{id}/layout
async fn save_layout(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(bus_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<LayoutRequest>,
) -> Result<Json<ApiResponse<SeatLayoutConfig>>, AppError> {
    state.authorize_bus(&claims, bus_id).await?;

    let saved = state.seat_catalog.save_layout(SeatLayoutConfig::new(bus_id, req.floors)).await?;
    Ok(ok(saved))
}

/// POST /buses/{id}/layout/generate
/// Saves the layout and creates every seat it describes.
async fn generate_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(bus_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GenerateSeatsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Seat>>>), AppError> {
    state.authorize_bus(&claims, bus_id).await?;

    let seats = state
        .seat_catalog
        .generate_from_layout(bus_id, req.floors, req.seat_type)
        .await?;
    Ok(created(seats))
}
