use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use busline_core::SeatTypePrice;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::ApiPath;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/routes/{id}/seat-type-prices", get(seat_type_prices))
}

/// GET /routes/{id}/seat-type-prices
async fn seat_type_prices(
    State(state): State<AppState>,
    ApiPath(route_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<SeatTypePrice>>>, AppError> {
    let prices = state.prices.seat_type_prices(route_id).await?;
    Ok(ok(prices))
}
