use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Json, Router,
};
use busline_order::{LiveMonitor, SeatStatusSnapshot};
use futures_util::Stream;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::ApiPath;
use crate::middleware::auth::StaffClaims;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips/{id}/seat-status", get(seat_status))
        .route("/trips/{id}/seat-status/stream", get(stream_seat_status))
}

/// GET /trips/{id}/seat-status
async fn seat_status(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(trip_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<SeatStatusSnapshot>>, AppError> {
    state.authorize_trip(&claims, trip_id).await?;

    let snapshot = state.reconciliation.compute_status(trip_id).await?;
    Ok(ok(snapshot))
}

/// GET /trips/{id}/seat-status/stream
/// Live view: one `seat-status` event per poll. Polling stops when the client
/// disconnects and the stream (and its monitor) is dropped.
async fn stream_seat_status(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(trip_id): ApiPath<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    state.authorize_trip(&claims, trip_id).await?;

    let monitor = LiveMonitor::new(state.reconciliation.clone(), state.poll_interval);
    monitor.enable(trip_id);

    let stream = WatchStream::new(monitor.subscribe()).filter_map(move |snapshot| {
        let _monitor = &monitor;
        snapshot.map(|s| Event::default().event("seat-status").json_data(&s))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
