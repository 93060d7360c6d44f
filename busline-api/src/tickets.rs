use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use busline_core::payment::PaymentOutcome;
use busline_core::{Buyer, SaleMode, Ticket, TicketStatus};
use busline_order::IssueReport;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::StaffClaims;
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTicketsQuery {
    pub trip_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketsRequest {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub buyer: Buyer,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub outcome: PaymentOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets).post(issue_online))
        .route("/tickets/counter", post(issue_counter))
        .route("/tickets/{id}", get(get_ticket).delete(delete_ticket))
        .route("/tickets/{id}/cancel", patch(cancel_ticket))
        .route("/tickets/{id}/payment", patch(record_payment))
        .route("/tickets/{id}/fail", patch(fail_ticket))
}

/// GET /tickets?tripId=&status=
/// Staff must scope the listing to one trip of their company.
async fn list_tickets(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiQuery(query): ApiQuery<ListTicketsQuery>,
) -> Result<Json<ApiResponse<Vec<Ticket>>>, AppError> {
    match query.trip_id {
        Some(trip_id) => {
            state.authorize_trip(&claims, trip_id).await?;
        }
        None if claims.is_admin() => {}
        None => return Err(AppError::Validation("tripId is required".to_string())),
    }

    let tickets = state.booking.list_tickets(query.trip_id, query.status).await?;
    Ok(ok(tickets))
}

/// POST /tickets
async fn issue_online(
    state: State<AppState>,
    claims: Extension<StaffClaims>,
    ApiJson(req): ApiJson<IssueTicketsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssueReport>>), AppError> {
    issue(state, claims, req, SaleMode::Online).await
}

/// POST /tickets/counter
async fn issue_counter(
    state: State<AppState>,
    claims: Extension<StaffClaims>,
    ApiJson(req): ApiJson<IssueTicketsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssueReport>>), AppError> {
    issue(state, claims, req, SaleMode::Counter).await
}

async fn issue(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    req: IssueTicketsRequest,
    mode: SaleMode,
) -> Result<(StatusCode, Json<ApiResponse<IssueReport>>), AppError> {
    state.authorize_trip(&claims, req.trip_id).await?;

    let report = state.booking.issue(req.trip_id, req.seat_ids, &req.buyer, mode).await?;

    state
        .metrics
        .tickets_issued
        .with_label_values(&[mode.as_str()])
        .inc_by(report.succeeded.len() as u64);
    for failed in &report.failed {
        let reason = format!("{:?}", failed.reason);
        state.metrics.seats_failed.with_label_values(&[reason.as_str()]).inc();
    }

    if report.succeeded.is_empty() {
        return Err(AppError::NothingSold(report.failed));
    }

    let message = format!("{} ticket(s) issued, {} seat(s) failed", report.succeeded.len(), report.failed.len());
    Ok((StatusCode::CREATED, Json(ApiResponse::success(report).with_message(message))))
}

/// GET /tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Ticket>>, AppError> {
    let ticket = authorized_ticket(&state, &claims, ticket_id).await?;
    Ok(ok(ticket))
}

/// PATCH /tickets/{id}/cancel
async fn cancel_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Ticket>>, AppError> {
    authorized_ticket(&state, &claims, ticket_id).await?;

    let ticket = state.booking.cancel(ticket_id).await?;
    record_transition(&state, &ticket);
    Ok(ok(ticket))
}

/// PATCH /tickets/{id}/payment
/// Records the payment provider's verdict on an online ticket.
async fn record_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(ticket_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<PaymentRequest>,
) -> Result<Json<ApiResponse<Ticket>>, AppError> {
    authorized_ticket(&state, &claims, ticket_id).await?;

    let ticket = state.booking.confirm_payment(ticket_id, req.outcome).await?;
    record_transition(&state, &ticket);
    Ok(ok(ticket))
}

/// PATCH /tickets/{id}/fail
async fn fail_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Ticket>>, AppError> {
    authorized_ticket(&state, &claims, ticket_id).await?;

    let ticket = state.booking.mark_failed(ticket_id).await?;
    record_transition(&state, &ticket);
    Ok(ok(ticket))
}

/// DELETE /tickets/{id}
async fn delete_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    authorized_ticket(&state, &claims, ticket_id).await?;

    state.booking.delete_ticket(ticket_id).await?;
    Ok(Json(ApiResponse::success(ticket_id).with_message("Ticket deleted")))
}

async fn authorized_ticket(state: &AppState, claims: &StaffClaims, ticket_id: Uuid) -> Result<Ticket, AppError> {
    let ticket = state.booking.ticket(ticket_id).await?;
    state.authorize_trip(claims, ticket.trip_id).await?;
    Ok(ticket)
}

fn record_transition(state: &AppState, ticket: &Ticket) {
    state
        .metrics
        .ticket_transitions
        .with_label_values(&[ticket.status.as_str()])
        .inc();
}
