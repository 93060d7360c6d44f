use busline_catalog::{PriceCalculator, RoutePricing};
use busline_core::events::TicketEventPublisher;
use busline_core::repository::{CatalogService, SeatRepository, TicketFilter, TicketRepository};
use busline_core::{Buyer, CoreError, SaleMode, Ticket, TicketStatus, Trip};
use busline_core::payment::PaymentOutcome;
use busline_shared::{TicketIssuedEvent, TicketStatusChangedEvent};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Why a single seat in an issuance request was not sold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    SeatUnavailable,
    SeatNotFound,
    SeatHidden,
    StorageError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedSeat {
    pub seat_id: Uuid,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    pub succeeded: Vec<Ticket>,
    pub failed: Vec<FailedSeat>,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Invalid ticket transition from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("Ticket {0} is still active; cancel it first")]
    TicketActive(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;

/// The only writer of ticket records.
pub struct BookingCoordinator {
    catalog: Arc<dyn CatalogService>,
    seats: Arc<dyn SeatRepository>,
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn TicketEventPublisher>,
    prices: PriceCalculator,
    max_in_flight: usize,
}

impl BookingCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        seats: Arc<dyn SeatRepository>,
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn TicketEventPublisher>,
    ) -> Self {
        Self {
            prices: PriceCalculator::new(catalog.clone()),
            catalog,
            seats,
            tickets,
            events,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Sells each seat independently. A seat that cannot be sold is reported
    /// in `failed` and never rolls back the others. Outcomes keep request order.
    pub async fn issue(
        &self,
        trip_id: Uuid,
        seat_ids: Vec<Uuid>,
        buyer: &Buyer,
        mode: SaleMode,
    ) -> BookingResult<IssueReport> {
        if seat_ids.is_empty() {
            return Err(BookingError::Validation("at least one seat is required".to_string()));
        }
        if buyer.user_id.trim().is_empty() {
            return Err(BookingError::Validation("buyer user id is required".to_string()));
        }

        let trip = self
            .catalog
            .get_trip(trip_id)
            .await?
            .ok_or(BookingError::TripNotFound(trip_id))?;
        let pricing = self.prices.route_pricing(trip.route_id).await;

        let outcomes: Vec<Result<Ticket, FailedSeat>> = stream::iter(seat_ids)
            .map(|seat_id| self.issue_one(&trip, seat_id, buyer, mode, &pricing))
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let mut report = IssueReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(ticket) => report.succeeded.push(ticket),
                Err(failed) => report.failed.push(failed),
            }
        }

        info!(
            "Issued {} {} ticket(s) on trip {} ({} failed)",
            report.succeeded.len(),
            mode,
            trip_id,
            report.failed.len()
        );
        Ok(report)
    }

    async fn issue_one(
        &self,
        trip: &Trip,
        seat_id: Uuid,
        buyer: &Buyer,
        mode: SaleMode,
        pricing: &RoutePricing,
    ) -> Result<Ticket, FailedSeat> {
        let fail = |reason| FailedSeat { seat_id, reason };

        let seat = match self.seats.get_seat(seat_id).await {
            Ok(Some(seat)) if seat.bus_id == trip.bus_id => seat,
            Ok(_) => return Err(fail(FailureReason::SeatNotFound)),
            Err(e) => {
                error!("Failed to load seat {}: {}", seat_id, e);
                return Err(fail(FailureReason::StorageError));
            }
        };
        if seat.is_hidden {
            return Err(fail(FailureReason::SeatHidden));
        }

        let ticket =
            Ticket::new(trip.id, seat.id, buyer.user_id.clone(), mode, pricing.price_for(&seat)).with_contact(buyer);

        match self.tickets.insert_if_seat_free(&ticket).await {
            Ok(()) => {}
            Err(CoreError::Conflict(_)) => return Err(fail(FailureReason::SeatUnavailable)),
            // Deleted between the lookup and the insert.
            Err(CoreError::NotFound(_)) => return Err(fail(FailureReason::SeatNotFound)),
            Err(e) => {
                error!("Failed to issue ticket for seat {} on trip {}: {}", seat_id, trip.id, e);
                return Err(fail(FailureReason::StorageError));
            }
        }

        debug!("Issued ticket {} for seat {} (phone {:?})", ticket.id, seat.seat_number, ticket.buyer_phone);

        if let Err(e) = self.catalog.adjust_available_seats(trip.id, -1).await {
            warn!("Could not decrement available seats for trip {}: {}", trip.id, e);
        }

        let event = TicketIssuedEvent {
            ticket_id: ticket.id,
            trip_id: ticket.trip_id,
            seat_id: ticket.seat_id,
            user_id: ticket.user_id.clone(),
            mode: ticket.mode.to_string(),
            status: ticket.status.to_string(),
            price: ticket.price,
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.events.ticket_issued(&event).await {
            warn!("Failed to publish TicketIssued for {}: {}", ticket.id, e);
        }

        Ok(ticket)
    }

    pub async fn cancel(&self, ticket_id: Uuid) -> BookingResult<Ticket> {
        self.transition(ticket_id, TicketStatus::Cancelled).await
    }

    pub async fn confirm_payment(&self, ticket_id: Uuid, outcome: PaymentOutcome) -> BookingResult<Ticket> {
        self.transition(ticket_id, outcome.target_status()).await
    }

    pub async fn mark_failed(&self, ticket_id: Uuid) -> BookingResult<Ticket> {
        self.transition(ticket_id, TicketStatus::Failed).await
    }

    /// Removes a ticket record. Active tickets must be cancelled first.
    pub async fn delete_ticket(&self, ticket_id: Uuid) -> BookingResult<()> {
        let ticket = self.ticket(ticket_id).await?;
        if ticket.status.is_active() {
            return Err(BookingError::TicketActive(ticket_id));
        }

        if !self.tickets.delete_ticket(ticket_id).await? {
            return Err(BookingError::TicketNotFound(ticket_id));
        }
        info!("Deleted {} ticket {}", ticket.status, ticket_id);
        Ok(())
    }

    pub async fn list_tickets(
        &self,
        trip_id: Option<Uuid>,
        status: Option<TicketStatus>,
    ) -> BookingResult<Vec<Ticket>> {
        let filter = TicketFilter { trip_id, status };
        Ok(self.tickets.list_tickets(&filter).await?)
    }

    pub async fn ticket(&self, ticket_id: Uuid) -> BookingResult<Ticket> {
        self.tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or(BookingError::TicketNotFound(ticket_id))
    }

    async fn transition(&self, ticket_id: Uuid, next: TicketStatus) -> BookingResult<Ticket> {
        let current = self.ticket(ticket_id).await?;
        if !current.status.can_transition_to(next) {
            return Err(BookingError::InvalidTransition { from: current.status, to: next });
        }

        let updated = match self.tickets.transition(ticket_id, current.status, next).await {
            Ok(ticket) => ticket,
            Err(CoreError::Conflict(_)) => {
                // Someone else moved it first; report against what won.
                let latest = self.ticket(ticket_id).await?;
                return Err(BookingError::InvalidTransition { from: latest.status, to: next });
            }
            Err(CoreError::NotFound(_)) => return Err(BookingError::TicketNotFound(ticket_id)),
            Err(e) => return Err(e.into()),
        };

        let seat_released = current.status.is_active() && !next.is_active();
        if seat_released {
            if let Err(e) = self.catalog.adjust_available_seats(updated.trip_id, 1).await {
                warn!("Could not increment available seats for trip {}: {}", updated.trip_id, e);
            }
        }

        let event = TicketStatusChangedEvent {
            ticket_id,
            trip_id: updated.trip_id,
            seat_id: updated.seat_id,
            from_status: current.status.to_string(),
            to_status: next.to_string(),
            seat_released,
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.events.ticket_status_changed(&event).await {
            warn!("Failed to publish TicketStatusChanged for {}: {}", ticket_id, e);
        }

        info!("Ticket {} moved {} -> {}", ticket_id, current.status, next);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use busline_core::events::LogOnlyPublisher;
    use busline_core::{CoreResult, Route, Seat, SeatType, SeatTypePrice};
    use busline_shared::Masked;
    use busline_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks the peak number of concurrent inserts.
    struct GaugedLedger {
        inner: Arc<MemoryStore>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TicketRepository for GaugedLedger {
        async fn insert_if_seat_free(&self, ticket: &Ticket) -> CoreResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.insert_if_seat_free(ticket).await
        }

        async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
            self.inner.get_ticket(id).await
        }

        async fn list_tickets(&self, filter: &TicketFilter) -> CoreResult<Vec<Ticket>> {
            self.inner.list_tickets(filter).await
        }

        async fn transition(&self, id: Uuid, expected: TicketStatus, next: TicketStatus) -> CoreResult<Ticket> {
            self.inner.transition(id, expected, next).await
        }

        async fn delete_ticket(&self, id: Uuid) -> CoreResult<bool> {
            self.inner.delete_ticket(id).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        coordinator: BookingCoordinator,
        trip: Trip,
        seats: Vec<Seat>,
    }

    async fn fixture(seat_count: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let route = Route { id: Uuid::new_v4(), name: "Ha Noi - Hai Phong".to_string(), base_price: 100_000 };
        store.add_route(route.clone()).await;

        let bus_id = Uuid::new_v4();
        let trip = Trip {
            id: Uuid::new_v4(),
            route_id: route.id,
            bus_id,
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            total_seats: seat_count as i32,
            available_seats: seat_count as i32,
        };
        store.add_trip(trip.clone()).await;

        let seats: Vec<Seat> = (1..=seat_count)
            .map(|i| Seat::new(bus_id, &format!("A{:02}", i), SeatType::Standard))
            .collect();
        store.insert_seats(&seats).await.unwrap();

        let coordinator = BookingCoordinator::new(store.clone(), store.clone(), store.clone(), Arc::new(LogOnlyPublisher));
        Fixture { store, coordinator, trip, seats }
    }

    async fn available_seats(f: &Fixture) -> i32 {
        f.store.get_trip(f.trip.id).await.unwrap().unwrap().available_seats
    }

    #[tokio::test]
    async fn test_partial_issue_reports_booked_seat() {
        let f = fixture(3).await;
        let ids: Vec<Uuid> = f.seats.iter().map(|s| s.id).collect();

        f.coordinator
            .issue(f.trip.id, vec![ids[1]], &Buyer::new("first"), SaleMode::Counter)
            .await
            .unwrap();

        let report = f
            .coordinator
            .issue(f.trip.id, ids.clone(), &Buyer::new("second"), SaleMode::Counter)
            .await
            .unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed, vec![FailedSeat { seat_id: ids[1], reason: FailureReason::SeatUnavailable }]);
        assert_eq!(report.succeeded[0].seat_id, ids[0]);
        assert_eq!(report.succeeded[1].seat_id, ids[2]);
        assert_ne!(report.succeeded[0].id, report.succeeded[1].id);
        assert!(report.succeeded.iter().all(|t| t.status == TicketStatus::Completed));
        assert_eq!(available_seats(&f).await, 0);
    }

    #[tokio::test]
    async fn test_online_sale_is_pending_and_priced() {
        let f = fixture(1).await;
        f.store
            .add_seat_type_price(SeatTypePrice { route_id: f.trip.route_id, seat_type: SeatType::Standard, surcharge: 5_000 })
            .await;

        let report = f
            .coordinator
            .issue(f.trip.id, vec![f.seats[0].id], &Buyer::new("web"), SaleMode::Online)
            .await
            .unwrap();

        let ticket = &report.succeeded[0];
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.mode, SaleMode::Online);
        assert_eq!(ticket.price, 105_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_bounds_in_flight_and_keeps_request_order() {
        let f = fixture(8).await;
        let ledger = Arc::new(GaugedLedger {
            inner: f.store.clone(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let coordinator =
            BookingCoordinator::new(f.store.clone(), f.store.clone(), ledger.clone(), Arc::new(LogOnlyPublisher))
                .with_max_in_flight(3);

        let ids: Vec<Uuid> = f.seats.iter().rev().map(|s| s.id).collect();
        let report = coordinator
            .issue(f.trip.id, ids.clone(), &Buyer::new("u"), SaleMode::Counter)
            .await
            .unwrap();

        assert_eq!(ledger.peak.load(Ordering::SeqCst), 3);
        let sold: Vec<Uuid> = report.succeeded.iter().map(|t| t.seat_id).collect();
        assert_eq!(sold, ids);
    }

    #[tokio::test]
    async fn test_ticket_keeps_buyer_contact() {
        let f = fixture(1).await;
        let buyer = Buyer {
            user_id: "web".to_string(),
            name: Some("Minh".to_string()),
            phone: Some(Masked("0912000111".to_string())),
        };

        let report = f
            .coordinator
            .issue(f.trip.id, vec![f.seats[0].id], &buyer, SaleMode::Online)
            .await
            .unwrap();

        let stored = f.coordinator.ticket(report.succeeded[0].id).await.unwrap();
        assert_eq!(stored.buyer_name.as_deref(), Some("Minh"));
        assert_eq!(stored.buyer_phone, buyer.phone);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_sells_seat_once() {
        let f = Arc::new(fixture(1).await);
        let seat_id = f.seats[0].id;

        let mut handles = Vec::new();
        for i in 0..16 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.coordinator
                    .issue(f.trip.id, vec![seat_id], &Buyer::new(format!("buyer-{}", i)), SaleMode::Online)
                    .await
                    .unwrap()
            }));
        }

        let mut sold = 0;
        for handle in handles {
            sold += handle.await.unwrap().succeeded.len();
        }
        assert_eq!(sold, 1);
    }

    #[tokio::test]
    async fn test_hidden_and_foreign_seats_fail() {
        let f = fixture(1).await;
        let mut hidden = Seat::new(f.trip.bus_id, "B01", SeatType::Standard);
        hidden.is_hidden = true;
        let foreign = Seat::new(Uuid::new_v4(), "A01", SeatType::Standard);
        f.store.insert_seats(&[hidden.clone(), foreign.clone()]).await.unwrap();

        let report = f
            .coordinator
            .issue(f.trip.id, vec![hidden.id, foreign.id, Uuid::new_v4()], &Buyer::new("u"), SaleMode::Counter)
            .await
            .unwrap();

        let reasons: Vec<FailureReason> = report.failed.iter().map(|f| f.reason).collect();
        assert_eq!(
            reasons,
            vec![FailureReason::SeatHidden, FailureReason::SeatNotFound, FailureReason::SeatNotFound]
        );
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_requests() {
        let f = fixture(1).await;

        assert!(matches!(
            f.coordinator.issue(f.trip.id, vec![], &Buyer::new("u"), SaleMode::Counter).await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            f.coordinator.issue(Uuid::new_v4(), vec![f.seats[0].id], &Buyer::new("u"), SaleMode::Counter).await,
            Err(BookingError::TripNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_makes_seat_reissuable() {
        let f = fixture(1).await;
        let seat_id = f.seats[0].id;
        let report = f
            .coordinator
            .issue(f.trip.id, vec![seat_id], &Buyer::new("u"), SaleMode::Counter)
            .await
            .unwrap();
        let ticket_id = report.succeeded[0].id;

        let cancelled = f.coordinator.cancel(ticket_id).await.unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        assert_eq!(available_seats(&f).await, 1);

        let again = f
            .coordinator
            .issue(f.trip.id, vec![seat_id], &Buyer::new("u2"), SaleMode::Counter)
            .await
            .unwrap();
        assert_eq!(again.succeeded.len(), 1);

        assert!(matches!(
            f.coordinator.cancel(ticket_id).await,
            Err(BookingError::InvalidTransition { from: TicketStatus::Cancelled, to: TicketStatus::Cancelled })
        ));
    }

    #[tokio::test]
    async fn test_payment_outcomes() {
        let f = fixture(2).await;
        let report = f
            .coordinator
            .issue(f.trip.id, f.seats.iter().map(|s| s.id).collect(), &Buyer::new("u"), SaleMode::Online)
            .await
            .unwrap();

        let paid = f.coordinator.confirm_payment(report.succeeded[0].id, PaymentOutcome::Succeeded).await.unwrap();
        let declined = f.coordinator.confirm_payment(report.succeeded[1].id, PaymentOutcome::Failed).await.unwrap();

        assert_eq!(paid.status, TicketStatus::Completed);
        assert_eq!(declined.status, TicketStatus::PaymentFailed);
        assert_eq!(available_seats(&f).await, 1);

        assert!(matches!(
            f.coordinator.mark_failed(paid.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_terminal_ticket() {
        let f = fixture(1).await;
        let report = f
            .coordinator
            .issue(f.trip.id, vec![f.seats[0].id], &Buyer::new("u"), SaleMode::Online)
            .await
            .unwrap();
        let ticket_id = report.succeeded[0].id;

        assert!(matches!(f.coordinator.delete_ticket(ticket_id).await, Err(BookingError::TicketActive(_))));

        f.coordinator.mark_failed(ticket_id).await.unwrap();
        f.coordinator.delete_ticket(ticket_id).await.unwrap();

        assert!(matches!(f.coordinator.ticket(ticket_id).await, Err(BookingError::TicketNotFound(_))));
        assert!(f.coordinator.list_tickets(Some(f.trip.id), None).await.unwrap().is_empty());
    }
}
