use busline_core::hints::{SeatHintSource, TripSeatHints};
use busline_core::repository::{CatalogService, SeatRepository, TicketFilter, TicketRepository};
use busline_core::{CoreError, Seat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bumped whenever the shape or meaning of `SeatStatusSnapshot` changes.
pub const STATUS_CONTRACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Booked,
    Hidden,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub available: usize,
    /// Visible seats with an active sale.
    pub booked: usize,
    /// All hidden seats, sold or not.
    pub hidden: usize,
    pub hidden_booked: usize,
    pub available_seats: usize,
}

/// Canonical seat status of one trip at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatStatusSnapshot {
    pub version: u32,
    pub trip_id: Uuid,
    pub bus_id: Uuid,
    pub seats: BTreeMap<Uuid, SeatStatus>,
    pub summary: StatusSummary,
}

impl SeatStatusSnapshot {
    pub fn status_of(&self, seat_id: &Uuid) -> Option<SeatStatus> {
        self.seats.get(seat_id).copied()
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Merges the seat catalog, trip hints and the ticket ledger.
///
/// A seat is booked when a hint for this exact trip says BOOKED, or when the
/// ledger holds an active ticket for it. Hidden seats always report HIDDEN
/// but still count as sold in `hidden_booked`.
pub fn reconcile(
    trip_id: Uuid,
    bus_id: Uuid,
    seats: &[Seat],
    hints: Option<&TripSeatHints>,
    active_seat_ids: &HashSet<Uuid>,
) -> SeatStatusSnapshot {
    let hints = hints.filter(|h| h.trip_id == trip_id);
    let mut statuses = BTreeMap::new();
    let mut summary = StatusSummary { total: seats.len(), ..Default::default() };

    for seat in seats {
        let booked = hints.is_some_and(|h| h.is_booked(&seat.id)) || active_seat_ids.contains(&seat.id);

        let status = if seat.is_hidden {
            summary.hidden += 1;
            if booked {
                summary.hidden_booked += 1;
            }
            SeatStatus::Hidden
        } else if booked {
            summary.booked += 1;
            SeatStatus::Booked
        } else {
            summary.available += 1;
            SeatStatus::Available
        };

        statuses.insert(seat.id, status);
    }

    summary.available_seats = summary.available;

    SeatStatusSnapshot {
        version: STATUS_CONTRACT_VERSION,
        trip_id,
        bus_id,
        seats: statuses,
        summary,
    }
}

pub struct ReconciliationEngine {
    catalog: Arc<dyn CatalogService>,
    seats: Arc<dyn SeatRepository>,
    tickets: Arc<dyn TicketRepository>,
    hints: Arc<dyn SeatHintSource>,
}

impl ReconciliationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        seats: Arc<dyn SeatRepository>,
        tickets: Arc<dyn TicketRepository>,
        hints: Arc<dyn SeatHintSource>,
    ) -> Self {
        Self { catalog, seats, tickets, hints }
    }

    pub async fn compute_status(&self, trip_id: Uuid) -> ReconcileResult<SeatStatusSnapshot> {
        let trip = self
            .catalog
            .get_trip(trip_id)
            .await?
            .ok_or(ReconcileError::TripNotFound(trip_id))?;

        let seats = self.seats.list_seats(trip.bus_id).await?;
        if usize::try_from(trip.total_seats).ok() != Some(seats.len()) {
            warn!(
                "Trip {} declares {} seats but bus {} has {} in the catalog",
                trip_id,
                trip.total_seats,
                trip.bus_id,
                seats.len()
            );
        }

        let hints = match self.hints.hints_for_trip(trip_id).await {
            Ok(hints) => hints,
            Err(e) => {
                warn!("Seat hints for trip {} unavailable, using ledger only: {}", trip_id, e);
                None
            }
        };

        let fully_hinted = hints
            .as_ref()
            .filter(|h| h.trip_id == trip_id)
            .is_some_and(|h| seats.iter().all(|s| h.is_booked(&s.id)));

        let active_seat_ids: HashSet<Uuid> = if fully_hinted {
            HashSet::new()
        } else {
            self.tickets
                .list_tickets(&TicketFilter::for_trip(trip_id))
                .await?
                .into_iter()
                .filter(|t| t.status.is_active())
                .map(|t| t.seat_id)
                .collect()
        };

        let snapshot = reconcile(trip_id, trip.bus_id, &seats, hints.as_ref(), &active_seat_ids);
        debug!(
            "Trip {} status: {} available, {} booked, {} hidden",
            trip_id, snapshot.summary.available, snapshot.summary.booked, snapshot.summary.hidden
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use busline_core::hints::HintStatus;
    use busline_core::{CoreResult, SaleMode, SeatType, Ticket, TicketStatus, Trip};
    use busline_store::MemoryStore;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OfflineHints;

    #[async_trait]
    impl SeatHintSource for OfflineHints {
        async fn hints_for_trip(&self, _trip_id: Uuid) -> CoreResult<Option<TripSeatHints>> {
            Err(CoreError::StorageError("hint feed offline".to_string()))
        }
    }

    /// Counts ledger reads, delegating everything to the store.
    struct CountingLedger {
        inner: Arc<MemoryStore>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl TicketRepository for CountingLedger {
        async fn insert_if_seat_free(&self, ticket: &Ticket) -> CoreResult<()> {
            self.inner.insert_if_seat_free(ticket).await
        }

        async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
            self.inner.get_ticket(id).await
        }

        async fn list_tickets(&self, filter: &TicketFilter) -> CoreResult<Vec<Ticket>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_tickets(filter).await
        }

        async fn transition(&self, id: Uuid, expected: TicketStatus, next: TicketStatus) -> CoreResult<Ticket> {
            self.inner.transition(id, expected, next).await
        }

        async fn delete_ticket(&self, id: Uuid) -> CoreResult<bool> {
            self.inner.delete_ticket(id).await
        }
    }

    fn seat(bus_id: Uuid, number: &str, hidden: bool) -> Seat {
        let mut seat = Seat::new(bus_id, number, SeatType::Standard);
        seat.is_hidden = hidden;
        seat
    }

    async fn setup(seat_count: usize) -> (Arc<MemoryStore>, ReconciliationEngine, Trip, Vec<Seat>) {
        let store = Arc::new(MemoryStore::new());
        let bus_id = Uuid::new_v4();
        let trip = Trip {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            bus_id,
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            total_seats: seat_count as i32,
            available_seats: seat_count as i32,
        };
        store.add_trip(trip.clone()).await;

        let seats: Vec<Seat> = (1..=seat_count).map(|i| seat(bus_id, &format!("A{:02}", i), false)).collect();
        store.insert_seats(&seats).await.unwrap();

        let engine = ReconciliationEngine::new(store.clone(), store.clone(), store.clone(), store.clone());
        (store, engine, trip, seats)
    }

    #[test]
    fn test_counts_sum_to_total() {
        let bus_id = Uuid::new_v4();
        let seats = vec![
            seat(bus_id, "A01", false),
            seat(bus_id, "A02", false),
            seat(bus_id, "A03", true),
            seat(bus_id, "A04", true),
        ];
        let active: HashSet<Uuid> = [seats[1].id, seats[3].id].into_iter().collect();

        let snapshot = reconcile(Uuid::new_v4(), bus_id, &seats, None, &active);
        let s = &snapshot.summary;

        assert_eq!(s.booked + s.available + s.hidden, s.total);
        assert_eq!(s.booked, 1);
        assert_eq!(s.hidden, 2);
        assert_eq!(s.hidden_booked, 1);
        assert_eq!(s.available_seats, s.total - (s.booked + s.hidden_booked) - (s.hidden - s.hidden_booked));
        assert_eq!(snapshot.status_of(&seats[3].id), Some(SeatStatus::Hidden));
    }

    #[test]
    fn test_hints_for_other_trip_are_ignored() {
        let bus_id = Uuid::new_v4();
        let seats = vec![seat(bus_id, "A01", false)];
        let hints = TripSeatHints {
            trip_id: Uuid::new_v4(),
            statuses: HashMap::from([(seats[0].id, HintStatus::Booked)]),
        };

        let snapshot = reconcile(Uuid::new_v4(), bus_id, &seats, Some(&hints), &HashSet::new());
        assert_eq!(snapshot.status_of(&seats[0].id), Some(SeatStatus::Available));
    }

    #[test]
    fn test_available_hint_does_not_mask_a_sale() {
        let bus_id = Uuid::new_v4();
        let trip_id = Uuid::new_v4();
        let seats = vec![seat(bus_id, "A01", false)];
        let hints = TripSeatHints { trip_id, statuses: HashMap::from([(seats[0].id, HintStatus::Available)]) };
        let active: HashSet<Uuid> = [seats[0].id].into_iter().collect();

        let snapshot = reconcile(trip_id, bus_id, &seats, Some(&hints), &active);
        assert_eq!(snapshot.status_of(&seats[0].id), Some(SeatStatus::Booked));
    }

    #[tokio::test]
    async fn test_compute_status_is_idempotent() {
        let (store, engine, trip, seats) = setup(4).await;
        let ticket = Ticket::new(trip.id, seats[0].id, "u1".to_string(), SaleMode::Counter, 0);
        store.insert_if_seat_free(&ticket).await.unwrap();

        let first = engine.compute_status(trip.id).await.unwrap();
        let second = engine.compute_status(trip.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.version, STATUS_CONTRACT_VERSION);
        assert_eq!(first.status_of(&seats[0].id), Some(SeatStatus::Booked));
        assert_eq!(first.summary.available, 3);
    }

    #[tokio::test]
    async fn test_booked_hint_is_trusted() {
        let (store, engine, trip, seats) = setup(2).await;
        store
            .set_hints(TripSeatHints { trip_id: trip.id, statuses: HashMap::from([(seats[1].id, HintStatus::Booked)]) })
            .await;

        let snapshot = engine.compute_status(trip.id).await.unwrap();
        assert_eq!(snapshot.status_of(&seats[0].id), Some(SeatStatus::Available));
        assert_eq!(snapshot.status_of(&seats[1].id), Some(SeatStatus::Booked));
    }

    #[tokio::test]
    async fn test_cancelled_ticket_frees_seat() {
        let (store, engine, trip, seats) = setup(1).await;
        let ticket = Ticket::new(trip.id, seats[0].id, "u1".to_string(), SaleMode::Counter, 0);
        store.insert_if_seat_free(&ticket).await.unwrap();
        assert_eq!(
            engine.compute_status(trip.id).await.unwrap().status_of(&seats[0].id),
            Some(SeatStatus::Booked)
        );

        store.transition(ticket.id, TicketStatus::Completed, TicketStatus::Cancelled).await.unwrap();

        assert_eq!(
            engine.compute_status(trip.id).await.unwrap().status_of(&seats[0].id),
            Some(SeatStatus::Available)
        );
    }

    #[tokio::test]
    async fn test_tickets_on_other_trips_do_not_count() {
        let (store, engine, trip, seats) = setup(1).await;
        let elsewhere = Ticket::new(Uuid::new_v4(), seats[0].id, "u1".to_string(), SaleMode::Counter, 0);
        store.insert_if_seat_free(&elsewhere).await.unwrap();

        let snapshot = engine.compute_status(trip.id).await.unwrap();
        assert_eq!(snapshot.status_of(&seats[0].id), Some(SeatStatus::Available));
    }

    #[tokio::test]
    async fn test_unknown_trip() {
        let (_store, engine, _trip, _seats) = setup(1).await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            engine.compute_status(missing).await,
            Err(ReconcileError::TripNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_failing_hint_source_falls_back_to_ledger() {
        let (store, _engine, trip, seats) = setup(2).await;
        let ticket = Ticket::new(trip.id, seats[0].id, "u1".to_string(), SaleMode::Counter, 0);
        store.insert_if_seat_free(&ticket).await.unwrap();

        let engine = ReconciliationEngine::new(store.clone(), store.clone(), store.clone(), Arc::new(OfflineHints));
        let snapshot = engine.compute_status(trip.id).await.unwrap();

        assert_eq!(snapshot.status_of(&seats[0].id), Some(SeatStatus::Booked));
        assert_eq!(snapshot.status_of(&seats[1].id), Some(SeatStatus::Available));
    }

    #[tokio::test]
    async fn test_ledger_read_once_and_skipped_when_fully_hinted() {
        let (store, _engine, trip, seats) = setup(2).await;
        let ledger = Arc::new(CountingLedger { inner: store.clone(), reads: AtomicUsize::new(0) });
        let engine = ReconciliationEngine::new(store.clone(), store.clone(), ledger.clone(), store.clone());

        store
            .set_hints(TripSeatHints { trip_id: trip.id, statuses: HashMap::from([(seats[0].id, HintStatus::Booked)]) })
            .await;
        engine.compute_status(trip.id).await.unwrap();
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);

        store
            .set_hints(TripSeatHints {
                trip_id: trip.id,
                statuses: seats.iter().map(|s| (s.id, HintStatus::Booked)).collect(),
            })
            .await;
        let snapshot = engine.compute_status(trip.id).await.unwrap();

        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.summary.booked, 2);
    }

    #[tokio::test]
    async fn test_trip_seat_count_mismatch_counts_catalog_seats() {
        let (store, engine, mut trip, _seats) = setup(3).await;
        trip.total_seats = 40;
        store.add_trip(trip.clone()).await;

        let snapshot = engine.compute_status(trip.id).await.unwrap();
        let s = &snapshot.summary;

        assert_eq!(s.total, 3);
        assert_eq!(s.booked + s.available + s.hidden, s.total);
    }
}
