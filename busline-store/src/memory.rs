use async_trait::async_trait;
use busline_core::hints::{SeatHintSource, TripSeatHints};
use busline_core::repository::{
    CatalogService, LayoutRepository, SeatDeletion, SeatRepository, TicketFilter, TicketRepository,
};
use busline_core::{
    Bus, CoreError, CoreResult, Route, Seat, SeatLayoutConfig, SeatTypePrice, Ticket, TicketStatus, Trip,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    buses: HashMap<Uuid, Bus>,
    routes: HashMap<Uuid, Route>,
    trips: HashMap<Uuid, Trip>,
    seat_type_prices: Vec<SeatTypePrice>,
    layouts: HashMap<Uuid, SeatLayoutConfig>,
    seats: HashMap<Uuid, Seat>,
    // Insertion order doubles as creation order.
    tickets: Vec<Ticket>,
    hints: HashMap<Uuid, TripSeatHints>,
}

impl MemoryState {
    fn seat_has_active_ticket(&self, seat_id: Uuid, trip_id: Option<Uuid>) -> bool {
        self.tickets.iter().any(|t| {
            t.seat_id == seat_id && t.status.is_active() && trip_id.map_or(true, |trip| t.trip_id == trip)
        })
    }
}

/// Single-process store backing every repository trait.
///
/// All state sits behind one lock, so each check-and-write below is atomic
/// with respect to every other caller.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_bus(&self, bus: Bus) {
        self.state.write().await.buses.insert(bus.id, bus);
    }

    pub async fn add_route(&self, route: Route) {
        self.state.write().await.routes.insert(route.id, route);
    }

    pub async fn add_trip(&self, trip: Trip) {
        self.state.write().await.trips.insert(trip.id, trip);
    }

    pub async fn add_seat_type_price(&self, price: SeatTypePrice) {
        let mut state = self.state.write().await;
        state
            .seat_type_prices
            .retain(|p| !(p.route_id == price.route_id && p.seat_type == price.seat_type));
        state.seat_type_prices.push(price);
    }

    /// Installs trip-scoped status hints, as an upstream schedule-aware listing would.
    pub async fn set_hints(&self, hints: TripSeatHints) {
        self.state.write().await.hints.insert(hints.trip_id, hints);
    }
}

#[async_trait]
impl LayoutRepository for MemoryStore {
    async fn get_layout(&self, bus_id: Uuid) -> CoreResult<Option<SeatLayoutConfig>> {
        Ok(self.state.read().await.layouts.get(&bus_id).cloned())
    }

    async fn save_layout(&self, config: &SeatLayoutConfig) -> CoreResult<()> {
        self.state.write().await.layouts.insert(config.bus_id, config.clone());
        Ok(())
    }
}

#[async_trait]
impl SeatRepository for MemoryStore {
    async fn list_seats(&self, bus_id: Uuid) -> CoreResult<Vec<Seat>> {
        let state = self.state.read().await;
        let mut seats: Vec<Seat> = state.seats.values().filter(|s| s.bus_id == bus_id).cloned().collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }

    async fn get_seat(&self, id: Uuid) -> CoreResult<Option<Seat>> {
        Ok(self.state.read().await.seats.get(&id).cloned())
    }

    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut state = self.state.write().await;

        let mut taken: HashSet<(Uuid, String)> =
            state.seats.values().map(|s| (s.bus_id, s.seat_number.clone())).collect();

        for seat in seats {
            if state.seats.contains_key(&seat.id) {
                return Err(CoreError::Conflict(format!("seat id {} already exists", seat.id)));
            }
            if !taken.insert((seat.bus_id, seat.seat_number.clone())) {
                return Err(CoreError::Conflict(format!(
                    "seat number {} already exists on bus {}",
                    seat.seat_number, seat.bus_id
                )));
            }
        }

        for seat in seats {
            state.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn update_seats(&self, seats: &[Seat]) -> CoreResult<()> {
        let mut state = self.state.write().await;

        if let Some(missing) = seats.iter().find(|s| !state.seats.contains_key(&s.id)) {
            return Err(CoreError::NotFound(format!("seat {}", missing.id)));
        }

        for seat in seats {
            state.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn delete_seat_if_unreferenced(&self, id: Uuid) -> CoreResult<SeatDeletion> {
        let mut state = self.state.write().await;

        if !state.seats.contains_key(&id) {
            return Ok(SeatDeletion::Missing);
        }
        if state.seat_has_active_ticket(id, None) {
            return Ok(SeatDeletion::InUse);
        }

        state.seats.remove(&id);
        Ok(SeatDeletion::Deleted)
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn insert_if_seat_free(&self, ticket: &Ticket) -> CoreResult<()> {
        let mut state = self.state.write().await;

        if !state.seats.contains_key(&ticket.seat_id) {
            return Err(CoreError::NotFound(format!("seat {}", ticket.seat_id)));
        }
        if state.tickets.iter().any(|t| t.id == ticket.id) {
            return Err(CoreError::Conflict(format!("ticket id {} already exists", ticket.id)));
        }
        if ticket.status.is_active() && state.seat_has_active_ticket(ticket.seat_id, Some(ticket.trip_id)) {
            return Err(CoreError::Conflict(format!(
                "seat {} already has an active ticket on trip {}",
                ticket.seat_id, ticket.trip_id
            )));
        }

        state.tickets.push(ticket.clone());
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        Ok(self.state.read().await.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> CoreResult<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .iter()
            .filter(|t| filter.trip_id.map_or(true, |id| t.trip_id == id))
            .filter(|t| filter.status.map_or(true, |status| t.status == status))
            .cloned()
            .collect())
    }

    async fn transition(&self, id: Uuid, expected: TicketStatus, next: TicketStatus) -> CoreResult<Ticket> {
        let mut state = self.state.write().await;

        let ticket = state
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", id)))?;

        if ticket.status != expected {
            return Err(CoreError::Conflict(format!(
                "ticket {} is {}, expected {}",
                id, ticket.status, expected
            )));
        }

        ticket.status = next;
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn delete_ticket(&self, id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        let before = state.tickets.len();
        state.tickets.retain(|t| t.id != id);
        Ok(state.tickets.len() != before)
    }
}

#[async_trait]
impl CatalogService for MemoryStore {
    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        Ok(self.state.read().await.buses.get(&id).cloned())
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.state.read().await.trips.get(&id).cloned())
    }

    async fn get_route(&self, id: Uuid) -> CoreResult<Option<Route>> {
        Ok(self.state.read().await.routes.get(&id).cloned())
    }

    async fn seat_type_prices(&self, route_id: Uuid) -> CoreResult<Vec<SeatTypePrice>> {
        Ok(self
            .state
            .read()
            .await
            .seat_type_prices
            .iter()
            .filter(|p| p.route_id == route_id)
            .cloned()
            .collect())
    }

    async fn adjust_available_seats(&self, trip_id: Uuid, delta: i32) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;

        trip.available_seats = (trip.available_seats + delta).clamp(0, trip.total_seats.max(0));
        Ok(())
    }
}

#[async_trait]
impl SeatHintSource for MemoryStore {
    async fn hints_for_trip(&self, trip_id: Uuid) -> CoreResult<Option<TripSeatHints>> {
        Ok(self.state.read().await.hints.get(&trip_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::{SaleMode, SeatType};
    use std::sync::Arc;

    async fn store_with_seat() -> (Arc<MemoryStore>, Seat) {
        let store = Arc::new(MemoryStore::new());
        let seat = Seat::new(Uuid::new_v4(), "A01", SeatType::Standard);
        store.insert_seats(&[seat.clone()]).await.unwrap();
        (store, seat)
    }

    #[tokio::test]
    async fn test_second_active_ticket_is_a_conflict() {
        let (store, seat) = store_with_seat().await;
        let trip_id = Uuid::new_v4();

        let first = Ticket::new(trip_id, seat.id, "a".to_string(), SaleMode::Online, 0);
        store.insert_if_seat_free(&first).await.unwrap();

        let second = Ticket::new(trip_id, seat.id, "b".to_string(), SaleMode::Counter, 0);
        assert!(matches!(store.insert_if_seat_free(&second).await, Err(CoreError::Conflict(_))));

        // Same seat on another trip is a different inventory item.
        let other_trip = Ticket::new(Uuid::new_v4(), seat.id, "b".to_string(), SaleMode::Counter, 0);
        store.insert_if_seat_free(&other_trip).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_inserts_admit_exactly_one() {
        let (store, seat) = store_with_seat().await;
        let trip_id = Uuid::new_v4();
        let seat_id = seat.id;

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let ticket = Ticket::new(trip_id, seat_id, format!("terminal-{}", i), SaleMode::Counter, 0);
                store.insert_if_seat_free(&ticket).await.is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let (store, seat) = store_with_seat().await;
        let ticket = Ticket::new(Uuid::new_v4(), seat.id, "a".to_string(), SaleMode::Online, 0);
        store.insert_if_seat_free(&ticket).await.unwrap();

        let moved = store
            .transition(ticket.id, TicketStatus::Pending, TicketStatus::Completed)
            .await
            .unwrap();
        assert_eq!(moved.status, TicketStatus::Completed);

        let stale = store.transition(ticket.id, TicketStatus::Pending, TicketStatus::Cancelled).await;
        assert!(matches!(stale, Err(CoreError::Conflict(_))));

        let missing = store
            .transition(Uuid::new_v4(), TicketStatus::Pending, TicketStatus::Cancelled)
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_available_seats_stay_in_bounds() {
        let store = MemoryStore::new();
        let trip = Trip {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            total_seats: 2,
            available_seats: 2,
        };
        store.add_trip(trip.clone()).await;

        store.adjust_available_seats(trip.id, 1).await.unwrap();
        assert_eq!(store.get_trip(trip.id).await.unwrap().unwrap().available_seats, 2);

        for _ in 0..3 {
            store.adjust_available_seats(trip.id, -1).await.unwrap();
        }
        assert_eq!(store.get_trip(trip.id).await.unwrap().unwrap().available_seats, 0);
    }
}
