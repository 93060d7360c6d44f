use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::{Bus, SeatLayoutConfig};
use crate::seat::Seat;
use crate::ticket::{Ticket, TicketStatus};
use crate::trip::{Route, SeatTypePrice, Trip};
use crate::CoreResult;

/// Persisted seat layouts, keyed by bus id.
#[async_trait]
pub trait LayoutRepository: Send + Sync {
    async fn get_layout(&self, bus_id: Uuid) -> CoreResult<Option<SeatLayoutConfig>>;

    async fn save_layout(&self, config: &SeatLayoutConfig) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatDeletion {
    Deleted,
    /// An active ticket still references the seat.
    InUse,
    Missing,
}

/// Repository trait for seat definitions
#[async_trait]
pub trait SeatRepository: Send + Sync {
    /// Seats of one bus ordered by seat number
    async fn list_seats(&self, bus_id: Uuid) -> CoreResult<Vec<Seat>>;

    async fn get_seat(&self, id: Uuid) -> CoreResult<Option<Seat>>;

    /// All-or-nothing insert. `Conflict` when a seat number already exists on its bus.
    async fn insert_seats(&self, seats: &[Seat]) -> CoreResult<()>;

    /// All-or-nothing update. `NotFound` when any id is unknown.
    async fn update_seats(&self, seats: &[Seat]) -> CoreResult<()>;

    /// Deletes the seat unless a PENDING or COMPLETED ticket references it.
    /// Check and delete happen as one storage operation.
    async fn delete_seat_if_unreferenced(&self, id: Uuid) -> CoreResult<SeatDeletion>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub trip_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

impl TicketFilter {
    pub fn for_trip(trip_id: Uuid) -> Self {
        Self { trip_id: Some(trip_id), ..Self::default() }
    }
}

/// Ticket ledger. Only the booking coordinator writes through it.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Atomic check-and-insert. `Conflict` when the (trip, seat) pair already
    /// holds a PENDING or COMPLETED ticket.
    async fn insert_if_seat_free(&self, ticket: &Ticket) -> CoreResult<()>;

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>>;

    /// Matching tickets ordered by creation time
    async fn list_tickets(&self, filter: &TicketFilter) -> CoreResult<Vec<Ticket>>;

    /// Compare-and-swap on status. `Conflict` when the stored status is no
    /// longer `expected`, `NotFound` when the ticket is gone.
    async fn transition(&self, id: Uuid, expected: TicketStatus, next: TicketStatus) -> CoreResult<Ticket>;

    async fn delete_ticket(&self, id: Uuid) -> CoreResult<bool>;
}

/// The external catalog service (buses, trips, routes, prices).
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>>;

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>>;

    async fn get_route(&self, id: Uuid) -> CoreResult<Option<Route>>;

    async fn seat_type_prices(&self, route_id: Uuid) -> CoreResult<Vec<SeatTypePrice>>;

    /// Seat-count bookkeeping; `delta` is negative on sale, positive on release.
    async fn adjust_available_seats(&self, trip_id: Uuid, delta: i32) -> CoreResult<()>;
}
