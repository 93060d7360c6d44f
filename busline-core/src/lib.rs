pub mod bus;
pub mod seat;
pub mod trip;
pub mod ticket;
pub mod payment;
pub mod events;
pub mod hints;
pub mod repository;

pub use bus::{Bus, FloorLayout, SeatLayoutConfig};
pub use seat::{Seat, SeatType};
pub use ticket::{Buyer, SaleMode, Ticket, TicketStatus};
pub use trip::{Route, SeatTypePrice, Trip};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    /// A uniqueness or compare-and-swap guard rejected the write.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
