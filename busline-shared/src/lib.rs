pub mod models;
pub mod pii;

pub use models::events::{TicketIssuedEvent, TicketStatusChangedEvent};
pub use pii::Masked;
