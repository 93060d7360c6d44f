pub mod layout;
pub mod seats;
pub mod pricing;

pub use layout::{generate_seat_numbers, generate_seat_plan, resolve_position, SeatPosition};
pub use pricing::{PriceCalculator, RoutePricing};
pub use seats::{BulkDeleteReport, CatalogError, CatalogResult, NewSeat, SeatCatalog, SeatUpdate};
