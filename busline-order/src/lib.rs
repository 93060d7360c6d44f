pub mod reconciliation;
pub mod coordinator;
pub mod live;

pub use reconciliation::{
    reconcile, ReconcileError, ReconcileResult, ReconciliationEngine, SeatStatus, SeatStatusSnapshot, StatusSummary,
    STATUS_CONTRACT_VERSION,
};
pub use coordinator::{BookingCoordinator, BookingError, BookingResult, FailedSeat, FailureReason, IssueReport};
pub use live::{LiveMonitor, StatusSource, DEFAULT_POLL_INTERVAL};
