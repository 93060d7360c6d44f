use async_trait::async_trait;
use busline_shared::{TicketIssuedEvent, TicketStatusChangedEvent};
use tracing::debug;

use crate::CoreResult;

/// Outbound notifications about ticket state. Delivery failures are the
/// caller's to log; they never undo a ticket write.
#[async_trait]
pub trait TicketEventPublisher: Send + Sync {
    async fn ticket_issued(&self, event: &TicketIssuedEvent) -> CoreResult<()>;

    async fn ticket_status_changed(&self, event: &TicketStatusChangedEvent) -> CoreResult<()>;
}

/// Publisher used when no broker is configured.
pub struct LogOnlyPublisher;

#[async_trait]
impl TicketEventPublisher for LogOnlyPublisher {
    async fn ticket_issued(&self, event: &TicketIssuedEvent) -> CoreResult<()> {
        debug!("ticket issued: {} seat {} trip {}", event.ticket_id, event.seat_id, event.trip_id);
        Ok(())
    }

    async fn ticket_status_changed(&self, event: &TicketStatusChangedEvent) -> CoreResult<()> {
        debug!(
            "ticket {} moved {} -> {}",
            event.ticket_id, event.from_status, event.to_status
        );
        Ok(())
    }
}
