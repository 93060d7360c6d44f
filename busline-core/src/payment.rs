use serde::{Deserialize, Serialize};

use crate::ticket::TicketStatus;

/// Result reported by the external payment provider for an online ticket.
/// This service never computes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

impl PaymentOutcome {
    pub fn target_status(&self) -> TicketStatus {
        match self {
            PaymentOutcome::Succeeded => TicketStatus::Completed,
            PaymentOutcome::Failed => TicketStatus::PaymentFailed,
        }
    }
}
