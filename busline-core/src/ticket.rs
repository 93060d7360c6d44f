use busline_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Ticket lifecycle.
///
/// ```text
/// PENDING ──► COMPLETED ──► CANCELLED
///    │
///    ├──────► CANCELLED
///    ├──────► FAILED
///    └──────► PAYMENT_FAILED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
    PaymentFailed,
}

impl TicketStatus {
    /// Active tickets occupy their seat for the trip.
    pub fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Pending, PaymentFailed)
                | (Completed, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Completed => "COMPLETED",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Failed => "FAILED",
            TicketStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TicketStatus::Pending),
            "COMPLETED" => Ok(TicketStatus::Completed),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "FAILED" => Ok(TicketStatus::Failed),
            "PAYMENT_FAILED" => Ok(TicketStatus::PaymentFailed),
            other => Err(CoreError::ValidationError(format!("unknown ticket status '{}'", other))),
        }
    }
}

/// Sale channel, stored on the ticket rather than inferred from status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleMode {
    Online,
    Counter,
}

impl SaleMode {
    /// Counter sales are paid at issuance; online sales wait for the payment provider.
    pub fn initial_status(&self) -> TicketStatus {
        match self {
            SaleMode::Online => TicketStatus::Pending,
            SaleMode::Counter => TicketStatus::Completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleMode::Online => "ONLINE",
            SaleMode::Counter => "COUNTER",
        }
    }
}

impl fmt::Display for SaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(SaleMode::Online),
            "COUNTER" => Ok(SaleMode::Counter),
            other => Err(CoreError::ValidationError(format!("unknown sale mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
}

impl Buyer {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), name: None, phone: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub user_id: String,
    pub status: TicketStatus,
    pub mode: SaleMode,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_phone: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(trip_id: Uuid, seat_id: Uuid, user_id: String, mode: SaleMode, price: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            seat_id,
            user_id,
            status: mode.initial_status(),
            mode,
            price,
            buyer_name: None,
            buyer_phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copies the buyer's contact details onto the ticket.
    pub fn with_contact(mut self, buyer: &Buyer) -> Self {
        self.buyer_name = buyer.name.clone();
        self.buyer_phone = buyer.phone.clone();
        self
    }
}
