use uuid::Uuid;

pub const TICKETS_ISSUED_TOPIC: &str = "tickets.issued";
pub const TICKETS_STATUS_TOPIC: &str = "tickets.status";

/// Published once per seat that was successfully sold.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketIssuedEvent {
    pub ticket_id: Uuid,
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub user_id: String,
    pub mode: String,
    pub status: String,
    pub price: i64,
    pub timestamp: i64,
}

/// Published on every ticket status transition (cancel, payment, failure).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusChangedEvent {
    pub ticket_id: Uuid,
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub seat_released: bool,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_wire_shape() {
        let event = TicketStatusChangedEvent {
            ticket_id: Uuid::nil(),
            trip_id: Uuid::nil(),
            seat_id: Uuid::nil(),
            from_status: "COMPLETED".to_string(),
            to_status: "CANCELLED".to_string(),
            seat_released: true,
            timestamp: 1_700_000_000,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["fromStatus"], "COMPLETED");
        assert_eq!(value["seatReleased"], true);
        assert_eq!(value["ticketId"], Uuid::nil().to_string());
    }
}
