use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HintStatus {
    Booked,
    Available,
}

/// Per-seat status carried by an upstream seat listing that is already
/// scoped to one trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TripSeatHints {
    pub trip_id: Uuid,
    pub statuses: HashMap<Uuid, HintStatus>,
}

impl TripSeatHints {
    pub fn is_booked(&self, seat_id: &Uuid) -> bool {
        self.statuses.get(seat_id) == Some(&HintStatus::Booked)
    }
}

#[async_trait]
pub trait SeatHintSource: Send + Sync {
    /// `Ok(None)` means the source has nothing trip-scoped to say.
    async fn hints_for_trip(&self, trip_id: Uuid) -> CoreResult<Option<TripSeatHints>>;
}
