use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    #[default]
    Standard,
    Vip,
    Double,
    Luxury,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Standard => "STANDARD",
            SeatType::Vip => "VIP",
            SeatType::Double => "DOUBLE",
            SeatType::Luxury => "LUXURY",
        }
    }
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STANDARD" => Ok(SeatType::Standard),
            "VIP" => Ok(SeatType::Vip),
            "DOUBLE" => Ok(SeatType::Double),
            "LUXURY" => Ok(SeatType::Luxury),
            other => Err(CoreError::ValidationError(format!("unknown seat type '{}'", other))),
        }
    }
}

/// A seat definition on a bus, independent of any trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub seat_number: String,
    pub seat_type: SeatType,
    pub is_hidden: bool,
    pub price_override: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Seat {
    pub fn new(bus_id: Uuid, seat_number: &str, seat_type: SeatType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bus_id,
            seat_number: normalize_seat_number(seat_number),
            seat_type,
            is_hidden: false,
            price_override: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Seat numbers are compared trimmed and upper-cased everywhere.
pub fn normalize_seat_number(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
