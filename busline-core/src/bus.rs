use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const MAX_FLOORS: u8 = 2;

/// A bus as seen from the catalog service. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: Uuid,
    pub capacity: i32,
    pub floor_count: u8,
    pub company_id: Uuid,
}

/// Seat-numbering rule for one floor of a bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FloorLayout {
    pub floor: u8,
    pub prefix: String,
    pub rows: u32,
    pub columns: u32,
    #[serde(default)]
    pub label: Option<String>,
}

impl FloorLayout {
    pub fn capacity(&self) -> u32 {
        self.rows.saturating_mul(self.columns)
    }
}

/// Persisted per-bus layout, shared by every terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatLayoutConfig {
    pub bus_id: Uuid,
    pub floors: Vec<FloorLayout>,
}

impl SeatLayoutConfig {
    pub fn new(bus_id: Uuid, floors: Vec<FloorLayout>) -> Self {
        Self { bus_id, floors }
    }

    /// Total number of addressable positions across all floors
    pub fn capacity(&self) -> u32 {
        self.floors.iter().map(FloorLayout::capacity).sum()
    }

    /// Checks the structural invariants of a layout.
    ///
    /// Prefixes must be non-empty, alphabetic and unique ignoring case; every
    /// floor needs at least one position and a floor number in `1..=MAX_FLOORS`.
    pub fn validate(&self) -> CoreResult<()> {
        if self.floors.is_empty() {
            return Err(CoreError::ValidationError(
                "layout must define at least one floor".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.floors {
            if spec.floor == 0 || spec.floor > MAX_FLOORS {
                return Err(CoreError::ValidationError(format!(
                    "floor {} is outside 1..={}",
                    spec.floor, MAX_FLOORS
                )));
            }

            let prefix = spec.prefix.trim();
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CoreError::ValidationError(format!(
                    "prefix '{}' must be non-empty and alphabetic",
                    spec.prefix
                )));
            }

            if !seen.insert(prefix.to_ascii_uppercase()) {
                return Err(CoreError::ValidationError(format!(
                    "prefix '{}' is used more than once",
                    spec.prefix
                )));
            }

            if spec.capacity() < 1 {
                return Err(CoreError::ValidationError(format!(
                    "floor {} ({}) has no seats: rows={} columns={}",
                    spec.floor, spec.prefix, spec.rows, spec.columns
                )));
            }
        }

        Ok(())
    }

    /// Like [`validate`](Self::validate), plus the floors must fit the bus.
    pub fn validate_for(&self, bus: &Bus) -> CoreResult<()> {
        self.validate()?;

        if self.bus_id != bus.id {
            return Err(CoreError::ValidationError(format!(
                "layout belongs to bus {} not {}",
                self.bus_id, bus.id
            )));
        }

        if let Some(spec) = self.floors.iter().find(|f| f.floor > bus.floor_count) {
            return Err(CoreError::ValidationError(format!(
                "floor {} exceeds the {} floor(s) of bus {}",
                spec.floor, bus.floor_count, bus.id
            )));
        }

        Ok(())
    }
}
