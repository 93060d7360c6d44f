use busline_core::repository::{CatalogService, LayoutRepository, SeatDeletion, SeatRepository};
use busline_core::seat::normalize_seat_number;
use busline_core::{Bus, CoreError, FloorLayout, Seat, SeatLayoutConfig, SeatType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::layout::generate_seat_numbers;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSeat {
    pub bus_id: Uuid,
    pub seat_number: String,
    #[serde(default)]
    pub seat_type: SeatType,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub price_override: Option<i64>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatUpdate {
    pub id: Uuid,
    #[serde(default)]
    pub seat_type: Option<SeatType>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub price_override: Option<i64>,
    /// Removes the override; wins over `price_override`.
    #[serde(default)]
    pub clear_price_override: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteReport {
    pub deleted: usize,
    pub blocked: usize,
    pub blocked_seat_ids: Vec<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Seat numbers already exist on bus {bus_id}: {seat_numbers:?}")]
    SeatNumberConflict {
        bus_id: Uuid,
        seat_numbers: Vec<String>,
    },

    #[error("Seat {0} is referenced by an active ticket")]
    SeatInUse(Uuid),

    #[error("Seat not found: {0}")]
    SeatNotFound(Uuid),

    #[error("Bus not found: {0}")]
    BusNotFound(Uuid),

    #[error("Invalid seat data: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Owner of seat definitions and seat layouts. The only writer of either.
pub struct SeatCatalog {
    seats: Arc<dyn SeatRepository>,
    layouts: Arc<dyn LayoutRepository>,
    catalog: Arc<dyn CatalogService>,
}

impl SeatCatalog {
    pub fn new(
        seats: Arc<dyn SeatRepository>,
        layouts: Arc<dyn LayoutRepository>,
        catalog: Arc<dyn CatalogService>,
    ) -> Self {
        Self { seats, layouts, catalog }
    }

    pub async fn list_seats(&self, bus_id: Uuid) -> CatalogResult<Vec<Seat>> {
        Ok(self.seats.list_seats(bus_id).await?)
    }

    pub async fn get_seat(&self, id: Uuid) -> CatalogResult<Seat> {
        self.seats.get_seat(id).await?.ok_or(CatalogError::SeatNotFound(id))
    }

    /// Creates every seat of the batch or none of them.
    ///
    /// A seat number that already exists on its bus, or appears twice in the
    /// batch, rejects the whole batch with the colliding numbers listed.
    pub async fn create_seats(&self, batch: Vec<NewSeat>) -> CatalogResult<Vec<Seat>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_bus: BTreeMap<Uuid, Vec<Seat>> = BTreeMap::new();
        for new_seat in batch {
            let seat = build_seat(new_seat)?;
            by_bus.entry(seat.bus_id).or_default().push(seat);
        }

        for (bus_id, seats) in &by_bus {
            self.require_bus(*bus_id).await?;

            let collisions = self.collisions(*bus_id, seats).await?;
            if !collisions.is_empty() {
                return Err(CatalogError::SeatNumberConflict { bus_id: *bus_id, seat_numbers: collisions });
            }
        }

        let seats: Vec<Seat> = by_bus.into_values().flatten().collect();

        match self.seats.insert_seats(&seats).await {
            Ok(()) => {}
            // Lost a race with another terminal; report what collides now.
            Err(CoreError::Conflict(msg)) => {
                for bus_id in seats.iter().map(|s| s.bus_id).collect::<BTreeSet<_>>() {
                    let on_bus: Vec<Seat> = seats.iter().filter(|s| s.bus_id == bus_id).cloned().collect();
                    let collisions = self.collisions(bus_id, &on_bus).await?;
                    if !collisions.is_empty() {
                        return Err(CatalogError::SeatNumberConflict { bus_id, seat_numbers: collisions });
                    }
                }
                return Err(CoreError::Conflict(msg).into());
            }
            Err(e) => return Err(e.into()),
        }

        info!("Created {} seat(s)", seats.len());
        Ok(seats)
    }

    /// Applies every update of the batch or none of them.
    pub async fn update_seats(&self, batch: Vec<SeatUpdate>) -> CatalogResult<Vec<Seat>> {
        let mut seen = HashSet::new();
        let mut updated = Vec::with_capacity(batch.len());

        for update in batch {
            if !seen.insert(update.id) {
                return Err(CatalogError::Invalid(format!("seat {} appears twice in the batch", update.id)));
            }

            let mut seat = self.get_seat(update.id).await?;

            if let Some(seat_type) = update.seat_type {
                seat.seat_type = seat_type;
            }
            if let Some(is_hidden) = update.is_hidden {
                seat.is_hidden = is_hidden;
            }
            if update.clear_price_override {
                seat.price_override = None;
            } else if let Some(price) = update.price_override {
                check_price_override(price)?;
                seat.price_override = Some(price);
            }
            seat.updated_at = Utc::now();

            updated.push(seat);
        }

        if updated.is_empty() {
            return Ok(updated);
        }

        self.seats.update_seats(&updated).await.map_err(|e| match e {
            CoreError::NotFound(_) => CatalogError::Invalid("a seat was deleted during the update".to_string()),
            other => other.into(),
        })?;

        info!("Updated {} seat(s)", updated.len());
        Ok(updated)
    }

    pub async fn delete_seat(&self, id: Uuid) -> CatalogResult<()> {
        match self.seats.delete_seat_if_unreferenced(id).await? {
            SeatDeletion::Deleted => {
                info!("Deleted seat {}", id);
                Ok(())
            }
            SeatDeletion::InUse => Err(CatalogError::SeatInUse(id)),
            SeatDeletion::Missing => Err(CatalogError::SeatNotFound(id)),
        }
    }

    /// Deletes every seat of the bus that no active ticket references.
    pub async fn delete_all_seats_for_bus(&self, bus_id: Uuid) -> CatalogResult<BulkDeleteReport> {
        let mut report = BulkDeleteReport::default();

        for seat in self.seats.list_seats(bus_id).await? {
            match self.seats.delete_seat_if_unreferenced(seat.id).await? {
                SeatDeletion::Deleted => report.deleted += 1,
                SeatDeletion::InUse => {
                    report.blocked += 1;
                    report.blocked_seat_ids.push(seat.id);
                }
                SeatDeletion::Missing => {}
            }
        }

        info!(
            "Bulk delete on bus {}: {} deleted, {} blocked by active tickets",
            bus_id, report.deleted, report.blocked
        );
        Ok(report)
    }

    pub async fn layout(&self, bus_id: Uuid) -> CatalogResult<Option<SeatLayoutConfig>> {
        Ok(self.layouts.get_layout(bus_id).await?)
    }

    pub async fn save_layout(&self, config: SeatLayoutConfig) -> CatalogResult<SeatLayoutConfig> {
        let bus = self.require_bus(config.bus_id).await?;
        let config = normalize_layout(config);
        config.validate_for(&bus)?;

        if config.capacity() > bus.capacity.max(0) as u32 {
            warn!(
                "Layout for bus {} has {} positions, more than the bus capacity of {}",
                bus.id,
                config.capacity(),
                bus.capacity
            );
        }

        self.layouts.save_layout(&config).await?;
        info!("Saved seat layout for bus {} ({} floor(s))", config.bus_id, config.floors.len());
        Ok(config)
    }

    /// Saves the layout and creates one seat per generated number.
    /// Nothing is written if any generated number already exists.
    pub async fn generate_from_layout(
        &self,
        bus_id: Uuid,
        floors: Vec<FloorLayout>,
        seat_type: SeatType,
    ) -> CatalogResult<Vec<Seat>> {
        let bus = self.require_bus(bus_id).await?;
        let config = normalize_layout(SeatLayoutConfig::new(bus_id, floors));
        config.validate_for(&bus)?;

        let batch = generate_seat_numbers(&config)
            .into_iter()
            .map(|seat_number| NewSeat {
                bus_id,
                seat_number,
                seat_type,
                is_hidden: false,
                price_override: None,
            })
            .collect();

        let seats = self.create_seats(batch).await?;
        self.save_layout(config).await?;
        Ok(seats)
    }

    async fn require_bus(&self, bus_id: Uuid) -> CatalogResult<Bus> {
        self.catalog.get_bus(bus_id).await?.ok_or(CatalogError::BusNotFound(bus_id))
    }

    async fn collisions(&self, bus_id: Uuid, batch: &[Seat]) -> CatalogResult<Vec<String>> {
        let existing: HashSet<String> = self
            .seats
            .list_seats(bus_id)
            .await?
            .into_iter()
            .map(|s| s.seat_number)
            .collect();

        let mut seen = HashSet::new();
        let colliding: BTreeSet<String> = batch
            .iter()
            .filter(|s| existing.contains(&s.seat_number) || !seen.insert(s.seat_number.clone()))
            .map(|s| s.seat_number.clone())
            .collect();

        Ok(colliding.into_iter().collect())
    }
}

fn build_seat(new_seat: NewSeat) -> CatalogResult<Seat> {
    let seat_number = normalize_seat_number(&new_seat.seat_number);
    if seat_number.is_empty() {
        return Err(CatalogError::Invalid("seat number must not be empty".to_string()));
    }

    if let Some(price) = new_seat.price_override {
        check_price_override(price)?;
    }

    let mut seat = Seat::new(new_seat.bus_id, &seat_number, new_seat.seat_type);
    seat.is_hidden = new_seat.is_hidden;
    seat.price_override = new_seat.price_override;
    Ok(seat)
}

fn check_price_override(price: i64) -> CatalogResult<()> {
    if price < 0 {
        return Err(CatalogError::Invalid(format!("price override {} is negative", price)));
    }
    Ok(())
}

fn normalize_layout(mut config: SeatLayoutConfig) -> SeatLayoutConfig {
    for spec in &mut config.floors {
        spec.prefix = spec.prefix.trim().to_ascii_uppercase();
    }
    config
}
