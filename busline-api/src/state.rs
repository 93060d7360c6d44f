use std::sync::Arc;
use std::time::Duration;

use busline_catalog::{PriceCalculator, SeatCatalog};
use busline_core::events::TicketEventPublisher;
use busline_core::hints::SeatHintSource;
use busline_core::repository::{CatalogService, LayoutRepository, SeatRepository, TicketRepository};
use busline_core::Bus;
use busline_order::{BookingCoordinator, ReconciliationEngine};
use busline_store::app_config::BookingConfig;
use busline_store::{MemoryStore, RedisClient};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::Metrics;
use crate::middleware::auth::StaffClaims;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Storage and collaborator handles the services are built from.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogService>,
    pub seats: Arc<dyn SeatRepository>,
    pub layouts: Arc<dyn LayoutRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub hints: Arc<dyn SeatHintSource>,
    pub events: Arc<dyn TicketEventPublisher>,
}

impl Backends {
    pub fn memory(store: Arc<MemoryStore>, events: Arc<dyn TicketEventPublisher>) -> Self {
        Self {
            catalog: store.clone(),
            seats: store.clone(),
            layouts: store.clone(),
            tickets: store.clone(),
            hints: store,
            events,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogService>,
    pub seat_catalog: Arc<SeatCatalog>,
    pub prices: Arc<PriceCalculator>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub booking: Arc<BookingCoordinator>,
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub poll_interval: Duration,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    pub fn new(backends: Backends, auth: AuthConfig, booking: &BookingConfig) -> anyhow::Result<Self> {
        let Backends { catalog, seats, layouts, tickets, hints, events } = backends;

        Ok(Self {
            seat_catalog: Arc::new(SeatCatalog::new(seats.clone(), layouts, catalog.clone())),
            prices: Arc::new(PriceCalculator::new(catalog.clone())),
            reconciliation: Arc::new(ReconciliationEngine::new(
                catalog.clone(),
                seats.clone(),
                tickets.clone(),
                hints,
            )),
            booking: Arc::new(
                BookingCoordinator::new(catalog.clone(), seats, tickets, events)
                    .with_max_in_flight(booking.max_in_flight_issuance),
            ),
            catalog,
            redis: None,
            metrics: Arc::new(Metrics::new()?),
            auth,
            poll_interval: Duration::from_millis(booking.poll_interval_ms.max(1)),
            rate_limit_per_minute: booking.rate_limit_per_minute,
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Loads the bus and checks the caller may manage it.
    pub async fn authorize_bus(&self, claims: &StaffClaims, bus_id: Uuid) -> Result<Bus, AppError> {
        let bus = self
            .catalog
            .get_bus(bus_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bus not found: {}", bus_id)))?;

        claims.ensure_company(bus.company_id)?;
        Ok(bus)
    }

    pub async fn authorize_trip(&self, claims: &StaffClaims, trip_id: Uuid) -> Result<Bus, AppError> {
        let trip = self
            .catalog
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip not found: {}", trip_id)))?;

        self.authorize_bus(claims, trip.bus_id).await
    }
}
