use busline_core::repository::CatalogService;
use busline_core::{CoreResult, Route, Seat, SeatTypePrice};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Everything needed to price any seat on one route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePricing {
    pub route_id: Uuid,
    pub base_price: i64,
    pub seat_type_prices: Vec<SeatTypePrice>,
}

impl RoutePricing {
    pub fn new(route: &Route, seat_type_prices: Vec<SeatTypePrice>) -> Self {
        Self { route_id: route.id, base_price: route.base_price, seat_type_prices }
    }

    /// Base price plus the seat's surcharge.
    pub fn price_for(&self, seat: &Seat) -> i64 {
        self.base_price + self.surcharge_for(seat)
    }

    /// Route seat-type table first, then the seat's own non-zero override, then zero.
    pub fn surcharge_for(&self, seat: &Seat) -> i64 {
        if let Some(row) = self
            .seat_type_prices
            .iter()
            .find(|p| p.route_id == self.route_id && p.seat_type == seat.seat_type)
        {
            return row.surcharge;
        }

        match seat.price_override {
            Some(amount) if amount != 0 => amount,
            _ => 0,
        }
    }
}

/// `priceFor(seat, route)` without any lookups.
pub fn price_for(seat: &Seat, route: &Route, seat_type_prices: &[SeatTypePrice]) -> i64 {
    RoutePricing::new(route, seat_type_prices.to_vec()).price_for(seat)
}

/// Resolves ticket prices from the catalog service.
///
/// Missing or unreachable price data prices at zero and logs a warning; a
/// sale is never blocked on pricing metadata.
pub struct PriceCalculator {
    catalog: Arc<dyn CatalogService>,
}

impl PriceCalculator {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self { catalog }
    }

    pub async fn route_pricing(&self, route_id: Uuid) -> RoutePricing {
        let base_price = match self.catalog.get_route(route_id).await {
            Ok(Some(route)) => route.base_price,
            Ok(None) => {
                warn!("Route {} not found, base price resolves to 0", route_id);
                0
            }
            Err(e) => {
                warn!("Failed to load route {}: {}. Base price resolves to 0", route_id, e);
                0
            }
        };

        let seat_type_prices = match self.catalog.seat_type_prices(route_id).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Failed to load seat type prices for route {}: {}", route_id, e);
                Vec::new()
            }
        };

        RoutePricing { route_id, base_price, seat_type_prices }
    }

    pub async fn quote(&self, seat: &Seat, route_id: Uuid) -> i64 {
        self.route_pricing(route_id).await.price_for(seat)
    }

    /// The raw seat-type table, for display. Lookup errors surface here.
    pub async fn seat_type_prices(&self, route_id: Uuid) -> CoreResult<Vec<SeatTypePrice>> {
        self.catalog.seat_type_prices(route_id).await
    }
}
