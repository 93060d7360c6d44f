use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use busline_api::{app, AppState, AuthConfig, Backends};
use busline_core::events::{LogOnlyPublisher, TicketEventPublisher};
use busline_store::app_config::Config;
use busline_store::{
    DbClient, EventProducer, MemoryStore, PgCatalogService, PgSeatRepository, PgTicketRepository, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let events: Arc<dyn TicketEventPublisher> = match &config.kafka.brokers {
        Some(brokers) => Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?),
        None => {
            tracing::warn!("No Kafka brokers configured, ticket events are only logged");
            Arc::new(LogOnlyPublisher)
        }
    };

    let backends = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            let seats = Arc::new(PgSeatRepository::new(db.pool.clone()));
            let catalog = Arc::new(PgCatalogService::new(db.pool.clone()));
            Backends {
                catalog: catalog.clone(),
                seats: seats.clone(),
                layouts: seats,
                tickets: Arc::new(PgTicketRepository::new(db.pool.clone())),
                hints: catalog,
                events,
            }
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            Backends::memory(Arc::new(MemoryStore::new()), events)
        }
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };
    let mut state = AppState::new(backends, auth, &config.booking)?;

    if let Some(url) = &config.redis.url {
        let redis = RedisClient::new(url).await.context("Failed to connect to Redis")?;
        state = state.with_redis(Arc::new(redis));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
