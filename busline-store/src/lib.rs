pub mod app_config;
pub mod database;
pub mod memory;
pub mod seat_repo;
pub mod ticket_repo;
pub mod catalog_repo;
pub mod redis_repo;
pub mod events;

pub use database::DbClient;
pub use events::EventProducer;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use seat_repo::PgSeatRepository;
pub use ticket_repo::PgTicketRepository;
pub use catalog_repo::PgCatalogService;
