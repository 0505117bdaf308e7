pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod duffel;
pub mod stripe;
pub mod events;
pub mod redis_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use duffel::DuffelOrderGateway;
pub use events::{EventProducer, KafkaNotifier};
pub use redis_repo::RedisClient;
pub use stripe::StripePaymentGateway;
