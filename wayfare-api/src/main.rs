use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfare_api::{app, AppState, Collaborators, Settings};
use wayfare_booking::PaymentPolicy;
use wayfare_core::mock::{MockOrderGateway, MockPaymentGateway};
use wayfare_core::{BookingNotifier, LogNotifier, OrderGateway, PaymentGateway};
use wayfare_store::app_config::Config;
use wayfare_store::{
    DbClient, DuffelOrderGateway, EventProducer, KafkaNotifier, PgBookingRepository, RedisClient,
    StripePaymentGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayfare_api=debug,wayfare_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Wayfare API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Providers
    let (orders, payments): (Arc<dyn OrderGateway>, Arc<dyn PaymentGateway>) = if config.providers.sandbox {
        tracing::warn!("Sandbox mode: using in-process mock order and payment providers");
        (Arc::new(MockOrderGateway::new()), Arc::new(MockPaymentGateway::new()))
    } else {
        (
            Arc::new(DuffelOrderGateway::new(&config.providers.order_gateway)?),
            Arc::new(StripePaymentGateway::new(&config.providers.payments)?),
        )
    };

    // Kafka (optional)
    let notifier: Arc<dyn BookingNotifier> = match config.kafka.brokers.as_deref() {
        Some(brokers) if !brokers.is_empty() => match EventProducer::new(brokers) {
            Ok(producer) => Arc::new(KafkaNotifier::new(producer, config.kafka.topic.clone())),
            Err(e) => {
                tracing::warn!("Kafka unavailable, booking notifications will only be logged: {}", e);
                Arc::new(LogNotifier)
            }
        },
        _ => Arc::new(LogNotifier),
    };

    let settings = Settings {
        jwt_secret: config.auth.jwt_secret.clone(),
        webhook_secret: config.providers.webhook.secret.clone(),
        webhook_tolerance_seconds: config.providers.webhook.tolerance_seconds,
        payment_policy: PaymentPolicy {
            strict_provider_check: config.payments.strict_provider_check,
            provider_timeout: config.sync.timeout(),
        },
        sync_timeout: config.sync.timeout(),
        status_lookup_per_minute: config.rate_limit.status_lookup_per_minute,
    };

    let mut app_state = AppState::new(
        Collaborators {
            repo: Arc::new(PgBookingRepository::new(db.pool.clone())),
            orders,
            payments,
            notifier,
        },
        settings,
    )?;

    // Redis (optional)
    if let Some(url) = config.redis.url.as_deref().filter(|u| !u.is_empty()) {
        match RedisClient::new(url).await {
            Ok(redis) => app_state = app_state.with_redis(Arc::new(redis)),
            Err(e) => tracing::warn!("Redis unavailable, status lookups are not rate limited: {}", e),
        }
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
