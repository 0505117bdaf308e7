use std::sync::Arc;
use std::time::Duration;
use wayfare_booking::{
    BookingRegistrar, BookingRepository, PaymentBridge, PaymentPolicy, SignatureVerifier, SmartSync,
    StatusLookup, WebhookProcessor,
};
use wayfare_core::{BookingNotifier, OrderGateway, PaymentGateway};
use wayfare_store::RedisClient;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// The process-wide collaborators every service is built from
pub struct Collaborators {
    pub repo: Arc<dyn BookingRepository>,
    pub orders: Arc<dyn OrderGateway>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn BookingNotifier>,
}

#[derive(Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_seconds: Option<u64>,
    pub payment_policy: PaymentPolicy,
    pub sync_timeout: Duration,
    pub status_lookup_per_minute: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            webhook_secret: None,
            webhook_tolerance_seconds: None,
            payment_policy: PaymentPolicy::default(),
            sync_timeout: wayfare_booking::sync::DEFAULT_SYNC_TIMEOUT,
            status_lookup_per_minute: 30,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn BookingRepository>,
    pub sync: Arc<SmartSync>,
    pub webhooks: Arc<WebhookProcessor>,
    pub verifier: Arc<SignatureVerifier>,
    pub payments: Arc<PaymentBridge>,
    pub lookup: Arc<StatusLookup>,
    pub registrar: Arc<BookingRegistrar>,
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub status_lookup_per_minute: i64,
}

impl AppState {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Result<Self, prometheus::Error> {
        let Collaborators {
            repo,
            orders,
            payments,
            notifier,
        } = collaborators;

        let sync = Arc::new(SmartSync::new(orders.clone(), repo.clone()).with_timeout(settings.sync_timeout));

        Ok(Self {
            webhooks: Arc::new(WebhookProcessor::new(repo.clone(), notifier)),
            verifier: Arc::new(
                SignatureVerifier::new(settings.webhook_secret)
                    .with_tolerance(settings.webhook_tolerance_seconds),
            ),
            payments: Arc::new(PaymentBridge::new(
                repo.clone(),
                orders.clone(),
                payments,
                settings.payment_policy,
            )),
            lookup: Arc::new(StatusLookup::new(repo.clone(), sync.clone())),
            registrar: Arc::new(
                BookingRegistrar::new(repo.clone(), orders).with_timeout(settings.sync_timeout),
            ),
            sync,
            repo,
            redis: None,
            metrics: Arc::new(Metrics::new()?),
            auth: AuthConfig {
                secret: settings.jwt_secret,
            },
            status_lookup_per_minute: settings.status_lookup_per_minute,
        })
    }

    /// Enable per-IP rate limiting on public lookups
    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }
}
