use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

/// Rate limiting is off when no URL is configured
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

/// Notifications are only logged when no brokers are configured
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self { brokers: None, topic: default_topic() }
    }
}

fn default_topic() -> String { "booking-events".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    /// Use in-process mock gateways instead of the real providers
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub order_gateway: OrderGatewayConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub payments: PaymentProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrderGatewayConfig {
    #[serde(default = "default_order_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OrderGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_order_base_url(),
            access_token: String::new(),
            api_version: default_api_version(),
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

fn default_order_base_url() -> String { "https://api.duffel.com".to_string() }
fn default_api_version() -> String { "v2".to_string() }
fn default_provider_timeout_ms() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub tolerance_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentProviderConfig {
    #[serde(default = "default_payments_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PaymentProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_payments_base_url(),
            secret_key: String::new(),
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

fn default_payments_base_url() -> String { "https://api.stripe.com".to_string() }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentsConfig {
    /// Refuse checkout when the order provider cannot confirm the booking
    #[serde(default)]
    pub strict_provider_check: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_sync_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { timeout_ms: default_sync_timeout_ms() }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_sync_timeout_ms() -> u64 { 1500 }

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_lookups_per_minute")]
    pub status_lookup_per_minute: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { status_lookup_per_minute: default_lookups_per_minute() }
    }
}

fn default_lookups_per_minute() -> i64 { 30 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `WAYFARE__PROVIDERS__WEBHOOK__SECRET=whsec_...`
            .add_source(config::Environment::with_prefix("WAYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
