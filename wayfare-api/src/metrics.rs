use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Counters for the reconciliation paths, on a per-process registry
pub struct Metrics {
    registry: Registry,
    webhook_events: IntCounterVec,
    sync_runs: IntCounterVec,
    payment_intents: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let webhook_events = IntCounterVec::new(
            Opts::new("wayfare_webhook_events_total", "Provider webhook deliveries by event type and outcome"),
            &["event_type", "outcome"],
        )?;
        let sync_runs = IntCounterVec::new(
            Opts::new("wayfare_sync_runs_total", "Smart Sync invocations by outcome"),
            &["outcome"],
        )?;
        let payment_intents = IntCounterVec::new(
            Opts::new("wayfare_payment_intents_total", "Payment intent requests by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(webhook_events.clone()))?;
        registry.register(Box::new(sync_runs.clone()))?;
        registry.register(Box::new(payment_intents.clone()))?;

        Ok(Self {
            registry,
            webhook_events,
            sync_runs,
            payment_intents,
        })
    }

    pub fn webhook_event(&self, event_type: &str, outcome: &str) {
        self.webhook_events.with_label_values(&[event_type, outcome]).inc();
    }

    pub fn sync_run(&self, outcome: &str) {
        self.sync_runs.with_label_values(&[outcome]).inc();
    }

    pub fn payment_intent(&self, outcome: &str) {
        self.payment_intents.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = Metrics::new().unwrap();
        metrics.webhook_event("order.created", "applied");
        metrics.sync_run("unchanged");
        metrics.payment_intent("created");

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"wayfare_webhook_events_total{event_type="order.created",outcome="applied"} 1"#));
        assert!(text.contains(r#"wayfare_sync_runs_total{outcome="unchanged"} 1"#));
        assert!(text.contains("wayfare_payment_intents_total"));
    }
}
