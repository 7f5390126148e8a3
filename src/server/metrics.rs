//! Prometheus metrics for relay traffic.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::RelayError;

/// Relay counters, registered on a private registry.
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    outcomes: IntCounterVec,
    active: IntGauge,
}

impl RelayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("relay_requests_total", "Relay invocations by consumption mode"),
            &["mode"],
        )?;
        let outcomes = IntCounterVec::new(
            Opts::new("relay_outcomes_total", "Finished relays by outcome"),
            &["outcome"],
        )?;
        let active = IntGauge::new("relay_active", "Relays currently in flight")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(active.clone()))?;

        Ok(Self {
            registry,
            requests,
            outcomes,
            active,
        })
    }

    pub fn relay_started(&self, mode: &str) {
        self.requests.with_label_values(&[mode]).inc();
        self.active.inc();
    }

    pub fn relay_finished(&self, error: Option<&RelayError>) {
        let outcome = error.map_or("complete", RelayError::kind);
        self.outcomes.with_label_values(&[outcome]).inc();
        self.active.dec();
    }

    pub fn active(&self) -> i64 {
        self.active.get()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
