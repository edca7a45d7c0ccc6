// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Relay metrics
    pub relay_requests_total: IntCounterVec,
    pub relay_duration_seconds: HistogramVec,
    pub relay_attempts_total: IntCounterVec,
    pub degraded_acquires_total: IntCounter,

    // Address pool metrics
    pub address_health_status: IntGaugeVec,
    pub healthy_addresses: IntGauge,
    pub total_addresses: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let relay_requests_total = IntCounterVec::new(
            Opts::new("relay_requests_total", "Total relayed requests"),
            &["outcome"],
        )?;
        registry.register(Box::new(relay_requests_total.clone()))?;

        let relay_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_duration_seconds",
                "End-to-end relay duration including retries",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(relay_duration_seconds.clone()))?;

        let relay_attempts_total = IntCounterVec::new(
            Opts::new(
                "relay_attempts_total",
                "Individual outbound attempts per source address",
            ),
            &["address", "outcome"],
        )?;
        registry.register(Box::new(relay_attempts_total.clone()))?;

        let degraded_acquires_total = IntCounter::new(
            "relay_degraded_acquires_total",
            "Leases handed out while every address was unhealthy",
        )?;
        registry.register(Box::new(degraded_acquires_total.clone()))?;

        let address_health_status = IntGaugeVec::new(
            Opts::new(
                "relay_address_health_status",
                "Source address health (1=healthy, 0=not healthy)",
            ),
            &["address"],
        )?;
        registry.register(Box::new(address_health_status.clone()))?;

        let healthy_addresses = IntGauge::new(
            "relay_healthy_addresses",
            "Number of healthy source addresses",
        )?;
        registry.register(Box::new(healthy_addresses.clone()))?;

        let total_addresses = IntGauge::new(
            "relay_total_addresses",
            "Total number of configured source addresses",
        )?;
        registry.register(Box::new(total_addresses.clone()))?;

        Ok(Self {
            relay_requests_total,
            relay_duration_seconds,
            relay_attempts_total,
            degraded_acquires_total,
            address_health_status,
            healthy_addresses,
            total_addresses,
        })
    }

    pub fn record_relay(&self, outcome: &str, duration: std::time::Duration) {
        self.relay_requests_total
            .with_label_values(&[outcome])
            .inc();

        self.relay_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration.as_secs_f64());
    }

    pub fn record_attempt(&self, address: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.relay_attempts_total
            .with_label_values(&[address, outcome])
            .inc();
    }

    pub fn record_degraded_acquire(&self) {
        self.degraded_acquires_total.inc();
    }

    pub fn update_address_health(&self, address: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.address_health_status
            .with_label_values(&[address])
            .set(value);
    }

    pub fn update_address_counts(&self, healthy: usize, total: usize) {
        self.healthy_addresses.set(healthy as i64);
        self.total_addresses.set(total as i64);
    }
}
