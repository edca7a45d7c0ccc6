// src/health/prober.rs
use crate::config::ProbeConfig;
use crate::metrics::MetricsCollector;
use crate::pool::{AddressPool, HealthStatus, SourceAddress};
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};
use url::Url;

/// Periodically probes the target endpoint through every source address,
/// so an address marked unhealthy can recover without live traffic. Probe
/// outcomes feed the same health tracking as real relay attempts.
pub struct Prober {
    config: ProbeConfig,
    target: Url,
    pool: Arc<AddressPool>,
    clients: HashMap<String, Client>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ProbeResult {
    pub address_id: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl Prober {
    pub fn new(
        config: ProbeConfig,
        target: Url,
        pool: Arc<AddressPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        // Probes get their own short-timeout clients, still bound to the
        // address they are probing.
        let mut clients = HashMap::new();
        for address in pool.addresses() {
            let client = Client::builder()
                .timeout(config.timeout())
                .local_address(address.ip)
                .build()
                .with_context(|| format!("failed to build probe client for {}", address.ip))?;
            clients.insert(address.id, client);
        }

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            config,
            target,
            pool,
            clients,
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn start(self: Arc<Self>) {
        let mut interval = interval(self.config.interval());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting address prober with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().probe_all().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Address prober shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn probe_all(self: Arc<Self>) {
        let addresses = self.pool.addresses();
        let mut tasks = Vec::new();

        for address in addresses {
            let prober = self.clone();
            tasks.push(tokio::spawn(
                async move { prober.probe_address(address).await },
            ));
        }

        let results = futures::future::join_all(tasks).await;

        let mut healthy_count = 0;
        let mut unhealthy_count = 0;

        for result in results {
            match result {
                Ok(probe) => {
                    if probe.healthy {
                        healthy_count += 1;
                        debug!("Address {} probe ok", probe.address_id);
                    } else {
                        unhealthy_count += 1;
                        warn!(
                            "Address {} probe failed: {:?}",
                            probe.address_id, probe.error
                        );
                    }
                }
                Err(e) => {
                    error!("Probe task join error: {}", e);
                    unhealthy_count += 1;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            let snapshot = self.pool.snapshot();
            let healthy = snapshot
                .iter()
                .filter(|s| s.status == HealthStatus::Healthy)
                .count();
            metrics.update_address_counts(healthy, snapshot.len());
            for entry in &snapshot {
                metrics.update_address_health(&entry.id, entry.status == HealthStatus::Healthy);
            }
        }

        info!(
            "Probe sweep complete: {} ok, {} failed",
            healthy_count, unhealthy_count
        );
    }

    async fn probe_address(&self, address: SourceAddress) -> ProbeResult {
        let start = std::time::Instant::now();

        let result = match self.clients.get(&address.id) {
            Some(client) => {
                timeout(self.config.timeout(), client.get(self.target.clone()).send()).await
            }
            None => {
                // Pool and client map are built from the same list; this
                // only trips if that changes.
                return ProbeResult {
                    address_id: address.id,
                    healthy: false,
                    response_time_ms: 0,
                    error: Some("no probe client for address".to_string()),
                };
            }
        };

        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, error) = match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Probe timeout".to_string())),
        };

        self.pool.report_outcome(&address.id, healthy);

        ProbeResult {
            address_id: address.id,
            healthy,
            response_time_ms,
            error,
        }
    }
}
