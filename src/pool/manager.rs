// src/pool/manager.rs
use super::address::{AddressSnapshot, HealthStatus, SourceAddress};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("address pool is empty")]
    Empty,

    #[error("duplicate address in pool: {0}")]
    Duplicate(IpAddr),
}

/// One address handed out for a single relay attempt.
#[derive(Debug, Clone)]
pub struct AddressLease {
    pub address: SourceAddress,
    /// Set when every address was unhealthy and the pool fell back to
    /// rotating over the full set instead of refusing.
    pub degraded: bool,
}

#[derive(Debug)]
struct Entry {
    address: SourceAddress,
    status: HealthStatus,
    consecutive_failures: u32,
    last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct PoolState {
    entries: Vec<Entry>,
    cursor: usize,
}

/// Owns the allow-listed source addresses and their health. The pool is the
/// only shared mutable state in the relay; `acquire` and `report_outcome`
/// each take the same mutex once, and no I/O happens under it.
#[derive(Debug)]
pub struct AddressPool {
    state: Mutex<PoolState>,
    unhealthy_threshold: u32,
}

impl AddressPool {
    pub fn new(addresses: &[IpAddr], unhealthy_threshold: u32) -> Result<Self, PoolError> {
        if addresses.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(addresses.len());
        for ip in addresses {
            if !seen.insert(*ip) {
                return Err(PoolError::Duplicate(*ip));
            }
            entries.push(Entry {
                address: SourceAddress::new(*ip),
                status: HealthStatus::Unknown,
                consecutive_failures: 0,
                last_checked: None,
            });
        }

        info!("Address pool initialized with {} addresses", entries.len());

        Ok(Self {
            state: Mutex::new(PoolState { entries, cursor: 0 }),
            unhealthy_threshold,
        })
    }

    /// Round-robin over addresses not marked unhealthy. When every address
    /// is unhealthy the pool degrades to rotating over the full set rather
    /// than refusing to serve; the lease carries that signal.
    pub fn acquire(&self) -> AddressLease {
        let mut state = self.state.lock().expect("address pool lock poisoned");
        let len = state.entries.len();

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            if state.entries[idx].status != HealthStatus::Unhealthy {
                state.cursor = idx + 1;
                let address = state.entries[idx].address.clone();
                debug!(address = %address.ip, "acquired source address");
                return AddressLease {
                    address,
                    degraded: false,
                };
            }
        }

        // Every address is unhealthy; keep rotating over the full pool.
        let idx = state.cursor % len;
        state.cursor = idx + 1;
        let address = state.entries[idx].address.clone();
        warn!(
            address = %address.ip,
            "all source addresses unhealthy, serving in degraded mode"
        );
        AddressLease {
            address,
            degraded: true,
        }
    }

    /// Update health from one relay attempt or probe. A configured number of
    /// consecutive failures marks the address unhealthy; a single success
    /// resets it to healthy. Addresses are never removed.
    pub fn report_outcome(&self, id: &str, success: bool) {
        let mut state = self.state.lock().expect("address pool lock poisoned");
        let threshold = self.unhealthy_threshold;

        let Some(entry) = state.entries.iter_mut().find(|e| e.address.id == id) else {
            warn!(address = %id, "outcome reported for unknown address");
            return;
        };

        entry.last_checked = Some(Utc::now());
        if success {
            if entry.status == HealthStatus::Unhealthy {
                info!(address = %entry.address.ip, "source address recovered");
            }
            entry.consecutive_failures = 0;
            entry.status = HealthStatus::Healthy;
        } else {
            entry.consecutive_failures += 1;
            if entry.consecutive_failures >= threshold && entry.status != HealthStatus::Unhealthy {
                warn!(
                    address = %entry.address.ip,
                    failures = entry.consecutive_failures,
                    "marking source address unhealthy"
                );
                entry.status = HealthStatus::Unhealthy;
            }
        }
    }

    pub fn addresses(&self) -> Vec<SourceAddress> {
        let state = self.state.lock().expect("address pool lock poisoned");
        state.entries.iter().map(|e| e.address.clone()).collect()
    }

    pub fn snapshot(&self) -> Vec<AddressSnapshot> {
        let state = self.state.lock().expect("address pool lock poisoned");
        state
            .entries
            .iter()
            .map(|e| AddressSnapshot {
                id: e.address.id.clone(),
                ip: e.address.ip,
                status: e.status,
                consecutive_failures: e.consecutive_failures,
                last_checked: e.last_checked,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("address pool lock poisoned");
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
