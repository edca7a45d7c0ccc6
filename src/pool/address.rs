// src/pool/address.rs
use chrono::{DateTime, Utc};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// One allow-listed egress address. The third party whitelists these, so
/// every outbound call must originate from one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress {
    pub id: String,
    pub ip: IpAddr,
}

impl SourceAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            id: ip.to_string(),
            ip,
        }
    }
}

/// Point-in-time view of one pool entry, for the prober and metrics.
#[derive(Debug, Clone)]
pub struct AddressSnapshot {
    pub id: String,
    pub ip: IpAddr,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}
