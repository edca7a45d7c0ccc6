// src/pool/mod.rs
mod address;
mod manager;

pub use address::{AddressSnapshot, HealthStatus, SourceAddress};
pub use manager::{AddressLease, AddressPool, PoolError};
