// src/health/mod.rs
mod prober;

pub use prober::{ProbeResult, Prober};
