// src/lib.rs
pub mod config;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod relay;
pub mod retry;
pub mod server;
