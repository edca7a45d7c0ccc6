// src/retry/mod.rs
mod strategy;

pub use strategy::{is_transient_status, RetryDecision, RetryStrategy};
