// src/relay/mod.rs
mod result;
mod worker;

pub use result::{FailureKind, RelayOutcome, RelayRequest, RelayResult};
pub use worker::RelayWorker;
