// src/resilience/mod.rs
//! Failure detection and recovery for the shared quota store.
//!
//! When a quota script fails, the store is marked down through a shared
//! [`HealthFlag`] and every limiter answers from its in-process bucket. A single
//! [`HealthMonitor`] task pings the store until it answers, then flips the flag
//! back so limiters return to the shared buckets.

mod health_monitor;

#[cfg(test)]
mod tests;

pub use health_monitor::{HealthFlag, HealthMonitor};
