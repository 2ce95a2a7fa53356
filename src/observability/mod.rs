//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging with request IDs flowing through all events
//! - Metrics are cheap atomic increments and safe to record before the
//!   exporter is installed
//! - The scrape endpoint is off by default; deployments opt in

pub mod logging;
pub mod metrics;
