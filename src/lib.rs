//! Wikimirror — a reverse proxy that fronts the Wikimedia project family
//! behind a single domain.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────┐
//!                        │                  WIKIMIRROR                     │
//!                        │                                                 │
//!   Client Request       │  ┌────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http  │──▶│ redirect │──▶│   upstream   │  │
//!                        │  │ server │   │  policy  │   │   resolver   │  │
//!                        │  └────────┘   └──────────┘   └──────┬───────┘  │
//!                        │                                      │          │
//!                        │                                      ▼          │
//!   Client Response      │  ┌─────────┐   ┌─────────┐   ┌──────────────┐  │
//!   ◀────────────────────┼──│ rewrite │◀──│ proxied │◀──│   outbound   │◀─┼── Upstream
//!                        │  │  (HTML) │   │resolver │   │    fetch     │  │    Site
//!                        │  └─────────┘   └─────────┘   └──────────────┘  │
//!                        │                                                 │
//!                        │  ┌───────────────────────────────────────────┐ │
//!                        │  │           Cross-Cutting Concerns           │ │
//!                        │  │  ┌────────┐ ┌──────────┐ ┌─────────────┐  │ │
//!                        │  │  │ config │ │ registry │ │observability│  │ │
//!                        │  │  └────────┘ └──────────┘ └─────────────┘  │ │
//!                        │  └───────────────────────────────────────────┘ │
//!                        └────────────────────────────────────────────────┘
//! ```
//!
//! The registry and both resolvers are read-only after startup; each
//! request runs a short linear pipeline with exactly one suspension point,
//! the outbound fetch.

// Core subsystems
pub mod config;
pub mod http;
pub mod mapping;
pub mod registry;
pub mod rewrite;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::MirrorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
