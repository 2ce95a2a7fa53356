//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, proxy pipeline)
//!     → request.rs (request ID stamping)
//!     → device.rs (device-class classification, diagnostics only)
//!     → mapping (redirect policy, upstream resolution)
//!     → single outbound fetch
//!     → rewrite (HTML bodies only)
//!     → Send to client
//! ```

pub mod device;
pub mod request;
pub mod server;

pub use request::{RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
