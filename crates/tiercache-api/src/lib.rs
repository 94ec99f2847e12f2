//! tiercache HTTP server
//!
//! This crate provides the Axum-based server side of the tiered cache: the
//! origin that sits behind the edge cache, answers its misses, stamps the
//! headers that control its retention, and repairs misses from the durable
//! store.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
