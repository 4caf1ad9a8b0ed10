//! HTTP front end of the Detour redirect service.
//!
//! The router answers arbitrary request paths with the winning mapping and
//! exposes an administrative API under `/v1` for mappings, manual
//! resolution tests, the content mirror and content lifecycle events.

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;

pub use app::App;
pub use error::{AppError, Result};
pub use state::{AppState, GatewaySettings};
