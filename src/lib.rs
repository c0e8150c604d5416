//! deck2pdf
//!
//! Accepts presentation uploads over HTTP, converts them to PDF with an
//! external engine in an isolated per-request workspace, and reclaims every
//! workspace afterwards, either through deferred cleanup or the janitor.

pub mod app;
pub mod config;
pub mod converter;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod service;
pub mod state;
pub mod validation;
pub mod workspace;

pub use app::build_router;
pub use config::{Args, Settings};
pub use error::{ConvertError, InputRejection};
pub use state::AppState;
