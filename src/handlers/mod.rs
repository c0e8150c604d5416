mod convert;
mod health;
mod metrics;

pub use convert::convert_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
