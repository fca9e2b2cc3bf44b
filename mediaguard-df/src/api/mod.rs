//! HTTP API handlers for mediaguard-df

pub mod detect;
pub mod health;

pub use detect::detect_routes;
pub use health::health_routes;
