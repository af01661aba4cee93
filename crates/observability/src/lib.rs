//! # agrolink-observability
//!
//! Observability-Crate fuer Agrolink:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, AgrolinkMetriken, MetrikAktualisierung};
pub use middleware::{request_timing_layer, timing_middleware};
