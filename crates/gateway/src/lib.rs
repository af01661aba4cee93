#![allow(clippy::result_large_err)]
//! agrolink-gateway – Transport-Gateway fuer den Agrolink Server
//!
//! - **transport**: Middleware, die geschuetzte Routen ent- und verschluesselt
//! - **rest**: Handshake-, Rotations- und Statistik-Endpunkte sowie der Axum-Server
//! - **rate_limit**: Festes Zeitfenster pro Client-IP
//!
//! Alle Endpunkte teilen sich denselben [`rest::GatewayState`] mit dem
//! [`agrolink_session::SitzungsStore`].

pub mod error;
pub mod rate_limit;
pub mod rest;
pub mod transport;

pub use error::{GatewayFehler, GatewayResult};
pub use rate_limit::{RateLimitEntscheidung, RateLimitKonfig, RateLimiter};
pub use rest::{GatewayState, RestServer, RestServerKonfig};
pub use transport::{RoutenTabelle, Schutz, SitzungsKontext, Umschlag};
