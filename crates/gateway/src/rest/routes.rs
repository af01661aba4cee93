//! Route-Definitionen fuer die Krypto-Endpunkte (/crypto/...)

use axum::routing::{get, post};

use crate::rest::handlers;
use crate::transport::RoutenTabelle;

/// Traegt Handshake, Rotation und Statistik als ausgenommene Routen ein
pub fn crypto_routen(tabelle: RoutenTabelle) -> RoutenTabelle {
    tabelle
        .ausgenommen("/crypto/handshake", post(handlers::crypto::handshake))
        .ausgenommen("/crypto/rotate", post(handlers::crypto::rotieren))
        .ausgenommen(
            "/crypto/stats/:session_id",
            get(handlers::crypto::statistik),
        )
}
