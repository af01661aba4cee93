//! Fehlertypen fuer das Agrolink Transport-Gateway
//!
//! Die Meldungen gehen unveraendert an den Client und bleiben deshalb im
//! Wortlaut des bestehenden Client-Protokolls.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use agrolink_session::SitzungsFehler;

use crate::rest::middleware::fehler_antwort;

/// Alle moeglichen Fehler im Gateway-Crate
#[derive(Debug, Error)]
pub enum GatewayFehler {
    /// Client-Schluessel fehlt, ist kein gueltiger Kurvenpunkt oder ECDH scheitert
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Sitzung unbekannt, abgelaufen oder Kontingent erschoepft
    #[error("Invalid or expired session")]
    SitzungNichtVerfuegbar,

    #[error("Invalid nonce (possible replay attack)")]
    Replay,

    #[error("Failed to decrypt payload")]
    Entschluesselung,

    /// Sitzung zwischen Pruefung und Schluesseltausch verschwunden
    #[error("Failed to rotate key")]
    Rotation,

    /// Sitzung waehrend des Requests abgelaufen, Antwort wird nicht versiegelt
    #[error("Crypto session expired")]
    SitzungAbgelaufen,

    #[error("Encrypted payload or Session Headers required. Please perform handshake at POST /crypto/handshake first.")]
    UmschlagFehlt,

    #[error("Invalid Session Headers")]
    UngueltigeHeader,

    #[error("{0}")]
    UngueltigeEingabe(String),

    #[error("Session not found")]
    NichtGefunden,

    #[error("Too many requests, retry in {retry_after_secs} seconds")]
    RateLimitUeberschritten { retry_after_secs: u64 },

    #[error("Internal server error: {0}")]
    Intern(String),
}

pub type GatewayResult<T> = Result<T, GatewayFehler>;

impl GatewayFehler {
    /// Maschinenlesbarer Fehler-Code fuer das `error.code` Feld
    pub fn fehler_code(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake_failed",
            Self::SitzungNichtVerfuegbar => "session_unavailable",
            Self::Replay => "replay_detected",
            Self::Entschluesselung => "decrypt_failed",
            Self::Rotation => "rotation_failed",
            Self::SitzungAbgelaufen => "session_expired",
            Self::UmschlagFehlt => "envelope_missing",
            Self::UngueltigeHeader => "invalid_session_headers",
            Self::UngueltigeEingabe(_) => "invalid_request",
            Self::NichtGefunden => "not_found",
            Self::RateLimitUeberschritten { .. } => "rate_limited",
            Self::Intern(_) => "internal",
        }
    }

    /// HTTP-Statuscode fuer REST-Fehler
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Handshake(_)
            | Self::Replay
            | Self::Entschluesselung
            | Self::UmschlagFehlt
            | Self::UngueltigeHeader
            | Self::UngueltigeEingabe(_) => StatusCode::BAD_REQUEST,
            Self::SitzungNichtVerfuegbar | Self::SitzungAbgelaufen => StatusCode::UNAUTHORIZED,
            Self::NichtGefunden => StatusCode::NOT_FOUND,
            Self::RateLimitUeberschritten { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Rotation | Self::Intern(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SitzungsFehler> for GatewayFehler {
    fn from(fehler: SitzungsFehler) -> Self {
        match fehler {
            SitzungsFehler::NichtVerfuegbar => Self::SitzungNichtVerfuegbar,
            SitzungsFehler::IdKollision => Self::Intern(fehler.to_string()),
        }
    }
}

impl IntoResponse for GatewayFehler {
    fn into_response(self) -> Response {
        let mut antwort = fehler_antwort(self.http_status(), &self.to_string(), self.fehler_code());
        if let Self::RateLimitUeberschritten { retry_after_secs } = self {
            antwort
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        antwort
    }
}
