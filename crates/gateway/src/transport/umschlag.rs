//! Erkennung des Request-Umschlags
//!
//! Body-Umschlag (POST/PUT/PATCH):
//! `{ "sessionId", "cipherText", "iv", "tag", "nonce": <integer> }`
//!
//! Header-Umschlag (GET/DELETE): `x-session-id`, `x-nonce`

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::{GatewayFehler, GatewayResult};

pub const HEADER_SESSION_ID: &str = "x-session-id";
pub const HEADER_NONCE: &str = "x-nonce";

/// Verschluesselter JSON-Body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyUmschlag {
    pub session_id: String,
    pub cipher_text: String,
    pub iv: String,
    pub tag: String,
    pub nonce: u64,
}

impl BodyUmschlag {
    fn vollstaendig(&self) -> bool {
        !self.session_id.is_empty()
            && !self.cipher_text.is_empty()
            && !self.iv.is_empty()
            && !self.tag.is_empty()
    }
}

/// Einmal pro Request aufgeloeste Form des Umschlags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Umschlag {
    Body(BodyUmschlag),
    Header { session_id: String, nonce: u64 },
    Fehlend,
}

impl Umschlag {
    /// Body hat Vorrang vor Headern
    ///
    /// Ein unvollstaendiger oder nicht-JSON Body gilt nicht als Umschlag. Ist
    /// `x-session-id` gesetzt, muessen beide Header gueltig sein.
    pub fn aufloesen(headers: &HeaderMap, body: &[u8]) -> GatewayResult<Self> {
        if let Ok(umschlag) = serde_json::from_slice::<BodyUmschlag>(body) {
            if umschlag.vollstaendig() {
                return Ok(Self::Body(umschlag));
            }
        }

        let Some(session_header) = headers.get(HEADER_SESSION_ID) else {
            return Ok(Self::Fehlend);
        };

        let session_id = session_header
            .to_str()
            .map(str::trim)
            .map_err(|_| GatewayFehler::UngueltigeHeader)?;
        if session_id.is_empty() {
            return Err(GatewayFehler::UngueltigeHeader);
        }

        let nonce = headers
            .get(HEADER_NONCE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or(GatewayFehler::UngueltigeHeader)?;

        Ok(Self::Header {
            session_id: session_id.to_string(),
            nonce,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Body(b) => Some(&b.session_id),
            Self::Header { session_id, .. } => Some(session_id),
            Self::Fehlend => None,
        }
    }

    pub fn nonce(&self) -> Option<u64> {
        match self {
            Self::Body(b) => Some(b.nonce),
            Self::Header { nonce, .. } => Some(*nonce),
            Self::Fehlend => None,
        }
    }
}
