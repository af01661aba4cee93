//! REST-Handler fuer Handshake, Schluesselrotation und Sitzungsstatistik
//!
//! Alle drei Routen sind vom Transport-Gateway ausgenommen: vor dem
//! Handshake existiert noch kein Schluessel.

use std::net::SocketAddr;

use agrolink_crypto::{
    peer_schluessel_dekodieren, sitzungsschluessel_ableiten, EphemeresSchluesselpaar,
    Sitzungsschluessel,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayFehler, GatewayResult};
use crate::rest::middleware::client_ip;
use crate::rest::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAnfrage {
    #[serde(default)]
    pub client_public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAntwort {
    pub session_id: String,
    pub server_public_key: String,
    pub expires_in_ms: u64,
    pub max_requests: u64,
    pub rotate_after: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationsAnfrage {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub client_public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationsAntwort {
    pub session_id: String,
    pub server_public_key: String,
    pub rotated: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatistikAntwort {
    pub session_id: String,
    pub request_count: u64,
    pub age_seconds: i64,
    pub ttl_seconds: i64,
    pub should_rotate: bool,
    pub last_nonce: u64,
    pub max_requests: u64,
}

/// ECDH mit frischem Server-Schluesselpaar und Ableitung des Sitzungsschluessels
///
/// Gibt den Sitzungsschluessel und den oeffentlichen Server-Schluessel (Base64) zurueck.
fn schluessel_aushandeln(
    state: &GatewayState,
    client_public_key: &str,
) -> GatewayResult<(Sitzungsschluessel, String)> {
    let peer = peer_schluessel_dekodieren(client_public_key)
        .map_err(|e| GatewayFehler::Handshake(e.to_string()))?;
    let paar = EphemeresSchluesselpaar::erzeugen();
    let server_public_key = paar.oeffentlicher_schluessel_base64();
    let geheimnis = paar
        .austauschen(&peer)
        .map_err(|e| GatewayFehler::Handshake(e.to_string()))?;
    let schluessel = sitzungsschluessel_ableiten(&geheimnis, state.ableitung)
        .map_err(|e| GatewayFehler::Handshake(e.to_string()))?;
    Ok((schluessel, server_public_key))
}

fn pflichtfeld(wert: Option<String>) -> Option<String> {
    wert.filter(|s| !s.trim().is_empty())
}

fn abgelehnt(state: &GatewayState, fehler: GatewayFehler) -> Response {
    state.ablehnung_zaehlen(fehler.fehler_code());
    fehler.into_response()
}

/// POST /crypto/handshake
pub async fn handshake(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<HandshakeAnfrage>, JsonRejection>,
) -> Response {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    match handshake_ausfuehren(&state, body, &ip) {
        Ok(antwort) => Json(antwort).into_response(),
        Err(fehler) => {
            tracing::warn!(client_ip = %ip, "Handshake abgelehnt: {fehler}");
            abgelehnt(&state, fehler)
        }
    }
}

fn handshake_ausfuehren(
    state: &GatewayState,
    body: Result<Json<HandshakeAnfrage>, JsonRejection>,
    ip: &str,
) -> GatewayResult<HandshakeAntwort> {
    let Json(anfrage) =
        body.map_err(|_| GatewayFehler::Handshake("clientPublicKey required".into()))?;
    let client_public_key = pflichtfeld(anfrage.client_public_key)
        .ok_or_else(|| GatewayFehler::Handshake("clientPublicKey required".into()))?;

    let (schluessel, server_public_key) = schluessel_aushandeln(state, &client_public_key)?;
    let session_id = state.store.neue_sitzung(schluessel)?;

    let konfig = state.store.konfig();
    tracing::info!(session_id = %session_id, client_ip = %ip, "Neue Krypto-Sitzung");
    if let Some(m) = &state.metriken {
        m.handshakes_total.inc();
    }
    state.sitzungen_aktualisieren();

    Ok(HandshakeAntwort {
        session_id,
        server_public_key,
        expires_in_ms: u64::try_from(konfig.ttl.as_millis()).unwrap_or(u64::MAX),
        max_requests: konfig.max_anfragen,
        rotate_after: konfig.rotation_empfohlen_ab,
    })
}

/// POST /crypto/rotate
pub async fn rotieren(
    State(state): State<GatewayState>,
    body: Result<Json<RotationsAnfrage>, JsonRejection>,
) -> Response {
    match rotation_ausfuehren(&state, body) {
        Ok(antwort) => Json(antwort).into_response(),
        Err(fehler) => {
            tracing::warn!("Rotation abgelehnt: {fehler}");
            abgelehnt(&state, fehler)
        }
    }
}

fn rotation_ausfuehren(
    state: &GatewayState,
    body: Result<Json<RotationsAnfrage>, JsonRejection>,
) -> GatewayResult<RotationsAntwort> {
    let pflicht = || GatewayFehler::UngueltigeEingabe("sessionId and clientPublicKey required".into());
    let Json(anfrage) = body.map_err(|_| pflicht())?;
    let (Some(session_id), Some(client_public_key)) = (
        pflichtfeld(anfrage.session_id),
        pflichtfeld(anfrage.client_public_key),
    ) else {
        return Err(pflicht());
    };

    // Sitzung muss vor dem Austausch existieren, zaehlt aber nicht als Anfrage
    state
        .store
        .statistik(&session_id)
        .map_err(|_| GatewayFehler::SitzungNichtVerfuegbar)?;

    let (schluessel, server_public_key) = schluessel_aushandeln(state, &client_public_key)?;

    state
        .store
        .rotieren(&session_id, schluessel)
        .map_err(|_| GatewayFehler::Rotation)?;

    if let Some(m) = &state.metriken {
        m.rotationen_total.inc();
    }

    Ok(RotationsAntwort {
        session_id,
        server_public_key,
        rotated: true,
        message: "Key rotated successfully. Request counter reset to 0.".into(),
    })
}

/// GET /crypto/stats/:session_id
pub async fn statistik(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.store.statistik(&session_id) {
        Ok(s) => Json(StatistikAntwort {
            age_seconds: s.alter_sekunden(),
            ttl_seconds: s.ttl_sekunden(),
            session_id: s.session_id,
            request_count: s.anfragen,
            should_rotate: s.rotation_empfohlen,
            last_nonce: s.letzte_nonce,
            max_requests: s.max_anfragen,
        })
        .into_response(),
        Err(_) => GatewayFehler::NichtGefunden.into_response(),
    }
}
