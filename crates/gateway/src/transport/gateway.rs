//! Axum-Middleware fuer verschluesselte Routen

use agrolink_crypto::{umschlag_oeffnen, versiegeln, VersiegelterUmschlag};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::{GatewayFehler, GatewayResult};
use crate::rest::middleware::client_ip_aus_request;
use crate::rest::GatewayState;
use crate::transport::{SitzungsKontext, Umschlag};

/// Obergrenze fuer Request- und Response-Bodies
pub const MAX_BODY_GROESSE: usize = 2 * 1024 * 1024;

/// Versiegelte Antwort eines geschuetzten Handlers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersiegelteAntwort {
    pub session_id: String,
    pub cipher_text: String,
    pub iv: String,
    pub tag: String,
    /// Empfehlung: `lastNonce + 1`
    pub next_nonce: u64,
}

/// Middleware fuer `Schutz::Verschluesselt` Routen
///
/// Fehler beenden den Request, der Handler wird dann nie aufgerufen.
pub async fn transport_middleware(
    State(state): State<GatewayState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = client_ip_aus_request(&req);
    let pfad = req.uri().path().to_string();

    match verarbeiten(&state, req, next).await {
        Ok(antwort) => antwort,
        Err(fehler) => {
            tracing::warn!(
                client_ip = %client_ip,
                path = %pfad,
                code = fehler.fehler_code(),
                "Verschluesselte Anfrage abgelehnt: {fehler}"
            );
            state.ablehnung_zaehlen(fehler.fehler_code());
            fehler.into_response()
        }
    }
}

async fn verarbeiten(
    state: &GatewayState,
    req: Request<Body>,
    next: Next,
) -> GatewayResult<Response> {
    let (mut parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_GROESSE)
        .await
        .map_err(|_| GatewayFehler::UngueltigeEingabe("Request body too large or unreadable".into()))?;

    let umschlag = Umschlag::aufloesen(&parts.headers, &bytes)?;
    let (Some(session_id), Some(nonce)) = (umschlag.session_id(), umschlag.nonce()) else {
        return Err(GatewayFehler::UmschlagFehlt);
    };
    let session_id = session_id.to_string();

    let schluessel = state.store.schluessel_fuer_entschluesselung(&session_id)?;

    // Verbraucht wird die Nonce erst nach erfolgreicher Entschluesselung
    if !state.store.nonce_pruefen(&session_id, nonce)? {
        return Err(GatewayFehler::Replay);
    }

    let neuer_body = match &umschlag {
        Umschlag::Body(b) => {
            let versiegelt = VersiegelterUmschlag::aus_base64(&b.cipher_text, &b.iv, &b.tag)
                .map_err(|_| GatewayFehler::Entschluesselung)?;
            let klartext =
                umschlag_oeffnen(&schluessel, &versiegelt).map_err(|_| GatewayFehler::Entschluesselung)?;
            // Geschuetzte Handler erwarten JSON
            serde_json::from_slice::<serde_json::Value>(&klartext)
                .map_err(|_| GatewayFehler::Entschluesselung)?;

            parts.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(klartext.len()));
            Body::from(klartext)
        }
        Umschlag::Header { .. } => Body::from(bytes),
        Umschlag::Fehlend => return Err(GatewayFehler::UmschlagFehlt),
    };

    // Parallele Anfrage mit derselben Nonce kann inzwischen gewonnen haben
    if !state.store.nonce_akzeptieren(&session_id, nonce)? {
        return Err(GatewayFehler::Replay);
    }

    tracing::debug!(session_id = %session_id, nonce, "Anfrage entschluesselt");

    parts.extensions.insert(SitzungsKontext {
        session_id: session_id.clone(),
        nonce,
    });

    let antwort = next.run(Request::from_parts(parts, neuer_body)).await;

    // Fehlerantworten des Handlers gehen unverschluesselt zurueck
    if !antwort.status().is_success() {
        return Ok(antwort);
    }

    let (antwort_parts, antwort_body) = antwort.into_parts();
    let klartext: Bytes = to_bytes(antwort_body, MAX_BODY_GROESSE)
        .await
        .map_err(|e| GatewayFehler::Intern(format!("Antwort nicht lesbar: {e}")))?;

    let kontext = state
        .store
        .schluessel_fuer_antwort(&session_id)
        .map_err(|_| GatewayFehler::SitzungAbgelaufen)?;
    // Rotiert waehrend des Requests: der Client kennt nur den alten Schluessel
    if kontext.schluessel != schluessel {
        return Err(GatewayFehler::SitzungAbgelaufen);
    }

    let versiegelt = versiegeln(&schluessel, &klartext)
        .map_err(|e| GatewayFehler::Intern(e.to_string()))?
        .zu_base64();

    let antwort = VersiegelteAntwort {
        session_id,
        cipher_text: versiegelt.cipher_text,
        iv: versiegelt.iv,
        tag: versiegelt.tag,
        next_nonce: kontext.naechste_nonce,
    };

    let mut versiegelte_antwort = (antwort_parts.status, Json(antwort)).into_response();
    for (name, wert) in antwort_parts.headers.iter() {
        if *name != header::CONTENT_TYPE && *name != header::CONTENT_LENGTH {
            versiegelte_antwort
                .headers_mut()
                .append(name.clone(), wert.clone());
        }
    }
    Ok(versiegelte_antwort)
}
