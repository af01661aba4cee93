//! Geschuetzte Beispiel-Endpunkte hinter dem Transport-Gateway
//!
//! Stehen stellvertretend fuer die Fach-API: sie sehen nur entschluesselte
//! JSON-Bodies und liefern Klartext, das Gateway uebernimmt den Rest.

use agrolink_gateway::{GatewayFehler, GatewayState, RoutenTabelle, SitzungsKontext};
use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension,
};
use serde_json::{json, Value};

/// POST /v1/ping – spiegelt den entschluesselten Body
pub async fn ping(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "pong": body }))
}

/// GET /v1/status – Zustand der eigenen Sitzung
pub async fn status(
    State(state): State<GatewayState>,
    Extension(kontext): Extension<SitzungsKontext>,
) -> Response {
    match state.store.statistik(&kontext.session_id) {
        Ok(s) => Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "requestCount": s.anfragen,
            "shouldRotate": s.rotation_empfohlen,
            "ttlSeconds": s.ttl_sekunden(),
        }))
        .into_response(),
        Err(_) => GatewayFehler::SitzungAbgelaufen.into_response(),
    }
}

/// Traegt die Beispiel-Endpunkte als verschluesselte Routen ein
pub fn demo_routen(tabelle: RoutenTabelle) -> RoutenTabelle {
    tabelle
        .verschluesselt("/v1/ping", post(ping))
        .verschluesselt("/v1/status", get(status))
}
